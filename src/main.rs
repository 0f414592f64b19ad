//! A configuration-driven data-quality and consistency monitoring runner.
//!
//! # Overview
//!
//! `bigeye` periodically evaluates metrics defined in YAML files against data fetchers
//! (PostgreSQL databases, JSON HTTP APIs), and publishes the values as time series to dashboard
//! backends (Datadog, the console). Dashboards are provisioned automatically as metric sets change.
//!
//! # Usage
//!
//! **Run the checks:**
//! ```bash
//! bigeye --config config.yaml --tests 'tests/**/*.yaml' master
//! ```
//!
//! **Run a subset of the definition files:**
//! ```bash
//! bigeye --only orders.yaml --only payments.yaml master
//! ```
//!
//! **Bring dashboards in line with the definitions:**
//! ```bash
//! bigeye updateBoards
//! ```
//!
//! # Configuration
//!
//! ```yaml
//! Fetchers:
//!   db_a:
//!     type: PostgresDB
//!     host: orders.internal
//!     database: shop
//!     user: reader
//!     password: env:ORDERS_DB_PASSWORD
//! Publishers:
//!   datadog:
//!     type: Datadog
//!     apiKey: env:DD_API_KEY
//!     appKey: env:DD_APP_KEY
//! runConfiguration:
//!   fetchers: [db_a]
//!   publishers: [datadog]
//!   types: [quality, consistency]
//!   batchSize: 100
//!   maxTestDuration: 3000
//!   timeBetweenCalls: 300
//!   iterations: 10
//! ```
//!
//! Values of the form `env:NAME` are read from the environment when the file is loaded.
//!
//! # Metric Definitions
//!
//! ```yaml
//! name: row_count_match
//! description: Orders must be archived
//! type: consistency
//! action: division
//! team: data
//! metrics:
//!   main:
//!     fetchers:
//!       db_a: { query: "select count(*) from orders" }
//!       db_b: { query: "select count(*) from orders_archive" }
//!     publishers:
//!       datadog: { dashboardName: Data Police, typeOfDashboard: timeboard }
//!     tags: { region: eu }
//! ```
//!
//! # Exit Codes
//!
//! - `0`: the run completed
//! - `1`: configuration or definitions failed to load, every delivery of the run failed, or
//!   every dashboard reconciliation failed

use bigeye::Result;
use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};

mod commands;

use crate::commands::{Args, execute};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "bigeye", version, about, long_about = None)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(flatten)]
    args: Args,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(&cli.args).await
}
