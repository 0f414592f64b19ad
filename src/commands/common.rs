//! Argument handling and the steps shared by every run mode.

use bigeye::Result;
use bigeye::config::{Config, RunMode};
use bigeye::engine::RunContext;
use bigeye::metrics::load_definitions;
use camino::Utf8PathBuf;
use clap::ValueEnum;
use ohno::IntoAppError;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

#[derive(clap::Args, Debug)]
pub struct Args {
    /// Run mode: `master` evaluates and publishes, `updateBoards` only reconciles dashboards
    #[arg(value_name = "MODE")]
    pub mode: String,

    /// Path to the configuration file
    #[arg(long, short = 'c', default_value = "config.yaml", value_name = "PATH", env = "BIGEYE_CONFIG")]
    pub config: Utf8PathBuf,

    /// Glob pattern locating the metric definition files
    #[arg(long, short = 't', default_value = "tests/**/*.yaml", value_name = "GLOB")]
    pub tests: String,

    /// Only load definition files with this file name (repeatable)
    #[arg(long, value_name = "FILE_NAME")]
    pub only: Vec<String>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}

/// Loads everything a run needs, then hands over to the selected mode.
pub async fn execute(args: &Args) -> Result<()> {
    init_logging(args.log_level);

    let mode: RunMode = args.mode.parse()?;

    let config = Config::load(&args.config).into_app_err_with(|| format!("unable to load configuration '{}'", args.config))?;

    let definitions =
        load_definitions(&args.tests, &args.only, &config).into_app_err_with(|| format!("unable to load definitions from '{}'", args.tests))?;

    let mut context = RunContext::from_config(&config).into_app_err("unable to set up fetchers and publishers")?;

    let outcome = match mode {
        RunMode::Master => super::master::run_checks(&context, &config, &definitions).await,
        RunMode::UpdateBoards => super::update_boards::update_boards(&context, &definitions).await,
    };

    context.tear_down();
    outcome
}
