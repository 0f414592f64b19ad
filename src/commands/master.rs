use bigeye::Result;
use bigeye::config::Config;
use bigeye::engine::{RunContext, Scheduler};
use bigeye::metrics::MetricDefinition;
use ohno::bail;

pub async fn run_checks(context: &RunContext, config: &Config, definitions: &[MetricDefinition]) -> Result<()> {
    let mut scheduler = Scheduler::new(context, &config.run, definitions);
    let summary = scheduler.run().await;

    if summary.all_flushes_failed() {
        bail!("all {} deliveries of the run failed", summary.flushes);
    }

    Ok(())
}
