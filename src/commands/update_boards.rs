use bigeye::Result;
use bigeye::engine::{RunContext, reconcile_boards};
use bigeye::metrics::MetricDefinition;
use ohno::bail;

pub async fn update_boards(context: &RunContext, definitions: &[MetricDefinition]) -> Result<()> {
    let summary = reconcile_boards(context, definitions).await;

    if summary.all_failed() {
        bail!("dashboard reconciliation failed for all {} publisher(s)", summary.publishers);
    }

    Ok(())
}
