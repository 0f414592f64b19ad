use crate::config::RunConfiguration;
use crate::engine::{Evaluator, RunContext};
use crate::fetchers::Fetch;
use crate::metrics::{MetricDefinition, MetricResult};
use crate::publishers::Publish;
use core::mem;
use futures_util::future::join_all;
use std::time::Instant;
use strum::Display;

const LOG_TARGET: &str = " scheduler";

/// Lifecycle of a scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Idle,
    Running,
    Evaluating,
    Flushing,
    Sleeping,
    Done,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations that were started
    pub passes: u32,

    /// Results produced across all passes
    pub results: usize,

    /// Sub-metrics skipped because of an evaluation error
    pub failures: usize,

    /// Batches handed to publishers
    pub batches: usize,

    /// Deliveries attempted, one per publisher per batch
    pub flushes: usize,

    /// Deliveries that failed
    pub failed_flushes: usize,

    /// Whether the run stopped on `maxTestDuration`
    pub deadline_reached: bool,
}

impl RunSummary {
    /// True when deliveries were attempted and none of them succeeded.
    #[must_use]
    pub const fn all_flushes_failed(&self) -> bool {
        self.flushes > 0 && self.failed_flushes == self.flushes
    }
}

/// Drives iterations over the loaded definitions, batches results and hands them to publishers.
#[derive(Debug)]
pub struct Scheduler<'a, F: Fetch, P: Publish> {
    context: &'a RunContext<F, P>,
    run: &'a RunConfiguration,
    definitions: &'a [MetricDefinition],
    state: SchedulerState,
}

impl<'a, F: Fetch, P: Publish> Scheduler<'a, F, P> {
    #[must_use]
    pub const fn new(context: &'a RunContext<F, P>, run: &'a RunConfiguration, definitions: &'a [MetricDefinition]) -> Self {
        Self {
            context,
            run,
            definitions,
            state: SchedulerState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            log::debug!(target: LOG_TARGET, "{} -> {next}", self.state);
            self.state = next;
        }
    }

    fn deadline_reached(&self, start: Instant) -> bool {
        start.elapsed() >= self.run.max_test_duration
    }

    /// Runs up to `iterations` passes, stopping early once `maxTestDuration` has elapsed.
    ///
    /// The first pass always runs.
    pub async fn run(&mut self) -> RunSummary {
        self.transition(SchedulerState::Running);

        let start = Instant::now();
        let mut summary = RunSummary::default();

        for iteration in 1..=self.run.iterations {
            if iteration > 1 && self.deadline_reached(start) {
                summary.deadline_reached = true;
                break;
            }

            log::info!(target: LOG_TARGET, "Starting iteration {iteration} of {}", self.run.iterations);

            if self.run_pass(start, &mut summary).await {
                summary.deadline_reached = true;
                break;
            }

            if iteration == self.run.iterations {
                break;
            }

            if self.deadline_reached(start) {
                summary.deadline_reached = true;
                break;
            }

            self.transition(SchedulerState::Sleeping);
            tokio::time::sleep(self.run.time_between_calls).await;
        }

        if summary.deadline_reached {
            log::info!(target: LOG_TARGET, "Maximum test duration reached after {} pass(es)", summary.passes);
        }

        self.transition(SchedulerState::Done);

        log::info!(
            target: LOG_TARGET,
            "Run finished: {} pass(es), {} result(s), {} skipped sub-metric(s), {} of {} deliveries failed",
            summary.passes,
            summary.results,
            summary.failures,
            summary.failed_flushes,
            summary.flushes
        );

        summary
    }

    /// Evaluates every definition once. Returns true when the deadline cut the pass short.
    async fn run_pass(&mut self, start: Instant, summary: &mut RunSummary) -> bool {
        self.transition(SchedulerState::Evaluating);
        summary.passes += 1;

        let context = self.context;
        let run = self.run;
        let definitions = self.definitions;
        let evaluator = Evaluator::new(context.fetchers(), &run.types);

        let mut batch = Vec::with_capacity(run.batch_size);
        let mut stopped = false;

        for group in definitions.chunks(run.workers) {
            let outcomes = join_all(group.iter().map(|definition| evaluator.evaluate(definition))).await;

            for outcome in outcomes.into_iter().flatten() {
                match outcome {
                    Ok(result) => {
                        summary.results += 1;
                        batch.push(result);

                        if batch.len() >= run.batch_size {
                            if self.deadline_reached(start) {
                                stopped = true;
                            }
                            self.flush(&mut batch, summary).await;
                        }
                    }
                    Err(_) => summary.failures += 1,
                }
            }

            if stopped {
                log::debug!(target: LOG_TARGET, "Deadline reached, no further definitions taken in this pass");
                break;
            }
        }

        self.flush(&mut batch, summary).await;
        stopped
    }

    /// Hands the pending batch to every publisher bound by at least one of its results.
    async fn flush(&mut self, batch: &mut Vec<MetricResult>, summary: &mut RunSummary) {
        if batch.is_empty() {
            return;
        }

        self.transition(SchedulerState::Flushing);
        summary.batches += 1;

        let results = mem::take(batch);
        let context = self.context;

        let deliveries = context.publishers().iter().filter_map(|slot| {
            let bound: Vec<MetricResult> = results.iter().filter(|r| r.is_bound_to(slot.name())).cloned().collect();
            if bound.is_empty() {
                return None;
            }

            Some(async move {
                let outcome = slot.publish(&bound).await;
                (slot.name(), bound.len(), outcome)
            })
        });

        let outcomes = join_all(deliveries).await;
        if outcomes.is_empty() {
            log::debug!(target: LOG_TARGET, "No live publisher is bound by the {} pending result(s)", results.len());
        }

        for (publisher, count, outcome) in outcomes {
            summary.flushes += 1;
            match outcome {
                Ok(()) => log::debug!(target: LOG_TARGET, "Delivered {count} result(s) to '{publisher}'"),
                Err(e) => {
                    summary.failed_flushes += 1;
                    log::warn!(
                        target: LOG_TARGET,
                        "Delivery of {count} result(s) to '{publisher}' failed ({} delivered, {} not delivered): {e}",
                        e.delivered,
                        e.failed
                    );
                }
            }
        }

        self.transition(SchedulerState::Evaluating);
    }
}
