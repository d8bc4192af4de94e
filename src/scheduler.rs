// src/scheduler.rs
//! Interval loop around a [`CycleRunner`].
//!
//! Runs one cycle immediately, then sleeps `interval` after each cycle completes, so
//! cycles never overlap. A cycle that errors or panics is logged and counted; the loop
//! keeps going until shutdown.

use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::pipeline::CycleReport;
use crate::shutdown::Shutdown;

/// Anything that can run one cycle. Implemented by `SharedPipeline`.
#[async_trait::async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, stop: &Shutdown) -> anyhow::Result<CycleReport>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Loop until `shutdown` fires. `on_report` sees every successful report.
    pub async fn run<R, F>(&self, runner: &R, mut shutdown: Shutdown, mut on_report: F) -> SchedulerSummary
    where
        R: CycleRunner + ?Sized,
        F: FnMut(&CycleReport) + Send,
    {
        let mut summary = SchedulerSummary::default();
        tracing::info!(target: "scheduler", interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            if shutdown.is_requested() {
                break;
            }

            let outcome = AssertUnwindSafe(runner.run_cycle(&shutdown))
                .catch_unwind()
                .await;
            summary.cycles += 1;
            match outcome {
                Ok(Ok(report)) => {
                    if report.has_errors() {
                        tracing::warn!(target: "scheduler", errors = report.errors.len(), "cycle finished with errors");
                    }
                    on_report(&report);
                }
                Ok(Err(e)) => {
                    summary.failed_cycles += 1;
                    counter!("radar_failed_cycles_total").increment(1);
                    tracing::error!(target: "scheduler", error = %format!("{e:#}"), "cycle failed");
                }
                Err(panic) => {
                    summary.failed_cycles += 1;
                    counter!("radar_failed_cycles_total").increment(1);
                    tracing::error!(target: "scheduler", panic = %panic_message(&*panic), "cycle panicked");
                }
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(target: "scheduler", cycles = summary.cycles, failed = summary.failed_cycles, "scheduler stopped");
        summary
    }
}

fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
