//! Named background tasks whose failures are reported, counted, and awaitable.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

use crate::metrics::PipelineMetrics;

#[derive(Debug)]
struct TaskFailure {
    name: String,
    error: anyhow::Error,
}

/// Spawns fire-and-forget work and funnels failures to one logging loop.
#[derive(Clone)]
pub struct TaskSupervisor {
    failures: mpsc::UnboundedSender<TaskFailure>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskSupervisor {
    /// Start the failure loop on the current runtime.
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        let (failures, mut receiver) = mpsc::unbounded_channel::<TaskFailure>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let loop_in_flight = in_flight.clone();
        let loop_idle = idle.clone();
        tokio::spawn(async move {
            while let Some(failure) = receiver.recv().await {
                tracing::error!(task = %failure.name, error = ?failure.error, "Background task failed");
                metrics.record_task_failure();
                finish(&loop_in_flight, &loop_idle);
            }
        });

        Self {
            failures,
            in_flight,
            idle,
        }
    }

    /// Run `task` in the background under `name`.
    ///
    /// Errors and panics are both reported as failures.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.clone();
        let in_flight = self.in_flight.clone();
        let idle = self.idle.clone();
        tracing::debug!(task = %name, "Background task spawned");

        tokio::spawn(async move {
            let outcome = match tokio::spawn(task).await {
                Ok(result) => result,
                Err(join_error) => Err(anyhow::anyhow!("task panicked: {join_error}")),
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(task = %name, "Background task finished");
                    finish(&in_flight, &idle);
                }
                Err(error) => {
                    if let Err(unsent) = failures.send(TaskFailure { name, error }) {
                        let failure = unsent.0;
                        tracing::error!(task = %failure.name, error = ?failure.error, "Background task failed after supervisor stopped");
                        finish(&in_flight, &idle);
                    }
                }
            }
        });
    }

    /// Tasks spawned and not yet accounted for.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every spawned task has finished and its failure, if any, was recorded.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn finish(in_flight: &AtomicUsize, idle: &Notify) {
    if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn succeed() -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    }

    async fn fail() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn failures_are_counted_and_awaited() {
        let metrics = Arc::new(PipelineMetrics::new());
        let supervisor = TaskSupervisor::new(metrics.clone());

        supervisor.spawn("ok", succeed());
        supervisor.spawn("fails", fail());
        supervisor.spawn("panics", explode());

        supervisor.wait_idle().await;
        assert_eq!(supervisor.in_flight(), 0);
        assert_eq!(metrics.snapshot().background_task_failures, 2);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_without_tasks() {
        let supervisor = TaskSupervisor::new(Arc::new(PipelineMetrics::new()));
        tokio::time::timeout(Duration::from_secs(1), supervisor.wait_idle())
            .await
            .expect("idle");
    }
}
