//! The cron collaborator contract.
//!
//! Cron expression parsing and ticking belong to the external cron
//! library (`croner` in the generated backend entry, reached through the
//! node sidecar in dev). The framework only needs this seam: register a
//! subscription with overlap protection, stop them all on reload.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::runtime::{NodeRuntime, RuntimeError};

/// One job registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub module_path: String,
    pub display_name: String,
}

/// External cron scheduler: a second tick is dropped while the previous
/// run of the same subscription is still going.
#[async_trait]
pub trait CronScheduler: Send + Sync {
    async fn schedule(&self, expression: &str, job: ScheduledJob) -> Result<(), RuntimeError>;

    /// Drop every subscription (jobs reload, shutdown).
    async fn stop_all(&self);
}

/// Cron backed by the node sidecar's `croner` binding.
pub struct SidecarCron {
    runtime: Arc<NodeRuntime>,
}

impl SidecarCron {
    pub fn new(runtime: Arc<NodeRuntime>) -> Self {
        SidecarCron { runtime }
    }
}

#[async_trait]
impl CronScheduler for SidecarCron {
    async fn schedule(&self, expression: &str, job: ScheduledJob) -> Result<(), RuntimeError> {
        self.runtime
            .request(json!({
                "op": "schedule",
                "expression": expression,
                "module": job.module_path,
                "name": job.display_name,
            }))
            .await
            .map(|_| ())
    }

    async fn stop_all(&self) {
        let _ = self.runtime.request(json!({ "op": "unschedule-all" })).await;
    }
}

/// Recording scheduler for tests: registrations are inspectable and
/// fired by hand.
#[derive(Default)]
pub struct ManualCron {
    entries: Mutex<Vec<(String, ScheduledJob)>>,
}

impl ManualCron {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> Vec<(String, ScheduledJob)> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl CronScheduler for ManualCron {
    async fn schedule(&self, expression: &str, job: ScheduledJob) -> Result<(), RuntimeError> {
        self.entries.lock().push((expression.to_string(), job));
        Ok(())
    }

    async fn stop_all(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_cron_records_and_clears() {
        let cron = ManualCron::new();
        cron.schedule(
            "0 3 * * *",
            ScheduledJob { module_path: "src/jobs/cleanup/job.ts".into(), display_name: "cleanup".into() },
        )
        .await
        .unwrap();
        assert_eq!(cron.registrations().len(), 1);
        assert_eq!(cron.registrations()[0].0, "0 3 * * *");

        cron.stop_all().await;
        assert!(cron.registrations().is_empty());
    }
}
