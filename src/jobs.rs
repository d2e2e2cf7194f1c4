//! Interval runner for the batch jobs, used by the binary when intervals are
//! configured. Library users are free to drive the service from their own
//! scheduler instead.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{AbortHandle, Abortable};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::JobsConfig;
use crate::service::TrafficService;
use crate::utils::{log_job_event, GuardResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    AutoBan,
    AutoWhitelist,
    Gc,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::AutoBan => "autoban",
            Job::AutoWhitelist => "autowhitelist",
            Job::Gc => "gc",
        }
    }
}

/// Run one job to completion and describe what it did
pub async fn run_job(service: &TrafficService, job: Job) -> GuardResult<String> {
    match job {
        Job::AutoBan => {
            let report = service.auto_ban().await?;
            Ok(format!("{} bans issued", report.banned()))
        }
        Job::AutoWhitelist => {
            let report = service.auto_whitelist().await?;
            Ok(format!(
                "{} checked, {} matched, {} newly whitelisted",
                report.checked, report.matched, report.inserted
            ))
        }
        Job::Gc => {
            let report = service.gc().await?;
            Ok(format!(
                "{} bans and {} counters removed",
                report.bans_removed, report.counters_removed
            ))
        }
    }
}

/// Spawns one timer task per enabled job. Jobs are independent and may
/// overlap each other; a failed run waits for the next tick.
pub struct JobRunner {
    service: Arc<TrafficService>,
    config: JobsConfig,
    handles: Vec<AbortHandle>,
}

impl JobRunner {
    pub fn new(service: Arc<TrafficService>, config: JobsConfig) -> Self {
        Self {
            service,
            config,
            handles: Vec::new(),
        }
    }

    /// Start every job with a non-zero interval; returns how many started
    pub fn start(&mut self) -> usize {
        let schedule = [
            (Job::AutoBan, self.config.autoban_interval_secs),
            (Job::AutoWhitelist, self.config.autowhitelist_interval_secs),
            (Job::Gc, self.config.gc_interval_secs),
        ];

        for (job, secs) in schedule {
            if secs == 0 {
                continue;
            }

            let service = self.service.clone();
            let (handle, registration) = AbortHandle::new_pair();
            let task = async move {
                let mut ticker = interval(Duration::from_secs(secs));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match run_job(&service, job).await {
                        Ok(details) => log_job_event(job.name(), true, Some(&details)),
                        Err(e) => log_job_event(job.name(), false, Some(&e.to_string())),
                    }
                }
            };

            tokio::spawn(Abortable::new(task, registration));
            tracing::info!(job = %job.name(), interval_secs = %secs, "Job scheduled");
            self.handles.push(handle);
        }

        self.handles.len()
    }

    /// Abort every job, including runs in progress
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
