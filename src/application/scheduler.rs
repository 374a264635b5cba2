//! Job Scheduler
//!
//! Timer-driven background jobs. Each job owns a [`JobGuard`] so a run that
//! overlaps a previous one is skipped instead of stacking. All loops share
//! one stop flag, checked at least once per poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio::sync::RwLock;

/// Non-reentrancy guard for one job
#[derive(Debug, Clone, Default)]
pub struct JobGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard on drop
#[derive(Debug)]
pub struct JobPermit {
    running: Arc<AtomicBool>,
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another run holds the guard
    pub fn try_enter(&self) -> Option<JobPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Result of asking a guarded job to run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<R> {
    Completed(R),
    /// A previous run was still in flight
    Skipped,
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// One run; failures are logged by the job itself
    async fn run_once(&self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    /// Fixed period, counted from the end of the previous run
    Interval(Duration),
    /// Once a day at a UTC wall-clock time
    Daily(NaiveTime),
}

impl Schedule {
    /// Next fire time strictly after `now`
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Interval(period) => {
                now + TimeDelta::from_std(*period).unwrap_or(TimeDelta::seconds(60))
            }
            Schedule::Daily(at) => {
                let today = now.date_naive().and_time(*at).and_utc();
                if today > now {
                    today
                } else {
                    today + TimeDelta::days(1)
                }
            }
        }
    }
}

/// Parse an `HH:MM` UTC time of day
pub fn parse_daily_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub struct Scheduler {
    is_running: Arc<RwLock<bool>>,
    poll_interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(RwLock::new(true)),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Set custom stop-flag poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drive `job` on `schedule` until [`Scheduler::stop`] is called
    pub async fn run_job(&self, job: Arc<dyn Job>, schedule: Schedule) {
        tracing::info!("Starting job '{}' on {:?}", job.name(), schedule);

        while *self.is_running.read().await {
            let fire_at = schedule.next_fire(Utc::now());
            tracing::debug!("Job '{}' next run at {}", job.name(), fire_at);

            if !self.sleep_until(fire_at).await {
                break;
            }
            job.run_once().await;
        }

        tracing::info!("Job '{}' stopped", job.name());
    }

    /// Sleep in poll-sized steps; false when stopped before `deadline`
    async fn sleep_until(&self, deadline: DateTime<Utc>) -> bool {
        loop {
            if !*self.is_running.read().await {
                return false;
            }
            let remaining = match (deadline - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return true,
            };
            tokio::time::sleep(remaining.min(self.poll_interval)).await;
        }
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        tracing::info!("Stop signal sent to scheduler");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}
