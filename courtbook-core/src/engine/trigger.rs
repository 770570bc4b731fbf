use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use tokio::time::sleep;
use tracing::debug;

use crate::reservation::{BookingError, BookingResult, TriggerTime};

use super::signal::CancelSignal;
use super::status::StatusReporter;

/// Wall-clock source, read once per schedule.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPlan {
    pub now: NaiveDateTime,
    pub target: NaiveDateTime,
    pub wait: Duration,
    /// Today's instant had already passed, so the plan targets tomorrow.
    pub rolled_over: bool,
}

impl TriggerPlan {
    /// Nearest instant at `at` that is not in the past, compared at second
    /// precision: the same second as `now` fires immediately.
    pub fn compute(now: NaiveDateTime, at: NaiveTime) -> Self {
        let at = at.with_nanosecond(0).unwrap_or(at);
        let now_second = now.with_nanosecond(0).unwrap_or(now);
        let today = now.date().and_time(at);
        let (target, rolled_over) = if today < now_second {
            (today + chrono::Duration::days(1), true)
        } else {
            (today, false)
        };
        let wait = (target - now).to_std().unwrap_or(Duration::ZERO);
        Self {
            now,
            target,
            wait,
            rolled_over,
        }
    }

    pub fn describe(&self) -> Vec<String> {
        let target = self.target.format("%Y-%m-%d %H:%M:%S");
        let when = if self.rolled_over {
            format!("today's trigger time has passed; waiting until tomorrow {target}")
        } else {
            format!("waiting until today {target}")
        };
        let seconds = self.wait.as_secs_f64();
        vec![
            when,
            format!(
                "need to wait {seconds:.1} seconds (about {:.1} minutes)",
                seconds / 60.0
            ),
        ]
    }
}

#[derive(Clone)]
pub struct TriggerScheduler {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TriggerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerScheduler").finish_non_exhaustive()
    }
}

impl Default for TriggerScheduler {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TriggerScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn plan(&self, trigger: TriggerTime) -> TriggerPlan {
        TriggerPlan::compute(self.clock.now(), trigger.time())
    }

    /// Suspends until the trigger instant. Only cancellation interrupts the
    /// wait; the clock is not consulted again.
    pub async fn wait(
        &self,
        trigger: TriggerTime,
        cancel: &CancelSignal,
        status: &StatusReporter,
    ) -> BookingResult<TriggerPlan> {
        status.report(format!("waiting for trigger time {trigger}"));
        let plan = self.plan(trigger);
        for line in plan.describe() {
            status.report(line);
        }
        debug!(wait_ms = plan.wait.as_millis() as u64, target = %plan.target, "trigger scheduled");

        tokio::select! {
            _ = sleep(plan.wait) => Ok(plan),
            _ = cancel.cancelled() => Err(BookingError::Cancelled),
        }
    }
}
