use std::time::Duration;

use tracing::{debug, info};

use crate::eventbus::{BotEvent, EventSender, RefreshAttempt};
use crate::settings::Timings;
use crate::utils::time::millis;
use crate::utils::{SingleSlotTimer, TimerToken};

/// Arms the proactive token refresh.
///
/// The scheduler only decides *when*; the refresh-then-rebuild cycle itself
/// runs in [`crate::services::ConnectionSupervisor::on_refresh_due`] when the
/// `RefreshDue` event comes back through the queue.
pub struct RefreshScheduler {
    timer: SingleSlotTimer,
    lead: Duration,
    floor: Duration,
    retry: Duration,
}

impl RefreshScheduler {
    pub fn new(timings: &Timings) -> Self {
        Self {
            timer: SingleSlotTimer::new("token-refresh"),
            lead: timings.refresh_lead,
            floor: timings.refresh_floor,
            retry: timings.refresh_retry,
        }
    }

    /// `max(floor, expires_at - now - lead)`. The floor keeps an expiry in
    /// the past from turning into a tight refresh loop.
    pub fn delay_until_refresh(&self, expires_at_ms: i64, now_ms: i64) -> Duration {
        let lead_ms = self.lead.as_millis() as i64;
        millis(expires_at_ms.saturating_sub(now_ms).saturating_sub(lead_ms)).max(self.floor)
    }

    /// Cancels any pending refresh, then schedules one for `expires_at_ms`.
    /// With no expiry, nothing is armed.
    pub fn arm(
        &mut self,
        expires_at_ms: Option<i64>,
        now_ms: i64,
        events: &EventSender,
    ) -> Option<Duration> {
        self.timer.cancel_if_pending();
        let expires_at_ms = match expires_at_ms {
            Some(at) => at,
            None => {
                debug!("No expiry known; proactive refresh not armed");
                return None;
            }
        };
        let delay = self.delay_until_refresh(expires_at_ms, now_ms);
        self.timer.arm(delay, events.raw(), |token| BotEvent::RefreshDue {
            token,
            attempt: RefreshAttempt::Scheduled,
        });
        info!("Proactive token refresh scheduled in {}s", delay.as_secs());
        Some(delay)
    }

    /// Schedules the single retry after a failed cycle.
    pub fn arm_retry(&mut self, events: &EventSender) -> Duration {
        self.timer.arm(self.retry, events.raw(), |token| BotEvent::RefreshDue {
            token,
            attempt: RefreshAttempt::Retry,
        });
        self.retry
    }

    pub fn fire(&mut self, token: TimerToken) -> bool {
        self.timer.fire(token)
    }

    pub fn cancel(&mut self) {
        self.timer.cancel_if_pending();
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }
}
