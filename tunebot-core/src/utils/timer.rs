//! Single-slot one-shot timer.
//!
//! Arming always cancels whatever was pending in the same slot first, so a
//! slot never has more than one callback in flight. The timer does not run
//! the callback itself: it posts a signal into the owner's event channel and
//! the owner handles it on its own task. Each arm gets a fresh
//! [`TimerToken`]; a signal that was already queued when the slot got
//! re-armed or cancelled carries a stale token and [`SingleSlotTimer::fire`]
//! rejects it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

pub struct SingleSlotTimer {
    name: &'static str,
    epoch: u64,
    pending: Option<JoinHandle<()>>,
}

impl SingleSlotTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            epoch: 0,
            pending: None,
        }
    }

    /// Cancels the pending callback (if any), then schedules `make(token)` to
    /// be sent on `tx` after `delay`.
    pub fn arm<T, F>(&mut self, delay: Duration, tx: &UnboundedSender<T>, make: F) -> TimerToken
    where
        T: Send + 'static,
        F: FnOnce(TimerToken) -> T,
    {
        self.cancel_if_pending();
        self.epoch += 1;
        let token = TimerToken(self.epoch);
        let signal = make(token);
        let tx = tx.clone();
        trace!("(timer:{}) armed for {:?}", self.name, delay);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(signal);
        }));
        token
    }

    pub fn cancel_if_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
            trace!("(timer:{}) cancelled", self.name);
        }
        self.epoch += 1;
    }

    /// Consumes a delivered signal. Returns `false` for stale tokens.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        if token.0 != self.epoch || self.pending.is_none() {
            trace!("(timer:{}) dropping stale signal", self.name);
            return false;
        }
        self.pending = None;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for SingleSlotTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SingleSlotTimer::new("test");
        timer.arm(Duration::from_secs(5), &tx, |t| t);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let token = rx.try_recv().expect("signal after delay");
        assert!(timer.fire(token));
        assert!(!timer.is_pending());
        assert!(!timer.fire(token), "a token fires at most once");
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_callback() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SingleSlotTimer::new("test");
        timer.arm(Duration::from_secs(5), &tx, |t| ("first", t));
        timer.arm(Duration::from_secs(10), &tx, |t| ("second", t));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let (label, token) = rx.try_recv().expect("second signal");
        assert_eq!(label, "second");
        assert!(timer.fire(token));
        assert!(rx.try_recv().is_err(), "first callback never delivered");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_signal_is_stale_after_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SingleSlotTimer::new("test");
        timer.arm(Duration::from_millis(10), &tx, |t| t);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Signal is already in the queue when the owner cancels.
        timer.cancel_if_pending();
        let token = rx.try_recv().expect("queued signal");
        assert!(!timer.fire(token));
    }
}
