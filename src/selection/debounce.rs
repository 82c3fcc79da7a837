use std::future;
use std::time::Duration;
use tokio::time::{self, Instant};

#[derive(Debug)]
struct PendingAction<T> {
    deadline: Instant,
    action: T,
}

/// Single-slot delayed action.
///
/// There is never more than one pending action. Scheduling replaces the slot
/// synchronously, so a superseded action can never fire. The slot is polled
/// from the owner's event loop; no task or thread is spawned.
#[derive(Debug)]
pub struct DebounceScheduler<T> {
    delay: Duration,
    pending: Option<PendingAction<T>>,
}

impl<T> DebounceScheduler<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms `action` to fire after `delay`, returning the action it replaced.
    pub fn schedule(&mut self, delay: Duration, action: T) -> Option<T> {
        let superseded = self.cancel();
        self.pending = Some(PendingAction {
            deadline: Instant::now() + delay,
            action,
        });
        superseded
    }

    /// [`schedule`](Self::schedule) with the configured delay.
    pub fn schedule_default(&mut self, action: T) -> Option<T> {
        self.schedule(self.delay, action)
    }

    /// Clears the slot. No-op when empty.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|pending| pending.action)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the action if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.deadline <= now => self.cancel(),
            _ => None,
        }
    }

    /// Resolves when the pending action fires. Never resolves while the slot
    /// is empty.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the slot
    /// untouched.
    pub async fn fired(&mut self) -> T {
        let Some(deadline) = self.pending.as_ref().map(|pending| pending.deadline) else {
            return future::pending().await;
        };

        time::sleep_until(deadline).await;

        match self.cancel() {
            Some(action) => action,
            None => future::pending().await,
        }
    }
}
