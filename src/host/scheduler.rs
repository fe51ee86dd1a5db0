//! Timer backends
//!
//! `ManualScheduler` runs on a virtual clock driven by the caller, which keeps
//! simulations and tests deterministic. `TokioScheduler` sleeps on the tokio
//! runtime and posts fired tasks back over a channel, so every callback is
//! applied on the task that owns the trade state.

use crate::ports::Scheduler;
use crate::trade::types::TimerTask;
use crate::types::TimerHandle;
use futures::future::{AbortHandle, Abortable};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;

/// Virtual-clock scheduler
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_handle: u64,
    pending: BTreeMap<TimerHandle, (Duration, TimerTask)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn advance_clock(&mut self, by: Duration) {
        self.now += by;
    }

    /// Move the clock and drain every task that came due, in deadline order
    pub fn advance(&mut self, by: Duration) -> Vec<TimerTask> {
        self.advance_clock(by);
        std::iter::from_fn(|| self.pop_due()).collect()
    }

    /// Remove and return the earliest task that is due
    pub fn pop_due(&mut self) -> Option<TimerTask> {
        let handle = self
            .pending
            .iter()
            .filter(|(_, (due, _))| *due <= self.now)
            .min_by_key(|(handle, (due, _))| (*due, **handle))
            .map(|(handle, _)| *handle)?;

        self.pending.remove(&handle).map(|(_, task)| task)
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending tasks in handle order
    pub fn pending_tasks(&self) -> Vec<&TimerTask> {
        self.pending.values().map(|(_, task)| task).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.pending.insert(handle, (self.now + delay, task));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }
}

/// Fired timer as delivered to the owning task
pub type FiredTimer = (TimerHandle, TimerTask);

/// Scheduler backed by tokio sleeps.
///
/// Must be used from within a tokio runtime. A task that fires after it was
/// cancelled can still be sitting in the channel; the receiver calls
/// `acknowledge` and drops the task when it returns false.
#[derive(Debug)]
pub struct TokioScheduler {
    next_handle: u64,
    live: HashMap<TimerHandle, AbortHandle>,
    fired_tx: mpsc::UnboundedSender<FiredTimer>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTimer>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_handle: 0,
            live: HashMap::new(),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Retire a fired timer; false if it was cancelled in the meantime
    pub fn acknowledge(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.live.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);

        let (abort_handle, registration) = AbortHandle::new_pair();
        let fired_tx = self.fired_tx.clone();
        tokio::spawn(Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                if fired_tx.send((handle, task)).is_err() {
                    tracing::debug!(%handle, "Timer fired after receiver closed");
                }
            },
            registration,
        ));

        self.live.insert(handle, abort_handle);
        tracing::debug!(%handle, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.live.remove(&handle) {
            Some(abort_handle) => {
                abort_handle.abort();
                tracing::debug!(%handle, "Timer cancelled");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorId, SessionId};
    use tokio_test::assert_ok;

    fn complete(tag: &str) -> TimerTask {
        TimerTask::CompleteTrade {
            session: SessionId(tag.to_string()),
        }
    }

    #[test]
    fn test_manual_fires_in_deadline_order() {
        let mut scheduler = ManualScheduler::new();
        scheduler.schedule(Duration::from_millis(300), complete("late"));
        scheduler.schedule(Duration::from_millis(100), complete("early"));

        scheduler.advance_clock(Duration::from_millis(50));
        assert!(scheduler.pop_due().is_none());

        let fired = scheduler.advance(Duration::from_millis(250));
        assert_eq!(fired, vec![complete("early"), complete("late")]);
        assert!(scheduler.pop_due().is_none());
    }

    #[test]
    fn test_manual_cancel() {
        let mut scheduler = ManualScheduler::new();
        let handle = scheduler.schedule(Duration::from_millis(10), complete("a"));

        assert!(scheduler.is_pending(handle));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        scheduler.advance_clock(Duration::from_secs(1));
        assert!(scheduler.pop_due().is_none());
    }

    #[test]
    fn test_manual_equal_deadlines_keep_schedule_order() {
        let mut scheduler = ManualScheduler::new();
        let actor = ActorId::new("alex");
        scheduler.schedule(
            Duration::from_millis(50),
            TimerTask::CloseGrace {
                session: SessionId("s".into()),
                actor: actor.clone(),
            },
        );
        scheduler.schedule(Duration::from_millis(50), complete("s"));

        scheduler.advance_clock(Duration::from_millis(50));
        assert!(matches!(
            scheduler.pop_due(),
            Some(TimerTask::CloseGrace { .. })
        ));
        assert_eq!(scheduler.pop_due(), Some(complete("s")));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers() {
        let (mut scheduler, mut fired) = TokioScheduler::new();
        let handle = scheduler.schedule(Duration::from_millis(5), complete("a"));

        let (got, task) = fired.recv().await.unwrap();
        assert_eq!(got, handle);
        assert_eq!(task, complete("a"));
        assert!(scheduler.acknowledge(handle));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_cancel() {
        let (mut scheduler, mut fired) = TokioScheduler::new();
        let cancelled = scheduler.schedule(Duration::from_millis(5), complete("cancelled"));
        let kept = scheduler.schedule(Duration::from_millis(20), complete("kept"));

        assert!(scheduler.cancel(cancelled));
        assert!(!scheduler.cancel(cancelled));

        let result = tokio::time::timeout(Duration::from_secs(2), fired.recv()).await;
        let (got, task) = assert_ok!(result).unwrap();
        assert_eq!(got, kept);
        assert_eq!(task, complete("kept"));
    }
}
