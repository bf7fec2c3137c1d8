//! # Scheduler
//!
//! Simulation ticks are driven through an injected [`Scheduler`] so that a
//! production runtime and a deterministic fake clock share one code path.
//!
//! A scheduled task runs once, after `delay`, unless its cancellation token is
//! cancelled first. Cancelling a token never aborts a task that has already
//! started.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracking_core::Clock;

/// Deferred unit of work.
pub type Task = BoxFuture<'static, ()>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` after `delay` unless `cancel` fires first.
    fn schedule(&self, delay: Duration, cancel: CancellationToken, task: Task);
}

/// Schedules tasks on the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, cancel: CancellationToken, task: Task) {
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => task.await,
            }
        });
    }
}

/// A fake clock and scheduler advanced explicitly by tests and replays.
///
/// Tasks run inline inside [`ManualScheduler::advance`] and
/// [`ManualScheduler::run_next`], in due-time order, with the clock set to
/// each task's due time while it runs.
pub struct ManualScheduler {
    epoch: DateTime<Utc>,
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    sequence: u64,
    queue: Vec<Pending>,
}

struct Pending {
    due: Duration,
    sequence: u64,
    cancel: CancellationToken,
    task: Task,
}

impl ManualScheduler {
    #[must_use]
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self { epoch, state: Mutex::new(ManualState::default()) }
    }

    /// Time elapsed since the epoch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    /// Number of queued tasks that have not been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state().queue.iter().filter(|p| !p.cancel.is_cancelled()).count()
    }

    /// Runs the earliest live task, moving the clock to its due time.
    /// Returns `false` when nothing live is queued.
    pub async fn run_next(&self) -> bool {
        self.run_due(None).await
    }

    /// Moves the clock forward by `by`, running every task that falls due.
    /// Returns the number of tasks run.
    pub async fn advance(&self, by: Duration) -> usize {
        let target = self.elapsed() + by;
        let mut ran = 0;
        while self.run_due(Some(target)).await {
            ran += 1;
        }
        self.state().elapsed = target;
        ran
    }

    async fn run_due(&self, until: Option<Duration>) -> bool {
        loop {
            let next = {
                let mut state = self.state();
                let Some(index) = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| until.is_none_or(|limit| p.due <= limit))
                    .min_by_key(|(_, p)| (p.due, p.sequence))
                    .map(|(index, _)| index)
                else {
                    return false;
                };
                let pending = state.queue.swap_remove(index);
                state.elapsed = state.elapsed.max(pending.due);
                pending
            };

            // cancelled tasks are discarded without running
            if next.cancel.is_cancelled() {
                continue;
            }
            next.task.await;
            return true;
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, cancel: CancellationToken, task: Task) {
        let mut state = self.state();
        state.sequence += 1;
        let due = state.elapsed + delay;
        let pending = Pending { due, sequence: state.sequence, cancel, task };
        state.queue.push(pending);
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.elapsed();
        TimeDelta::from_std(elapsed).map_or(self.epoch, |delta| self.epoch + delta)
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ManualScheduler")
            .field("epoch", &self.epoch)
            .field("elapsed", &state.elapsed)
            .field("queued", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Task {
        let log = Arc::clone(log);
        Box::pin(async move {
            log.lock().unwrap().push(name);
        })
    }

    #[tokio::test]
    async fn runs_in_due_order() {
        let scheduler = ManualScheduler::new(epoch());
        let log = Arc::new(Mutex::new(Vec::new()));

        let never = CancellationToken::new;
        scheduler.schedule(Duration::from_secs(10), never(), recorder(&log, "late"));
        scheduler.schedule(Duration::from_secs(5), never(), recorder(&log, "early"));
        scheduler.schedule(Duration::from_secs(5), never(), recorder(&log, "tie"));

        assert_eq!(scheduler.advance(Duration::from_secs(7)).await, 2);
        assert_eq!(*log.lock().unwrap(), vec!["early", "tie"]);
        assert_eq!(scheduler.now(), epoch() + TimeDelta::seconds(7));

        assert!(scheduler.run_next().await);
        assert_eq!(scheduler.now(), epoch() + TimeDelta::seconds(10));
        assert!(!scheduler.run_next().await);
    }

    #[tokio::test]
    async fn cancelled_task_never_runs() {
        let scheduler = ManualScheduler::new(epoch());
        let log = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        scheduler.schedule(Duration::from_secs(1), cancel.clone(), recorder(&log, "cancelled"));
        assert_eq!(scheduler.pending(), 1);
        cancel.cancel();
        assert_eq!(scheduler.pending(), 0);

        assert_eq!(scheduler.advance(Duration::from_secs(5)).await, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_can_reschedule_itself() {
        let scheduler = Arc::new(ManualScheduler::new(epoch()));
        let count = Arc::new(AtomicUsize::new(0));

        fn chain(scheduler: Arc<ManualScheduler>, count: Arc<AtomicUsize>) {
            let inner = Arc::clone(&scheduler);
            scheduler.schedule(
                Duration::from_secs(1),
                CancellationToken::new(),
                Box::pin(async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        chain(inner, count);
                    }
                }),
            );
        }

        chain(Arc::clone(&scheduler), Arc::clone(&count));
        assert_eq!(scheduler.advance(Duration::from_secs(10)).await, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn tokio_scheduler_honours_cancellation() {
        let scheduler = TokioScheduler;
        let count = Arc::new(AtomicUsize::new(0));

        let ran = Arc::clone(&count);
        scheduler.schedule(
            Duration::from_millis(5),
            CancellationToken::new(),
            Box::pin(async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let cancel = CancellationToken::new();
        let skipped = Arc::clone(&count);
        scheduler.schedule(
            Duration::from_millis(5),
            cancel.clone(),
            Box::pin(async move {
                skipped.fetch_add(10, Ordering::SeqCst);
            }),
        );
        cancel.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
