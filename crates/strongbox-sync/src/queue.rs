//! Per-identifier sync coalescing.
//!
//! Each id moves through three states:
//!
//! ```text
//! Idle ──request──> Active ──request──> Active + Queued
//!   ^                 │                      │
//!   └────finish───────┘<─────finish──────────┘ (queued run starts)
//! ```
//!
//! At most one attempt per id runs at a time. A request that arrives while
//! an attempt is active schedules exactly one follow-up; every later request
//! shares that follow-up's outcome. Requests that must run their own attempt
//! use [`SyncQueue::run_exclusive`], which serializes without sharing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{watch, Mutex as Gate, OwnedMutexGuard};

use crate::error::{Result, SyncError};

type Outcome<T> = std::result::Result<T, Arc<SyncError>>;

struct Slot<T> {
    /// Held for the duration of an attempt.
    gate: Arc<Gate<()>>,
    follow_up: Option<FollowUp<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            gate: Arc::new(Gate::new(())),
            follow_up: None,
        }
    }
}

struct FollowUp<T> {
    generation: u64,
    outcome: watch::Receiver<Option<Outcome<T>>>,
}

enum Plan<T> {
    Run(OwnedMutexGuard<()>),
    Lead {
        gate: Arc<Gate<()>>,
        generation: u64,
        tx: watch::Sender<Option<Outcome<T>>>,
    },
    Join(watch::Receiver<Option<Outcome<T>>>),
}

/// Coalesces concurrent sync requests per id.
pub struct SyncQueue<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    generation: AtomicU64,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + Sync> SyncQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any id has an active or queued attempt.
    pub fn is_syncing(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Whether `id` has an active or queued attempt.
    pub fn is_busy(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Run `attempt` for `id`, or share the outcome of the queued follow-up.
    ///
    /// `attempt` is only invoked when this request runs an attempt itself.
    /// Shared failures come back as [`SyncError::Shared`].
    pub async fn run<F, Fut>(&self, id: &str, attempt: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let plan = {
            let mut slots = self.lock();
            let slot = slots.entry(id.to_owned()).or_default();
            match &slot.follow_up {
                Some(follow_up) => Plan::Join(follow_up.outcome.clone()),
                None => match Arc::clone(&slot.gate).try_lock_owned() {
                    Ok(permit) => Plan::Run(permit),
                    Err(_) => {
                        let (tx, rx) = watch::channel(None);
                        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                        slot.follow_up = Some(FollowUp {
                            generation,
                            outcome: rx,
                        });
                        Plan::Lead {
                            gate: Arc::clone(&slot.gate),
                            generation,
                            tx,
                        }
                    }
                },
            }
        };

        match plan {
            Plan::Run(permit) => {
                let _active = Active::new(self, id, permit);
                attempt().await
            }
            Plan::Join(mut rx) => {
                tracing::trace!(id, "joining queued sync");
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map(|outcome| (*outcome).clone());
                match outcome {
                    Ok(Some(Ok(value))) => Ok(value),
                    Ok(Some(Err(e))) => Err(SyncError::Shared(e)),
                    Ok(None) | Err(_) => Err(SyncError::Cancelled),
                }
            }
            Plan::Lead {
                gate,
                generation,
                tx,
            } => {
                tracing::trace!(id, "queueing follow-up sync");
                let pending = Pending {
                    queue: self,
                    id,
                    generation,
                    claimed: false,
                };
                let permit = gate.lock_owned().await;
                pending.claim();

                let _active = Active::new(self, id, permit);
                match attempt().await {
                    Ok(value) => {
                        let _ = tx.send(Some(Ok(value.clone())));
                        Ok(value)
                    }
                    Err(e) => {
                        let e = Arc::new(e);
                        let _ = tx.send(Some(Err(Arc::clone(&e))));
                        Err(SyncError::Shared(e))
                    }
                }
            }
        }
    }

    /// Run `attempt` for `id` once every earlier attempt has finished,
    /// without joining or scheduling a shared follow-up.
    pub async fn run_exclusive<F, Fut>(&self, id: &str, attempt: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let gate = {
            let mut slots = self.lock();
            Arc::clone(&slots.entry(id.to_owned()).or_default().gate)
        };
        let permit = gate.lock_owned().await;
        let _active = Active::new(self, id, permit);
        attempt().await
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the slot for `id` once nothing references it.
    fn release(slots: &mut HashMap<String, Slot<T>>, id: &str) {
        let idle = slots
            .get(id)
            .map_or(false, |s| s.follow_up.is_none() && Arc::strong_count(&s.gate) == 1);
        if idle {
            slots.remove(id);
        }
    }
}

/// Marks `id` active until dropped, including when the caller's future is
/// cancelled mid-attempt.
struct Active<'a, T: Clone + Send + Sync> {
    queue: &'a SyncQueue<T>,
    id: &'a str,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<'a, T: Clone + Send + Sync> Active<'a, T> {
    fn new(queue: &'a SyncQueue<T>, id: &'a str, permit: OwnedMutexGuard<()>) -> Self {
        Self {
            queue,
            id,
            permit: Some(permit),
        }
    }
}

impl<T: Clone + Send + Sync> Drop for Active<'_, T> {
    fn drop(&mut self) {
        let mut slots = self.queue.lock();
        // Release the gate under the map lock so a new request never sees a
        // free gate with a stale slot.
        self.permit.take();
        SyncQueue::release(&mut slots, self.id);
    }
}

/// A queued follow-up that has not started yet. Dropping it before
/// [`Pending::claim`] withdraws the follow-up; its waiters see
/// [`SyncError::Cancelled`].
struct Pending<'a, T: Clone + Send + Sync> {
    queue: &'a SyncQueue<T>,
    id: &'a str,
    generation: u64,
    claimed: bool,
}

impl<T: Clone + Send + Sync> Pending<'_, T> {
    /// The follow-up is starting: later requests queue a new one.
    fn claim(mut self) {
        self.withdraw();
        self.claimed = true;
    }

    fn withdraw(&self) {
        let mut slots = self.queue.lock();
        if let Some(slot) = slots.get_mut(self.id) {
            if slot
                .follow_up
                .as_ref()
                .map_or(false, |f| f.generation == self.generation)
            {
                slot.follow_up = None;
            }
        }
    }
}

impl<T: Clone + Send + Sync> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        if !self.claimed {
            self.withdraw();
            SyncQueue::release(&mut self.queue.lock(), self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use tokio::sync::Notify;

    struct Harness {
        queue: SyncQueue<u32>,
        attempts: AtomicU32,
        release: Notify,
    }

    impl Harness {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                queue: SyncQueue::new(),
                attempts: AtomicU32::new(0),
                release: Notify::new(),
            })
        }

        /// The first attempt blocks until `release` is notified.
        async fn request(self: Arc<Self>, fail_follow_up: bool) -> Result<u32> {
            let this = Arc::clone(&self);
            self.queue
                .run("v1", || async move {
                    let n = this.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        this.release.notified().await;
                    } else if fail_follow_up {
                        return Err(SyncError::NotFound("v1".into()));
                    }
                    Ok(n)
                })
                .await
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce_into_two_attempts() {
        let harness = Harness::new();

        let first = tokio::spawn(Arc::clone(&harness).request(false));
        settle().await;
        assert!(harness.queue.is_busy("v1"));

        let rest: Vec<_> = (0..8)
            .map(|_| tokio::spawn(Arc::clone(&harness).request(false)))
            .collect();
        settle().await;
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 1);

        harness.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        for handle in rest {
            assert_eq!(handle.await.unwrap().unwrap(), 2);
        }

        assert_eq!(harness.attempts.load(Ordering::SeqCst), 2);
        assert!(!harness.queue.is_syncing());
    }

    #[tokio::test]
    async fn test_follow_up_failure_is_shared() {
        let harness = Harness::new();

        let first = tokio::spawn(Arc::clone(&harness).request(true));
        settle().await;
        let rest: Vec<_> = (0..3)
            .map(|_| tokio::spawn(Arc::clone(&harness).request(true)))
            .collect();
        settle().await;

        harness.release.notify_one();
        assert!(first.await.unwrap().is_ok());
        for handle in rest {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, SyncError::Shared(_)));
            assert!(matches!(err.root(), SyncError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_cancelled_follow_up_releases_waiters() {
        let harness = Harness::new();

        let first = tokio::spawn(Arc::clone(&harness).request(false));
        settle().await;
        let lead = tokio::spawn(Arc::clone(&harness).request(false));
        settle().await;
        let joiner = tokio::spawn(Arc::clone(&harness).request(false));
        settle().await;

        lead.abort();
        settle().await;

        assert!(matches!(
            joiner.await.unwrap(),
            Err(SyncError::Cancelled)
        ));

        harness.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(harness.attempts.load(Ordering::SeqCst), 1);
        assert!(!harness.queue.is_syncing());
    }

    #[tokio::test]
    async fn test_idle_request_runs_immediately() {
        let queue: SyncQueue<u32> = SyncQueue::new();
        assert_eq!(queue.run("a", || async { Ok(7) }).await.unwrap(), 7);
        assert_eq!(queue.run("a", || async { Ok(8) }).await.unwrap(), 8);
        assert!(!queue.is_syncing());
    }

    #[tokio::test]
    async fn test_exclusive_runs_never_overlap() {
        let queue: Arc<SyncQueue<u32>> = Arc::new(SyncQueue::new());
        let running = Arc::new(AtomicBool::new(false));
        let attempts = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let running = Arc::clone(&running);
                let attempts = Arc::clone(&attempts);
                tokio::spawn(async move {
                    queue
                        .run_exclusive("v1", || async move {
                            assert!(!running.swap(true, Ordering::SeqCst));
                            tokio::task::yield_now().await;
                            running.store(false, Ordering::SeqCst);
                            Ok(attempts.fetch_add(1, Ordering::SeqCst))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(!queue.is_syncing());
    }
}
