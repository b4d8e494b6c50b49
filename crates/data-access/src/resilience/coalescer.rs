//! Leader/subscriber request coalescing.
//!
//! For any key at most one leader runs its fetch at a time. Callers arriving
//! while a leader is in flight subscribe to the leader's outcome instead of
//! starting their own call.
//!
//! The registry mutex only covers lookup-or-register and publish-and-remove;
//! the leader's future runs outside it, so a slow upstream call on one key
//! never holds up other keys.
//!
//! The leader's future is detached onto its own task. Every caller, the one
//! that started the fetch included, only waits for the outcome, so giving up
//! on a call never cancels the upstream request underneath it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::watch;

/// One in-flight fetch and the callers waiting on it.
struct Group<T> {
    outcome: watch::Receiver<Option<T>>,
    subscribers: AtomicUsize,
}

type Registry<T> = Mutex<HashMap<String, Arc<Group<T>>>>;

fn lock_registry<T>(registry: &Registry<T>) -> MutexGuard<'_, HashMap<String, Arc<Group<T>>>> {
    registry.lock().unwrap_or_else(|poisoned| {
        warn!("Coalescer registry mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

enum Role<T> {
    Leader(LeaderGuard<T>),
    Subscriber(Arc<Group<T>>),
}

/// Owned by the leader's task while its fetch runs.
///
/// Dropping the guard without resolving (the task panicked or the runtime shut
/// down) removes the group and closes the channel, which wakes subscribers so
/// one of them can take over.
struct LeaderGuard<T> {
    registry: Arc<Registry<T>>,
    key: String,
    group: Arc<Group<T>>,
    sender: Option<watch::Sender<Option<T>>>,
}

impl<T: Clone> LeaderGuard<T> {
    /// Publish the outcome and remove the group in one critical section, so a
    /// newcomer sees either the live group or no group at all.
    fn resolve(mut self, outcome: T) -> T {
        let mut groups = lock_registry(&self.registry);
        remove_if_current(&mut groups, &self.key, &self.group);
        if let Some(sender) = self.sender.take() {
            // No receivers left is fine: every subscriber may have given up
            let _ = sender.send(Some(outcome.clone()));
        }
        drop(groups);

        let subscribers = self.group.subscribers.load(Ordering::Acquire);
        if subscribers > 0 {
            debug!(
                "Coalescer: '{}' resolved for {} subscriber(s)",
                self.key, subscribers
            );
        }
        outcome
    }
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        if self.sender.is_none() {
            return;
        }

        let mut groups = lock_registry(&self.registry);
        remove_if_current(&mut groups, &self.key, &self.group);
        // Dropping the sender while still holding the lock closes the channel
        self.sender.take();
        drop(groups);
        warn!(
            "Coalescer: leader for '{}' abandoned before resolving",
            self.key
        );
    }
}

fn remove_if_current<T>(
    groups: &mut HashMap<String, Arc<Group<T>>>,
    key: &str,
    group: &Arc<Group<T>>,
) {
    if groups.get(key).is_some_and(|current| Arc::ptr_eq(current, group)) {
        groups.remove(key);
    }
}

/// Deduplicates concurrent work by key.
pub struct RequestCoalescer<T> {
    groups: Arc<Registry<T>>,
}

impl<T: Clone> RequestCoalescer<T> {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `leader` for `key` unless another caller already is, in which case
    /// wait for and return that caller's outcome.
    ///
    /// Only the elected leader ever invokes `leader`, and its future runs on a
    /// spawned task: dropping the calling future (a timeout, a cancelled
    /// request) leaves the fetch running for everyone else subscribed to it.
    /// A panic in the leader's future is re-raised in the caller that started
    /// it while the remaining subscribers elect a new leader.
    pub async fn dedupe<F, Fut>(&self, key: &str, leader: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + Sync + 'static,
    {
        loop {
            match self.join_or_lead(key) {
                Role::Leader(guard) => {
                    let fetch = leader();
                    let task = tokio::spawn(async move {
                        let outcome = fetch.await;
                        guard.resolve(outcome)
                    });
                    return match task.await {
                        Ok(outcome) => outcome,
                        Err(error) => match error.try_into_panic() {
                            Ok(payload) => std::panic::resume_unwind(payload),
                            // Only a runtime shutdown cancels the task, and this
                            // caller goes down with it
                            Err(_) => std::future::pending().await,
                        },
                    };
                }
                Role::Subscriber(group) => {
                    let mut outcome = group.outcome.clone();
                    let published = match outcome.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    if let Some(value) = published {
                        return value;
                    }
                    debug!("Coalescer: leader for '{}' went away, re-electing", key);
                }
            }
        }
    }

    /// Number of keys with a fetch currently in flight.
    pub fn in_flight(&self) -> usize {
        lock_registry(&self.groups).len()
    }

    fn join_or_lead(&self, key: &str) -> Role<T> {
        let mut groups = lock_registry(&self.groups);

        if let Some(group) = groups.get(key) {
            group.subscribers.fetch_add(1, Ordering::AcqRel);
            debug!("Coalescer: joining in-flight fetch for '{}'", key);
            return Role::Subscriber(Arc::clone(group));
        }

        let (sender, receiver) = watch::channel(None);
        let group = Arc::new(Group {
            outcome: receiver,
            subscribers: AtomicUsize::new(0),
        });
        groups.insert(key.to_string(), Arc::clone(&group));

        Role::Leader(LeaderGuard {
            registry: Arc::clone(&self.groups),
            key: key.to_string(),
            group,
            sender: Some(sender),
        })
    }
}

impl<T: Clone> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}
