//! In-flight request deduplication.
//!
//! When several callers ask for the same key at once, only the first one
//! (the leader) does the work. Later callers subscribe to a broadcast
//! channel and receive the leader's result. The entry disappears as soon as
//! the leader finishes, so a later request for the same key starts fresh.
//!
//! If the leader is dropped without completing (cancelled, panicked), the
//! channel closes and [`RequestCoalescer::execute`] lets one of the waiting
//! callers take over as the new leader.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

type InFlight<K, V> = Arc<Mutex<HashMap<K, broadcast::Sender<V>>>>;

/// Outcome of registering interest in a key.
pub enum CoalesceResult<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Another caller is already working on this key; wait on the receiver.
    Coalesced(broadcast::Receiver<V>),
    /// The caller is the leader and must complete the guard.
    NewRequest(LeaderGuard<K, V>),
}

/// Deduplicates concurrent work per key.
pub struct RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone,
{
    in_flight: InFlight<K, V>,
    coalesced: AtomicU64,
    label: &'static str,
}

impl<K, V> RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(label: &'static str) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            coalesced: AtomicU64::new(0),
            label,
        }
    }

    /// Registers interest in `key`.
    pub fn register(&self, key: K) -> CoalesceResult<K, V> {
        let mut map = self.in_flight.lock();
        if let Some(tx) = map.get(&key) {
            let coalesced = self.coalesced.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(coalescer = self.label, key = ?key, coalesced, "Request coalesced");
            return CoalesceResult::Coalesced(tx.subscribe());
        }

        let (tx, _) = broadcast::channel(1);
        map.insert(key.clone(), tx);
        CoalesceResult::NewRequest(LeaderGuard {
            key: Some(key),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Runs `work` for `key` unless an identical request is already in
    /// flight, in which case its result is shared.
    pub async fn execute<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let mut work = Some(work);
        loop {
            match self.register(key.clone()) {
                CoalesceResult::Coalesced(mut rx) => match rx.recv().await {
                    Ok(value) => return value,
                    Err(_) => {
                        tracing::debug!(
                            coalescer = self.label,
                            key = ?key,
                            "Leader abandoned request, retrying"
                        );
                    }
                },
                CoalesceResult::NewRequest(guard) => {
                    // `work` is only taken once: a caller that becomes
                    // leader returns below.
                    let Some(work) = work.take() else {
                        continue;
                    };
                    let value = work().await;
                    guard.complete(value.clone());
                    return value;
                }
            }
        }
    }
}

/// Leadership of one in-flight key.
///
/// Dropping the guard without calling [`complete`](Self::complete) removes
/// the entry and closes the channel, waking every follower.
pub struct LeaderGuard<K, V>
where
    K: Eq + Hash + Clone,
{
    key: Option<K>,
    in_flight: InFlight<K, V>,
}

impl<K, V> LeaderGuard<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Publishes the result to all followers and releases the key.
    pub fn complete(mut self, value: V) {
        if let Some(key) = self.key.take() {
            let tx = self.in_flight.lock().remove(&key);
            if let Some(tx) = tx {
                // No receivers is fine.
                let _ = tx.send(value);
            }
        }
    }
}

impl<K, V> Drop for LeaderGuard<K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight.lock().remove(&key);
        }
    }
}
