//! # Per-key single flight
//!
//! Collapses concurrent work for the same key into one execution.
//!
//! Callers that ask for a key while an operation for it is already running
//! wait for that operation and receive a clone of its outcome, success or
//! failure, instead of starting their own. Once a flight has finished, the
//! next caller starts a fresh one. Different keys never wait on each other.
//!
//! ```ignore
//! let flights: SingleFlight<UserId, Result<Credential>> = SingleFlight::new();
//! let credential = flights.run(&user_id, || refresh(&user_id)).await?;
//! ```
//!
//! Per-key state is dropped as soon as no caller holds it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;

struct SlotState<V> {
    /// Flights completed for this key
    generation: u64,
    last_outcome: Option<V>,
}

struct Slot<V> {
    /// Serializes flights and exclusive sections for one key
    gate: Mutex<()>,
    state: Mutex<SlotState<V>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            state: Mutex::new(SlotState {
                generation: 0,
                last_outcome: None,
            }),
        }
    }
}

/// Per-key single-flight executor.
pub struct SingleFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run `operation` for `key`, or share the outcome of a flight for the
    /// same key that finished while this caller was waiting for its turn.
    pub async fn run<F, Fut>(&self, key: &K, operation: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = self.acquire(key).await;
        let seen = slot.state.lock().await.generation;

        let outcome = {
            let _gate = slot.gate.lock().await;

            let shared = {
                let state = slot.state.lock().await;
                if state.generation != seen {
                    state.last_outcome.clone()
                } else {
                    None
                }
            };

            match shared {
                Some(outcome) => outcome,
                None => {
                    let outcome = operation().await;
                    let mut state = slot.state.lock().await;
                    state.generation += 1;
                    state.last_outcome = Some(outcome.clone());
                    outcome
                }
            }
        };

        self.release(key, slot).await;
        outcome
    }

    /// Run `operation` while holding `key`'s gate, without publishing its
    /// result to waiting flights.
    pub async fn exclusive<F, Fut, R>(&self, key: &K, operation: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let slot = self.acquire(key).await;

        let result = {
            let _gate = slot.gate.lock().await;
            operation().await
        };

        self.release(key, slot).await;
        result
    }

    /// Number of keys with a caller currently running or waiting.
    pub async fn active_keys(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn acquire(&self, key: &K) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    async fn release(&self, key: &K, slot: Arc<Slot<V>>) {
        let mut slots = self.slots.lock().await;
        // One reference is the map's, the other is ours.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
