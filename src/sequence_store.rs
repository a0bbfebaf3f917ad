use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::IdentifierError;
use crate::family::SequenceKey;

/// Durable per-key counters with an atomic "reserve next" primitive.
///
/// The counter for a key starts at 0 and only moves forward. Values handed
/// out by [`next`](SequenceStore::next) are never returned to the pool, even
/// when the caller abandons them.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Reserves and returns `previous + 1` for `key`, starting at 1.
    async fn next(&self, key: &SequenceKey) -> Result<u64, IdentifierError>;

    /// Last value handed out for `key`, or 0 if none.
    async fn current(&self, key: &SequenceKey) -> Result<u64, IdentifierError>;

    /// Raises the counter of `key` to at least `floor` and returns the
    /// resulting value. Never lowers a counter.
    async fn advance_to(&self, key: &SequenceKey, floor: u64) -> Result<u64, IdentifierError>;
}

/// Single-process store keeping one atomic counter per key.
///
/// The map lock is only held to look up or insert a counter, never across an
/// increment, so unrelated keys do not serialize on each other.
#[derive(Default)]
pub struct InMemorySequenceStore {
    counters: RwLock<HashMap<SequenceKey, Arc<AtomicU64>>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        InMemorySequenceStore {
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn counter(&self, key: &SequenceKey) -> Result<Arc<AtomicU64>, IdentifierError> {
        {
            let counters = self
                .counters
                .read()
                .map_err(|e| IdentifierError::StoreUnavailable(e.to_string()))?;
            if let Some(counter) = counters.get(key) {
                return Ok(Arc::clone(counter));
            }
        }
        let mut counters = self
            .counters
            .write()
            .map_err(|e| IdentifierError::StoreUnavailable(e.to_string()))?;
        Ok(Arc::clone(counters.entry(*key).or_default()))
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn next(&self, key: &SequenceKey) -> Result<u64, IdentifierError> {
        let counter = self.counter(key)?;
        let previous = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| value.checked_add(1))
            .map_err(|value| IdentifierError::CounterOverflow {
                key: *key,
                counter: value,
            })?;
        Ok(previous + 1)
    }

    async fn current(&self, key: &SequenceKey) -> Result<u64, IdentifierError> {
        let counters = self
            .counters
            .read()
            .map_err(|e| IdentifierError::StoreUnavailable(e.to_string()))?;
        Ok(counters
            .get(key)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn advance_to(&self, key: &SequenceKey, floor: u64) -> Result<u64, IdentifierError> {
        let counter = self.counter(key)?;
        let previous = counter.fetch_max(floor, Ordering::SeqCst);
        Ok(previous.max(floor))
    }
}
