use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use callmux_core::Call;

use crate::distinct::DistinctCall;

/// Keyed table of in-flight calls.
///
/// At most one [`DistinctCall`] exists per key at any moment: callers that
/// show up with the same fingerprint while a call is running join it, and
/// each entry evicts itself when its call reaches a terminal outcome, so a
/// later identical call starts fresh.
#[derive(Clone)]
pub struct DistinctCalls<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    inner: Arc<DashMap<K, DistinctCall<T>>>,
}

impl<K, T> DistinctCalls<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Returns the call currently in flight for `key`, creating it if there
    /// is none. The created call carries a finalization hook that removes
    /// its own entry, and `builder` is only kept alive in that case.
    pub fn get_or_create(
        &self,
        key: K,
        builder: impl FnOnce() -> Arc<dyn Call<T>> + Send + 'static,
    ) -> DistinctCall<T> {
        self.inner
            .entry(key.clone())
            .or_insert_with(|| {
                debug!("starting fresh distinct call");
                let calls = self.inner.clone();
                DistinctCall::new(builder, move || {
                    calls.remove(&key);
                })
            })
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<DistinctCall<T>> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Best-effort cancellation sweep over everything in flight, e.g. on
    /// owner shutdown.
    pub fn cancel_all(&self) {
        // Collect first: cancelling finalizes entries, which remove
        // themselves from the map and must not race the iteration locks.
        let calls: Vec<DistinctCall<T>> = self
            .inner
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for call in calls {
            call.cancel();
        }
    }
}

impl<K, T> Default for DistinctCalls<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
