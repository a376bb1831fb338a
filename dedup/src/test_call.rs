use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use callmux_core::{Call, Outcome};

/// Controllable stand-in for a real operation: resolves when told to and
/// counts how often it is driven and canceled.
pub(crate) struct TestCall<T>
where
    T: Clone + Send + Sync + 'static,
{
    tx: watch::Sender<Option<Outcome<T>>>,
    executions: AtomicUsize,
    cancellations: AtomicUsize,
}

impl<T> TestCall<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn pending() -> Arc<Self> {
        let (tx, _rx) = watch::channel(None);
        Arc::new(Self {
            tx,
            executions: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        })
    }

    pub(crate) fn ready(outcome: Outcome<T>) -> Arc<Self> {
        let call = Self::pending();
        call.resolve(outcome);
        call
    }

    /// First resolution wins; later ones (including cancel) are ignored.
    pub(crate) fn resolve(&self, outcome: Outcome<T>) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn as_call(self: Arc<Self>) -> Arc<dyn Call<T>> {
        self
    }

    pub(crate) fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub(crate) fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> Call<T> for TestCall<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn execute(&self) -> Outcome<T> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();
        let outcome = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone().unwrap_or(Outcome::Canceled),
            Err(_) => Outcome::Canceled,
        };
        outcome
    }

    fn cancel(&self) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        // Best-effort semantics: a still-pending operation resolves to
        // Canceled, an already-produced outcome stands.
        self.resolve(Outcome::Canceled);
    }
}
