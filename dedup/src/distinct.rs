use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use callmux_core::{Call, CallError, Outcome};

/// Callback invoked with the terminal outcome of a call.
///
/// Treat it as fire-and-forget: it runs on whichever task finished the
/// call, so dispatch from inside it if a specific context is needed.
pub type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

/// Factory producing the underlying operation handle. Invoked at most once
/// per [`DistinctCall`] lifetime.
pub type CallBuilder<T> = Box<dyn FnOnce() -> Arc<dyn Call<T>> + Send + 'static>;

/// Single-flight wrapper delivering one result to all subscribers.
///
/// However many contexts call [`await_result`](Self::await_result),
/// [`enqueue`](Self::enqueue) or [`cancel`](Self::cancel) concurrently,
/// the underlying operation is started at most once and every subscriber
/// observes the same terminal [`Outcome`]. Clones share state.
#[derive(Clone)]
pub struct DistinctCall<T>
where
    T: Clone + Send + 'static,
{
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T>
where
    T: Clone + Send + 'static,
{
    builder: Option<CallBuilder<T>>,
    running: Option<Arc<dyn Call<T>>>,
    started: bool,
    cancel_requested: bool,
    result: Option<Outcome<T>>,
    // Listener partitions, each in registration order. Cancel-aware
    // listeners see every terminal outcome; result-only listeners are
    // dropped silently when the call is canceled without a result.
    cancel_aware: Vec<Callback<T>>,
    result_only: Vec<Callback<T>>,
    on_finished: Option<Box<dyn FnOnce() + Send + 'static>>,
}

enum Join<T>
where
    T: Clone + Send + 'static,
{
    Claimed(CallBuilder<T>),
    Waiting(oneshot::Receiver<Outcome<T>>),
}

impl<T> DistinctCall<T>
where
    T: Clone + Send + 'static,
{
    /// `on_finished` runs exactly once, after the terminal broadcast and
    /// cleanup. Owners use it to evict this call from a keyed table so a
    /// later identical call starts fresh.
    pub fn new(
        builder: impl FnOnce() -> Arc<dyn Call<T>> + Send + 'static,
        on_finished: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                builder: Some(Box::new(builder)),
                running: None,
                started: false,
                cancel_requested: false,
                result: None,
                cancel_aware: Vec::new(),
                result_only: Vec::new(),
                on_finished: Some(Box::new(on_finished)),
            })),
        }
    }

    /// The cached terminal outcome, if the call already finished.
    pub fn try_result(&self) -> Option<Outcome<T>> {
        self.inner.lock().result.clone()
    }

    /// Suspends until the call reaches its terminal outcome, starting the
    /// underlying operation if nobody has yet.
    pub async fn await_result(&self) -> Outcome<T> {
        let joined = {
            // only sync code in this block
            let mut inner = self.inner.lock();

            if let Some(result) = &inner.result {
                return result.clone();
            }

            let claimed = if inner.started { None } else { inner.builder.take() };
            match claimed {
                Some(builder) => {
                    inner.started = true;
                    Join::Claimed(builder)
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    // Awaiters must observe bare cancellation too, or they
                    // would hang on a call that never produces a value.
                    inner.cancel_aware.push(Box::new(move |outcome| {
                        let _ = tx.send(outcome);
                    }));
                    Join::Waiting(rx)
                }
            }
        };

        match joined {
            Join::Claimed(builder) => self.run(builder).await,
            Join::Waiting(rx) => {
                debug!("joining call already in flight");
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Failure(CallError::new("in-flight call dropped")),
                }
            }
        }
    }

    /// Registers `callback` for the definitive outcome of this call and
    /// kicks off execution if nobody has yet. Never suspends the caller.
    ///
    /// The callback is not invoked if the call is canceled before producing
    /// a result; use [`enqueue_with_cancel`](Self::enqueue_with_cancel) to
    /// be told about that as well.
    pub fn enqueue(&self, callback: impl FnOnce(Outcome<T>) + Send + 'static) {
        self.subscribe(false, Box::new(callback));
    }

    /// Like [`enqueue`](Self::enqueue), but the callback also receives
    /// [`Outcome::Canceled`] when the call is canceled without a result.
    pub fn enqueue_with_cancel(&self, callback: impl FnOnce(Outcome<T>) + Send + 'static) {
        self.subscribe(true, Box::new(callback));
    }

    /// Requests cancellation. Idempotent and non-blocking.
    ///
    /// Propagates to the running operation if there is one, then installs
    /// `Canceled` as the terminal outcome unless a result already exists.
    /// Once the call has finalized this is a no-op.
    pub fn cancel(&self) {
        let running = {
            let mut inner = self.inner.lock();
            inner.cancel_requested = true;
            inner.running.clone()
        };
        if let Some(handle) = running {
            debug!("propagating cancellation to running call");
            handle.cancel();
        }
        self.complete(Outcome::Canceled);
    }

    fn subscribe(&self, notify_on_cancel: bool, callback: Callback<T>) {
        let cached = {
            let mut inner = self.inner.lock();
            if let Some(result) = &inner.result {
                Some((callback, result.clone()))
            } else {
                if notify_on_cancel {
                    inner.cancel_aware.push(callback);
                } else {
                    inner.result_only.push(callback);
                }
                None
            }
        };

        match cached {
            Some((callback, result)) => deliver(callback, result),
            None => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.drive().await;
                });
            }
        }
    }

    /// Claim-or-bail path for the spawned driver behind `subscribe`.
    async fn drive(&self) {
        let builder = {
            let mut inner = self.inner.lock();
            if inner.result.is_some() || inner.started {
                return;
            }
            match inner.builder.take() {
                Some(builder) => {
                    inner.started = true;
                    builder
                }
                None => return,
            }
        };
        self.run(builder).await;
    }

    /// Winner path: build the handle, run it, broadcast the outcome.
    async fn run(&self, builder: CallBuilder<T>) -> Outcome<T> {
        debug!("claimed execution of distinct call");
        let handle = match panic::catch_unwind(AssertUnwindSafe(builder)) {
            Ok(handle) => handle,
            Err(_) => {
                warn!("call builder panicked");
                return self.complete(Outcome::Failure(CallError::new("call builder panicked")));
            }
        };

        enum Gate {
            Run { propagate_cancel: bool },
            Superseded,
        }

        let gate = {
            let mut inner = self.inner.lock();
            if inner.result.is_some() {
                // Canceled while the factory was running.
                Gate::Superseded
            } else {
                inner.running = Some(handle.clone());
                Gate::Run {
                    propagate_cancel: inner.cancel_requested,
                }
            }
        };

        let outcome = match gate {
            Gate::Superseded => {
                handle.cancel();
                Outcome::Canceled
            }
            Gate::Run { propagate_cancel } => {
                if propagate_cancel {
                    // cancel() ran before the handle existed; catch up.
                    handle.cancel();
                }
                handle.execute().await
            }
        };
        self.complete(outcome)
    }

    /// Installs `outcome` as the write-once terminal result and performs
    /// the single broadcast and finalization pass. Returns the result
    /// actually installed, which is the earlier one if this call lost the
    /// race. No-op besides the return value once a result exists.
    fn complete(&self, outcome: Outcome<T>) -> Outcome<T> {
        let (result, callbacks, on_finished) = {
            let mut inner = self.inner.lock();
            if let Some(existing) = &inner.result {
                return existing.clone();
            }
            inner.result = Some(outcome.clone());

            let mut callbacks = std::mem::take(&mut inner.cancel_aware);
            let result_only = std::mem::take(&mut inner.result_only);
            if !outcome.is_canceled() {
                callbacks.extend(result_only);
            }

            inner.running = None;
            inner.builder = None;
            inner.started = false;
            (outcome, callbacks, inner.on_finished.take())
        };

        debug!(listeners = callbacks.len(), canceled = result.is_canceled(), "broadcasting terminal outcome");
        for callback in callbacks {
            deliver(callback, result.clone());
        }
        if let Some(on_finished) = on_finished {
            on_finished();
        }
        result
    }
}

fn deliver<T>(callback: Callback<T>, outcome: Outcome<T>) {
    if panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
        warn!("listener callback panicked, continuing broadcast");
    }
}
