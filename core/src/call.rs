use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::Future;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::outcome::{CallError, Outcome};

pub type BoxFut<'a, O> = Pin<Box<dyn Future<Output = O> + Send + 'a>>;

/// Handle to one asynchronous operation.
///
/// `execute` suspends until the operation finishes and is meant to be
/// driven exactly once. `cancel` is best-effort and idempotent; it may not
/// take effect if the operation is already near completion.
#[async_trait]
pub trait Call<T: Send>: Send + Sync {
    async fn execute(&self) -> Outcome<T>;

    fn cancel(&self);
}

/// Adapts a plain future into a [`Call`] by racing it against a
/// cancellation signal.
pub struct FutureCall<T>
where
    T: Send + 'static,
{
    fut: Mutex<Option<BoxFut<'static, Result<T, CallError>>>>,
    canceled: AtomicBool,
    cancel_signal: Notify,
}

impl<T> FutureCall<T>
where
    T: Send + 'static,
{
    pub fn new(fut: BoxFut<'static, Result<T, CallError>>) -> Self {
        Self {
            fut: Mutex::new(Some(fut)),
            canceled: AtomicBool::new(false),
            cancel_signal: Notify::new(),
        }
    }
}

#[async_trait]
impl<T> Call<T> for FutureCall<T>
where
    T: Send + 'static,
{
    async fn execute(&self) -> Outcome<T> {
        let Some(fut) = self.fut.lock().take() else {
            return Outcome::Failure(CallError::new("call was already executed"));
        };

        // Register for the cancel signal before re-checking the flag, so a
        // cancel landing in between is never missed.
        let canceled = self.cancel_signal.notified();
        tokio::pin!(canceled);
        if self.canceled.load(Ordering::Acquire) {
            return Outcome::Canceled;
        }

        tokio::select! {
            res = fut => Outcome::from_result(res),
            _ = &mut canceled => Outcome::Canceled,
        }
    }

    fn cancel(&self) {
        debug!("cancelling future-backed call");
        self.canceled.store(true, Ordering::Release);
        self.cancel_signal.notify_waiters();
    }
}
