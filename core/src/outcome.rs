use std::fmt;

/// Error payload of a failed call.
///
/// Stringified up front so one terminal result can be handed out to any
/// number of subscribers without the source error being `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("call failed: {inner}")]
pub struct CallError {
    inner: String,
}

impl CallError {
    pub fn new<E: fmt::Display>(e: E) -> Self {
        Self {
            inner: e.to_string(),
        }
    }
}

/// Terminal result of one logical call, immutable once produced.
///
/// Failure and cancellation are ordinary values here, not raised faults.
/// Callers pattern-match on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(CallError),
    Canceled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(e) => Outcome::Failure(e),
            Outcome::Canceled => Outcome::Canceled,
        }
    }

    pub fn from_result<E: fmt::Display>(res: Result<T, E>) -> Self {
        match res {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Failure(CallError::new(e)),
        }
    }

    /// Collapses cancellation into an error for callers that only care
    /// about success.
    pub fn into_result(self) -> Result<T, CallError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(e) => Err(e),
            Outcome::Canceled => Err(CallError::new("call was canceled")),
        }
    }
}
