#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]

pub mod distinct;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_call;

pub use distinct::{Callback, DistinctCall};
pub use registry::DistinctCalls;
