#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]

pub mod call;
pub mod outcome;

pub use call::{BoxFut, Call, FutureCall};
pub use outcome::{CallError, Outcome};
