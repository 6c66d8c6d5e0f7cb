//! Action primitives for driving a live page
//!
//! This crate provides the two coordination building blocks the console is
//! built on:
//! - [`Lock`]: a FIFO counting semaphore used for single-flight actions
//! - [`ConditionWait`]: resolve once a predicate over a watched surface holds,
//!   re-evaluated on every change notification, optionally bounded by a timeout

pub mod errors;
mod lock;
mod waiting;

pub use errors::*;
pub use lock::*;
pub use waiting::*;
