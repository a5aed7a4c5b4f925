//! Cooperative cancellation.
//!
//! A run's `CancellationToken` is observed at step boundaries and at the
//! suspension point of interruptible steps.

mod token;

pub use token::{CancelCallback, CancellationToken};
