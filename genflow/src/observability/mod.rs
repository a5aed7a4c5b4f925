//! Observability utilities.
//!
//! Log output goes through `tracing`; `init_tracing` installs a subscriber
//! for binaries and tests that want one. Runs and steps get their own spans so
//! every log line carries the run and session it belongs to.

mod spans;
mod subscriber;

pub use spans::{run_span, step_span, SpanTimer};
pub use subscriber::{init_tracing, LogFormat};
