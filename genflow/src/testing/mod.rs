//! Testing utilities for genflow pipelines.
//!
//! This module provides:
//! - A recording source connection with injectable failures
//! - A fake execution engine client
//! - Fault-injecting and recording steps
//! - A run-context fixture and outcome assertions

mod assertions;
mod connection;
mod engine;
mod fixtures;
mod steps;

pub use assertions::{
    assert_outcome_failed_with, assert_run_cancelled, assert_run_failed, assert_run_succeeded,
};
pub use connection::{RecordingConnection, SingleConnectionProvider};
pub use engine::FakeExecutionEngine;
pub use fixtures::TestRun;
pub use steps::{FailingStep, FlakyStep, PanickingStep, RecordingStep};
