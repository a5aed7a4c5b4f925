//! Target data source access.
//!
//! This module provides:
//! - `TargetSource` and `Dialect` describing where a run operates
//! - `SourceConnection`, the dialect-aware statement execution seam
//! - `StatementRenderer` for the few statements the core itself issues

mod connection;
mod dialect;
mod render;

pub use connection::{ConnectionProvider, SourceConnection, TargetSource};
pub use dialect::Dialect;
pub use render::{DefaultRenderer, StatementRenderer};
