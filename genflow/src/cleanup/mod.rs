//! Temporary resource tracking and teardown.
//!
//! Resources are registered per session as steps create them and dropped
//! exactly once, in reverse creation order, by `cleanup`.

mod manager;

pub use manager::{TempResource, TempResourceCleanupManager};
