//! End-to-End Test Framework for the management federation
//!
//! Starts several members on one [`network::LocalFabric`], each with its own
//! [`federation::Management`], and offers the waits and fixtures the
//! scenarios in `tests/` share.

pub mod fixtures;
pub mod framework;
pub mod validation;

pub use fixtures::{counter_bean, RecordingListener};
pub use framework::{NodeSpec, TestCluster, TestNode};
pub use validation::{eventually, eventually_async, DEFAULT_WAIT};
