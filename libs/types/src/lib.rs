//! # Management Types
//!
//! Vocabulary shared by every management crate: cluster members and their
//! product versions, canonical MBean names, attribute values, model
//! snapshots, notifications and the serializable halves of listener
//! subscriptions.
//!
//! Nothing in here performs I/O. The codec crate decides how these types go
//! on the wire and the federation crate decides what they mean.
//!
//! ## Canonical names
//!
//! ```rust
//! use types::names;
//!
//! let name = "type=Service,name=Invocation,nodeId=3";
//! assert!(names::is_global(name));
//! assert_eq!(names::extract_member_id(name), Some(3));
//! assert!(names::matches_pattern(name, "type=Service"));
//! ```

pub mod filter;
pub mod function;
pub mod holder;
pub mod member;
pub mod names;
pub mod notification;
pub mod snapshot;
pub mod value;
pub mod version;

pub use filter::Filter;
pub use function::ManagementFunction;
pub use holder::RemoteHolder;
pub use member::{Member, MemberId};
pub use names::NamingContext;
pub use notification::{Notification, NotificationFilter};
pub use snapshot::{MBeanInfo, ModelKind, ModelSnapshot};
pub use value::Value;
pub use version::{ProductVersion, VersionParseError};

/// Current wall clock in epoch milliseconds.
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
