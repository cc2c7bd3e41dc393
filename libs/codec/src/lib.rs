//! # Management Codec
//!
//! Encoding rules for the tasks exchanged by management services on
//! different members, and for their responses.
//!
//! ## Safety properties
//!
//! - Every length is bounds checked before it is trusted.
//! - Array counts are validated against the remaining input before any
//!   allocation ([`bounds::validate_load_array`]), and large arrays are read
//!   in bounded batches.
//! - Payload fields whose content fails to deserialize are reported through
//!   the task (`InvokeRemote::read_error`, `Notify::notification == None`)
//!   instead of failing the whole frame.
//! - Actions that an older member cannot decode are refused at encode time
//!   by [`messages::InvokeRemote::ensure_supported_by`].

pub mod bounds;
pub mod error;
pub mod messages;
pub mod response;
pub mod task;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Announce, InvokeRemote, ModelOp, ModelRequest, Notify, Publish, Register, RemoteAction,
    Subscribe, SubscriptionChange, Unregister, ACTION_SUBSCRIBE, ACTION_UNSUBSCRIBE,
};
pub use response::{FailureKind, ModelReply, RemoteFailure, TaskResponse};
pub use task::{Task, TaskKind};
