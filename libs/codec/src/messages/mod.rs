//! Federation task messages.
//!
//! Each task is a plain struct with `encode_body` / `decode_body`. The frame
//! (magic, version, task code, checksum) is handled by [`crate::task`].

mod announce;
mod invoke;
mod model_request;
mod notify;
mod publish;
mod register;
mod subscribe;
mod unregister;

pub use announce::Announce;
pub use invoke::{InvokeRemote, RemoteAction};
pub use model_request::{ModelOp, ModelRequest};
pub use notify::Notify;
pub use publish::Publish;
pub use register::Register;
pub use subscribe::{Subscribe, SubscriptionChange, ACTION_SUBSCRIBE, ACTION_UNSUBSCRIBE};
pub use unregister::Unregister;
