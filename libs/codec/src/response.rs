//! Task responses.
//!
//! Responses are a single bincode-encoded enum. Failures raised while
//! running a task on the remote member travel back as [`RemoteFailure`] so
//! the caller can rebuild the right error kind.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use types::{MBeanInfo, MemberId, ModelSnapshot, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    IllegalArgument,
    IllegalState,
    UnsupportedOperation,
    Security,
    ReadOnly,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Reply to a [`crate::messages::ModelRequest`]: the owner's snapshot and
/// the outcome of the requested operation, if one was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    pub snapshot: ModelSnapshot,
    pub result: Option<Result<Value, RemoteFailure>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskResponse {
    Ack,
    Bool(bool),
    Value(Value),
    Attributes(BTreeMap<String, Value>),
    Names(BTreeSet<String>),
    Owner(Option<MemberId>),
    Info(MBeanInfo),
    /// `None` when the model is no longer registered at the owner
    Model(Option<ModelReply>),
    Failure(RemoteFailure),
}

impl TaskResponse {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        TaskResponse::Failure(RemoteFailure::new(kind, message))
    }

    pub fn encode(&self) -> ProtocolResult<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::serialization("task response", e))
    }

    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::serialization("task response", e))
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            TaskResponse::Ack => "Ack",
            TaskResponse::Bool(_) => "Bool",
            TaskResponse::Value(_) => "Value",
            TaskResponse::Attributes(_) => "Attributes",
            TaskResponse::Names(_) => "Names",
            TaskResponse::Owner(_) => "Owner",
            TaskResponse::Info(_) => "Info",
            TaskResponse::Model(_) => "Model",
            TaskResponse::Failure(_) => "Failure",
        }
    }
}
