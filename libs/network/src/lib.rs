//! Network Infrastructure
//!
//! The invocation service the management connector runs on, expressed as
//! traits, plus [`LocalFabric`], an in-process cluster used by the node
//! binary and the end-to-end tests.
//!
//! - [`InvocationService`]: deliver-to-member `query` and `execute`
//! - [`TaskHandler`]: receives encoded tasks, may defer through a [`Continuation`]
//! - [`MemberListener`]: join and departure events
//! - [`NameService`]: cluster-wide name bindings

pub mod error;
pub mod fabric;
pub mod invocation;
pub mod membership;
pub mod name_service;

pub use error::{Result, TransportError};
pub use fabric::{FabricConfig, FabricMetrics, FabricService, JoinRequest, LocalFabric};
pub use invocation::{
    Continuation, DeliveryContext, InvocationObserver, InvocationService, TaskHandler, TaskReply,
};
pub use membership::{dynamic_senior, MemberListener, ServiceMember, DYNAMIC_MANAGEMENT_KEY};
pub use name_service::{LookupContext, NameService, Resolvable};
