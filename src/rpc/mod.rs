//! Call routing and correlation.
//!
//! - [`codec`]: identity to wire method name
//! - [`registry`]: method name to identity and factory
//! - [`pending`]: outbound calls awaiting a response
//! - [`dispatcher`]: local/remote routing
//! - [`handler`]: execution of inbound requests
//! - [`translator`]: call/event adapters

pub mod call;
pub mod codec;
pub mod dispatcher;
pub mod event;
pub mod handler;
pub mod ids;
pub mod pending;
pub mod registry;
pub mod translator;

pub use call::{RpcCall, RpcMethod, UNTYPED};
pub use codec::{method_name_for, DefaultMethodNameProvider, MethodNameProvider};
pub use dispatcher::{Dispatcher, Route};
pub use event::{RpcEvent, RpcEventKind};
pub use handler::{CallHandler, ServerCallHandler};
pub use ids::IdGenerator;
pub use pending::PendingCalls;
pub use registry::{Factory, MethodRegistry};
pub use translator::{CallToEventTranslator, EventToCallTranslator};
