//! Call correlation and routing for bidirectional JSON-RPC.
//!
//! Calls are delivered to local handlers first and forwarded to the remote
//! peer when none answers; responses from the peer are matched back to the
//! waiting call by request id.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod jsonrpc;
pub mod rpc;

// 公開API
pub use crate::config::{CollisionPolicy, DispatcherConfig};
pub use crate::core::{listener_fn, CallEvent, EventManager, Fault, Identity, Listener, ListenerId};
pub use crate::error::{RpcError, RpcResult};
pub use crate::jsonrpc::{ErrorCode, ErrorObject, Message, MessageSender, Request, Response};
pub use crate::rpc::{
    CallHandler, CallToEventTranslator, Dispatcher, EventToCallTranslator, Route, RpcCall,
    RpcEvent, RpcEventKind, RpcMethod,
};
