//! Core module for local call delivery
//!
//! This module provides the in-process event bus used to invoke local
//! handlers. Events are request/response exchanges keyed by an [`Identity`];
//! the RPC layer builds on top of it to decide whether a call is answered
//! locally or forwarded to the peer.

pub mod event;
pub mod listener;
pub mod manager;

// Re-exports for convenience
pub use event::{CallEvent, Exchange, Fault, Identity};
pub use listener::{listener_fn, Listener};
pub use manager::{EventManager, ListenerId};
