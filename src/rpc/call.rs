//! Structured call objects.

use crate::core::{CallEvent, Fault, Identity};
use crate::jsonrpc::types::{ErrorObject, Request, Response};
use serde_json::Value;

/// A structured RPC call: one [`Request`] paired with at most one [`Response`].
pub type RpcCall = CallEvent<Request, Response>;

/// Identity of calls addressed by method name only. No listener is ever
/// registered for it, so such calls always go to the peer.
pub const UNTYPED: Identity = Identity::new("Untyped");

/// A statically known kind of call.
///
/// ```ignore
/// struct SayHello;
///
/// impl RpcMethod for SayHello {
///     const SHORT_NAME: &'static str = "SayHello";
/// }
///
/// let call = SayHello::call(Some(json!("123")), json!({"name": "John"}));
/// assert_eq!(call.method(), "sayHello");
/// ```
pub trait RpcMethod: 'static {
    /// Short name, `$` separating nesting levels.
    const SHORT_NAME: &'static str;

    fn identity() -> Identity {
        Identity::new(Self::SHORT_NAME)
    }

    /// Instantiate a call from an inbound request.
    fn build(request: Request) -> RpcCall {
        RpcCall::from_request(Self::identity(), request)
    }

    fn call(id: Option<Value>, params: Value) -> RpcCall {
        RpcCall::with_params(Self::identity(), id, params)
    }
}

impl CallEvent<Request, Response> {
    /// Create a call from a request, deriving `method` from the identity
    /// when the request carries none.
    pub fn from_request(identity: Identity, mut request: Request) -> Self {
        if request.method.is_none() {
            request.method = Some(identity.method_name());
        }
        CallEvent::new(identity, request)
    }

    pub fn with_params(identity: Identity, id: Option<Value>, params: Value) -> Self {
        Self::from_request(identity, Request::new(id, None, Some(params)))
    }

    /// Create a call addressed to an explicit method name.
    pub fn with_method(
        identity: Identity,
        id: Option<Value>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self::from_request(identity, Request::new(id, Some(method.into()), params))
    }

    /// A call with no static kind, addressed only by its method name.
    pub fn untyped(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::with_method(UNTYPED, None, method, params)
    }

    pub fn id(&self) -> Option<Value> {
        self.request().id
    }

    pub(crate) fn assign_id(&self, id: Value) {
        self.update_request(|request| request.id = Some(id));
    }

    pub fn method(&self) -> String {
        self.request()
            .method
            .unwrap_or_else(|| self.identity().method_name())
    }

    pub fn params(&self) -> Option<Value> {
        self.request().params
    }

    /// Complete the call with a result.
    pub fn reply(&self, result: Value) -> bool {
        self.complete(Response::success(self.id(), result))
    }

    /// Complete the call with an error.
    pub fn reply_error(&self, error: ErrorObject) -> bool {
        self.complete(Response::error(self.id(), error))
    }

    /// Complete the call with an `INTERNAL_ERROR` built from a fault.
    pub fn reply_fault(&self, fault: &Fault) -> bool {
        self.reply_error(ErrorObject::internal_error(
            fault.message.clone(),
            fault.details.clone(),
        ))
    }

    /// Result of a completed call, `None` while pending or on error.
    pub fn result(&self) -> Option<Value> {
        self.response().and_then(|response| response.result)
    }

    pub fn result_error(&self) -> Option<ErrorObject> {
        self.response().and_then(|response| response.error)
    }

    pub fn has_response_errors(&self) -> bool {
        self.response().map_or(false, |response| response.is_error())
    }
}
