//! Execution of inbound requests against local handlers.

use crate::core::EventManager;
use crate::jsonrpc::types::{ErrorCode, ErrorObject, Request, Response};
use crate::rpc::call::RpcCall;
use crate::rpc::registry::MethodRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns one request into exactly one response.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(&self, request: Request) -> Response;
}

/// Build the `METHOD_NOT_FOUND` answer for `request`.
pub(crate) fn method_not_found(request: &Request) -> Response {
    let method = request.method.as_deref().unwrap_or_default();
    Response::error(
        request.id.clone(),
        ErrorObject::new(ErrorCode::MethodNotFound)
            .with_details(format!("No handler registered for '{}'", method)),
    )
}

/// Executes requests coming from the peer on the local call bus.
pub struct ServerCallHandler {
    calls: Arc<EventManager<RpcCall>>,
    registry: Arc<MethodRegistry<RpcCall>>,
}

impl ServerCallHandler {
    pub fn new(calls: Arc<EventManager<RpcCall>>, registry: Arc<MethodRegistry<RpcCall>>) -> Self {
        Self { calls, registry }
    }
}

#[async_trait]
impl CallHandler for ServerCallHandler {
    async fn handle(&self, request: Request) -> Response {
        let Some(call) = self.registry.build(request.clone()) else {
            log::debug!("No local method for inbound {:?}", request.method);
            return method_not_found(&request);
        };

        call.mark_remote();
        self.calls.fire(&call).await;

        if !call.has_response() && !call.is_deferred() {
            match call.errors().first() {
                Some(fault) => {
                    call.reply_fault(fault);
                }
                None => {
                    call.complete(method_not_found(&request));
                }
            }
        }

        match call.wait().await {
            Some(response) => response,
            None => Response::error(
                request.id,
                ErrorObject::internal_error("Call dropped before it was answered", None),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;
    use crate::core::listener_fn;
    use crate::rpc::call::RpcMethod;
    use crate::rpc::registry::Factory;
    use serde_json::json;

    struct SayHello;

    impl RpcMethod for SayHello {
        const SHORT_NAME: &'static str = "SayHello";
    }

    fn setup() -> (Arc<EventManager<RpcCall>>, ServerCallHandler) {
        let calls = Arc::new(EventManager::new());
        let registry = Arc::new(MethodRegistry::new(CollisionPolicy::Replace));
        let factory: Factory<RpcCall> = Arc::new(SayHello::build);
        registry.register(SayHello::identity(), factory).unwrap();
        (calls.clone(), ServerCallHandler::new(calls, registry))
    }

    fn say_hello(id: &str) -> Request {
        Request::new(
            Some(json!(id)),
            Some("sayHello".to_string()),
            Some(json!({"name": "John"})),
        )
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_calls, handler) = setup();
        let request = Request::new(Some(json!("42")), Some("nope".to_string()), None);

        let response = handler.handle(request).await;
        assert_eq!(response.id, Some(json!("42")));
        assert_eq!(response.error.unwrap().code, ErrorCode::MethodNotFound.code());
    }

    #[tokio::test]
    async fn test_local_reply_and_remote_flag() {
        let (calls, handler) = setup();
        calls.add_listener(
            SayHello::identity(),
            listener_fn(|call: RpcCall| async move {
                assert!(call.is_remote());
                let name = call.params().unwrap()["name"].as_str().unwrap_or_default().to_string();
                call.reply(json!({"msg": format!("Hello, {}!", name)}));
                Ok(())
            }),
        );

        let response = handler.handle(say_hello("1")).await;
        assert_eq!(response.id, Some(json!("1")));
        assert_eq!(response.result, Some(json!({"msg": "Hello, John!"})));
    }

    #[tokio::test]
    async fn test_fault_becomes_internal_error() {
        let (calls, handler) = setup();
        calls.add_listener(
            SayHello::identity(),
            listener_fn(|_call: RpcCall| async move { anyhow::bail!("database unavailable") }),
        );

        let error = handler.handle(say_hello("2")).await.error.unwrap();
        assert_eq!(error.code, ErrorCode::InternalError.code());
        assert_eq!(error.message, "database unavailable");
    }

    #[tokio::test]
    async fn test_registered_but_unanswered() {
        let (calls, handler) = setup();
        calls.add_listener(
            SayHello::identity(),
            listener_fn(|_call: RpcCall| async move { Ok(()) }),
        );

        let error = handler.handle(say_hello("3")).await.error.unwrap();
        assert_eq!(error.code, ErrorCode::MethodNotFound.code());
    }

    #[tokio::test]
    async fn test_deferred_reply_is_awaited() {
        let (calls, handler) = setup();
        calls.add_listener(
            SayHello::identity(),
            listener_fn(|call: RpcCall| async move {
                call.defer();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    call.reply(json!("later"));
                });
                Ok(())
            }),
        );

        let response = handler.handle(say_hello("4")).await;
        assert_eq!(response.result, Some(json!("later")));
    }
}
