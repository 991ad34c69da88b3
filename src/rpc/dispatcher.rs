//! Correlation dispatcher.
//!
//! Decides for every call whether a local handler satisfies it or whether it
//! is forwarded to the peer, and matches each response from the peer back to
//! the call that issued the request.
//!
//! ```ignore
//! let (local, remote) = duplex();
//! let dispatcher = Dispatcher::new(local.outbound, DispatcherConfig::from_env());
//! dispatcher.serve(local.inbound);
//!
//! let response = dispatcher.request(SayHello::call(None, json!({"name": "John"}))).await?;
//! ```

use crate::config::DispatcherConfig;
use crate::core::{EventManager, Identity, Listener, ListenerId};
use crate::error::{RpcError, RpcResult};
use crate::jsonrpc::transport::MessageSender;
use crate::jsonrpc::types::{ErrorCode, ErrorObject, Message, Request, Response};
use crate::rpc::call::{RpcCall, RpcMethod};
use crate::rpc::handler::{CallHandler, ServerCallHandler};
use crate::rpc::ids::IdGenerator;
use crate::rpc::pending::PendingCalls;
use crate::rpc::registry::{Factory, MethodRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a fired call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A local handler answered, promised an answer, or faulted.
    Local,
    /// The request was sent to the peer and the call is pending.
    Remote,
}

struct Inner {
    calls: Arc<EventManager<RpcCall>>,
    registry: Arc<MethodRegistry<RpcCall>>,
    server: Arc<ServerCallHandler>,
    inbound: Arc<dyn CallHandler>,
    pending: PendingCalls,
    ids: IdGenerator,
    sender: Box<dyn MessageSender>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

/// Routes calls between local handlers and the remote peer.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher executing inbound requests on its own call bus.
    pub fn new(sender: impl MessageSender + 'static, config: DispatcherConfig) -> Self {
        Self::build(sender, config, None)
    }

    /// Dispatcher executing inbound requests with `handler` instead of its
    /// call bus, e.g. a [`CallToEventTranslator`](crate::rpc::CallToEventTranslator).
    pub fn with_call_handler(
        sender: impl MessageSender + 'static,
        config: DispatcherConfig,
        handler: Arc<dyn CallHandler>,
    ) -> Self {
        Self::build(sender, config, Some(handler))
    }

    fn build(
        sender: impl MessageSender + 'static,
        config: DispatcherConfig,
        inbound: Option<Arc<dyn CallHandler>>,
    ) -> Self {
        let calls = Arc::new(EventManager::new());
        let registry = Arc::new(MethodRegistry::new(config.collision_policy));
        let server = Arc::new(ServerCallHandler::new(calls.clone(), registry.clone()));
        let inbound: Arc<dyn CallHandler> = match inbound {
            Some(handler) => handler,
            None => server.clone(),
        };
        let ids = match &config.id_prefix {
            Some(prefix) => IdGenerator::with_prefix(prefix.clone()),
            None => IdGenerator::seeded(),
        };
        log::debug!("Dispatcher created, request ids prefixed '{}'", ids.prefix());

        Self {
            inner: Arc::new(Inner {
                calls,
                registry,
                server,
                inbound,
                pending: PendingCalls::new(),
                ids,
                sender: Box::new(sender),
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// The local call bus.
    pub fn calls(&self) -> &Arc<EventManager<RpcCall>> {
        &self.inner.calls
    }

    pub fn registry(&self) -> &Arc<MethodRegistry<RpcCall>> {
        &self.inner.registry
    }

    /// The handler executing inbound requests on the local call bus.
    pub fn server_handler(&self) -> Arc<ServerCallHandler> {
        self.inner.server.clone()
    }

    // ---- handler registration ----

    /// Register a local handler for `identity`.
    ///
    /// Inbound requests for the identity's method name are instantiated with
    /// [`RpcCall::from_request`].
    pub fn add_listener(
        &self,
        identity: Identity,
        listener: Arc<dyn Listener<RpcCall>>,
    ) -> RpcResult<ListenerId> {
        let factory: Factory<RpcCall> =
            Arc::new(move |request| RpcCall::from_request(identity, request));
        self.register(identity, factory, listener)
    }

    /// Register a local handler for the call kind `M`.
    pub fn add_method<M: RpcMethod>(
        &self,
        listener: Arc<dyn Listener<RpcCall>>,
    ) -> RpcResult<ListenerId> {
        let factory: Factory<RpcCall> = Arc::new(M::build);
        self.register(M::identity(), factory, listener)
    }

    fn register(
        &self,
        identity: Identity,
        factory: Factory<RpcCall>,
        listener: Arc<dyn Listener<RpcCall>>,
    ) -> RpcResult<ListenerId> {
        self.inner.registry.register(identity, factory)?;
        Ok(self.inner.calls.add_listener(identity, listener))
    }

    /// Remove a local handler. Calls of `identity` go to the peer once its
    /// last handler is gone.
    pub fn remove_listener(&self, identity: Identity, id: ListenerId) -> bool {
        if !self.inner.calls.remove_listener(identity, id) {
            return false;
        }
        self.inner.registry.unregister(identity);
        true
    }

    // ---- outbound ----

    /// Route `call`: local handlers first, the peer otherwise.
    pub async fn fire(&self, call: &RpcCall) -> RpcResult<Route> {
        self.inner.calls.fire(call).await;

        if call.has_response() || call.is_deferred() {
            log::debug!("{} satisfied locally", call.method());
            return Ok(Route::Local);
        }
        if let Some(fault) = call.errors().first() {
            log::debug!("{} failed locally: {}", call.method(), fault);
            call.reply_fault(fault);
            return Ok(Route::Local);
        }

        self.forward(call)?;
        Ok(Route::Remote)
    }

    fn forward(&self, call: &RpcCall) -> RpcResult<()> {
        let id = match call.id() {
            Some(id) if !id.is_null() => id,
            _ => {
                let id = self.inner.ids.next();
                call.assign_id(id.clone());
                id
            }
        };
        let text = Message::Request(call.request()).to_json()?;

        // 応答が送信直後に届いても取りこぼさないよう、送信前に登録する
        if let Some(previous) = self.inner.pending.insert(&id, call.clone()) {
            log::warn!("Request id {} reused while still pending, cancelling the older call", id);
            previous.reply_error(ErrorObject::new(ErrorCode::RequestCancelled));
        }

        log::debug!("Forwarding {} as {}", call.method(), id);
        if let Err(e) = self.inner.sender.send(text) {
            log::error!("Failed to send request {}: {}", id, e);
            self.inner.pending.remove_call(&id, call);
            return Err(e);
        }
        Ok(())
    }

    /// Fire `call` and wait for its response.
    pub async fn request(&self, call: RpcCall) -> RpcResult<Response> {
        let route = self.fire(&call).await?;

        let response = match self.inner.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, call.wait()).await {
                Ok(response) => response,
                Err(_) => {
                    if route == Route::Remote {
                        if let Some(id) = call.id() {
                            self.inner.pending.remove_call(&id, &call);
                        }
                    }
                    log::debug!("{} timed out after {:?}", call.method(), limit);
                    return Err(RpcError::Timeout);
                }
            },
            None => call.wait().await,
        };

        response.ok_or(RpcError::Abandoned)
    }

    /// Send a one-way request of kind `M`. Nothing is tracked and no answer
    /// is expected.
    pub fn notify<M: RpcMethod>(&self, params: Value) -> RpcResult<()> {
        let request = Request::new(
            None,
            Some(self.inner.registry.method_name(&M::identity())),
            Some(params),
        );
        self.inner.sender.send(Message::Request(request).to_json()?)
    }

    // ---- inbound ----

    /// Process one message received from the peer.
    pub async fn on_message(&self, text: &str) -> RpcResult<()> {
        match Message::parse(text)? {
            Message::Request(request) => self.on_request(request).await,
            Message::Response(response) => {
                self.on_response(response);
                Ok(())
            }
        }
    }

    async fn on_request(&self, request: Request) -> RpcResult<()> {
        let one_way = request.is_notification();
        let response = self.inner.inbound.handle(request).await;

        if one_way {
            // 一方向リクエストには応答しない。未知のメソッドも黙って捨てる
            if let Some(error) = &response.error {
                log::debug!("One-way request dropped: {}", error.message);
            }
            return Ok(());
        }
        self.inner.sender.send(Message::Response(response).to_json()?)
    }

    fn on_response(&self, response: Response) {
        let Some(id) = response.id.clone() else {
            log::debug!("Dropping response without id");
            return;
        };

        match self.inner.pending.remove(&id) {
            Some(call) => {
                log::debug!("Response for {} resolves {}", id, call.method());
                call.complete(response);
            }
            None => log::debug!("Dropping response for unknown request {}", id),
        }
    }

    // ---- retention ----

    /// Stop waiting for the response to `id`. The call completes with
    /// `REQUEST_CANCELLED`.
    pub fn cancel(&self, id: &Value) -> bool {
        match self.inner.pending.remove(id) {
            Some(call) => {
                log::debug!("Cancelled request {}", id);
                call.reply_error(ErrorObject::new(ErrorCode::RequestCancelled));
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, id: &Value) -> bool {
        self.inner.pending.contains(id)
    }

    /// Fail every pending call with `TRANSPORT_CLOSED`.
    pub fn close(&self) {
        let calls = self.inner.pending.drain();
        if !calls.is_empty() {
            log::debug!("Closing with {} pending call(s)", calls.len());
        }
        for call in calls {
            call.reply_error(ErrorObject::new(ErrorCode::TransportClosed));
        }
    }

    /// Pump inbound messages from `receiver` until it closes or the
    /// dispatcher is shut down. Each message is handled on its own task.
    pub fn serve(&self, mut receiver: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let token = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::debug!("Serve loop cancelled");
                        break;
                    }
                    message = receiver.recv() => {
                        let Some(text) = message else {
                            log::debug!("Inbound channel closed");
                            break;
                        };
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            if let Err(e) = dispatcher.on_message(&text).await {
                                log::warn!("Failed to process inbound message: {}", e);
                            }
                        });
                    }
                }
            }
            dispatcher.close();
        })
    }

    /// Stop the serve loop and fail pending calls.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.close();
    }
}

/// Executes a request through the dispatcher: locally when a handler is
/// registered for its method, on the peer otherwise.
#[async_trait]
impl CallHandler for Dispatcher {
    async fn handle(&self, request: Request) -> Response {
        let id = request.id.clone();
        let method = request.method.clone().unwrap_or_default();
        let call = match self.inner.registry.identity_for(&method) {
            Some(identity) => RpcCall::from_request(identity, request),
            None => RpcCall::untyped(method, request.params),
        };

        match self.request(call).await {
            Ok(mut response) => {
                response.id = id;
                response
            }
            Err(RpcError::Timeout) => Response::error(
                id,
                ErrorObject::new(ErrorCode::RequestCancelled).with_details("Timeout"),
            ),
            Err(RpcError::TransportClosed) => {
                Response::error(id, ErrorObject::new(ErrorCode::TransportClosed))
            }
            Err(e) => Response::error(id, ErrorObject::internal_error(e.to_string(), None)),
        }
    }
}
