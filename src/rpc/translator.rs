//! Adapters between structured calls and generic JSON events.
//!
//! [`CallToEventTranslator`] executes inbound requests as [`RpcEvent`]s on an
//! event bus. [`EventToCallTranslator`] goes the other way: events nobody
//! answered locally are turned into requests for a [`CallHandler`].

use crate::config::CollisionPolicy;
use crate::core::{EventManager, Fault, Identity, Listener, ListenerId};
use crate::error::RpcResult;
use crate::jsonrpc::types::{ErrorObject, Request, Response};
use crate::rpc::codec::{DefaultMethodNameProvider, MethodNameProvider};
use crate::rpc::event::{RpcEvent, RpcEventKind};
use crate::rpc::handler::{method_not_found, CallHandler};
use crate::rpc::ids::IdGenerator;
use crate::rpc::registry::{Factory, MethodRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

fn event_factory(identity: Identity) -> Factory<RpcEvent> {
    Arc::new(move |request: Request| {
        RpcEvent::new(identity, request.params.unwrap_or_else(|| json!({})))
    })
}

/// `INTERNAL_ERROR` carrying every fault recorded on an event.
fn faults_to_error(faults: &[Fault]) -> ErrorObject {
    let message = faults
        .iter()
        .map(|fault| fault.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let details = faults
        .iter()
        .filter_map(|fault| fault.details.as_deref())
        .collect::<Vec<_>>();
    let details = (!details.is_empty()).then(|| details.join("\n"));
    ErrorObject::internal_error(message, details)
}

/// Executes requests by firing the matching [`RpcEvent`] on an event bus.
pub struct CallToEventTranslator {
    events: Arc<EventManager<RpcEvent>>,
    registry: MethodRegistry<RpcEvent>,
}

impl CallToEventTranslator {
    pub fn new(events: Arc<EventManager<RpcEvent>>, policy: CollisionPolicy) -> Self {
        Self {
            events,
            registry: MethodRegistry::new(policy),
        }
    }

    pub fn events(&self) -> &Arc<EventManager<RpcEvent>> {
        &self.events
    }

    pub fn registry(&self) -> &MethodRegistry<RpcEvent> {
        &self.registry
    }

    /// Register an event listener and expose `identity` to inbound requests.
    pub fn add_listener(
        &self,
        identity: Identity,
        listener: Arc<dyn Listener<RpcEvent>>,
    ) -> RpcResult<ListenerId> {
        self.registry.register(identity, event_factory(identity))?;
        Ok(self.events.add_listener(identity, listener))
    }

    pub fn add_event<K: RpcEventKind>(
        &self,
        listener: Arc<dyn Listener<RpcEvent>>,
    ) -> RpcResult<ListenerId> {
        self.add_listener(K::identity(), listener)
    }

    pub fn remove_listener(&self, identity: Identity, id: ListenerId) -> bool {
        if !self.events.remove_listener(identity, id) {
            return false;
        }
        self.registry.unregister(identity);
        true
    }
}

#[async_trait]
impl CallHandler for CallToEventTranslator {
    async fn handle(&self, request: Request) -> Response {
        let Some(event) = self.registry.build(request.clone()) else {
            return method_not_found(&request);
        };

        event.mark_remote();
        self.events.fire(&event).await;

        if !event.has_response() && !event.is_deferred() {
            let faults = event.errors();
            if faults.is_empty() {
                return method_not_found(&request);
            }
            return Response::error(request.id, faults_to_error(&faults));
        }

        let payload = event.wait().await;
        let faults = event.errors();
        if !faults.is_empty() {
            return Response::error(request.id, faults_to_error(&faults));
        }

        match payload {
            Some(result) => Response::success(request.id, result),
            None => Response::error(
                request.id,
                ErrorObject::internal_error("Event dropped before it was answered", None),
            ),
        }
    }
}

/// Fallback event listener forwarding unanswered events as calls.
///
/// Events that arrived from the peer are never forwarded back.
pub struct EventToCallTranslator {
    handler: Arc<dyn CallHandler>,
    names: Arc<dyn MethodNameProvider>,
    ids: IdGenerator,
}

impl EventToCallTranslator {
    pub fn new(handler: Arc<dyn CallHandler>) -> Self {
        Self::with_provider(handler, Arc::new(DefaultMethodNameProvider))
    }

    pub fn with_provider(handler: Arc<dyn CallHandler>, names: Arc<dyn MethodNameProvider>) -> Self {
        Self {
            handler,
            names,
            ids: IdGenerator::seeded_as("call"),
        }
    }

    /// Install as a fallback listener on `events`.
    pub fn register_with(self: Arc<Self>, events: &EventManager<RpcEvent>) -> ListenerId {
        events.add_fallback(self)
    }

    fn error_fault(error: ErrorObject) -> Fault {
        Fault::new(
            format!("Error {}. {}", error.code, error.message),
            error.details,
        )
    }
}

#[async_trait]
impl Listener<RpcEvent> for EventToCallTranslator {
    async fn handle_request(&self, event: &RpcEvent) -> anyhow::Result<()> {
        if event.is_remote() {
            return Ok(());
        }

        let request = Request::new(
            Some(self.ids.next()),
            Some(self.names.method_name(&event.identity())),
            Some(event.payload()),
        );
        log::debug!("Translating event {} into call {:?}", event.identity(), request.id);

        let response = self.handler.handle(request).await;
        match response.error {
            Some(error) => {
                event.fail(Self::error_fault(error));
            }
            None => {
                event.respond(response.result.unwrap_or(Value::Null));
            }
        }
        Ok(())
    }
}
