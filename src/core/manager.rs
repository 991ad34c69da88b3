//! Type-keyed event bus.
//!
//! Listeners are registered per [`Identity`]. Firing an event delivers it to
//! the listeners of its identity in registration order until one of them
//! answers (or defers). Fallback listeners run afterwards, only when the event
//! is still unanswered.

use crate::core::event::{Exchange, Fault, Identity};
use crate::core::listener::Listener;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registered<E> = (ListenerId, Arc<dyn Listener<E>>);

struct Listeners<E> {
    typed: HashMap<Identity, Vec<Registered<E>>>,
    fallback: Vec<Registered<E>>,
}

/// Delivers events to locally registered listeners.
pub struct EventManager<E: Exchange> {
    listeners: RwLock<Listeners<E>>,
    next_id: AtomicU64,
}

impl<E: Exchange> Default for EventManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Exchange> EventManager<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Listeners {
                typed: HashMap::new(),
                fallback: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Listeners<E>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Listeners<E>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a listener for events of `identity`.
    pub fn add_listener(&self, identity: Identity, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let id = self.next_listener_id();
        self.write()
            .typed
            .entry(identity)
            .or_default()
            .push((id, listener));
        log::debug!("Listener {:?} added for {}", id, identity);
        id
    }

    /// Remove a listener. Returns `false` if it was not registered for `identity`.
    pub fn remove_listener(&self, identity: Identity, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let Some(registered) = listeners.typed.get_mut(&identity) else {
            return false;
        };

        let before = registered.len();
        registered.retain(|(listener_id, _)| *listener_id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.typed.remove(&identity);
        }
        if removed {
            log::debug!("Listener {:?} removed for {}", id, identity);
        }
        removed
    }

    /// Register a listener that receives every event left unanswered by the
    /// typed listeners.
    pub fn add_fallback(&self, listener: Arc<dyn Listener<E>>) -> ListenerId {
        let id = self.next_listener_id();
        self.write().fallback.push((id, listener));
        id
    }

    pub fn remove_fallback(&self, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let before = listeners.fallback.len();
        listeners.fallback.retain(|(listener_id, _)| *listener_id != id);
        listeners.fallback.len() != before
    }

    pub fn has_listeners(&self, identity: Identity) -> bool {
        self.listener_count(identity) > 0
    }

    pub fn listener_count(&self, identity: Identity) -> usize {
        self.read().typed.get(&identity).map_or(0, Vec::len)
    }

    /// Deliver `event` to its listeners and return how many were invoked.
    ///
    /// Listener faults are recorded on the event. The listener lists are
    /// snapshotted first, so listeners may (un)register during delivery.
    pub async fn fire(&self, event: &E) -> usize {
        let identity = event.identity();
        let (typed, fallback): (Vec<_>, Vec<_>) = {
            let listeners = self.read();
            let typed = listeners
                .typed
                .get(&identity)
                .map(|registered| registered.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default();
            let fallback = listeners.fallback.iter().map(|(_, l)| l.clone()).collect();
            (typed, fallback)
        };

        let mut invoked = 0;
        for listener in typed.iter().chain(fallback.iter()) {
            if event.has_response() || event.is_deferred() {
                break;
            }
            invoked += 1;
            // panicしたハンドラーも障害として記録し、呼び出し元を待たせない
            match AssertUnwindSafe(listener.handle_request(event))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    log::debug!("Listener for {} failed: {:#}", identity, error);
                    event.record_error(Fault::from(error));
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    log::error!("Listener for {} panicked: {}", identity, message);
                    event.record_error(Fault::new(message, None));
                }
            }
        }

        log::trace!("Fired {} to {} listener(s)", identity, invoked);
        invoked
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic in handler: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic in handler: {}", s)
    } else {
        "panic in handler".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::CallEvent;
    use crate::core::listener::listener_fn;

    type TestEvent = CallEvent<String, String>;

    const ECHO: Identity = Identity::new("Echo");
    const OTHER: Identity = Identity::new("Other");

    fn echo_listener(prefix: &'static str) -> Arc<dyn Listener<TestEvent>> {
        listener_fn(move |event: TestEvent| async move {
            event.complete(format!("{}{}", prefix, event.request()));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_fire_delivers_to_identity_listeners() {
        let manager = EventManager::new();
        manager.add_listener(ECHO, echo_listener("echo:"));

        let event = TestEvent::new(ECHO, "hi".to_string());
        let invoked = manager.fire(&event).await;

        assert_eq!(invoked, 1);
        assert_eq!(event.response(), Some("echo:hi".to_string()));
    }

    #[tokio::test]
    async fn test_first_answer_stops_delivery() {
        let manager = EventManager::new();
        manager.add_listener(ECHO, echo_listener("first:"));
        manager.add_listener(ECHO, echo_listener("second:"));

        let event = TestEvent::new(ECHO, "x".to_string());
        assert_eq!(manager.fire(&event).await, 1);
        assert_eq!(event.response(), Some("first:x".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_left_unanswered() {
        let manager = EventManager::new();
        manager.add_listener(ECHO, echo_listener(""));

        let event = TestEvent::new(OTHER, "x".to_string());
        assert_eq!(manager.fire(&event).await, 0);
        assert!(!event.has_response());
    }

    #[tokio::test]
    async fn test_fallback_runs_only_when_unanswered() {
        let manager = EventManager::new();
        manager.add_listener(ECHO, echo_listener("typed:"));
        manager.add_fallback(echo_listener("fallback:"));

        let answered = TestEvent::new(ECHO, "a".to_string());
        manager.fire(&answered).await;
        assert_eq!(answered.response(), Some("typed:a".to_string()));

        let unanswered = TestEvent::new(OTHER, "b".to_string());
        manager.fire(&unanswered).await;
        assert_eq!(unanswered.response(), Some("fallback:b".to_string()));
    }

    #[tokio::test]
    async fn test_listener_error_is_recorded() {
        let manager: EventManager<TestEvent> = EventManager::new();
        manager.add_listener(
            ECHO,
            listener_fn(|_event: TestEvent| async move { Err(anyhow::anyhow!("boom")) }),
        );

        let event = TestEvent::new(ECHO, "x".to_string());
        manager.fire(&event).await;

        assert!(!event.has_response());
        assert_eq!(event.errors()[0].message, "boom");
    }

    #[tokio::test]
    async fn test_listener_panic_is_recorded_as_fault() {
        let manager: EventManager<TestEvent> = EventManager::new();
        manager.add_listener(
            ECHO,
            listener_fn(|event: TestEvent| async move {
                let words: Vec<String> = Vec::new();
                event.complete(words[0].clone());
                Ok(())
            }),
        );
        manager.add_listener(ECHO, echo_listener("after:"));

        let event = TestEvent::new(ECHO, "x".to_string());
        assert_eq!(manager.fire(&event).await, 2);

        // panicしても後続のリスナーへ配送は続く
        assert!(event.errors()[0].message.starts_with("panic in handler: "));
        assert_eq!(event.response(), Some("after:x".to_string()));
    }

    #[test]
    fn test_remove_listener() {
        let manager = EventManager::new();
        let id = manager.add_listener(ECHO, echo_listener(""));

        assert!(manager.has_listeners(ECHO));
        assert!(!manager.remove_listener(OTHER, id));
        assert!(manager.remove_listener(ECHO, id));
        assert!(!manager.remove_listener(ECHO, id));
        assert!(!manager.has_listeners(ECHO));
    }
}
