//! Call events: the correlation unit shared by callers and handlers.
//!
//! A [`CallEvent`] pairs one request with at most one response. Handles are
//! cheap clones of the same shared state, so a handler can keep a clone and
//! reply later from another task.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Statically known kind of a call or event.
///
/// The short name uses `$` as the nesting separator (`Outer$Inner`); it is
/// the input of the method name codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    short_name: &'static str,
}

impl Identity {
    pub const fn new(short_name: &'static str) -> Self {
        Self { short_name }
    }

    pub fn short_name(&self) -> &'static str {
        self.short_name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name)
    }
}

/// An execution fault recorded while a handler processed an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub message: String,
    pub details: Option<String>,
}

impl Fault {
    pub fn new(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        // `{:?}` renders the whole cause chain
        let details = format!("{:?}", error);
        Self {
            message: error.to_string(),
            details: Some(details),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the event bus needs to know about the events it delivers.
pub trait Exchange: Clone + Send + Sync + 'static {
    fn identity(&self) -> Identity;
    fn has_response(&self) -> bool;
    fn is_deferred(&self) -> bool;
    fn record_error(&self, fault: Fault);
}

type Continuation<R> = Box<dyn FnOnce(R) + Send>;

struct State<Q, R> {
    request: Q,
    response: Option<R>,
    errors: Vec<Fault>,
    deferred: bool,
    continuations: Vec<Continuation<R>>,
}

struct Inner<Q, R> {
    identity: Identity,
    remote: AtomicBool,
    state: Mutex<State<Q, R>>,
}

/// A request/response exchange delivered through the event bus.
pub struct CallEvent<Q, R> {
    inner: Arc<Inner<Q, R>>,
}

impl<Q, R> Clone for CallEvent<Q, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Q, R> CallEvent<Q, R>
where
    Q: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Create a new, unanswered event.
    pub fn new(identity: Identity, request: Q) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                remote: AtomicBool::new(false),
                state: Mutex::new(State {
                    request,
                    response: None,
                    errors: Vec::new(),
                    deferred: false,
                    continuations: Vec::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<Q, R>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn identity(&self) -> Identity {
        self.inner.identity
    }

    /// A snapshot of the request.
    pub fn request(&self) -> Q {
        self.lock().request.clone()
    }

    /// Mutate the request in place.
    pub fn update_request<F>(&self, update: F)
    where
        F: FnOnce(&mut Q),
    {
        update(&mut self.lock().request);
    }

    pub fn response(&self) -> Option<R> {
        self.lock().response.clone()
    }

    pub fn has_response(&self) -> bool {
        self.lock().response.is_some()
    }

    /// True when this event arrived from the remote peer.
    pub fn is_remote(&self) -> bool {
        self.inner.remote.load(Ordering::Acquire)
    }

    /// Flag the event as received from the peer. The flag is never cleared.
    pub fn mark_remote(&self) {
        self.inner.remote.store(true, Ordering::Release);
    }

    /// Promise a reply that will be produced later, outside the current
    /// handler invocation.
    pub fn defer(&self) {
        self.lock().deferred = true;
    }

    pub fn is_deferred(&self) -> bool {
        self.lock().deferred
    }

    pub fn record_error(&self, fault: Fault) {
        log::debug!("{}: handler fault recorded: {}", self.identity(), fault);
        self.lock().errors.push(fault);
    }

    pub fn errors(&self) -> Vec<Fault> {
        self.lock().errors.clone()
    }

    pub fn has_errors(&self) -> bool {
        !self.lock().errors.is_empty()
    }

    /// Complete the event with its response.
    ///
    /// Returns `false` when the event was already completed; the new response
    /// is discarded in that case.
    pub fn complete(&self, response: R) -> bool {
        let continuations = {
            let mut state = self.lock();
            if state.response.is_some() {
                log::warn!("{}: ignoring second completion", self.identity());
                return false;
            }
            state.response = Some(response.clone());
            std::mem::take(&mut state.continuations)
        };

        for continuation in continuations {
            continuation(response.clone());
        }
        true
    }

    /// Run `continuation` with the response once the event completes.
    /// Runs immediately when the event is already complete.
    pub fn on_complete<F>(&self, continuation: F)
    where
        F: FnOnce(R) + Send + 'static,
    {
        let ready = {
            let mut state = self.lock();
            match &state.response {
                Some(response) => Some(response.clone()),
                None => {
                    state.continuations.push(Box::new(continuation));
                    return;
                }
            }
        };

        if let Some(response) = ready {
            continuation(response);
        }
    }

    /// Wait for the response.
    ///
    /// Returns `None` only if every handle to the event is dropped before
    /// it completes.
    pub async fn wait(&self) -> Option<R> {
        let (tx, rx) = oneshot::channel();
        self.on_complete(move |response| {
            let _ = tx.send(response);
        });
        rx.await.ok()
    }

    /// True when both handles point at the same event.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<Q, R> Exchange for CallEvent<Q, R>
where
    Q: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    fn identity(&self) -> Identity {
        CallEvent::identity(self)
    }

    fn has_response(&self) -> bool {
        CallEvent::has_response(self)
    }

    fn is_deferred(&self) -> bool {
        CallEvent::is_deferred(self)
    }

    fn record_error(&self, fault: Fault) {
        CallEvent::record_error(self, fault)
    }
}

impl<Q: fmt::Debug, R: fmt::Debug> fmt::Debug for CallEvent<Q, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f.debug_struct("CallEvent")
            .field("identity", &self.inner.identity)
            .field("remote", &self.inner.remote.load(Ordering::Acquire))
            .field("request", &state.request)
            .field("response", &state.response)
            .field("errors", &state.errors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const PING: Identity = Identity::new("Ping");

    #[test]
    fn test_complete_only_once() {
        let event: CallEvent<String, String> = CallEvent::new(PING, "hello".to_string());

        assert!(!event.has_response());
        assert!(event.complete("first".to_string()));
        assert!(!event.complete("second".to_string()));
        assert_eq!(event.response(), Some("first".to_string()));
    }

    #[test]
    fn test_continuations_run_on_completion() {
        let event: CallEvent<(), u32> = CallEvent::new(PING, ());
        let calls = Arc::new(AtomicUsize::new(0));

        let before = calls.clone();
        event.on_complete(move |value| {
            assert_eq!(value, 7);
            before.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        event.complete(7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 完了後に登録された継続は即座に実行される
        let after = calls.clone();
        event.on_complete(move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remote_flag_and_shared_state() {
        let event: CallEvent<(), ()> = CallEvent::new(PING, ());
        let clone = event.clone();

        assert!(!event.is_remote());
        clone.mark_remote();
        assert!(event.is_remote());
        assert!(event.same_as(&clone));
    }

    #[test]
    fn test_fault_from_anyhow_keeps_chain() {
        let error = anyhow::anyhow!("disk full").context("saving profile");
        let fault = Fault::from(error);

        assert_eq!(fault.message, "saving profile");
        let details = fault.details.unwrap();
        assert!(details.contains("disk full"));
    }

    #[tokio::test]
    async fn test_wait_resolves_from_other_task() {
        let event: CallEvent<(), String> = CallEvent::new(PING, ());
        event.defer();

        let responder = event.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            responder.complete("pong".to_string());
        });

        assert!(event.is_deferred());
        assert_eq!(event.wait().await, Some("pong".to_string()));
    }
}
