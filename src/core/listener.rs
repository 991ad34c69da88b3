//! Listener traits for the event bus.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Handles events delivered by an [`EventManager`](crate::core::EventManager).
///
/// A listener answers by completing the event (synchronously, or after
/// calling `defer()` on it and replying from another task). Returning an
/// error records a fault on the event; it does not stop delivery.
#[async_trait]
pub trait Listener<E>: Send + Sync {
    async fn handle_request(&self, event: &E) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`Listener`].
///
/// The closure receives its own clone of the event handle.
pub struct FnListener<E, F> {
    f: F,
    _phantom: PhantomData<fn(E)>,
}

#[async_trait]
impl<E, F, Fut> Listener<E> for FnListener<E, F>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle_request(&self, event: &E) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// Build a shared listener from an async closure.
///
/// ```ignore
/// let listener = listener_fn(|call: RpcCall| async move {
///     call.reply(json!({"msg": "pong"}));
///     Ok(())
/// });
/// ```
pub fn listener_fn<E, F, Fut>(f: F) -> Arc<dyn Listener<E>>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnListener {
        f,
        _phantom: PhantomData,
    })
}
