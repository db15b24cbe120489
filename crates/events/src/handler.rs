use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Event;

/// Outcome of a single handler invocation.
pub type HandlerResult = anyhow::Result<()>;

/// Something that can process one event and may fail.
///
/// Handlers are invoked by the bus's dispatch tasks, possibly concurrently for
/// different events. Retry is not the handler's concern: the bus wraps every
/// handler in a [`RetryingHandler`](crate::RetryingHandler) configured from the
/// subscription's retry policy.
///
/// Delivery is at-least-once from the handler's point of view (a failed
/// attempt is retried with the same event), so handlers should be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> HandlerResult;
}

#[async_trait]
impl<H> EventHandler for Arc<H>
where
    H: EventHandler + ?Sized,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (**self).handle(event).await
    }
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> core::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// Build a handler from a closure taking the event by value.
///
/// ```ignore
/// let handler = handler_fn(|event: Event| async move {
///     tracing::info!(event_id = %event.id(), "seen");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> EventHandler for HandlerFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.f)(event.clone()).await
    }
}
