use super::Handler;
use crate::event::Event;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// 由异步函数构成的处理器
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// 把 `Fn(Response, Event) -> impl Future<Output = ()>` 适配为 `Handler`
///
/// ```rust
/// use cone::handler::handler_fn;
///
/// let handler = handler_fn(|response, _event| async move {
///     let _ = response.ack().await;
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Response, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Response, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn serve(&self, response: Response, event: Event) {
        (self.f)(response, event).await
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}
