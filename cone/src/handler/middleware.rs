//! 中间件（Middleware）
//!
//! 中间件就是 `Handler -> Handler` 的变换：在调用被包装处理器的 `serve` 前后做额外工作。
//! 组合即函数组合，顺序由调用方的嵌套顺序决定；`Chain` 只是一个书写上更顺手的小构建器。
//!
use super::{BoxHandler, Handler};
use crate::event::Event;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, debug_span};

/// 处理器变换
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxHandler) -> BoxHandler + Send + Sync,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        self(next)
    }
}

/// 中间件链：后添加的层位于最外侧
///
/// ```rust
/// use cone::handler::{Chain, HandlerMux, middleware};
///
/// let mux = HandlerMux::new();
/// let handler = Chain::new(mux)
///     .layer(middleware::filter_subjects(|s: &str| s.starts_with("orders.")))
///     .layer(middleware::trace_events())
///     .build();
/// # let _ = handler;
/// ```
pub struct Chain {
    handler: BoxHandler,
}

impl Chain {
    pub fn new(handler: impl Handler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn layer(self, middleware: impl Middleware) -> Self {
        Self {
            handler: middleware.wrap(self.handler),
        }
    }

    pub fn build(self) -> BoxHandler {
        self.handler
    }
}

/// 只把主题满足 `predicate` 的事件交给下游；被过滤的事件不作任何应答
pub fn filter_subjects<P>(predicate: P) -> impl Middleware
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    move |next: BoxHandler| -> BoxHandler {
        Arc::new(FilterSubjects {
            predicate: predicate.clone(),
            next,
        })
    }
}

struct FilterSubjects<P> {
    predicate: Arc<P>,
    next: BoxHandler,
}

#[async_trait]
impl<P> Handler for FilterSubjects<P>
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    async fn serve(&self, response: Response, event: Event) {
        if !(self.predicate)(event.subject()) {
            debug!(subject = event.subject(), "event filtered out");
            return;
        }
        self.next.serve(response, event).await
    }
}

/// 为每次分发创建 `tracing` span，并记录应答结果与耗时
pub fn trace_events() -> impl Middleware {
    |next: BoxHandler| -> BoxHandler { Arc::new(TraceEvents { next }) }
}

struct TraceEvents {
    next: BoxHandler,
}

#[async_trait]
impl Handler for TraceEvents {
    async fn serve(&self, response: Response, event: Event) {
        let span = debug_span!("event", subject = event.subject(), size = event.body().len());
        let started = Instant::now();
        let observed = response.clone();

        self.next.serve(response, event).instrument(span.clone()).await;

        span.in_scope(|| {
            debug!(
                state = ?observed.state(),
                failed = observed.failed(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "event served"
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConeResult;
    use crate::handler::handler_fn;
    use crate::response::{Acknowledger, ResponseState};
    use bytes::Bytes;
    use std::sync::Mutex;

    struct NoopAck;

    #[async_trait]
    impl Acknowledger for NoopAck {
        async fn ack(&self) -> ConeResult<()> {
            Ok(())
        }

        async fn nak(&self) -> ConeResult<()> {
            Ok(())
        }
    }

    fn acking() -> BoxHandler {
        Arc::new(handler_fn(|r: Response, _e| async move {
            let _ = r.ack().await;
        }))
    }

    fn event(subject: &str) -> Event {
        Event::new(subject, Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn filtered_event_gets_no_response() {
        let handler = filter_subjects(|s: &str| s == "valid").wrap(acking());
        let response = Response::new(NoopAck);

        handler.serve(response.clone(), event("event.subject")).await;

        assert_eq!(response.state(), ResponseState::Pending);
    }

    #[tokio::test]
    async fn accepted_event_reaches_handler() {
        let handler = filter_subjects(|s: &str| s == "valid").wrap(acking());
        let response = Response::new(NoopAck);

        handler.serve(response.clone(), event("valid")).await;

        assert_eq!(response.state(), ResponseState::Acked);
    }

    #[tokio::test]
    async fn closures_compose_in_nesting_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let tag = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
            move |next: BoxHandler| -> BoxHandler {
                let order = order.clone();
                Arc::new(handler_fn(move |r, e| {
                    let next = next.clone();
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(name);
                        next.serve(r, e).await;
                    }
                }))
            }
        };

        let handler = Chain::new(acking())
            .layer(tag("inner", order.clone()))
            .layer(tag("outer", order.clone()))
            .layer(trace_events())
            .build();

        let response = Response::new(NoopAck);
        handler.serve(response.clone(), event("any")).await;

        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(response.state(), ResponseState::Acked);
    }
}
