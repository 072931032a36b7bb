//! 事件处理器（Handler）
//!
//! - `Handler`：唯一能力 `serve(response, event)`，没有返回值，完成情况只通过
//!   `Response` 的 ack/nak 表达；
//! - `HandlerFn`：把普通异步函数适配成 `Handler`；
//! - `HandlerMux`：按主题路由到子处理器，并负责默认的 ack/nak 策略；
//! - `middleware`：`Handler -> Handler` 的变换与组合，位于处理器之外。
//!
mod handler_fn;
pub mod middleware;
mod mux;

pub use handler_fn::{HandlerFn, handler_fn};
pub use middleware::{Chain, Middleware};
pub use mux::HandlerMux;

use crate::event::Event;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// 共享的类型擦除处理器
pub type BoxHandler = Arc<dyn Handler>;

/// 事件处理器：处理一条事件及其应答
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, response: Response, event: Event);
}

#[async_trait]
impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    async fn serve(&self, response: Response, event: Event) {
        (**self).serve(response, event).await
    }
}
