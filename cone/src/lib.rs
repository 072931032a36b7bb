//! 事件消费框架（cone）
//!
//! 从外部队列/流中拉取可应答的事件，按主题分发给处理器：
//! - 事件（`event`）：不可变主题 + 不透明载荷 + 多值元数据；
//! - 应答（`response`）：每条事件至多一次 ack/nak，重复调用为空操作；
//! - 处理器（`handler`）：函数即处理器、按主题路由的 `HandlerMux` 与中间件组合；
//! - 事件源（`source`）：拉取式协议，具体传输在独立 crate 中适配；
//! - 消费者（`consumer`）：拉取循环、并发分发、在途追踪与优雅关闭。
//!
//! 典型用法：
//! 1. 用 `HandlerMux` 注册主题与处理器，按需叠加中间件；
//! 2. 选择一个 `Source` 实现（例如 JetStream 适配器）；
//! 3. 构建 `Consumer` 并在独立任务中 `run`；
//! 4. 退出时调用 `shutdown`，等待在途事件处理完毕。
//!
pub mod consumer;
pub mod error;
pub mod event;
pub mod handler;
pub mod response;
pub mod source;

pub use consumer::{Consumer, ConsumerConfig, ConsumerState};
pub use error::{ConeError, ConeResult, ErrorKind};
pub use event::{Event, Metadata};
pub use handler::{BoxHandler, Handler, HandlerFn, HandlerMux, handler_fn};
pub use response::{Acknowledger, Response, ResponseState};
pub use source::{Delivery, Source};
