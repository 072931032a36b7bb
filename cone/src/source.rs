//! 事件源（Source）协议
//!
//! 拉取式地提供 `(Response, Event)` 对，应答与事件总是成对原子地产生。
//! 具体传输（如 JetStream）在独立的适配 crate 中实现。
//!
use crate::error::ConeResult;
use crate::event::Event;
use crate::response::Response;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 一次拉取的结果
pub type Delivery = (Response, Event);

/// 事件源
#[async_trait]
pub trait Source: Send + Sync {
    /// 开始产出事件，在拉取循环开始前调用一次
    async fn start(&self) -> ConeResult<()>;

    /// 停止产出并释放资源，可能与 `start`/`next` 位于不同任务；
    /// `deadline` 被取消后应尽快返回
    async fn stop(&self, deadline: &CancellationToken) -> ConeResult<()>;

    /// 拉取下一条事件
    ///
    /// - `Ok(None)`：暂时没有事件，调用方应再次拉取；
    /// - `Err(_)`：不可恢复的事件源错误，会终止拉取循环。
    ///
    /// 实现应只做短暂阻塞，并自行决定空闲时的等待间隔。
    async fn next(&self) -> ConeResult<Option<Delivery>>;
}
