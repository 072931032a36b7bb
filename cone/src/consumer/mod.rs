//! 消费者（Consumer）
//!
//! 编排“拉取 → 并发分发 → 优雅关闭”的长驻循环：
//! - `run`：单一循环轮询事件源，每条事件交给独立任务执行处理器；
//! - `shutdown`：停止事件源、通知循环退出，并等待在途处理完成或截止信号先到；
//! - 状态机：`Idle → Running → ShuttingDown → Stopped`，关闭标记只会单调置位。
//!
mod config;

pub use config::ConsumerConfig;

use crate::error::{ConeError, ConeResult};
use crate::event::Event;
use crate::handler::{BoxHandler, Handler};
use crate::response::Response;
use crate::source::Source;
use bon::Builder;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, error, info, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::consumer_builder::{IsUnset, SetHandler, State as BuilderState};

/// 消费者运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// Consumer：
/// - 从 Source 拉取 `(Response, Event)`，交给 Handler 并发处理
/// - 同一实例同时只允许一个拉取循环
#[derive(Builder)]
pub struct Consumer {
    source: Option<Arc<dyn Source>>,
    handler: Option<BoxHandler>,
    #[builder(default)]
    config: ConsumerConfig,
    #[builder(skip)]
    running: AtomicBool,
    #[builder(skip)]
    shutting_down: AtomicBool,
    #[builder(skip)]
    in_flight: Arc<AtomicUsize>,
    #[builder(skip)]
    tracker: TaskTracker,
}

impl<S: BuilderState> ConsumerBuilder<S> {
    /// 以具体处理器类型设置 handler，省去手动 `Arc` 包装
    pub fn handle_with(self, handler: impl Handler + 'static) -> ConsumerBuilder<SetHandler<S>>
    where
        <S as BuilderState>::Handler: IsUnset,
    {
        self.handler(Arc::new(handler))
    }
}

impl Consumer {
    pub fn new(source: impl Source + 'static, handler: impl Handler + 'static) -> Self {
        Self::builder()
            .source(Arc::new(source))
            .handler(Arc::new(handler))
            .build()
    }

    /// 运行拉取循环，直到关闭或事件源出错
    ///
    /// 正常关闭时返回 `ConeError::Stopped`；事件源错误原样返回。
    pub async fn run(&self) -> ConeResult<()> {
        // 循环本身计入在途追踪，关闭等待因此覆盖到循环的最后一次分发
        let _loop_token = self.tracker.token();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConeError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let source = self.source.clone().ok_or(ConeError::MissingSource)?;
        let handler = self.handler.clone().ok_or(ConeError::MissingHandler)?;

        if self.shutting_down.load(Ordering::Acquire) {
            return Err(ConeError::Stopped);
        }

        source
            .start()
            .await
            .map_err(|err| ConeError::SourceStart {
                reason: err.to_string(),
            })?;
        info!("consumer started");

        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                info!("consumer loop stopped");
                return Err(ConeError::Stopped);
            }

            match source.next().await {
                Ok(Some((response, event))) => self.dispatch(&handler, response, event),
                Ok(None) => self.idle().await,
                Err(err) => {
                    error!(error = %err, "source failed, consumer loop terminated");
                    return Err(err);
                }
            }
        }
    }

    /// 关闭：停止事件源并等待在途处理完成，`deadline` 被取消时提前返回
    ///
    /// 截止后返回 `ShutdownCancelled`，在途处理仍会在后台跑完，不会被强行中断。
    pub async fn shutdown(&self, deadline: CancellationToken) -> ConeResult<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(ConeError::NotRunning);
        }

        let source = self.source.as_ref().ok_or(ConeError::MissingSource)?;
        source
            .stop(&deadline)
            .await
            .map_err(|err| ConeError::SourceStop {
                reason: err.to_string(),
            })?;

        self.shutting_down.store(true, Ordering::Release);
        self.tracker.close();
        info!(in_flight = self.in_flight(), "consumer shutting down");

        tokio::select! {
            biased;
            _ = self.tracker.wait() => {
                info!("consumer drained");
                Ok(())
            }
            _ = deadline.cancelled() => {
                warn!(in_flight = self.in_flight(), "shutdown deadline reached before in-flight events completed");
                Err(ConeError::ShutdownCancelled)
            }
        }
    }

    /// 以超时时长关闭，超时返回 `ShutdownTimeout`
    pub async fn shutdown_timeout(&self, timeout: Duration) -> ConeResult<()> {
        let deadline = CancellationToken::new();
        let timer = tokio::spawn({
            let deadline = deadline.clone();
            async move {
                time::sleep(timeout).await;
                deadline.cancel();
            }
        });

        let result = self.shutdown(deadline).await;
        timer.abort();

        result.map_err(|err| match err {
            ConeError::ShutdownCancelled => ConeError::ShutdownTimeout { timeout },
            other => other,
        })
    }

    /// 已分发但尚未完成的处理数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConsumerState {
        let running = self.running.load(Ordering::Acquire);
        let shutting_down = self.shutting_down.load(Ordering::Acquire);

        match (running, shutting_down) {
            (false, false) => ConsumerState::Idle,
            (true, false) => ConsumerState::Running,
            (true, true) => ConsumerState::ShuttingDown,
            (false, true) if self.in_flight() > 0 => ConsumerState::ShuttingDown,
            (false, true) => ConsumerState::Stopped,
        }
    }

    fn dispatch(&self, handler: &BoxHandler, response: Response, event: Event) {
        let handler = handler.clone();
        let in_flight = InFlight::enter(&self.in_flight);
        let span = debug_span!("dispatch", subject = event.subject());

        self.tracker.spawn(
            async move {
                let _in_flight = in_flight;
                let fallback = response.clone();

                // 处理器 panic 不能拖垮循环：记录后 nak，交由事件源重投
                let served = AssertUnwindSafe(handler.serve(response, event))
                    .catch_unwind()
                    .await;
                if served.is_err() {
                    error!("handler panicked, naking event");
                    if let Err(err) = fallback.nak().await {
                        warn!(error = %err, "failed to nak event after handler panic");
                    }
                } else {
                    debug!(state = ?fallback.state(), "event handled");
                }
            }
            .instrument(span),
        );
    }

    async fn idle(&self) {
        if self.config.idle_backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            time::sleep(self.config.idle_backoff).await;
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
