//! 应答（Response）
//!
//! 每条事件对应一个应答能力：`ack` 表示处理成功，`nak` 表示失败/拒绝。
//! 底层传输动作由 `Acknowledger` 提供（不要求幂等），`Response` 在其之上保证
//! “至多一次”：首次调用执行真实动作并记录结果，之后对任一方法的调用都是返回成功的空操作。
//! 这样处理器与框架的默认 ack 策略可以安全地“抢答”。
//!
use crate::error::ConeResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// 传输层应答动作，由具体事件源实现
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> ConeResult<()>;

    async fn nak(&self) -> ConeResult<()>;
}

/// 应答状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Pending,
    Acked,
    Naked,
}

const PENDING: u8 = 0;
const ACKED: u8 = 1;
const NAKED: u8 = 2;

/// 幂等应答句柄，克隆后共享同一个应答标记
#[derive(Clone)]
pub struct Response {
    inner: Arc<ResponseInner>,
}

struct ResponseInner {
    acknowledger: Box<dyn Acknowledger>,
    state: AtomicU8,
    failed: AtomicBool,
}

impl Response {
    pub fn new(acknowledger: impl Acknowledger + 'static) -> Self {
        Self {
            inner: Arc::new(ResponseInner {
                acknowledger: Box::new(acknowledger),
                state: AtomicU8::new(PENDING),
                failed: AtomicBool::new(false),
            }),
        }
    }

    pub async fn ack(&self) -> ConeResult<()> {
        self.respond(ACKED).await
    }

    pub async fn nak(&self) -> ConeResult<()> {
        self.respond(NAKED).await
    }

    pub fn state(&self) -> ResponseState {
        match self.inner.state.load(Ordering::Acquire) {
            ACKED => ResponseState::Acked,
            NAKED => ResponseState::Naked,
            _ => ResponseState::Pending,
        }
    }

    pub fn is_responded(&self) -> bool {
        self.state() != ResponseState::Pending
    }

    /// 唯一一次底层应答动作是否失败
    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    async fn respond(&self, target: u8) -> ConeResult<()> {
        // 先抢占标记再执行动作，保证并发调用下也只有一次真实动作
        if self
            .inner
            .state
            .compare_exchange(PENDING, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let result = match target {
            ACKED => self.inner.acknowledger.ack().await,
            _ => self.inner.acknowledger.nak().await,
        };

        if result.is_err() {
            self.inner.failed.store(true, Ordering::Release);
        }
        result
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("state", &self.state())
            .field("failed", &self.failed())
            .finish()
    }
}
