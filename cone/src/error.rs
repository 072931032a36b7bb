//! 统一错误定义
//!
//! 覆盖配置、运行生命周期、事件源、应答（ack/nak）与关闭等待几类错误，
//! 调用方按 `ErrorKind` 或变体匹配判断，而不是比较某个全局哨兵值。
//!
use std::time::Duration;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConeError {
    // --- 配置 ---
    #[error("empty subject is not allowed")]
    EmptySubject,
    #[error("source is not configured")]
    MissingSource,
    #[error("handler is not configured")]
    MissingHandler,

    // --- 生命周期 ---
    #[error("consumer is already running")]
    AlreadyRunning,
    #[error("consumer is not running")]
    NotRunning,
    #[error("consumer stopped")]
    Stopped,

    // --- 事件源 ---
    #[error("source error: {reason}")]
    Source { reason: String },
    #[error("failed to start source: {reason}")]
    SourceStart { reason: String },
    #[error("failed to stop source: {reason}")]
    SourceStop { reason: String },

    // --- 应答 ---
    #[error("response error: action={action}, reason={reason}")]
    Response {
        action: &'static str,
        reason: String,
    },

    // --- 关闭等待 ---
    #[error("shutdown cancelled before in-flight events completed")]
    ShutdownCancelled,
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 启动前即可发现的编程/配置错误，不应重试
    Configuration,
    /// 运行状态不允许该操作
    Lifecycle,
    /// 事件源传输失败
    Source,
    /// 底层 ack/nak 调用失败
    Response,
    /// 关闭等待被取消或超时
    Shutdown,
    /// 载荷编解码失败
    Serialization,
}

impl ConeError {
    pub fn source_error(reason: impl Into<String>) -> Self {
        Self::Source {
            reason: reason.into(),
        }
    }

    pub fn response(action: &'static str, reason: impl Into<String>) -> Self {
        Self::Response {
            action,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptySubject | Self::MissingSource | Self::MissingHandler => {
                ErrorKind::Configuration
            }
            Self::AlreadyRunning | Self::NotRunning | Self::Stopped => ErrorKind::Lifecycle,
            Self::Source { .. } | Self::SourceStart { .. } | Self::SourceStop { .. } => {
                ErrorKind::Source
            }
            Self::Response { .. } => ErrorKind::Response,
            Self::ShutdownCancelled | Self::ShutdownTimeout { .. } => ErrorKind::Shutdown,
            Self::Serde { .. } => ErrorKind::Serialization,
        }
    }

    /// 是否为消费循环正常停止的结果
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// 统一 Result 类型别名
pub type ConeResult<T> = Result<T, ConeError>;
