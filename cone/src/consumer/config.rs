use std::time::Duration;

/// 消费者配置
#[derive(Clone, Copy, Debug)]
pub struct ConsumerConfig {
    /// 事件源暂时无事件时的等待间隔；为零时仅让出调度，立即再次拉取。
    /// 事件源自身的等待策略优先，这里只用于防止空转占满执行线程。
    pub idle_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::ZERO,
        }
    }
}
