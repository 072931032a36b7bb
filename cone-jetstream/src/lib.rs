//! JetStream 事件源
//!
//! 把 NATS JetStream 拉取式消费者适配为 `cone::Source`：
//! - `start`：打开消息流，由后台泵任务写入有界通道；
//! - `next`：最多等待 `poll_interval`，超时返回 `None`，避免消费循环空转；
//! - `stop`：先标记停止再取消泵任务，等待其退出（或截止信号先到），随后把缓冲区里
//!   尚未交给消费循环的消息逐条 nak，交还服务端立即重投；
//! - 泵任务连续出错超过上限、或消费者被删除时，把错误转交 `next`，由消费循环终止。
//!
//! 每条 JetStream 消息对应唯一一个 `Response`，ack/nak 直接映射到 JetStream 的确认协议。
//!
mod error;

pub use error::Error;

use async_nats::HeaderMap;
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::consumer::pull::MessagesErrorKind;
use async_nats::jetstream::{self, AckKind};
use async_trait::async_trait;
use cone::{Acknowledger, ConeError, ConeResult, Delivery, Event, Metadata, Response, Source};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// JetStream 事件源配置
#[derive(Clone, Copy, Debug)]
pub struct JetStreamConfig {
    /// `next` 的最长等待时间
    pub poll_interval: Duration,
    /// 泵任务与消费循环之间的缓冲容量
    pub channel_capacity: usize,
    /// 连续接收错误达到该次数后视为事件源失效
    pub max_consecutive_errors: u32,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            channel_capacity: 64,
            max_consecutive_errors: 10,
        }
    }
}

// 泵任务转交给 `next` 的条目：消息，或使事件源失效的错误
type Fed = Result<jetstream::Message, Error>;

struct Pump {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// 基于 JetStream 拉取消费者的事件源
pub struct JetStreamSource {
    consumer: PullConsumer,
    config: JetStreamConfig,
    pump: Mutex<Option<Pump>>,
    events: Mutex<Option<mpsc::Receiver<Fed>>>,
    stopped: AtomicBool,
}

impl JetStreamSource {
    pub fn new(consumer: PullConsumer) -> Self {
        Self::with_config(consumer, JetStreamConfig::default())
    }

    pub fn with_config(consumer: PullConsumer, config: JetStreamConfig) -> Self {
        Self {
            consumer,
            config,
            pump: Mutex::new(None),
            events: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    async fn run_pump(
        mut messages: async_nats::jetstream::consumer::pull::Stream,
        tx: mpsc::Sender<Fed>,
        token: CancellationToken,
        mut budget: ErrorBudget,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = messages.next() => match next {
                    Some(Ok(message)) => {
                        budget.reset();
                        // 先占位再交付，取消时消息仍在手上，可以交还服务端
                        tokio::select! {
                            biased;
                            permit = tx.reserve() => match permit {
                                Ok(permit) => permit.send(Ok(message)),
                                Err(_) => {
                                    give_back(&message).await;
                                    break;
                                }
                            },
                            _ = token.cancelled() => {
                                give_back(&message).await;
                                break;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "failed to receive jetstream message");
                        if budget.record(err.kind()) {
                            let failed = Error::Receive(err.to_string());
                            tokio::select! {
                                _ = tx.send(Err(failed)) => {}
                                _ = token.cancelled() => {}
                            }
                            break;
                        }
                    }
                    None => {
                        warn!("jetstream message stream ended");
                        break;
                    }
                }
            }
        }
        debug!("jetstream pump exited");
    }
}

/// 连续接收错误计数：消费者被删除立即失效，其余错误累计到上限才失效
#[derive(Debug)]
struct ErrorBudget {
    limit: u32,
    consecutive: u32,
}

impl ErrorBudget {
    fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// 记录一次错误，返回事件源是否已失效
    fn record(&mut self, kind: MessagesErrorKind) -> bool {
        if kind == MessagesErrorKind::ConsumerDeleted {
            return true;
        }
        self.consecutive += 1;
        self.consecutive >= self.limit
    }
}

async fn give_back(message: &jetstream::Message) {
    if let Err(err) = message.ack_with(AckKind::Nak(None)).await {
        warn!(error = %err, "failed to nak undelivered jetstream message");
    }
}

#[async_trait]
impl Source for JetStreamSource {
    async fn start(&self) -> ConeResult<()> {
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Err(Error::AlreadyStarted.into());
        }

        let messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| Error::Messages(e.to_string()))?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let token = CancellationToken::new();
        let budget = ErrorBudget::new(self.config.max_consecutive_errors);
        let task = tokio::spawn(Self::run_pump(messages, tx, token.clone(), budget));

        *self.events.lock().await = Some(rx);
        *pump = Some(Pump { token, task });
        self.stopped.store(false, Ordering::Release);
        info!("jetstream source started");
        Ok(())
    }

    async fn stop(&self, deadline: &CancellationToken) -> ConeResult<()> {
        let Some(Pump { token, mut task }) = self.pump.lock().await.take() else {
            return Err(Error::NotStarted.into());
        };

        // 泵任务退出会关闭通道，先置位，`next` 才能把关闭识别为正常停止
        self.stopped.store(true, Ordering::Release);
        token.cancel();
        tokio::select! {
            _ = &mut task => {}
            _ = deadline.cancelled() => {
                warn!("deadline reached while stopping jetstream pump");
                task.abort();
            }
        }

        let mut returned = 0usize;
        if let Some(rx) = self.events.lock().await.as_mut() {
            rx.close();
            while let Ok(fed) = rx.try_recv() {
                if let Ok(message) = fed {
                    give_back(&message).await;
                    returned += 1;
                }
            }
        }
        info!(returned, "jetstream source stopped");
        Ok(())
    }

    async fn next(&self) -> ConeResult<Option<Delivery>> {
        let mut events = self.events.lock().await;
        let Some(rx) = events.as_mut() else {
            return Err(Error::NotStarted.into());
        };

        match time::timeout(self.config.poll_interval, rx.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Some(Ok(message))) => translate(message).map(Some),
            Ok(Some(Err(err))) => Err(err.into()),
            Ok(None) if self.stopped.load(Ordering::Acquire) => Ok(None),
            Ok(None) => Err(Error::Closed.into()),
        }
    }
}

fn translate(message: jetstream::Message) -> ConeResult<Delivery> {
    let event = to_event(&message.message)?;
    Ok((Response::new(JetStreamAck { message }), event))
}

fn to_event(message: &async_nats::Message) -> ConeResult<Event> {
    let event = Event::new(message.subject.to_string(), message.payload.clone())
        .map_err(|e| ConeError::from(Error::InvalidMessage(e.to_string())))?;
    Ok(event.with_metadata(to_metadata(message.headers.as_ref())))
}

fn to_metadata(headers: Option<&HeaderMap>) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, values) in headers.into_iter().flat_map(HeaderMap::iter) {
        for value in values {
            metadata.add(name.to_string(), value.as_str());
        }
    }
    metadata
}

struct JetStreamAck {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for JetStreamAck {
    async fn ack(&self) -> ConeResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| ConeError::response("ack", e.to_string()))
    }

    async fn nak(&self) -> ConeResult<()> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| ConeError::response("nak", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(subject: &str, headers: Option<HeaderMap>) -> async_nats::Message {
        async_nats::Message {
            subject: subject.into(),
            reply: None,
            payload: "{\"amount\":5}".into(),
            headers,
            status: None,
            description: None,
            length: 0,
        }
    }

    #[test]
    fn default_config_polls_briefly() {
        let config = JetStreamConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert!(config.channel_capacity > 0);
        assert!(config.max_consecutive_errors > 0);
    }

    #[test]
    fn headers_become_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("trace-id", "t-1");
        headers.append("tag", "a");
        headers.append("tag", "b");

        let event = to_event(&message("orders.placed", Some(headers))).unwrap();

        assert_eq!(event.subject(), "orders.placed");
        assert_eq!(event.body().as_ref(), b"{\"amount\":5}");
        assert_eq!(event.metadata().get("trace-id"), "t-1");
        assert_eq!(event.metadata().values("tag"), ["a", "b"]);
        assert_eq!(event.metadata().len(), 2);
    }

    #[test]
    fn message_without_headers_has_empty_metadata() {
        let event = to_event(&message("orders.placed", None)).unwrap();
        assert!(event.metadata().is_empty());
    }

    #[test]
    fn empty_subject_is_invalid_message() {
        let err = to_event(&message("", None)).unwrap_err();
        assert!(err.to_string().contains("invalid message"));
    }

    #[test]
    fn transient_errors_fail_only_after_limit() {
        let mut budget = ErrorBudget::new(3);
        assert!(!budget.record(MessagesErrorKind::MissingHeartbeat));
        assert!(!budget.record(MessagesErrorKind::Pull));

        budget.reset();
        assert!(!budget.record(MessagesErrorKind::MissingHeartbeat));
        assert!(!budget.record(MessagesErrorKind::MissingHeartbeat));
        assert!(budget.record(MessagesErrorKind::MissingHeartbeat));
    }

    #[test]
    fn deleted_consumer_fails_immediately() {
        let mut budget = ErrorBudget::new(10);
        assert!(budget.record(MessagesErrorKind::ConsumerDeleted));
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let mut budget = ErrorBudget::new(0);
        assert!(budget.record(MessagesErrorKind::Other));
    }
}
