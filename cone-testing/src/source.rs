use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cone::{Acknowledger, ConeError, ConeResult, Delivery, Event, Response, Source};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// 已应答的事件
#[derive(Debug, Clone)]
pub struct Settled {
    pub id: u64,
    pub event: Event,
    pub at: DateTime<Utc>,
}

struct Entry {
    id: u64,
    event: Event,
    processing: bool,
}

#[derive(Default)]
struct SourceState {
    next_id: u64,
    queue: Vec<Entry>,
    acked: Vec<Settled>,
    naked: Vec<Settled>,
    redeliver_naked: bool,
    started: bool,
    stopped: bool,
    fail_start: Option<String>,
    fail_next: Option<String>,
    fail_stop: Option<String>,
}

/// 内存事件源
///
/// - `next` 返回第一条未在处理中的事件，队列为空时立即返回 `None`；
/// - ack 将事件移出队列；nak 默认同样移出，开启 `redeliver_naked` 后放回队列等待重投；
/// - `fail_*` 系列用于注入一次性故障。
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// nak 后把事件放回队列
    pub fn redeliver_naked(self) -> Self {
        self.state().redeliver_naked = true;
        self
    }

    /// 入队一条事件，返回其编号
    pub fn add_event(&self, event: Event) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.queue.push(Entry {
            id,
            event,
            processing: false,
        });
        id
    }

    /// 队列中尚未应答的事件数（含处理中）
    pub fn pending(&self) -> usize {
        self.state().queue.len()
    }

    pub fn num_acked(&self) -> usize {
        self.state().acked.len()
    }

    pub fn num_naked(&self) -> usize {
        self.state().naked.len()
    }

    pub fn acked(&self) -> Vec<Settled> {
        self.state().acked.clone()
    }

    pub fn naked(&self) -> Vec<Settled> {
        self.state().naked.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    pub fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    pub fn fail_start(&self, reason: impl Into<String>) {
        self.state().fail_start = Some(reason.into());
    }

    pub fn fail_next(&self, reason: impl Into<String>) {
        self.state().fail_next = Some(reason.into());
    }

    pub fn fail_stop(&self, reason: impl Into<String>) {
        self.state().fail_stop = Some(reason.into());
    }

    fn settle(&self, id: u64, acked: bool) -> ConeResult<()> {
        let mut state = self.state();
        let Some(pos) = state.queue.iter().position(|e| e.id == id) else {
            return Err(ConeError::response(
                if acked { "ack" } else { "nak" },
                format!("unknown event id {id}"),
            ));
        };

        if !acked && state.redeliver_naked {
            let entry = &mut state.queue[pos];
            entry.processing = false;
            let settled = Settled {
                id,
                event: entry.event.clone(),
                at: Utc::now(),
            };
            state.naked.push(settled);
            return Ok(());
        }

        let entry = state.queue.remove(pos);
        let settled = Settled {
            id,
            event: entry.event,
            at: Utc::now(),
        };
        if acked {
            state.acked.push(settled);
        } else {
            state.naked.push(settled);
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn start(&self) -> ConeResult<()> {
        let mut state = self.state();
        if let Some(reason) = state.fail_start.take() {
            return Err(ConeError::source_error(reason));
        }
        state.started = true;
        Ok(())
    }

    async fn stop(&self, _deadline: &CancellationToken) -> ConeResult<()> {
        let mut state = self.state();
        if let Some(reason) = state.fail_stop.take() {
            return Err(ConeError::source_error(reason));
        }
        state.stopped = true;
        Ok(())
    }

    async fn next(&self) -> ConeResult<Option<Delivery>> {
        let mut state = self.state();
        if let Some(reason) = state.fail_next.take() {
            return Err(ConeError::source_error(reason));
        }

        let Some(entry) = state.queue.iter_mut().find(|e| !e.processing) else {
            return Ok(None);
        };
        entry.processing = true;

        let response = Response::new(MemoryAck {
            source: self.clone(),
            id: entry.id,
        });
        Ok(Some((response, entry.event.clone())))
    }
}

struct MemoryAck {
    source: MemorySource,
    id: u64,
}

#[async_trait]
impl Acknowledger for MemoryAck {
    async fn ack(&self) -> ConeResult<()> {
        self.source.settle(self.id, true)
    }

    async fn nak(&self) -> ConeResult<()> {
        self.source.settle(self.id, false)
    }
}
