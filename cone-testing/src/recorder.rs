use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cone::{Acknowledger, ConeError, ConeResult, Response};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 底层应答动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Nak,
}

impl Outcome {
    fn action(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Nak => "nak",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// 一次底层调用记录
#[derive(Debug, Clone)]
pub struct Recorded {
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderState {
    calls: Vec<Recorded>,
    fail: Option<String>,
}

/// 记录型应答替身
///
/// 作为 `Acknowledger` 记录每一次真实动作；通过 `response()` 得到带幂等保证的 `Response`，
/// 因此 `calls()` 可以直接用来断言“只发生了一次底层动作”。
#[derive(Clone, Default)]
pub struct ResponseRecorder {
    inner: Arc<Mutex<RecorderState>>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次底层动作都会返回错误（仍会被记录）
    pub fn failing(reason: impl Into<String>) -> Self {
        let recorder = Self::default();
        recorder.state().fail = Some(reason.into());
        recorder
    }

    pub fn response(&self) -> Response {
        Response::new(self.clone())
    }

    /// 第一次底层动作
    pub fn result(&self) -> Option<Outcome> {
        self.state().calls.first().map(|r| r.outcome)
    }

    /// 底层动作次数
    pub fn calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn history(&self) -> Vec<Recorded> {
        self.state().calls.clone()
    }

    fn record(&self, outcome: Outcome) -> ConeResult<()> {
        let mut state = self.state();
        state.calls.push(Recorded {
            outcome,
            at: Utc::now(),
        });

        match &state.fail {
            Some(reason) => Err(ConeError::response(outcome.action(), reason.clone())),
            None => Ok(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Acknowledger for ResponseRecorder {
    async fn ack(&self) -> ConeResult<()> {
        self.record(Outcome::Ack)
    }

    async fn nak(&self) -> ConeResult<()> {
        self.record(Outcome::Nak)
    }
}
