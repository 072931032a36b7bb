use super::{BoxHandler, Handler, handler_fn};
use crate::error::{ConeError, ConeResult};
use crate::event::Event;
use crate::response::Response;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// 按主题路由的处理器
///
/// - 命中：调用注册的处理器，返回后再 `ack`（处理器已应答时为空操作）；
/// - 未命中：默认 `nak`，开启 `ack_unknown_subjects` 后改为 `ack`；
/// - 同一主题重复注册时后者覆盖前者；
/// - 注册需要 `&mut self`，交给 `Consumer` 共享后路由表即被冻结。
#[derive(Clone, Default)]
pub struct HandlerMux {
    // None 表示“主题已识别，无需处理”，与“未识别”不同
    handlers: HashMap<String, Option<BoxHandler>>,
    ack_unknown_subjects: bool,
}

impl HandlerMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器
    pub fn handle<H>(&mut self, subject: impl Into<String>, handler: H) -> ConeResult<&mut Self>
    where
        H: Handler + 'static,
    {
        self.register(subject.into(), Some(Arc::new(handler)))?;
        Ok(self)
    }

    /// 以异步函数注册处理器
    pub fn handle_fn<F, Fut>(&mut self, subject: impl Into<String>, f: F) -> ConeResult<&mut Self>
    where
        F: Fn(Response, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle(subject, handler_fn(f))
    }

    /// 识别该主题但不做任何处理（事件会被 ack）
    pub fn ignore(&mut self, subject: impl Into<String>) -> ConeResult<&mut Self> {
        self.register(subject.into(), None)?;
        Ok(self)
    }

    /// 未注册主题是否按成功处理
    pub fn ack_unknown_subjects(&mut self, enabled: bool) -> &mut Self {
        self.ack_unknown_subjects = enabled;
        self
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.handlers.contains_key(subject)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn register(&mut self, subject: String, handler: Option<BoxHandler>) -> ConeResult<()> {
        if subject.is_empty() {
            return Err(ConeError::EmptySubject);
        }

        self.handlers.insert(subject, handler);
        Ok(())
    }
}

impl fmt::Debug for HandlerMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut subjects: Vec<&str> = self.subjects().collect();
        subjects.sort_unstable();
        f.debug_struct("HandlerMux")
            .field("subjects", &subjects)
            .field("ack_unknown_subjects", &self.ack_unknown_subjects)
            .finish()
    }
}

#[async_trait]
impl Handler for HandlerMux {
    async fn serve(&self, response: Response, event: Event) {
        let subject = event.subject().to_owned();

        let result = match self.handlers.get(&subject) {
            Some(route) => {
                if let Some(handler) = route {
                    handler.serve(response.clone(), event).await;
                }
                response.ack().await
            }
            None if self.ack_unknown_subjects => {
                debug!(%subject, "acking unknown subject");
                response.ack().await
            }
            None => {
                debug!(%subject, "no handler registered, naking");
                response.nak().await
            }
        };

        if let Err(err) = result {
            warn!(%subject, error = %err, "failed to respond to event");
        }
    }
}
