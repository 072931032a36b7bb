//! 事件（Event）与元数据（Metadata）
//!
//! 事件由事件源（`Source`）把传输层消息翻译而来：主题（subject）在构造时确定且不可变，
//! 载荷为不透明字节，元数据为可选的多值映射。
//!
mod metadata;

pub use metadata::Metadata;

use crate::error::{ConeError, ConeResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 一条待分发的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    subject: String,
    body: Bytes,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
}

impl Event {
    /// 创建事件，主题不可为空
    pub fn new(subject: impl Into<String>, body: impl Into<Bytes>) -> ConeResult<Self> {
        let subject = subject.into();
        if subject.is_empty() {
            return Err(ConeError::EmptySubject);
        }

        Ok(Self {
            subject,
            body: body.into(),
            metadata: Metadata::default(),
        })
    }

    /// 以 JSON 编码 `payload` 作为载荷
    pub fn json<T: Serialize + ?Sized>(
        subject: impl Into<String>,
        payload: &T,
    ) -> ConeResult<Self> {
        let body = serde_json::to_vec(payload)?;
        Self::new(subject, body)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// 把载荷按 JSON 解码
    pub fn decode_json<T: DeserializeOwned>(&self) -> ConeResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn into_parts(self) -> (String, Bytes, Metadata) {
        (self.subject, self.body, self.metadata)
    }
}
