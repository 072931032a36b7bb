//! cone 测试替身
//!
//! - `ResponseRecorder`：记录每一次底层 ack/nak 调用的应答替身；
//! - `MemorySource`：内存事件源，记录已 ack/nak 的事件，并支持故障注入；
//! - `event`：快速构造测试事件。
//!
mod recorder;
mod source;

pub use recorder::{Outcome, Recorded, ResponseRecorder};
pub use source::{MemorySource, Settled};

use bytes::Bytes;
use cone::Event;

/// 构造测试事件，主题为空时直接 panic
pub fn event(subject: &str, body: impl Into<Bytes>) -> Event {
    Event::new(subject, body).expect("test event subject must not be empty")
}
