//! Outbound message delivery.
//!
//! [`MessageSink`] is the seam the executor talks to. The production
//! implementation is [`telegram::TelegramSink`]; tests use an in-memory
//! recorder.

pub mod telegram;

use crate::error::SinkError;

/// Something that can deliver one rendered message.
///
/// Implementations must not retry internally: a failed send is reported to
/// the executor, which stops the run.
pub trait MessageSink {
    async fn send(&self, text: &str) -> Result<(), SinkError>;
}
