//! The delivery backend seam: once the protocol engine has assembled an
//! envelope, the backend decides its fate and the engine maps the result
//! onto an SMTP reply.

use crate::envelope::Envelope;
use async_trait::async_trait;
use uuid::Uuid;

/// Outcome of processing an envelope. `code` becomes the SMTP reply
/// code; anything below 300 counts as delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub code: u16,
    pub text: String,
}

impl DeliveryResult {
    pub fn queued(id: impl std::fmt::Display) -> Self {
        Self {
            code: 250,
            text: format!("2.0.0 OK: queued as {id}"),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.code < 300
    }

    pub fn to_reply(&self) -> String {
        format!("{} {}", self.code, self.text)
    }
}

#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Inspect the envelope after a recipient was pushed; an Err rejects
    /// that recipient and the engine pops it back off.
    async fn validate_rcpt(&self, envelope: &Envelope) -> anyhow::Result<()>;

    /// Take delivery of a completed envelope.
    async fn process(&self, envelope: &Envelope) -> DeliveryResult;
}

/// Default backend: accepts everything, logs the envelope, and makes up
/// a queue id.
#[derive(Debug, Default)]
pub struct DebugBackend;

#[async_trait]
impl Backend for DebugBackend {
    async fn validate_rcpt(&self, _envelope: &Envelope) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(&self, envelope: &Envelope) -> DeliveryResult {
        let id = Uuid::new_v4().simple().to_string();
        tracing::debug!(
            queued_as = %id,
            from = %envelope
                .mail_from
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            recipients = envelope.rcpt_to.len(),
            bytes = envelope.data.len(),
            "processed message"
        );
        DeliveryResult::queued(id)
    }
}
