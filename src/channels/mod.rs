//! Delivery channel adapters.
//!
//! The dispatch engine only sees the `DeliveryClient` seam; provider-specific
//! response shapes are collapsed into the closed `FailureKind` classification
//! before they reach the orchestrator.

use async_trait::async_trait;

use crate::campaign::template::RenderedTemplate;
use crate::campaign::validator::PhoneNumber;

pub mod whatsapp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessageId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Permanent for this recipient (opted out, invalid number). Never retried.
    Rejected,
    /// Rate limit, timeout, 5xx-class. Worth a bounded retry.
    Transient,
}

#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl DeliveryFailure {
    pub fn rejected(code: Option<String>, message: String) -> Self {
        Self {
            kind: FailureKind::Rejected,
            code,
            message,
        }
    }

    pub fn transient(code: Option<String>, message: String) -> Self {
        Self {
            kind: FailureKind::Transient,
            code,
            message,
        }
    }

    pub fn detail(&self) -> String {
        match &self.code {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// One template send per recipient. The provider applies its own rate
/// limiting; the orchestrator bounds concurrency and retries on top.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<ProviderMessageId, DeliveryFailure>;
}
