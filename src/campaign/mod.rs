//! Metered campaign dispatch engine.
//!
//! A campaign is one submission of a promotional template message to a batch
//! of recipients. The modules here cover the full pipeline: recipient
//! validation, quota reservation, template rendering, concurrent delivery
//! fan-out, and the audit trail of per-recipient outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod audit;
pub mod dispatch;
pub mod plans;
pub mod promotions;
pub mod quota;
pub mod template;
pub mod validator;

use validator::{PhoneNumber, RejectedRecipient};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Rejected,
    ProviderError,
}

/// Terminal delivery status recorded for one normalized recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub phone_number: PhoneNumber,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl RecipientOutcome {
    pub fn delivered(phone_number: PhoneNumber, provider_message_id: String) -> Self {
        Self {
            phone_number,
            status: DeliveryStatus::Delivered,
            provider_message_id: Some(provider_message_id),
            error_detail: None,
        }
    }

    pub fn rejected(phone_number: PhoneNumber, error_detail: String) -> Self {
        Self {
            phone_number,
            status: DeliveryStatus::Rejected,
            provider_message_id: None,
            error_detail: Some(error_detail),
        }
    }

    pub fn provider_error(phone_number: PhoneNumber, error_detail: String) -> Self {
        Self {
            phone_number,
            status: DeliveryStatus::ProviderError,
            provider_message_id: None,
            error_detail: Some(error_detail),
        }
    }
}

/// Aggregated result of one campaign. Outcomes carry no ordering guarantee
/// relative to the submitted recipient list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignResult {
    pub campaign_id: Uuid,
    pub subscription_id: Uuid,
    pub promotion_id: Uuid,
    pub delivered: u64,
    pub rejected: u64,
    pub provider_errors: u64,
    pub outcomes: Vec<RecipientOutcome>,
    /// Entries the batch validator dropped before any quota was reserved.
    pub skipped: Vec<RejectedRecipient>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CampaignResult {
    pub fn new(
        campaign_id: Uuid,
        subscription_id: Uuid,
        promotion_id: Uuid,
        outcomes: Vec<RecipientOutcome>,
        skipped: Vec<RejectedRecipient>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let delivered = count_status(&outcomes, DeliveryStatus::Delivered);
        let rejected = count_status(&outcomes, DeliveryStatus::Rejected);
        let provider_errors = count_status(&outcomes, DeliveryStatus::ProviderError);
        Self {
            campaign_id,
            subscription_id,
            promotion_id,
            delivered,
            rejected,
            provider_errors,
            outcomes,
            skipped,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn count_status(outcomes: &[RecipientOutcome], status: DeliveryStatus) -> u64 {
    outcomes.iter().filter(|o| o.status == status).count() as u64
}

/// Terminal dispatch failures. Per-recipient delivery failures never surface
/// here; they live inside a committed `CampaignResult`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no valid recipients in batch")]
    NoValidRecipients { rejected: Vec<RejectedRecipient> },
    #[error(transparent)]
    Quota(#[from] quota::QuotaError),
    #[error(transparent)]
    Render(#[from] template::RenderError),
    #[error("dispatch task failed: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoValidRecipients { .. } => "no_valid_recipients",
            Self::Quota(e) => e.kind(),
            Self::Render(_) => "missing_required_field",
            Self::Internal(_) => "internal",
        }
    }
}
