//! Dispatch orchestration.
//!
//! Drives a campaign through its full lifecycle: validate the recipient
//! batch, reserve quota, render the template once, fan deliveries out over a
//! bounded worker pool, and finalize the ledger from the actual outcomes.
//! A campaign that reaches the delivery phase always commits exactly one send
//! unit, no matter how many individual deliveries failed.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use super::audit::CampaignAuditLog;
use super::promotions::Promotion;
use super::quota::QuotaLedger;
use super::template::{self, RenderedTemplate, TemplateSpec};
use super::validator::{self, PhoneNumber, ValidatedBatch};
use super::{CampaignResult, DispatchError, RecipientOutcome};
use crate::channels::{DeliveryClient, FailureKind};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on simultaneous provider calls per campaign.
    pub concurrency: usize,
    /// Retries per recipient for transient failures, on top of the first attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Overall budget for the delivery phase. On expiry the campaign commits
    /// with whatever outcomes were collected.
    pub campaign_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            campaign_timeout: Duration::from_secs(300),
        }
    }
}

pub struct DispatchOrchestrator {
    ledger: Arc<QuotaLedger>,
    client: Arc<dyn DeliveryClient>,
    audit: Arc<CampaignAuditLog>,
    config: DispatchConfig,
}

impl DispatchOrchestrator {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        client: Arc<dyn DeliveryClient>,
        audit: Arc<CampaignAuditLog>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            ledger,
            client,
            audit,
            config,
        }
    }

    /// Runs one campaign end to end. Quota errors, render errors, and an
    /// empty validated batch are terminal; per-recipient delivery failures
    /// are not, and end up inside the committed `CampaignResult`.
    pub async fn dispatch(
        &self,
        subscription_id: Uuid,
        promotion: &Promotion,
        template_spec: &TemplateSpec,
        raw_recipients: &[String],
    ) -> Result<CampaignResult, DispatchError> {
        let ValidatedBatch { accepted, rejected } = validator::validate_batch(raw_recipients);
        if accepted.is_empty() {
            return Err(DispatchError::NoValidRecipients { rejected });
        }

        let handle = self.ledger.reserve(subscription_id, accepted.len() as u64).await?;

        info!(
            "dispatching campaign {} for subscription {}: {} recipients ({} dropped by validation)",
            handle.campaign_id,
            subscription_id,
            accepted.len(),
            rejected.len()
        );

        let ledger = Arc::clone(&self.ledger);
        let audit = Arc::clone(&self.audit);
        let client = Arc::clone(&self.client);
        let config = self.config.clone();
        let promotion = promotion.clone();
        let template_spec = template_spec.clone();
        let started_at = Utc::now();

        // Everything between reserve and commit/release runs in its own task:
        // once quota is reserved, cancellation of the surrounding request must
        // not leave the in-flight marker stuck. That includes the release on
        // the render-error branch, which also waits on the ledger lock.
        let task = tokio::spawn(async move {
            let campaign_id = handle.campaign_id;
            let rendered = match template::render(&promotion, &template_spec) {
                Ok(rendered) => rendered,
                Err(e) => {
                    // Nothing was attempted yet, so the reservation is
                    // released instead of committed.
                    if let Err(release_err) = ledger.release(handle).await {
                        warn!("failed to release reservation after render error: {release_err}");
                    }
                    return Err(DispatchError::Render(e));
                }
            };
            let outcomes = run_deliveries(client.as_ref(), &config, &rendered, &accepted).await;
            let result = CampaignResult::new(
                campaign_id,
                subscription_id,
                promotion.id,
                outcomes,
                rejected,
                started_at,
            );
            ledger.commit(handle, &result).await?;
            audit.record(result.clone()).await;
            Ok(result)
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => Err(DispatchError::Internal(join_err.to_string())),
        }
    }
}

/// Bounded concurrent fan-out. Every recipient yields exactly one outcome:
/// recipients the overall timeout cut off are recorded as provider errors.
async fn run_deliveries(
    client: &dyn DeliveryClient,
    config: &DispatchConfig,
    rendered: &RenderedTemplate,
    recipients: &[PhoneNumber],
) -> Vec<RecipientOutcome> {
    let collected: Arc<Mutex<Vec<RecipientOutcome>>> =
        Arc::new(Mutex::new(Vec::with_capacity(recipients.len())));

    let deliveries = stream::iter(recipients.iter().cloned())
        .map(|recipient| deliver_one(client, config, rendered, recipient))
        .buffer_unordered(config.concurrency.max(1))
        .for_each(|outcome| {
            let collected = Arc::clone(&collected);
            async move {
                collected.lock().await.push(outcome);
            }
        });

    if timeout(config.campaign_timeout, deliveries).await.is_err() {
        warn!(
            "campaign delivery phase timed out after {:?}; unfinished recipients recorded as provider errors",
            config.campaign_timeout
        );
    }

    let mut outcomes = {
        let mut guard = collected.lock().await;
        std::mem::take(&mut *guard)
    };
    let finished: HashSet<PhoneNumber> =
        outcomes.iter().map(|o| o.phone_number.clone()).collect();
    for recipient in recipients {
        if !finished.contains(recipient) {
            outcomes.push(RecipientOutcome::provider_error(
                recipient.clone(),
                "campaign timed out before delivery completed".to_string(),
            ));
        }
    }
    outcomes
}

/// One recipient, with bounded retry for transient provider failures.
/// Rejections are permanent and never retried.
async fn deliver_one(
    client: &dyn DeliveryClient,
    config: &DispatchConfig,
    rendered: &RenderedTemplate,
    recipient: PhoneNumber,
) -> RecipientOutcome {
    let mut attempt: u32 = 0;
    loop {
        match client.send(&recipient, rendered).await {
            Ok(message_id) => return RecipientOutcome::delivered(recipient, message_id.0),
            Err(failure) if failure.kind == FailureKind::Transient && attempt < config.max_retries => {
                attempt += 1;
                debug!(
                    "transient delivery failure for {recipient} (retry {attempt}/{}): {}",
                    config.max_retries,
                    failure.detail()
                );
                sleep(config.retry_delay * attempt).await;
            }
            Err(failure) => {
                return match failure.kind {
                    FailureKind::Rejected => RecipientOutcome::rejected(recipient, failure.detail()),
                    FailureKind::Transient => {
                        RecipientOutcome::provider_error(recipient, failure.detail())
                    }
                };
            }
        }
    }
}
