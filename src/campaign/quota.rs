//! Quota ledger for metered subscriptions.
//!
//! Holds every subscription's remaining allowances and exposes the atomic
//! reserve/commit/release cycle the dispatch path depends on. Each operation
//! runs its checks and mutation inside a single write-lock critical section,
//! so two campaigns racing for the last send unit can never both pass the
//! limit check.

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::plans::PlanConfig;
use super::CampaignResult;

pub struct QuotaLedger {
    subscriptions: Arc<RwLock<HashMap<Uuid, SubscriptionQuota>>>,
}

/// One row per active subscription. Superseded rows are deactivated, never
/// deleted, so historical campaign records keep a valid reference.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionQuota {
    pub subscription_id: Uuid,
    pub plan_id: String,
    pub send_limit: u64,
    pub sends_used: u64,
    /// Maximum recipients per campaign, not cumulative.
    pub recipient_limit: u64,
    pub promotion_limit: u64,
    pub promotions_used: u64,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(skip)]
    in_flight: Option<Uuid>,
}

impl SubscriptionQuota {
    pub fn campaign_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn sends_remaining(&self) -> u64 {
        self.send_limit.saturating_sub(self.sends_used)
    }
}

/// Hold on one send unit. Consumed by exactly one of `commit` or `release`.
#[derive(Debug)]
pub struct ReservationHandle {
    pub subscription_id: Uuid,
    pub campaign_id: Uuid,
    pub requested_recipients: u64,
    token: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("subscription not found")]
    SubscriptionNotFound,
    #[error("subscription is expired or inactive")]
    ExpiredSubscription,
    #[error("send limit exhausted")]
    SendLimitExhausted,
    #[error("requested {requested} recipients but the per-campaign limit is {limit}")]
    RecipientLimitExceeded { requested: u64, limit: u64 },
    #[error("another campaign is already in flight for this subscription")]
    CampaignInFlight,
    #[error("promotion limit exhausted")]
    PromotionLimitExhausted,
    #[error("reservation no longer matches the subscription state")]
    StaleReservation,
}

impl QuotaError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionNotFound => "subscription_not_found",
            Self::ExpiredSubscription => "expired_subscription",
            Self::SendLimitExhausted => "send_limit_exhausted",
            Self::RecipientLimitExceeded { .. } => "recipient_limit_exceeded",
            Self::CampaignInFlight => "campaign_in_flight",
            Self::PromotionLimitExhausted => "promotion_limit_exhausted",
            Self::StaleReservation => "stale_reservation",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub subscription_id: Uuid,
    pub plan_id: String,
    pub sends_used: u64,
    pub send_limit: u64,
    pub sends_remaining: u64,
    pub recipient_limit: u64,
    pub promotions_used: u64,
    pub promotion_limit: u64,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub campaign_in_flight: bool,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a fresh quota row from a plan. Any older row for the same
    /// subscription id is replaced; an outstanding reservation against the
    /// replaced row becomes stale.
    pub async fn provision(&self, plan: &PlanConfig, expires_at: DateTime<Utc>) -> SubscriptionQuota {
        let quota = SubscriptionQuota {
            subscription_id: Uuid::new_v4(),
            plan_id: plan.id.clone(),
            send_limit: plan.send_limit,
            sends_used: 0,
            recipient_limit: plan.recipient_limit,
            promotion_limit: plan.promotion_limit,
            promotions_used: 0,
            expires_at,
            is_active: true,
            in_flight: None,
        };
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(quota.subscription_id, quota.clone());
        quota
    }

    /// Marks a subscription inactive (superseded or cancelled). Unused quota
    /// becomes unusable but the row stays for audit references.
    pub async fn deactivate(&self, subscription_id: Uuid) -> Result<(), QuotaError> {
        let mut subscriptions = self.subscriptions.write().await;
        let quota = subscriptions
            .get_mut(&subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;
        quota.is_active = false;
        Ok(())
    }

    /// Places the single in-flight hold for a campaign. Must run before any
    /// external delivery call; the whole check-and-set is one critical section.
    pub async fn reserve(
        &self,
        subscription_id: Uuid,
        requested_recipients: u64,
    ) -> Result<ReservationHandle, QuotaError> {
        let mut subscriptions = self.subscriptions.write().await;
        let quota = subscriptions
            .get_mut(&subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;

        if !quota.is_active || Utc::now() >= quota.expires_at {
            return Err(QuotaError::ExpiredSubscription);
        }
        if quota.in_flight.is_some() {
            return Err(QuotaError::CampaignInFlight);
        }
        if quota.sends_used >= quota.send_limit {
            return Err(QuotaError::SendLimitExhausted);
        }
        if requested_recipients > quota.recipient_limit {
            return Err(QuotaError::RecipientLimitExceeded {
                requested: requested_recipients,
                limit: quota.recipient_limit,
            });
        }

        let token = Uuid::new_v4();
        quota.in_flight = Some(token);
        Ok(ReservationHandle {
            subscription_id,
            campaign_id: Uuid::new_v4(),
            requested_recipients,
            token,
        })
    }

    /// Debits exactly one send unit and clears the in-flight hold. Called once
    /// per successful reserve, even when deliveries partially failed: the unit
    /// is consumed by the attempt, not by the success count.
    pub async fn commit(
        &self,
        handle: ReservationHandle,
        result: &CampaignResult,
    ) -> Result<(), QuotaError> {
        let mut subscriptions = self.subscriptions.write().await;
        let quota = subscriptions
            .get_mut(&handle.subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;
        if quota.in_flight != Some(handle.token) {
            return Err(QuotaError::StaleReservation);
        }
        quota.in_flight = None;
        quota.sends_used += 1;
        info!(
            "campaign {} committed for subscription {}: {} delivered, {} rejected, {} provider errors ({}/{} sends used)",
            handle.campaign_id,
            handle.subscription_id,
            result.delivered,
            result.rejected,
            result.provider_errors,
            quota.sends_used,
            quota.send_limit
        );
        Ok(())
    }

    /// Clears the in-flight hold without debit. Only valid before any delivery
    /// attempt was made for the reserved campaign.
    pub async fn release(&self, handle: ReservationHandle) -> Result<(), QuotaError> {
        let mut subscriptions = self.subscriptions.write().await;
        let quota = subscriptions
            .get_mut(&handle.subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;
        if quota.in_flight != Some(handle.token) {
            return Err(QuotaError::StaleReservation);
        }
        quota.in_flight = None;
        info!(
            "campaign {} released without debit for subscription {}",
            handle.campaign_id, handle.subscription_id
        );
        Ok(())
    }

    /// Same atomic-increment discipline as `reserve`, evaluated at
    /// promotion-creation time.
    pub async fn increment_promotion_usage(&self, subscription_id: Uuid) -> Result<(), QuotaError> {
        let mut subscriptions = self.subscriptions.write().await;
        let quota = subscriptions
            .get_mut(&subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;
        if !quota.is_active || Utc::now() >= quota.expires_at {
            return Err(QuotaError::ExpiredSubscription);
        }
        if quota.promotions_used >= quota.promotion_limit {
            return Err(QuotaError::PromotionLimitExhausted);
        }
        quota.promotions_used += 1;
        Ok(())
    }

    pub async fn get(&self, subscription_id: Uuid) -> Option<SubscriptionQuota> {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.get(&subscription_id).cloned()
    }

    pub async fn usage_summary(&self, subscription_id: Uuid) -> Result<UsageSummary, QuotaError> {
        let subscriptions = self.subscriptions.read().await;
        let quota = subscriptions
            .get(&subscription_id)
            .ok_or(QuotaError::SubscriptionNotFound)?;
        Ok(UsageSummary {
            subscription_id: quota.subscription_id,
            plan_id: quota.plan_id.clone(),
            sends_used: quota.sends_used,
            send_limit: quota.send_limit,
            sends_remaining: quota.sends_remaining(),
            recipient_limit: quota.recipient_limit,
            promotions_used: quota.promotions_used,
            promotion_limit: quota.promotion_limit,
            expires_at: quota.expires_at,
            is_active: quota.is_active,
            campaign_in_flight: quota.campaign_in_flight(),
        })
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}
