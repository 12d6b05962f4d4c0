//! Campaign audit log.
//!
//! Every committed campaign result is recorded here, keyed by campaign id
//! with a per-subscription index for listing.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CampaignResult;

#[derive(Default)]
struct AuditStorage {
    campaigns: HashMap<Uuid, CampaignResult>,
    by_subscription: HashMap<Uuid, Vec<Uuid>>,
}

pub struct CampaignAuditLog {
    storage: Arc<RwLock<AuditStorage>>,
}

impl CampaignAuditLog {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(AuditStorage::default())),
        }
    }

    pub async fn record(&self, result: CampaignResult) {
        let mut storage = self.storage.write().await;
        storage
            .by_subscription
            .entry(result.subscription_id)
            .or_default()
            .push(result.campaign_id);
        storage.campaigns.insert(result.campaign_id, result);
    }

    pub async fn get(&self, campaign_id: Uuid) -> Option<CampaignResult> {
        let storage = self.storage.read().await;
        storage.campaigns.get(&campaign_id).cloned()
    }

    /// Results in recording order.
    pub async fn list_for_subscription(&self, subscription_id: Uuid) -> Vec<CampaignResult> {
        let storage = self.storage.read().await;
        storage
            .by_subscription
            .get(&subscription_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| storage.campaigns.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for CampaignAuditLog {
    fn default() -> Self {
        Self::new()
    }
}
