//! Promotion store.
//!
//! A promotion is the reusable content payload bound into a campaign's
//! template message. Each promotion is owned by exactly one subscription;
//! creation is gated by the subscription's promotion quota (enforced by the
//! caller through the ledger). The renderer reads promotion state at dispatch
//! time, so edits apply to future campaigns only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    /// Per-channel image overrides keyed by channel name, e.g. "whatsapp".
    #[serde(default)]
    pub image_overrides: HashMap<String, String>,
    pub sender_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromotionDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_overrides: HashMap<String, String>,
    pub sender_name: String,
}

pub struct PromotionStore {
    promotions: Arc<RwLock<HashMap<Uuid, Promotion>>>,
}

impl PromotionStore {
    pub fn new() -> Self {
        Self {
            promotions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, subscription_id: Uuid, draft: PromotionDraft) -> Promotion {
        let now = Utc::now();
        let promotion = Promotion {
            id: Uuid::new_v4(),
            subscription_id,
            title: draft.title,
            description: draft.description,
            image_url: draft.image_url,
            image_overrides: draft.image_overrides,
            sender_name: draft.sender_name,
            created_at: now,
            updated_at: now,
        };
        let mut promotions = self.promotions.write().await;
        promotions.insert(promotion.id, promotion.clone());
        promotion
    }

    pub async fn get(&self, id: Uuid) -> Option<Promotion> {
        let promotions = self.promotions.read().await;
        promotions.get(&id).cloned()
    }

    pub async fn update(&self, id: Uuid, draft: PromotionDraft) -> Option<Promotion> {
        let mut promotions = self.promotions.write().await;
        let promotion = promotions.get_mut(&id)?;
        promotion.title = draft.title;
        promotion.description = draft.description;
        promotion.image_url = draft.image_url;
        promotion.image_overrides = draft.image_overrides;
        promotion.sender_name = draft.sender_name;
        promotion.updated_at = Utc::now();
        Some(promotion.clone())
    }

    pub async fn list_for_subscription(&self, subscription_id: Uuid) -> Vec<Promotion> {
        let promotions = self.promotions.read().await;
        promotions
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect()
    }
}

impl Default for PromotionStore {
    fn default() -> Self {
        Self::new()
    }
}
