//! Shared application state handed to every API handler.

use std::sync::Arc;

use crate::campaign::audit::CampaignAuditLog;
use crate::campaign::dispatch::DispatchOrchestrator;
use crate::campaign::plans::PlanConfig;
use crate::campaign::promotions::PromotionStore;
use crate::campaign::quota::QuotaLedger;
use crate::config::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    pub plans: Vec<PlanConfig>,
    pub ledger: Arc<QuotaLedger>,
    pub promotions: Arc<PromotionStore>,
    pub audit: Arc<CampaignAuditLog>,
    pub orchestrator: Arc<DispatchOrchestrator>,
}
