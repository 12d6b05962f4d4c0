//! HTTP API surface.
//!
//! Thin handlers over the campaign services: request parsing, ownership
//! checks, and a stable error body shape. All quota and dispatch semantics
//! live in the `campaign` modules.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::campaign::plans::{find_plan, PlanConfig};
use crate::campaign::promotions::{Promotion, PromotionDraft};
use crate::campaign::quota::{QuotaError, SubscriptionQuota, UsageSummary};
use crate::campaign::validator::RejectedRecipient;
use crate::campaign::{CampaignResult, DispatchError, RecipientOutcome};
use crate::shared::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Vec<RejectedRecipient>>,
}

impl ApiError {
    fn new(kind: &str, message: String) -> Self {
        Self {
            kind: kind.to_string(),
            message,
            rejected: None,
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/:id/usage", get(subscription_usage))
        .route(
            "/subscriptions/:id/promotions",
            post(create_promotion).get(list_promotions),
        )
        .route("/subscriptions/:id/campaigns", get(list_campaigns))
        .route("/promotions/:id", get(get_promotion).put(update_promotion))
        .route("/campaigns", post(submit_campaign))
        .route("/campaigns/:id", get(get_campaign))
}

#[derive(Debug, Deserialize)]
struct CreateSubscriptionRequest {
    plan_id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitCampaignRequest {
    subscription_id: Uuid,
    promotion_id: Uuid,
    recipients: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CampaignSummary {
    campaign_id: Uuid,
    delivered: u64,
    rejected: u64,
    provider_errors: u64,
    details: Vec<RecipientOutcome>,
    skipped: Vec<RejectedRecipient>,
}

impl From<CampaignResult> for CampaignSummary {
    fn from(result: CampaignResult) -> Self {
        Self {
            campaign_id: result.campaign_id,
            delivered: result.delivered,
            rejected: result.rejected,
            provider_errors: result.provider_errors,
            details: result.outcomes,
            skipped: result.skipped,
        }
    }
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> ApiResult<SubscriptionQuota> {
    let plan: &PlanConfig = find_plan(&state.plans, &request.plan_id).ok_or((
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            "plan_not_found",
            format!("unknown plan `{}`", request.plan_id),
        )),
    ))?;

    let expires_at = chrono::Utc::now() + chrono::Duration::days(plan.period_days);
    let quota = state.ledger.provision(plan, expires_at).await;
    Ok(Json(quota))
}

async fn subscription_usage(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<UsageSummary> {
    state
        .ledger
        .usage_summary(subscription_id)
        .await
        .map(Json)
        .map_err(quota_error)
}

async fn create_promotion(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<Uuid>,
    Json(draft): Json<PromotionDraft>,
) -> ApiResult<Promotion> {
    // The quota check and the usage increment are one ledger operation, so
    // a failed create never consumes a promotion slot.
    state
        .ledger
        .increment_promotion_usage(subscription_id)
        .await
        .map_err(quota_error)?;
    let promotion = state.promotions.create(subscription_id, draft).await;
    Ok(Json(promotion))
}

async fn list_promotions(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Vec<Promotion>> {
    Ok(Json(
        state.promotions.list_for_subscription(subscription_id).await,
    ))
}

// Edits do not consume a promotion slot; only creation does. Future campaigns
// pick up the edited content at dispatch time.
async fn update_promotion(
    State(state): State<Arc<AppState>>,
    Path(promotion_id): Path<Uuid>,
    Json(draft): Json<PromotionDraft>,
) -> ApiResult<Promotion> {
    state
        .promotions
        .update(promotion_id, draft)
        .await
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                "promotion_not_found",
                format!("no promotion with id {promotion_id}"),
            )),
        ))
}

async fn get_promotion(
    State(state): State<Arc<AppState>>,
    Path(promotion_id): Path<Uuid>,
) -> ApiResult<Promotion> {
    state.promotions.get(promotion_id).await.map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            "promotion_not_found",
            format!("no promotion with id {promotion_id}"),
        )),
    ))
}

async fn submit_campaign(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitCampaignRequest>,
) -> ApiResult<CampaignSummary> {
    let promotion = state.promotions.get(request.promotion_id).await.ok_or((
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            "promotion_not_found",
            format!("no promotion with id {}", request.promotion_id),
        )),
    ))?;

    // Cross-tenant promotion ids look identical to missing ones.
    if promotion.subscription_id != request.subscription_id {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                "promotion_not_found",
                format!("no promotion with id {}", request.promotion_id),
            )),
        ));
    }

    let result = state
        .orchestrator
        .dispatch(
            request.subscription_id,
            &promotion,
            &state.config.whatsapp.template,
            &request.recipients,
        )
        .await
        .map_err(dispatch_error)?;

    Ok(Json(result.into()))
}

async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<CampaignResult> {
    state.audit.get(campaign_id).await.map(Json).ok_or((
        StatusCode::NOT_FOUND,
        Json(ApiError::new(
            "campaign_not_found",
            format!("no campaign with id {campaign_id}"),
        )),
    ))
}

async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Vec<CampaignResult>> {
    Ok(Json(state.audit.list_for_subscription(subscription_id).await))
}

fn quota_error(err: QuotaError) -> (StatusCode, Json<ApiError>) {
    let status = match err {
        QuotaError::SubscriptionNotFound => StatusCode::NOT_FOUND,
        QuotaError::ExpiredSubscription => StatusCode::FORBIDDEN,
        QuotaError::SendLimitExhausted | QuotaError::PromotionLimitExhausted => {
            StatusCode::TOO_MANY_REQUESTS
        }
        QuotaError::CampaignInFlight => StatusCode::CONFLICT,
        QuotaError::RecipientLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        QuotaError::StaleReservation => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError::new(err.kind(), err.to_string())))
}

fn dispatch_error(err: DispatchError) -> (StatusCode, Json<ApiError>) {
    match err {
        DispatchError::NoValidRecipients { rejected } => {
            let mut body = ApiError::new(
                "no_valid_recipients",
                "no valid recipients in batch".to_string(),
            );
            body.rejected = Some(rejected);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body))
        }
        DispatchError::Quota(quota_err) => quota_error(quota_err),
        DispatchError::Render(render_err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError::new(
                "missing_required_field",
                render_err.to_string(),
            )),
        ),
        DispatchError::Internal(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new("internal", message)),
        ),
    }
}
