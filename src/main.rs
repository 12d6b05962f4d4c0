use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use promoserver::api::configure_api_routes;
use promoserver::campaign::audit::CampaignAuditLog;
use promoserver::campaign::dispatch::DispatchOrchestrator;
use promoserver::campaign::plans::default_plans;
use promoserver::campaign::promotions::PromotionStore;
use promoserver::campaign::quota::QuotaLedger;
use promoserver::channels::whatsapp::WhatsAppClient;
use promoserver::config::AppConfig;
use promoserver::shared::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;

    let ledger = Arc::new(QuotaLedger::new());
    let promotions = Arc::new(PromotionStore::new());
    let audit = Arc::new(CampaignAuditLog::new());
    let client = Arc::new(WhatsAppClient::new(&config.whatsapp));
    let orchestrator = Arc::new(DispatchOrchestrator::new(
        Arc::clone(&ledger),
        client,
        Arc::clone(&audit),
        config.dispatch.clone(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        plans: default_plans(),
        ledger,
        promotions,
        audit,
        orchestrator,
    });

    let app = Router::new()
        .nest("/api", configure_api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
