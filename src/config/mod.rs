//! Environment-driven configuration.
//!
//! Everything is read once at startup from the process environment (with
//! `.env` support via dotenvy in `main`). Secrets such as the WhatsApp access
//! token are never logged.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::campaign::dispatch::DispatchConfig;
use crate::campaign::template::TemplateSpec;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_base: String,
    pub access_token: String,
    pub phone_number_id: String,
    pub template: TemplateSpec,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env_or("SERVER_HOST", "0.0.0.0"),
            port: env_or("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        };

        let whatsapp = WhatsAppConfig {
            api_base: env_or("WHATSAPP_API_BASE", "https://graph.facebook.com/v17.0"),
            access_token: env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_default(),
            phone_number_id: env::var("WHATSAPP_PHONE_ID").unwrap_or_default(),
            template: TemplateSpec {
                name: env_or("WHATSAPP_TEMPLATE_NAME", "promotion_announcement"),
                language: env_or("WHATSAPP_TEMPLATE_LANGUAGE", "en_US"),
                requires_media: env_or("WHATSAPP_TEMPLATE_REQUIRES_MEDIA", "true")
                    .parse()
                    .context("WHATSAPP_TEMPLATE_REQUIRES_MEDIA must be true or false")?,
            },
        };

        let dispatch = DispatchConfig {
            concurrency: env_or("DISPATCH_CONCURRENCY", "8")
                .parse()
                .context("DISPATCH_CONCURRENCY must be a positive integer")?,
            max_retries: env_or("DISPATCH_MAX_RETRIES", "2")
                .parse()
                .context("DISPATCH_MAX_RETRIES must be an integer")?,
            retry_delay: Duration::from_millis(
                env_or("DISPATCH_RETRY_DELAY_MS", "500")
                    .parse()
                    .context("DISPATCH_RETRY_DELAY_MS must be an integer")?,
            ),
            campaign_timeout: Duration::from_secs(
                env_or("DISPATCH_TIMEOUT_SECS", "300")
                    .parse()
                    .context("DISPATCH_TIMEOUT_SECS must be an integer")?,
            ),
        };

        Ok(Self {
            server,
            whatsapp,
            dispatch,
        })
    }
}
