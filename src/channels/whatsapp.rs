//! WhatsApp Business template delivery.
//!
//! Sends pre-approved template messages through Meta's Graph API. The
//! response and error bodies are mapped into the closed delivery outcome
//! classification: rate limits and 5xx-class failures are transient, explicit
//! provider rejections are permanent for the recipient.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{DeliveryClient, DeliveryFailure, ProviderMessageId};
use crate::campaign::template::RenderedTemplate;
use crate::campaign::validator::PhoneNumber;
use crate::config::WhatsAppConfig;

/// Graph API error codes worth retrying: throughput/pair rate limits and
/// transient delivery infrastructure failures.
const TRANSIENT_ERROR_CODES: [i64; 4] = [130_429, 131_048, 131_056, 133_016];

pub struct WhatsAppClient {
    http: Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    fn template_payload(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> serde_json::Value {
        let mut components = Vec::new();
        if let Some(url) = &template.header_image_url {
            components.push(json!({
                "type": "header",
                "parameters": [{ "type": "image", "image": { "link": url } }]
            }));
        }
        let body_parameters: Vec<serde_json::Value> = template
            .body_variables
            .iter()
            .map(|text| json!({ "type": "text", "text": text }))
            .collect();
        components.push(json!({ "type": "body", "parameters": body_parameters }));

        json!({
            "messaging_product": "whatsapp",
            "to": recipient.as_str(),
            "type": "template",
            "template": {
                "name": template.template_name,
                "language": { "code": template.language },
                "components": components
            }
        })
    }
}

#[async_trait]
impl DeliveryClient for WhatsAppClient {
    async fn send(
        &self,
        recipient: &PhoneNumber,
        template: &RenderedTemplate,
    ) -> Result<ProviderMessageId, DeliveryFailure> {
        let payload = self.template_payload(recipient, template);
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryFailure::transient(None, format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: SendResponse = response.json().await.map_err(|e| {
                DeliveryFailure::transient(None, format!("invalid provider response: {e}"))
            })?;
            match body.messages.into_iter().next() {
                Some(message) => {
                    debug!("WhatsApp accepted message for {recipient}: {}", message.id);
                    Ok(ProviderMessageId(message.id))
                }
                None => Err(DeliveryFailure::transient(
                    None,
                    "provider accepted the request but returned no message id".to_string(),
                )),
            }
        } else {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error);
            let (code, message) = match parsed {
                Some(err) if !err.message.is_empty() => (err.code, err.message),
                Some(err) => (err.code, body.clone()),
                None => (None, body.clone()),
            };
            error!("WhatsApp API error ({status}) for {recipient}: {message}");

            let transient = status.is_server_error()
                || status.as_u16() == 429
                || code.is_some_and(|c| TRANSIENT_ERROR_CODES.contains(&c));
            let code = code.map(|c| c.to_string());
            if transient {
                Err(DeliveryFailure::transient(code, message))
            } else {
                Err(DeliveryFailure::rejected(code, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::FailureKind;

    fn client_for(server_url: &str) -> WhatsAppClient {
        WhatsAppClient {
            http: Client::new(),
            api_base: server_url.to_string(),
            phone_number_id: "1234".to_string(),
            access_token: "test-token".to_string(),
        }
    }

    fn rendered() -> RenderedTemplate {
        RenderedTemplate {
            template_name: "promotion_announcement".to_string(),
            language: "en_US".to_string(),
            header_image_url: Some("https://example.com/banner.png".to_string()),
            body_variables: vec![
                "Spring sale".to_string(),
                "Everything 20% off".to_string(),
                "Acme".to_string(),
            ],
        }
    }

    fn recipient() -> PhoneNumber {
        PhoneNumber::parse("+15551234567").unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let client = client_for("https://graph.example.com");
        let payload = client.template_payload(&recipient(), &rendered());

        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["to"], "+15551234567");
        assert_eq!(payload["type"], "template");
        assert_eq!(payload["template"]["name"], "promotion_announcement");
        assert_eq!(payload["template"]["language"]["code"], "en_US");

        let components = payload["template"]["components"].as_array().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["type"], "header");
        assert_eq!(
            components[0]["parameters"][0]["image"]["link"],
            "https://example.com/banner.png"
        );
        assert_eq!(components[1]["type"], "body");
        let body_params = components[1]["parameters"].as_array().unwrap();
        assert_eq!(body_params.len(), 3);
        assert_eq!(body_params[0]["text"], "Spring sale");
    }

    #[test]
    fn test_payload_without_header_for_text_template() {
        let client = client_for("https://graph.example.com");
        let mut template = rendered();
        template.header_image_url = None;
        let payload = client.template_payload(&recipient(), &template);

        let components = payload["template"]["components"].as_array().unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0]["type"], "body");
    }

    #[tokio::test]
    async fn test_send_success_returns_message_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/1234/messages")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messaging_product":"whatsapp","messages":[{"id":"wamid.test123"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let id = client.send(&recipient(), &rendered()).await.unwrap();
        assert_eq!(id, ProviderMessageId("wamid.test123".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_4xx_rejection_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1234/messages")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":131026,"message":"Message undeliverable"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let failure = client.send(&recipient(), &rendered()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Rejected);
        assert_eq!(failure.code.as_deref(), Some("131026"));
        assert_eq!(failure.message, "Message undeliverable");
    }

    #[tokio::test]
    async fn test_send_error_without_code_keeps_code_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1234/messages")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Bad request"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let failure = client.send(&recipient(), &rendered()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Rejected);
        assert!(failure.code.is_none());
        assert_eq!(failure.detail(), "Bad request");
    }

    #[tokio::test]
    async fn test_send_rate_limit_code_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1234/messages")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":130429,"message":"Rate limit hit"}}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let failure = client.send(&recipient(), &rendered()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_send_5xx_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1234/messages")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let failure = client.send(&recipient(), &rendered()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
        assert!(failure.message.contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_send_success_without_message_id_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1234/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"messaging_product":"whatsapp","messages":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let failure = client.send(&recipient(), &rendered()).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Transient);
    }
}
