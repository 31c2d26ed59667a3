use anyhow::{anyhow, Result};
use dira_core::config::DeliveryConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing;

use crate::templates::RenderedMail;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct ResendEmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    id: String,
}

/// Outbound email transport. When the Resend credentials are missing the
/// transport is disabled and sends become no-ops, so development
/// environments work without an API key.
pub struct EmailDelivery {
    client: Option<Arc<reqwest::Client>>,
    api_key: Option<String>,
    from_email: Option<String>,
}

impl EmailDelivery {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let (client, api_key, from_email) = if let (Some(api_key), Some(from_email)) =
            (&config.resend_api_key, &config.resend_from_email)
        {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

            tracing::info!("Resend email client initialized");
            (
                Some(Arc::new(client)),
                Some(api_key.clone()),
                Some(from_email.clone()),
            )
        } else {
            tracing::warn!("Email delivery disabled (missing Resend configuration)");
            (None, None, None)
        };

        Ok(Self {
            client,
            api_key,
            from_email,
        })
    }

    pub async fn send(&self, recipient: &str, mail: &RenderedMail) -> Result<()> {
        let (client, api_key, from_email) = match (&self.client, &self.api_key, &self.from_email) {
            (Some(c), Some(k), Some(f)) => (c, k, f),
            _ => {
                tracing::debug!("Email not configured, skipping");
                return Ok(());
            }
        };

        let email_request = ResendEmailRequest {
            from: from_email.clone(),
            to: vec![recipient.to_string()],
            subject: mail.subject.clone(),
            html: mail.html.clone(),
            text: Some(mail.text.clone()),
        };

        let response = client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&email_request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send HTTP request to Resend: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Resend API returned error status {}: {}",
                status,
                error_text
            ));
        }

        let email_response: ResendEmailResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Resend API response: {}", e))?;

        tracing::debug!(
            "Email sent to {} (subject: {:?}, email_id: {})",
            recipient,
            mail.subject,
            email_response.id
        );

        Ok(())
    }
}
