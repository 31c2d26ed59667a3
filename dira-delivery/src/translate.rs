use async_trait::async_trait;
use dira_core::config::TranslationConfig;
use dira_core::types::Locale;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Translation of listing free-text between the two supported locales.
/// Best-effort: `None` means no translation is available.
#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, text: &str, from: Locale, to: Locale) -> Option<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completion-backed translator. Disabled without an API key, in
/// which case every call returns `None`.
pub struct OpenAiTranslator {
    client: Option<Arc<reqwest::Client>>,
    api_key: Option<String>,
    model: String,
}

impl OpenAiTranslator {
    pub fn new(config: &TranslationConfig) -> anyhow::Result<Self> {
        let (client, api_key) = if let Some(api_key) = &config.openai_api_key {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()?;

            tracing::info!(model = %config.model, "Translation client initialized");
            (Some(Arc::new(client)), Some(api_key.clone()))
        } else {
            tracing::warn!("Translation disabled (missing OpenAI API key)");
            (None, None)
        };

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
        })
    }

    async fn request(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        text: &str,
        from: Locale,
        to: Locale,
    ) -> anyhow::Result<Option<String>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: format!(
                        "You are a translation assistant. Translate the user's text from {} to {}. \
                         Return only the translated text, with no explanations or quotes.",
                        language_name(from),
                        language_name(to),
                    ),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.1,
        };

        let response = client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response.json().await?;
        let translated = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(translated)
    }
}

#[async_trait]
impl Translate for OpenAiTranslator {
    async fn translate(&self, text: &str, from: Locale, to: Locale) -> Option<String> {
        let (client, api_key) = match (&self.client, &self.api_key) {
            (Some(c), Some(k)) => (c, k),
            _ => return None,
        };

        if text.trim().is_empty() || from == to {
            return None;
        }

        match self.request(client, api_key, text, from, to).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Translation failed: {}", e);
                None
            }
        }
    }
}

fn language_name(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "English",
        Locale::He => "Hebrew",
    }
}
