//! LLM classifier collaborator.
//!
//! One-shot prompt against an OpenAI-compatible chat completions endpoint:
//! given the catalog's category names plus a transaction's destination and
//! normalized description, the model picks a category or declines. Answers
//! outside the catalog count as a decline; only catalog members may ever be
//! assigned.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;

/// Token the model is told to answer with when no category fits.
const NO_MATCH_TOKEN: &str = "UNKNOWN";

/// Outcome of a classification call.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Chosen catalog category name, or `None` when the model declined or
    /// answered outside the catalog.
    pub category: Option<String>,
    /// The exact prompt sent, kept for operator review.
    pub prompt: String,
    /// The raw model answer, kept for operator review.
    pub response: String,
}

/// Narrow contract the pipeline depends on.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        categories: &[String],
        destination: &str,
        description: &str,
    ) -> Result<Classification, ClassifyError>;
}

/// reqwest-backed classifier against an OpenAI-compatible API.
pub struct OpenAiClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl OpenAiClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    fn build_prompt(categories: &[String], destination: &str, description: &str) -> String {
        format!(
            "Given I want to categorize transactions on my bank account into these categories: \
             {}\nIn which category would a transaction to \"{destination}\" with the description \
             \"{description}\" fall? Answer with the exact category name only, or {NO_MATCH_TOKEN} \
             if none fits.",
            categories.join(", ")
        )
    }

    /// Map a raw model answer onto the catalog, case-insensitively.
    fn match_category(answer: &str, categories: &[String]) -> Option<String> {
        let cleaned = answer.trim().trim_matches(['"', '\'', '.']).trim();
        if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(NO_MATCH_TOKEN) {
            return None;
        }
        categories
            .iter()
            .find(|c| c.eq_ignore_ascii_case(cleaned))
            .cloned()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(
        &self,
        categories: &[String],
        destination: &str,
        description: &str,
    ) -> Result<Classification, ClassifyError> {
        let prompt = Self::build_prompt(categories, destination, description);
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt.clone(),
            }],
            temperature: 0.0,
        };

        tracing::debug!(destination, "requesting classification");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifyError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ClassifyError::RequestFailed {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClassifyError::InvalidResponse {
                reason: format!("JSON parse error: {e}"),
            })?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifyError::InvalidResponse {
                reason: "no choices in response".to_string(),
            })?;

        let category = Self::match_category(&answer, categories);
        tracing::debug!(?category, "classification answer received");

        Ok(Classification {
            category,
            prompt,
            response: answer,
        })
    }
}
