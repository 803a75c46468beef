//! Ledger collaborator: category catalog reads and category assignment.
//!
//! The ledger exposes a Firefly-style REST API. Only two calls matter here:
//! listing the category catalog (name -> id) and writing a category onto an
//! existing transaction group.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::webhook::WebhookTransaction;

/// Narrow contract the pipeline and resolver depend on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the current category catalog as a name -> id mapping.
    async fn fetch_categories(&self) -> Result<HashMap<String, String>, LedgerError>;

    /// Assign `category_id` to every split of the given transaction group.
    async fn assign_category(
        &self,
        transaction_id: &Value,
        transactions: &[WebhookTransaction],
        category_id: &str,
    ) -> Result<(), LedgerError>;
}

/// reqwest-backed ledger client.
pub struct HttpLedgerClient {
    client: Client,
    config: LedgerConfig,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.access_token.expose_secret())
    }
}

#[derive(Debug, Deserialize)]
struct CategoryPage {
    data: Vec<CategoryResource>,
}

#[derive(Debug, Deserialize)]
struct CategoryResource {
    id: String,
    attributes: CategoryAttributes,
}

#[derive(Debug, Deserialize)]
struct CategoryAttributes {
    name: String,
}

/// Render a transaction group id for a URL path. Webhooks deliver it as a
/// JSON number, some ledgers as a string.
fn id_segment(transaction_id: &Value) -> String {
    match transaction_id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn fetch_categories(&self) -> Result<HashMap<String, String>, LedgerError> {
        let url = self.api_url("api/v1/categories");

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| LedgerError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LedgerError::RequestFailed {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let page: CategoryPage =
            serde_json::from_str(&body).map_err(|e| LedgerError::InvalidResponse {
                reason: format!("JSON parse error: {e}"),
            })?;

        Ok(page
            .data
            .into_iter()
            .map(|c| (c.attributes.name, c.id))
            .collect())
    }

    async fn assign_category(
        &self,
        transaction_id: &Value,
        transactions: &[WebhookTransaction],
        category_id: &str,
    ) -> Result<(), LedgerError> {
        let url = self.api_url(&format!(
            "api/v1/transactions/{}",
            id_segment(transaction_id)
        ));

        // Send the splits back unchanged except for the category.
        let splits: Vec<Value> = transactions
            .iter()
            .map(|tx| {
                let mut split = serde_json::to_value(tx).unwrap_or(Value::Null);
                if let Some(obj) = split.as_object_mut() {
                    obj.insert(
                        "category_id".to_string(),
                        Value::String(category_id.to_string()),
                    );
                }
                split
            })
            .collect();

        let body = serde_json::json!({ "transactions": splits });

        tracing::debug!(url = %url, category_id, "assigning category");

        let response = self
            .client
            .put(&url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::RequestFailed {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_segment_handles_numbers_and_strings() {
        assert_eq!(id_segment(&json!(42)), "42");
        assert_eq!(id_segment(&json!("abc-1")), "abc-1");
    }

    #[test]
    fn test_category_page_parses() {
        let body = json!({
            "data": [
                { "id": "3", "type": "categories", "attributes": { "name": "Groceries" } },
                { "id": "7", "type": "categories", "attributes": { "name": "Food & Drink" } }
            ]
        });

        let page: CategoryPage = serde_json::from_value(body).unwrap();
        let map: HashMap<String, String> = page
            .data
            .into_iter()
            .map(|c| (c.attributes.name, c.id))
            .collect();

        assert_eq!(map["Food & Drink"], "7");
        assert_eq!(map["Groceries"], "3");
    }
}
