//! Inbound webhook payload types and validation.
//!
//! The ledger fires a change notification on every transaction update. Only
//! a narrow slice of those is worth a classification job: fresh withdrawals
//! or deposits with no category yet. Everything else is rejected up front so
//! no job is ever created for it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::normalize::DescriptionNormalizer;

/// Trigger marker the ledger sets on transaction updates.
pub const TRIGGER_UPDATE_TRANSACTION: &str = "UPDATE_TRANSACTION";
/// Response marker for payloads carrying a transactions list.
pub const RESPONSE_TRANSACTIONS: &str = "TRANSACTIONS";

/// Raw webhook notification body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub content: WebhookContent,
}

/// The `content` envelope: the transaction group id plus its splits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookContent {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub transactions: Vec<WebhookTransaction>,
}

/// One transaction split inside the webhook.
///
/// Unknown fields are preserved in `extra` so the assignment call can send
/// the split back to the ledger unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTransaction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub category_id: Option<Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub destination_name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Everything a classification job needs, extracted from a valid webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSeed {
    pub destination_name: String,
    /// Already normalized.
    pub description: String,
    pub transaction_id: Value,
    pub transactions: Vec<WebhookTransaction>,
}

/// Shape-checks webhook payloads and extracts job seeds.
pub struct WebhookValidator {
    normalizer: DescriptionNormalizer,
}

impl WebhookValidator {
    pub fn new() -> Self {
        Self {
            normalizer: DescriptionNormalizer::new(),
        }
    }

    /// Validate a payload, failing fast on the first violated rule.
    ///
    /// Pure: no job is created here and nothing is mutated on failure.
    pub fn validate(&self, payload: &WebhookPayload) -> Result<JobSeed, ValidationError> {
        if payload.trigger != TRIGGER_UPDATE_TRANSACTION {
            return Err(ValidationError::WrongTrigger {
                trigger: payload.trigger.clone(),
            });
        }

        if payload.response != RESPONSE_TRANSACTIONS {
            return Err(ValidationError::WrongResponse {
                response: payload.response.clone(),
            });
        }

        let Some(tx) = payload.content.transactions.first() else {
            return Err(ValidationError::NoTransactions);
        };

        if tx.kind != "withdrawal" && tx.kind != "deposit" {
            return Err(ValidationError::UnsupportedType {
                kind: tx.kind.clone(),
            });
        }

        // A set category means this notification is a redelivery or a manual
        // edit; re-classifying would overwrite user intent.
        if matches!(&tx.category_id, Some(v) if !v.is_null()) {
            return Err(ValidationError::AlreadyCategorized);
        }

        if tx.description.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "description",
            });
        }

        if tx.destination_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "destination_name",
            });
        }

        Ok(JobSeed {
            destination_name: tx.destination_name.clone(),
            description: self.normalizer.normalize(&tx.description),
            transaction_id: payload.content.id.clone(),
            transactions: payload.content.transactions.clone(),
        })
    }
}

impl Default for WebhookValidator {
    fn default() -> Self {
        Self::new()
    }
}
