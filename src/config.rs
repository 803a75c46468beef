//! Configuration loaded from the environment.
//!
//! Every subsystem gets its own config section with sensible defaults; only
//! the ledger base URL/token and the classifier API key are required to run
//! against real collaborators.

use std::env;
use std::time::Duration;

use secrecy::SecretString;

/// Top-level settings for the service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub classifier: ClassifierConfig,
    pub queue: QueueConfig,
    pub cleanup: CleanupConfig,
}

/// HTTP/WebSocket server bind settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Ledger API access (Firefly-style REST API).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub base_url: String,
    pub access_token: SecretString,
}

/// LLM classifier access (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Processing queue behavior.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Wall-clock bound for a single classification task.
    pub task_timeout: Duration,
}

/// Retention sweep behavior.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Period between automatic sweeps.
    pub interval: Duration,
    /// Minimum age before a terminal job is evicted.
    pub retention: Duration,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this if a `.env` file should apply.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("LEDGERSIFT_HOST", "0.0.0.0"),
                port: env_parse("LEDGERSIFT_PORT", 3000),
            },
            ledger: LedgerConfig {
                base_url: env_or("LEDGER_BASE_URL", "http://localhost:8080"),
                access_token: SecretString::from(env_or("LEDGER_ACCESS_TOKEN", "")),
            },
            classifier: ClassifierConfig {
                base_url: env_or("CLASSIFIER_BASE_URL", "https://api.openai.com/v1"),
                api_key: SecretString::from(env_or("CLASSIFIER_API_KEY", "")),
                model: env_or("CLASSIFIER_MODEL", "gpt-4o-mini"),
            },
            queue: QueueConfig {
                task_timeout: Duration::from_secs(env_parse("QUEUE_TASK_TIMEOUT_SECS", 30)),
            },
            cleanup: CleanupConfig {
                interval: Duration::from_secs(env_parse("CLEANUP_INTERVAL_SECS", 3600)),
                retention: Duration::from_secs(env_parse("CLEANUP_RETENTION_SECS", 86400)),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "malformed env value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        let settings = Settings::from_env();
        assert_eq!(settings.queue.task_timeout, Duration::from_secs(30));
        assert_eq!(settings.cleanup.interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_malformed_env_value_falls_back_to_default() {
        // Key is unique to this test so parallel tests never observe it.
        unsafe { env::set_var("LEDGERSIFT_TEST_MALFORMED_SECS", "not-a-number") };
        assert_eq!(env_parse("LEDGERSIFT_TEST_MALFORMED_SECS", 30u64), 30);
        unsafe { env::remove_var("LEDGERSIFT_TEST_MALFORMED_SECS") };
    }
}
