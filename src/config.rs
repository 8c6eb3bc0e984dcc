//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Settings for the profile operations. Set by the embedding application;
/// the maintenance binary runs no profile updates.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound for a whole profile update, generation included.
    pub transaction_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(10),
        }
    }
}

/// Settings for the insight cache.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// How long a generated insight stays fresh.
    pub ttl: chrono::Duration,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::days(7),
        }
    }
}

/// Process-level configuration for the maintenance binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub insights: InsightConfig,
    /// Cron expression (with seconds field) for the stale-insight sweep.
    pub refresh_schedule: String,
    pub llm: LlmConfig,
}

pub const DEFAULT_REFRESH_SCHEDULE: &str = "0 0 0 * * Sun";

impl AppConfig {
    /// Build the configuration from `CAREER_INSIGHTS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("CAREER_INSIGHTS_DB_PATH")
            .unwrap_or_else(|| "./data/career-insights.db".to_string());

        let ttl_days: i64 = parse_or(&lookup, "CAREER_INSIGHTS_INSIGHT_TTL_DAYS", 7)?;
        if ttl_days <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "CAREER_INSIGHTS_INSIGHT_TTL_DAYS".into(),
                message: "must be a positive number of days".into(),
            });
        }

        let refresh_schedule = lookup("CAREER_INSIGHTS_REFRESH_SCHEDULE")
            .unwrap_or_else(|| DEFAULT_REFRESH_SCHEDULE.to_string());
        crate::refresh::parse_schedule(&refresh_schedule)?;

        let backend = match lookup("CAREER_INSIGHTS_LLM_BACKEND") {
            None => LlmBackend::Anthropic,
            Some(raw) => LlmBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "CAREER_INSIGHTS_LLM_BACKEND".into(),
                message: format!("unknown backend '{raw}' (expected anthropic or openai)"),
            })?,
        };

        let key_var = backend.api_key_var();
        let api_key =
            lookup(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model = lookup("CAREER_INSIGHTS_MODEL")
            .unwrap_or_else(|| backend.default_model().to_string());

        Ok(Self {
            db_path: PathBuf::from(db_path),
            insights: InsightConfig {
                ttl: chrono::Duration::days(ttl_days),
            },
            refresh_schedule,
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
