//! Error types for career-insights.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violation on {target}")]
    UniqueViolation { target: String },

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the insight store.
#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("Insight generation failed for {category}: {source}")]
    Generation {
        category: String,
        #[source]
        source: LlmError,
    },

    #[error("Insight not found for category {0}")]
    Missing(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Stable classification of a [`ProfileError`], for callers that branch on
/// the failure rather than display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Validation,
    ConstraintViolation,
    GenerationFailed,
    Timeout,
    Failed,
}

/// Errors surfaced by the profile operations.
///
/// Every variant carries a human-readable message; nothing internal (row
/// ids, SQL) leaks through `Display`.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unique constraint violation")]
    ConstraintViolation,

    #[error("Failed to generate industry insights: {0}")]
    GenerationFailed(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{context}: {message}")]
    Failed {
        context: &'static str,
        message: String,
    },
}

impl ProfileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ConstraintViolation => ErrorKind::ConstraintViolation,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Failed { .. } => ErrorKind::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(ProfileError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            ProfileError::Validation("Industry is required".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ProfileError::Timeout(Duration::from_secs(10)).kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn wrapped_failure_message() {
        let err = ProfileError::Failed {
            context: "Failed to update profile",
            message: "disk I/O error".into(),
        };
        assert_eq!(err.to_string(), "Failed to update profile: disk I/O error");
        assert_eq!(err.kind(), ErrorKind::Failed);
    }

    #[test]
    fn generation_error_keeps_source() {
        let err = InsightError::Generation {
            category: "tech-software".into(),
            source: LlmError::AuthFailed {
                provider: "anthropic".into(),
            },
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Authentication failed for provider anthropic");
    }
}
