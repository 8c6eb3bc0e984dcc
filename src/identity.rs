//! Caller identity.
//!
//! The auth layer resolves who is calling; every profile operation receives
//! the result explicitly as a [`RequestContext`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Externally issued user id (the auth provider's subject).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    /// Returns `None` for blank ids, which auth layers use to mean "signed out".
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the principal behind the current request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_current_identity(&self) -> Option<IdentityId>;
}

/// Provider that always answers the same thing.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    identity: Option<IdentityId>,
}

impl StaticIdentityProvider {
    pub fn new(identity: Option<IdentityId>) -> Self {
        Self { identity }
    }

    pub fn signed_in(identity: &str) -> Self {
        Self::new(IdentityId::new(identity))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve_current_identity(&self) -> Option<IdentityId> {
        self.identity.clone()
    }
}

/// Per-request context handed to every profile operation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<IdentityId>,
}

impl RequestContext {
    pub async fn resolve(provider: &dyn IdentityProvider) -> Self {
        Self {
            identity: provider.resolve_current_identity().await,
        }
    }

    pub fn for_identity(identity: IdentityId) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&IdentityId> {
        self.identity.as_ref()
    }
}
