//! Backend-agnostic persistence traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::identity::IdentityId;
use crate::insights::model::{Category, Insight};
use crate::profile::model::{Profile, ProfileUpdate};

/// Storage for profiles and insights.
///
/// Methods on this trait each run on their own; anything that must commit
/// together goes through [`Database::begin`].
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Start a transaction. Isolation is at least read-committed.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Create an empty profile for a newly signed-up identity.
    ///
    /// Fails with [`DatabaseError::UniqueViolation`] if one already exists.
    async fn create_profile(&self, identity: &IdentityId) -> Result<Profile, DatabaseError>;

    async fn find_profile(&self, identity: &IdentityId) -> Result<Option<Profile>, DatabaseError>;

    /// Profile plus the insight its category points at, read in one query.
    async fn find_profile_with_insight(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<(Profile, Option<Insight>)>, DatabaseError>;

    // ── Insights ────────────────────────────────────────────────────

    async fn find_insight(&self, category: &Category) -> Result<Option<Insight>, DatabaseError>;

    /// Insights whose `next_update` is at or before `now`, oldest first.
    async fn list_stale_insights(&self, now: DateTime<Utc>) -> Result<Vec<Insight>, DatabaseError>;

    async fn count_insights(&self) -> Result<usize, DatabaseError>;
}

/// An open transaction. Dropping it without [`Transaction::commit`] discards
/// its writes.
#[async_trait]
pub trait Transaction: Send {
    async fn find_profile(&mut self, identity: &IdentityId)
        -> Result<Option<Profile>, DatabaseError>;

    async fn find_profile_by_id(&mut self, id: Uuid) -> Result<Option<Profile>, DatabaseError>;

    async fn find_insight(&mut self, category: &Category) -> Result<Option<Insight>, DatabaseError>;

    /// Insert a new insight.
    ///
    /// Fails with [`DatabaseError::UniqueViolation`] if the category already
    /// has one; the transaction stays usable afterwards.
    async fn insert_insight(&mut self, insight: &Insight) -> Result<(), DatabaseError>;

    /// Overwrite an existing insight's content, matched by id.
    async fn update_insight(&mut self, insight: &Insight) -> Result<(), DatabaseError>;

    /// Apply an update to a profile. Fails with [`DatabaseError::NotFound`]
    /// if the row is gone.
    async fn update_profile(
        &mut self,
        profile_id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
