//! ProfileService: profile updates and onboarding status.
//!
//! Every operation takes an explicit [`RequestContext`]. An update is bounded
//! by [`ServiceConfig::transaction_timeout`]: the caller's profile is
//! resolved, a missing insight is generated outside any transaction, then
//! one transaction stores the insight and points the profile at it. Either
//! both writes land or neither does.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::{DatabaseError, ErrorKind, InsightError, ProfileError};
use crate::identity::{IdentityId, RequestContext};
use crate::insights::{InsightStore, PreparedInsight};
use crate::store::{Database, Transaction};

use super::model::{OnboardingStatus, ProfileSnapshot, ProfileUpdate, UpdatedProfile};

const UPDATE_CONTEXT: &str = "Failed to update profile";
const ONBOARDING_CONTEXT: &str = "Failed to check onboarding status";

pub struct ProfileService {
    db: Arc<dyn Database>,
    insights: Arc<InsightStore>,
    config: ServiceConfig,
}

impl ProfileService {
    pub fn new(db: Arc<dyn Database>, insights: Arc<InsightStore>, config: ServiceConfig) -> Self {
        Self {
            db,
            insights,
            config,
        }
    }

    /// Point the caller's profile at `update.category`, creating the
    /// category's insight if this is its first use.
    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        update: ProfileUpdate,
    ) -> Result<UpdatedProfile, ProfileError> {
        let result = match ctx.identity() {
            Some(identity) => self.run_update(identity, &update).await,
            None => Err(ProfileError::Unauthorized),
        };
        match &result {
            Ok(updated) => info!(
                profile_id = %updated.profile.id,
                category = %update.category,
                insight_id = %updated.insight.id,
                "Profile updated"
            ),
            Err(e) => log_failure("update_profile", ctx, e),
        }
        result
    }

    /// [`update_profile`](Self::update_profile) for a loosely-typed payload.
    /// The payload is validated before anything touches storage.
    pub async fn update_profile_json(
        &self,
        ctx: &RequestContext,
        payload: &Value,
    ) -> Result<UpdatedProfile, ProfileError> {
        if ctx.identity().is_none() {
            let err = ProfileError::Unauthorized;
            log_failure("update_profile", ctx, &err);
            return Err(err);
        }
        let update = match ProfileUpdate::from_json(payload) {
            Ok(update) => update,
            Err(e) => {
                log_failure("update_profile", ctx, &e);
                return Err(e);
            }
        };
        self.update_profile(ctx, update).await
    }

    pub async fn onboarding_status(
        &self,
        ctx: &RequestContext,
    ) -> Result<OnboardingStatus, ProfileError> {
        let Some(identity) = ctx.identity() else {
            let err = ProfileError::Unauthorized;
            log_failure("onboarding_status", ctx, &err);
            return Err(err);
        };

        let row = self
            .db
            .find_profile_with_insight(identity)
            .await
            .map_err(|e| classify_database_error(ONBOARDING_CONTEXT, e));

        match row {
            Ok(row) => {
                let status = OnboardingStatus::from_snapshot(
                    row.map(|(profile, insight)| ProfileSnapshot::new(profile, insight)),
                );
                debug!(identity = %identity, is_onboarded = status.is_onboarded, "Onboarding status");
                Ok(status)
            }
            Err(e) => {
                log_failure("onboarding_status", ctx, &e);
                Err(e)
            }
        }
    }

    /// The whole update under one deadline. Generation for a new category
    /// happens before the write transaction opens, so it holds no lock.
    async fn run_update(
        &self,
        identity: &IdentityId,
        update: &ProfileUpdate,
    ) -> Result<UpdatedProfile, ProfileError> {
        let timeout = self.config.transaction_timeout;
        let deadline = Instant::now() + timeout;

        // A transaction cut off here is dropped, which rolls it back.
        match tokio::time::timeout_at(deadline, self.apply_update(identity, update)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProfileError::Timeout(timeout)),
        }
    }

    async fn apply_update(
        &self,
        identity: &IdentityId,
        update: &ProfileUpdate,
    ) -> Result<UpdatedProfile, ProfileError> {
        // Unknown callers must not trigger generation.
        let profile = self
            .db
            .find_profile(identity)
            .await
            .map_err(|e| classify_database_error(UPDATE_CONTEXT, e))?
            .ok_or_else(user_not_found)?;

        let prepared = self
            .insights
            .prepare(&update.category)
            .await
            .map_err(|e| classify_insight_error(UPDATE_CONTEXT, e))?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| classify_database_error(UPDATE_CONTEXT, e))?;

        match self.link(&mut *tx, profile.id, &prepared, update).await {
            Ok(updated) => {
                tx.commit()
                    .await
                    .map_err(|e| classify_database_error(UPDATE_CONTEXT, e))?;
                Ok(updated)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback of profile update failed");
                }
                Err(e)
            }
        }
    }

    async fn link(
        &self,
        tx: &mut dyn Transaction,
        profile_id: Uuid,
        prepared: &PreparedInsight,
        update: &ProfileUpdate,
    ) -> Result<UpdatedProfile, ProfileError> {
        let insight = self
            .insights
            .store_in(tx, prepared)
            .await
            .map_err(|e| classify_insight_error(UPDATE_CONTEXT, e))?;

        tx.update_profile(profile_id, update, Utc::now())
            .await
            .map_err(|e| classify_database_error(UPDATE_CONTEXT, e))?;

        let profile = tx
            .find_profile_by_id(profile_id)
            .await
            .map_err(|e| classify_database_error(UPDATE_CONTEXT, e))?
            .ok_or_else(user_not_found)?;

        Ok(UpdatedProfile { profile, insight })
    }
}

fn user_not_found() -> ProfileError {
    ProfileError::NotFound("User not found".to_string())
}

/// The one mapping from storage failures to what callers see.
pub fn classify_database_error(context: &'static str, e: DatabaseError) -> ProfileError {
    match e {
        DatabaseError::UniqueViolation { .. } => ProfileError::ConstraintViolation,
        DatabaseError::NotFound { entity, .. } => match entity.as_str() {
            "profile" => user_not_found(),
            "insight" => ProfileError::NotFound("Industry insight not found".to_string()),
            other => ProfileError::NotFound(format!("{other} not found")),
        },
        other => ProfileError::Failed {
            context,
            message: other.to_string(),
        },
    }
}

/// Insight store failures, with storage errors routed through
/// [`classify_database_error`].
pub fn classify_insight_error(context: &'static str, e: InsightError) -> ProfileError {
    match e {
        InsightError::Generation { source, .. } => ProfileError::GenerationFailed(source.to_string()),
        InsightError::Missing(_) => {
            ProfileError::NotFound("Industry insight not found".to_string())
        }
        InsightError::Database(e) => classify_database_error(context, e),
    }
}

fn log_failure(operation: &str, ctx: &RequestContext, e: &ProfileError) {
    let identity = ctx.identity().map(IdentityId::as_str).unwrap_or("-");
    match e.kind() {
        ErrorKind::Unauthorized | ErrorKind::Validation | ErrorKind::NotFound => {
            warn!(operation, identity, kind = ?e.kind(), error = %e, "Profile operation rejected");
        }
        _ => {
            error!(operation, identity, kind = ?e.kind(), error = %e, "Profile operation failed");
        }
    }
}
