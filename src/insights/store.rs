//! InsightStore: get-or-generate-and-store for per-category insights.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::InsightConfig;
use crate::error::{DatabaseError, InsightError};
use crate::store::{Database, Transaction};

use super::generator::InsightGenerator;
use super::model::{Category, GeneratedInsight, Insight};

/// Result of [`InsightStore::refresh_if_stale`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Not due yet; returned unchanged.
    Fresh(Insight),
    Refreshed(Insight),
    /// No insight exists for the category.
    Missing,
}

/// Counts from one [`InsightStore::refresh_stale`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// An insight ready to be linked inside a transaction, from
/// [`InsightStore::prepare`].
///
/// A freshly generated insight keeps its category claimed until this value
/// is dropped, so other callers for the same category wait for it instead
/// of generating again. Drop it after the transaction commits.
#[derive(Debug)]
pub struct PreparedInsight {
    insight: Insight,
    stored: bool,
    _claim: Option<OwnedMutexGuard<()>>,
}

impl PreparedInsight {
    fn stored(insight: Insight) -> Self {
        Self {
            insight,
            stored: true,
            _claim: None,
        }
    }

    pub fn category(&self) -> &Category {
        &self.insight.category
    }

    /// Whether the insight was generated by this call and still has to be
    /// written.
    pub fn is_generated(&self) -> bool {
        !self.stored
    }
}

/// Owns the shared insight table.
///
/// At most one insight exists per category. The first reference generates
/// it; later references read it back until it goes stale.
pub struct InsightStore {
    db: Arc<dyn Database>,
    generator: Arc<dyn InsightGenerator>,
    config: InsightConfig,
    /// Per-category generation locks. Entries nobody holds are pruned.
    claims: Mutex<HashMap<Category, Arc<Mutex<()>>>>,
}

impl InsightStore {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<dyn InsightGenerator>,
        config: InsightConfig,
    ) -> Self {
        Self {
            db,
            generator,
            config,
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub async fn find(&self, category: &Category) -> Result<Option<Insight>, InsightError> {
        Ok(self.db.find_insight(category).await?)
    }

    /// Return the insight for `category`, generating it first if needed.
    /// Generation runs before the write transaction opens.
    pub async fn get_or_create(&self, category: &Category) -> Result<Insight, InsightError> {
        let prepared = self.prepare(category).await?;
        if !prepared.is_generated() {
            return Ok(prepared.insight);
        }

        let mut tx = self.db.begin().await?;
        match self.store_in(&mut *tx, &prepared).await {
            Ok(insight) => {
                tx.commit().await?;
                Ok(insight)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed get_or_create failed");
                }
                Err(e)
            }
        }
    }

    /// Look up `category` and, on a miss, generate its content without
    /// touching the database. Pair with [`store_in`](Self::store_in).
    pub async fn prepare(&self, category: &Category) -> Result<PreparedInsight, InsightError> {
        if let Some(existing) = self.db.find_insight(category).await? {
            debug!(category = %category, insight_id = %existing.id, "Insight cache hit");
            return Ok(PreparedInsight::stored(existing));
        }

        let claim = self.claim(category).await;
        // Another caller may have finished generating while we waited.
        if let Some(existing) = self.db.find_insight(category).await? {
            debug!(category = %category, insight_id = %existing.id, "Insight created while waiting");
            return Ok(PreparedInsight::stored(existing));
        }

        let generated = self.generate(category).await?;
        Ok(PreparedInsight {
            insight: Insight::new(category.clone(), generated, Utc::now(), self.config.ttl),
            stored: false,
            _claim: Some(claim),
        })
    }

    /// Make a prepared insight part of `tx` and return the stored row.
    ///
    /// If the category gained a row since [`prepare`](Self::prepare), that
    /// row wins and the prepared content is discarded.
    pub async fn store_in(
        &self,
        tx: &mut dyn Transaction,
        prepared: &PreparedInsight,
    ) -> Result<Insight, InsightError> {
        if let Some(existing) = tx.find_insight(prepared.category()).await? {
            return Ok(existing);
        }
        if prepared.stored {
            return Err(InsightError::Missing(prepared.category().to_string()));
        }
        self.insert_or_reread(tx, &prepared.insight).await
    }

    /// Same as [`get_or_create`](Self::get_or_create), inside the caller's
    /// transaction. A failure leaves nothing written; the caller decides
    /// whether to roll back.
    ///
    /// Generation runs while `tx` is open. Callers that can generate first
    /// should use [`prepare`](Self::prepare) and [`store_in`](Self::store_in).
    pub async fn get_or_create_in(
        &self,
        tx: &mut dyn Transaction,
        category: &Category,
    ) -> Result<Insight, InsightError> {
        if let Some(existing) = tx.find_insight(category).await? {
            debug!(category = %category, insight_id = %existing.id, "Insight cache hit");
            return Ok(existing);
        }

        let generated = self.generate(category).await?;
        let insight = Insight::new(category.clone(), generated, Utc::now(), self.config.ttl);
        self.insert_or_reread(tx, &insight).await
    }

    /// Insert a new insight. A unique violation means another writer got
    /// there first: return its row instead.
    async fn insert_or_reread(
        &self,
        tx: &mut dyn Transaction,
        insight: &Insight,
    ) -> Result<Insight, InsightError> {
        let category = &insight.category;
        match tx.insert_insight(insight).await {
            Ok(()) => {
                info!(
                    category = %category,
                    insight_id = %insight.id,
                    next_update = %insight.next_update,
                    "Insight created"
                );
                Ok(insight.clone())
            }
            Err(DatabaseError::UniqueViolation { target }) => {
                warn!(category = %category, "Lost insight create race, re-reading winner");
                match tx.find_insight(category).await? {
                    Some(winner) => Ok(winner),
                    None => Err(DatabaseError::UniqueViolation { target }.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn generate(&self, category: &Category) -> Result<GeneratedInsight, InsightError> {
        self.generator
            .generate(category)
            .await
            .map_err(|source| InsightError::Generation {
                category: category.to_string(),
                source,
            })
    }

    async fn claim(&self, category: &Category) -> OwnedMutexGuard<()> {
        let lock = {
            let mut claims = self.claims.lock().await;
            claims.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(claims.entry(category.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Regenerate an existing insight in place, keeping its id.
    pub async fn refresh(&self, category: &Category) -> Result<Insight, InsightError> {
        let current = self
            .db
            .find_insight(category)
            .await?
            .ok_or_else(|| InsightError::Missing(category.to_string()))?;
        self.refresh_existing(&current, Utc::now()).await
    }

    pub async fn refresh_if_stale(
        &self,
        category: &Category,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, InsightError> {
        let Some(current) = self.db.find_insight(category).await? else {
            return Ok(RefreshOutcome::Missing);
        };
        if !current.is_stale(now) {
            return Ok(RefreshOutcome::Fresh(current));
        }
        let refreshed = self.refresh_existing(&current, now).await?;
        Ok(RefreshOutcome::Refreshed(refreshed))
    }

    /// Refresh every insight due at `now`, oldest first. One failure does not
    /// stop the sweep.
    pub async fn refresh_stale(&self, now: DateTime<Utc>) -> Result<RefreshReport, InsightError> {
        let stale = self.db.list_stale_insights(now).await?;
        info!(count = stale.len(), "Starting insight refresh sweep");

        let mut report = RefreshReport::default();
        for insight in &stale {
            match self.refresh_existing(insight, now).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    error!(category = %insight.category, error = %e, "Insight refresh failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            refreshed = report.refreshed,
            failed = report.failed,
            "Insight refresh sweep finished"
        );
        Ok(report)
    }

    async fn refresh_existing(
        &self,
        current: &Insight,
        now: DateTime<Utc>,
    ) -> Result<Insight, InsightError> {
        let generated = self.generate(&current.category).await?;
        let refreshed = current.refreshed(generated, now, self.config.ttl);

        let mut tx = self.db.begin().await?;
        if let Err(e) = tx.update_insight(&refreshed).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed refresh failed");
            }
            return Err(e.into());
        }
        tx.commit().await?;

        info!(
            category = %refreshed.category,
            next_update = %refreshed.next_update,
            "Insight refreshed"
        );
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::identity::IdentityId;
    use crate::insights::model::DemandLevel;
    use crate::profile::model::{Profile, ProfileUpdate};
    use crate::store::LibSqlBackend;
    use crate::testing::{StubGenerator, sample_insight};

    async fn setup(generator: StubGenerator) -> (Arc<LibSqlBackend>, Arc<StubGenerator>, InsightStore) {
        let db = Arc::new(LibSqlBackend::new_temporary().await.unwrap());
        let generator = Arc::new(generator);
        let store = InsightStore::new(db.clone(), generator.clone(), InsightConfig::default());
        (db, generator, store)
    }

    fn category(raw: &str) -> Category {
        Category::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (db, generator, store) = setup(StubGenerator::new()).await;

        let before = Utc::now();
        let first = store.get_or_create(&category("tech-software")).await.unwrap();
        let second = store.get_or_create(&category("tech-software")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(generator.calls(), 1);
        assert_eq!(db.count_insights().await.unwrap(), 1);
        assert!(first.next_update >= before + chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn concurrent_get_or_create_creates_one_row() {
        let (db, generator, store) =
            setup(StubGenerator::new().with_delay(Duration::from_millis(20))).await;
        let store = Arc::new(store);

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            async move { store.get_or_create(&category("finance")).await }
        });
        let results = futures::future::join_all(tasks).await;

        let ids: Vec<Uuid> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(db.count_insights().await.unwrap(), 1);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn distinct_categories_generate_in_parallel() {
        let delay = Duration::from_millis(200);
        let (db, generator, store) = setup(StubGenerator::new().with_delay(delay)).await;

        let started = tokio::time::Instant::now();
        let (finance_category, retail_category) = (category("finance"), category("retail"));
        let (finance, retail) = tokio::join!(
            store.get_or_create(&finance_category),
            store.get_or_create(&retail_category),
        );
        finance.unwrap();
        retail.unwrap();

        assert!(started.elapsed() < delay * 2);
        assert_eq!(generator.calls(), 2);
        assert_eq!(db.count_insights().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn prepare_generates_without_writing() {
        let (db, generator, store) = setup(StubGenerator::new()).await;

        let prepared = store.prepare(&category("finance")).await.unwrap();
        assert!(prepared.is_generated());
        assert_eq!(generator.calls(), 1);
        assert_eq!(db.count_insights().await.unwrap(), 0);

        let mut tx = db.begin().await.unwrap();
        let stored = store.store_in(&mut *tx, &prepared).await.unwrap();
        tx.commit().await.unwrap();
        drop(prepared);

        let again = store.prepare(&category("finance")).await.unwrap();
        assert!(!again.is_generated());
        assert_eq!(store.find(&category("finance")).await.unwrap().unwrap().id, stored.id);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn store_in_keeps_row_written_after_prepare() {
        let (db, _, store) = setup(StubGenerator::new()).await;
        let prepared = store.prepare(&category("finance")).await.unwrap();

        let existing = sample_insight("finance");
        let mut tx = db.begin().await.unwrap();
        tx.insert_insight(&existing).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let stored = store.store_in(&mut *tx, &prepared).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stored.id, existing.id);
        assert_eq!(db.count_insights().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn generator_failure_writes_nothing() {
        let (db, _, store) = setup(StubGenerator::failing()).await;

        let err = store.get_or_create(&category("finance")).await.unwrap_err();
        assert!(matches!(err, InsightError::Generation { ref category, .. } if category == "finance"));
        assert_eq!(db.count_insights().await.unwrap(), 0);
    }

    /// Transaction that hides a concurrently committed row until our own
    /// insert has collided with it.
    struct LostRaceTx {
        winner: Option<Insight>,
        insert_attempted: bool,
    }

    #[async_trait]
    impl Transaction for LostRaceTx {
        async fn find_profile(&mut self, _: &IdentityId) -> Result<Option<Profile>, DatabaseError> {
            unimplemented!()
        }

        async fn find_profile_by_id(&mut self, _: Uuid) -> Result<Option<Profile>, DatabaseError> {
            unimplemented!()
        }

        async fn find_insight(&mut self, _: &Category) -> Result<Option<Insight>, DatabaseError> {
            Ok(if self.insert_attempted {
                self.winner.clone()
            } else {
                None
            })
        }

        async fn insert_insight(&mut self, _: &Insight) -> Result<(), DatabaseError> {
            self.insert_attempted = true;
            Err(DatabaseError::UniqueViolation {
                target: "industry_insights.category".to_string(),
            })
        }

        async fn update_insight(&mut self, _: &Insight) -> Result<(), DatabaseError> {
            unimplemented!()
        }

        async fn update_profile(
            &mut self,
            _: Uuid,
            _: &ProfileUpdate,
            _: DateTime<Utc>,
        ) -> Result<(), DatabaseError> {
            unimplemented!()
        }

        async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lost_race_returns_winner() {
        let (_, generator, store) = setup(StubGenerator::new()).await;
        let winner = sample_insight("finance");
        let mut tx = LostRaceTx {
            winner: Some(winner.clone()),
            insert_attempted: false,
        };

        let insight = store.get_or_create_in(&mut tx, &category("finance")).await.unwrap();
        assert_eq!(insight.id, winner.id);
        assert!(tx.insert_attempted);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn lost_race_without_winner_surfaces_violation() {
        let (_, _, store) = setup(StubGenerator::new()).await;
        let mut tx = LostRaceTx {
            winner: None,
            insert_attempted: false,
        };

        let err = store
            .get_or_create_in(&mut tx, &category("finance"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InsightError::Database(DatabaseError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_keeps_id_and_moves_next_update() {
        let (_, generator, store) =
            setup(StubGenerator::new().with_demand_level(DemandLevel::Low)).await;
        let created = store.get_or_create(&category("finance")).await.unwrap();

        let refreshed = store.refresh(&category("finance")).await.unwrap();
        assert_eq!(refreshed.id, created.id);
        assert!(refreshed.next_update >= created.next_update);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_missing_category() {
        let (_, generator, store) = setup(StubGenerator::new()).await;
        let err = store.refresh(&category("unknown")).await.unwrap_err();
        assert!(matches!(err, InsightError::Missing(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_if_stale_outcomes() {
        let (_, generator, store) = setup(StubGenerator::new()).await;
        let now = Utc::now();

        assert_eq!(
            store.refresh_if_stale(&category("finance"), now).await.unwrap(),
            RefreshOutcome::Missing
        );

        let created = store.get_or_create(&category("finance")).await.unwrap();
        match store.refresh_if_stale(&category("finance"), now).await.unwrap() {
            RefreshOutcome::Fresh(insight) => assert_eq!(insight.id, created.id),
            other => panic!("expected Fresh, got {other:?}"),
        }

        let later = created.next_update + chrono::Duration::seconds(1);
        match store.refresh_if_stale(&category("finance"), later).await.unwrap() {
            RefreshOutcome::Refreshed(insight) => {
                assert_eq!(insight.id, created.id);
                assert_eq!(insight.last_updated, later);
                assert_eq!(insight.next_update, later + chrono::Duration::days(7));
            }
            other => panic!("expected Refreshed, got {other:?}"),
        }
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_stale_only_touches_due_insights() {
        let (db, generator, store) = setup(StubGenerator::new()).await;
        let now = Utc::now();

        let mut due = sample_insight("due");
        due.next_update = now - chrono::Duration::hours(1);
        let fresh = sample_insight("fresh");
        let mut tx = db.begin().await.unwrap();
        tx.insert_insight(&due).await.unwrap();
        tx.insert_insight(&fresh).await.unwrap();
        tx.commit().await.unwrap();

        let report = store.refresh_stale(now).await.unwrap();
        assert_eq!(report, RefreshReport { refreshed: 1, failed: 0 });
        assert_eq!(generator.calls(), 1);

        let due_after = store.find(&category("due")).await.unwrap().unwrap();
        assert!(due_after.next_update > now);
        let fresh_after = store.find(&category("fresh")).await.unwrap().unwrap();
        assert_eq!(fresh_after.last_updated.timestamp(), fresh.last_updated.timestamp());

        assert!(db.list_stale_insights(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_stale_counts_failures() {
        let (db, _, store) = setup(StubGenerator::failing()).await;
        let now = Utc::now();

        let mut due = sample_insight("due");
        due.next_update = now - chrono::Duration::hours(1);
        let mut tx = db.begin().await.unwrap();
        tx.insert_insight(&due).await.unwrap();
        tx.commit().await.unwrap();

        let report = store.refresh_stale(now).await.unwrap();
        assert_eq!(report, RefreshReport { refreshed: 0, failed: 1 });
        assert_eq!(db.list_stale_insights(now).await.unwrap().len(), 1);
    }
}
