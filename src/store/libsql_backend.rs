//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file databases and throwaway databases for tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, TransactionBehavior, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::identity::IdentityId;
use crate::insights::model::{Category, Insight};
use crate::profile::model::{Profile, ProfileUpdate};
use crate::store::migrations;
use crate::store::traits::{Database, Transaction};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// libSQL database backend.
///
/// Every read and every transaction gets its own connection. The file runs
/// in WAL mode, so reads never wait on an open transaction; writers queue on
/// SQLite's write lock for up to [`BUSY_TIMEOUT`].
pub struct LibSqlBackend {
    db: LibSqlDatabase,
    // Declared after `db` so the database closes before the directory goes.
    _temp_dir: Option<tempfile::TempDir>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let backend = Self::open(path, None).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create a database in a fresh temporary directory, removed on drop.
    ///
    /// `:memory:` is not an option: each connection to it sees its own
    /// empty database.
    pub async fn new_temporary() -> Result<Self, DatabaseError> {
        let dir = tempfile::tempdir().map_err(|e| {
            DatabaseError::Pool(format!("Failed to create temporary directory: {e}"))
        })?;
        let path = dir.path().join("career-insights.db");
        Self::open(&path, Some(dir)).await
    }

    async fn open(path: &Path, temp_dir: Option<tempfile::TempDir>) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self {
            db,
            _temp_dir: temp_dir,
        };
        let conn = backend.connect().await?;
        pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        migrations::run_migrations(&conn).await?;
        Ok(backend)
    }

    /// A new connection with foreign keys enforced and a busy timeout set.
    async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        pragma(&conn, "PRAGMA foreign_keys = ON").await?;
        pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT.as_millis()),
        )
        .await?;
        Ok(conn)
    }
}

/// Run a PRAGMA, discarding whatever rows it reports back.
async fn pragma(conn: &Connection, sql: &str) -> Result<(), DatabaseError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DatabaseError::Pool(format!("{sql}: {e}")))?;
    while rows
        .next()
        .await
        .map_err(|e| DatabaseError::Pool(format!("{sql}: {e}")))?
        .is_some()
    {}
    Ok(())
}

// ── Helper functions ────────────────────────────────────────────────

const SQLITE_CONSTRAINT: i32 = 19;

/// Map a libSQL error onto [`DatabaseError`], separating constraint
/// failures from everything else.
pub(crate) fn classify_libsql_error(context: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    let constraint = matches!(&e, libsql::Error::SqliteFailure(code, _) if code & 0xff == SQLITE_CONSTRAINT)
        || message.contains("constraint failed");

    if !constraint {
        return DatabaseError::Query(format!("{context}: {message}"));
    }

    if let Some((_, target)) = message.split_once("UNIQUE constraint failed:") {
        return DatabaseError::UniqueViolation {
            target: target
                .trim_matches(|c: char| c == '`' || c.is_whitespace())
                .to_string(),
        };
    }
    if message.contains("FOREIGN KEY constraint failed") {
        return DatabaseError::ForeignKeyViolation(format!("{context}: {message}"));
    }
    DatabaseError::Constraint(format!("{context}: {message}"))
}

/// Canonical timestamp format. Fixed width, so TEXT comparison orders by time.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("Failed to parse datetime '{s}': {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("Invalid JSON in {column}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::Serialization(format!("Invalid id '{raw}': {e}")))
}

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Serialization(format!("row parse: {e}"))
}

const PROFILE_COLUMNS: &str =
    "p.id, p.identity, p.category, p.experience_years, p.bio, p.skills, p.created_at, p.updated_at";

const INSIGHT_COLUMNS: &str = "i.id, i.category, i.salary_ranges, i.growth_rate, i.demand_level, i.top_skills, i.market_outlook, i.key_trends, i.recommended_skills, i.last_updated, i.next_update";

/// Map a row to a Profile. Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<Profile, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    let identity: String = row.get(1).map_err(row_err)?;
    let category: Option<String> = row.get(2).map_err(row_err)?;
    let experience_years: Option<i64> = row.get(3).map_err(row_err)?;
    let skills: String = row.get(5).map_err(row_err)?;
    let created_at: String = row.get(6).map_err(row_err)?;
    let updated_at: String = row.get(7).map_err(row_err)?;

    Ok(Profile {
        id: parse_uuid(&id)?,
        identity: IdentityId::new(identity.clone())
            .ok_or_else(|| DatabaseError::Serialization(format!("Blank identity on profile {id}")))?,
        category: category.as_deref().and_then(|c| Category::parse(c).ok()),
        experience_years: experience_years.and_then(|y| u32::try_from(y).ok()),
        bio: row.get(4).map_err(row_err)?,
        skills: from_json("profiles.skills", &skills)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Map a row to an Insight, starting at column `offset`.
/// Column order matches INSIGHT_COLUMNS.
fn row_to_insight(row: &libsql::Row, offset: i32) -> Result<Insight, DatabaseError> {
    let col = |i: i32| offset + i;
    let id: String = row.get(col(0)).map_err(row_err)?;
    let category: String = row.get(col(1)).map_err(row_err)?;
    let salary_ranges: String = row.get(col(2)).map_err(row_err)?;
    let demand_level: String = row.get(col(4)).map_err(row_err)?;
    let top_skills: String = row.get(col(5)).map_err(row_err)?;
    let market_outlook: String = row.get(col(6)).map_err(row_err)?;
    let key_trends: String = row.get(col(7)).map_err(row_err)?;
    let recommended_skills: String = row.get(col(8)).map_err(row_err)?;
    let last_updated: String = row.get(col(9)).map_err(row_err)?;
    let next_update: String = row.get(col(10)).map_err(row_err)?;

    Ok(Insight {
        id: parse_uuid(&id)?,
        category: Category::parse(&category)
            .map_err(|e| DatabaseError::Serialization(format!("insight {id}: {e}")))?,
        salary_ranges: from_json("industry_insights.salary_ranges", &salary_ranges)?,
        growth_rate: row.get(col(3)).map_err(row_err)?,
        demand_level: demand_level.parse().map_err(DatabaseError::Serialization)?,
        top_skills: from_json("industry_insights.top_skills", &top_skills)?,
        market_outlook: market_outlook.parse().map_err(DatabaseError::Serialization)?,
        key_trends: from_json("industry_insights.key_trends", &key_trends)?,
        recommended_skills: from_json("industry_insights.recommended_skills", &recommended_skills)?,
        last_updated: parse_datetime(&last_updated)?,
        next_update: parse_datetime(&next_update)?,
    })
}

// ── Queries shared by the backend and its transactions ─────────────

async fn query_profile(
    conn: &Connection,
    identity: &IdentityId,
) -> Result<Option<Profile>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.identity = ?1"),
            params![identity.as_str()],
        )
        .await
        .map_err(|e| classify_libsql_error("find_profile", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(classify_libsql_error("find_profile", e)),
    }
}

async fn query_profile_by_id(conn: &Connection, id: Uuid) -> Result<Option<Profile>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = ?1"),
            params![id.to_string()],
        )
        .await
        .map_err(|e| classify_libsql_error("find_profile_by_id", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(classify_libsql_error("find_profile_by_id", e)),
    }
}

async fn query_insight(
    conn: &Connection,
    category: &Category,
) -> Result<Option<Insight>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {INSIGHT_COLUMNS} FROM industry_insights i WHERE i.category = ?1"),
            params![category.as_str()],
        )
        .await
        .map_err(|e| classify_libsql_error("find_insight", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_insight(&row, 0)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(classify_libsql_error("find_insight", e)),
    }
}

async fn insert_insight_row(conn: &Connection, insight: &Insight) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO industry_insights (id, category, salary_ranges, growth_rate, demand_level, top_skills, market_outlook, key_trends, recommended_skills, last_updated, next_update) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            insight.id.to_string(),
            insight.category.as_str(),
            to_json(&insight.salary_ranges)?,
            insight.growth_rate,
            insight.demand_level.as_str(),
            to_json(&insight.top_skills)?,
            insight.market_outlook.as_str(),
            to_json(&insight.key_trends)?,
            to_json(&insight.recommended_skills)?,
            format_datetime(&insight.last_updated),
            format_datetime(&insight.next_update),
        ],
    )
    .await
    .map_err(|e| classify_libsql_error("insert_insight", e))?;

    debug!(insight_id = %insight.id, category = %insight.category, "Insight inserted into DB");
    Ok(())
}

async fn update_insight_row(conn: &Connection, insight: &Insight) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE industry_insights SET salary_ranges = ?1, growth_rate = ?2, demand_level = ?3, top_skills = ?4, market_outlook = ?5, key_trends = ?6, recommended_skills = ?7, last_updated = ?8, next_update = ?9 WHERE id = ?10",
            params![
                to_json(&insight.salary_ranges)?,
                insight.growth_rate,
                insight.demand_level.as_str(),
                to_json(&insight.top_skills)?,
                insight.market_outlook.as_str(),
                to_json(&insight.key_trends)?,
                to_json(&insight.recommended_skills)?,
                format_datetime(&insight.last_updated),
                format_datetime(&insight.next_update),
                insight.id.to_string(),
            ],
        )
        .await
        .map_err(|e| classify_libsql_error("update_insight", e))?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "insight".to_string(),
            id: insight.id.to_string(),
        });
    }
    debug!(insight_id = %insight.id, "Insight updated in DB");
    Ok(())
}

async fn update_profile_row(
    conn: &Connection,
    profile_id: Uuid,
    update: &ProfileUpdate,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE profiles SET category = ?1, experience_years = ?2, bio = ?3, skills = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                update.category.as_str(),
                update.experience_years.map(i64::from),
                update.bio.clone(),
                to_json(&update.skills)?,
                format_datetime(&now),
                profile_id.to_string(),
            ],
        )
        .await
        .map_err(|e| classify_libsql_error("update_profile", e))?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "profile".to_string(),
            id: profile_id.to_string(),
        });
    }
    debug!(profile_id = %profile_id, category = %update.category, "Profile updated in DB");
    Ok(())
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        migrations::run_migrations(&conn).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let conn = self.connect().await?;
        // IMMEDIATE takes the write lock up front; competing writers wait on
        // busy_timeout instead of failing at their first write.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;
        Ok(Box::new(LibSqlTransaction { tx }))
    }

    async fn create_profile(&self, identity: &IdentityId) -> Result<Profile, DatabaseError> {
        let conn = self.connect().await?;
        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            category: None,
            experience_years: None,
            bio: None,
            skills: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        conn
            .execute(
                "INSERT INTO profiles (id, identity, skills, created_at, updated_at) VALUES (?1, ?2, '[]', ?3, ?4)",
                params![
                    profile.id.to_string(),
                    identity.as_str(),
                    format_datetime(&now),
                    format_datetime(&now),
                ],
            )
            .await
            .map_err(|e| classify_libsql_error("create_profile", e))?;

        debug!(profile_id = %profile.id, identity = %identity, "Profile created");
        Ok(profile)
    }

    async fn find_profile(&self, identity: &IdentityId) -> Result<Option<Profile>, DatabaseError> {
        let conn = self.connect().await?;
        query_profile(&conn, identity).await
    }

    async fn find_profile_with_insight(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<(Profile, Option<Insight>)>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS}, {INSIGHT_COLUMNS} FROM profiles p
                     LEFT JOIN industry_insights i ON i.category = p.category
                     WHERE p.identity = ?1"
                ),
                params![identity.as_str()],
            )
            .await
            .map_err(|e| classify_libsql_error("find_profile_with_insight", e))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(classify_libsql_error("find_profile_with_insight", e)),
        };

        let profile = row_to_profile(&row)?;
        // Insight columns start after the 8 profile columns; NULL id means no match.
        let insight_id: Option<String> = row.get(8).map_err(row_err)?;
        let insight = match insight_id {
            Some(_) => Some(row_to_insight(&row, 8)?),
            None => None,
        };
        Ok(Some((profile, insight)))
    }

    async fn find_insight(&self, category: &Category) -> Result<Option<Insight>, DatabaseError> {
        let conn = self.connect().await?;
        query_insight(&conn, category).await
    }

    async fn list_stale_insights(&self, now: DateTime<Utc>) -> Result<Vec<Insight>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INSIGHT_COLUMNS} FROM industry_insights i WHERE i.next_update <= ?1 ORDER BY i.next_update ASC"
                ),
                params![format_datetime(&now)],
            )
            .await
            .map_err(|e| classify_libsql_error("list_stale_insights", e))?;

        let mut insights = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| classify_libsql_error("list_stale_insights", e))?
        {
            match row_to_insight(&row, 0) {
                Ok(insight) => insights.push(insight),
                Err(e) => warn!("Skipping insight row: {e}"),
            }
        }
        Ok(insights)
    }

    async fn count_insights(&self) -> Result<usize, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM industry_insights", ())
            .await
            .map_err(|e| classify_libsql_error("count_insights", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(row_err)?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(classify_libsql_error("count_insights", e)),
        }
    }
}

/// A transaction on its own connection. Dropping it without commit rolls
/// back.
struct LibSqlTransaction {
    tx: libsql::Transaction,
}

#[async_trait]
impl Transaction for LibSqlTransaction {
    async fn find_profile(
        &mut self,
        identity: &IdentityId,
    ) -> Result<Option<Profile>, DatabaseError> {
        query_profile(&self.tx, identity).await
    }

    async fn find_profile_by_id(&mut self, id: Uuid) -> Result<Option<Profile>, DatabaseError> {
        query_profile_by_id(&self.tx, id).await
    }

    async fn find_insight(&mut self, category: &Category) -> Result<Option<Insight>, DatabaseError> {
        query_insight(&self.tx, category).await
    }

    async fn insert_insight(&mut self, insight: &Insight) -> Result<(), DatabaseError> {
        // A failed statement only undoes itself in SQLite; the transaction
        // stays open for the caller's re-read.
        insert_insight_row(&self.tx, insight).await
    }

    async fn update_insight(&mut self, insight: &Insight) -> Result<(), DatabaseError> {
        update_insight_row(&self.tx, insight).await
    }

    async fn update_profile(
        &mut self,
        profile_id: Uuid,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        update_profile_row(&self.tx, profile_id, update, now).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .map_err(|e| classify_libsql_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("rollback: {e}")))
    }
}
