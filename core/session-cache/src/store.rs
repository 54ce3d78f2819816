//! SQLite persistence for validator session records.
//!
//! One row per canonical key in `validator_sessions`. Every operation opens its
//! own connection, so a `SessionStore` can be cloned freely across threads and
//! several processes can share the same database file.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::context::{SuiteOptionSet, ValidationContext, ValidatorSessionRecord};
use crate::error::{CacheError, Result};
use crate::key::{canonicalize, CanonicalKey};

/// Result of [`SessionStore::upsert`]; informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the context.
    Inserted,
    /// A record with the same session id already existed; nothing was written.
    Unchanged,
    /// A record with a different session id was overwritten.
    Replaced { previous: String },
}

/// Result of [`SessionStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The context already had a session; the store was left untouched.
    Existing(String),
}

impl InsertOutcome {
    /// The session id the store holds after the call.
    pub fn retained_id<'a>(&'a self, offered: &'a str) -> &'a str {
        match self {
            InsertOutcome::Inserted => offered,
            InsertOutcome::Existing(id) => id,
        }
    }
}

/// A record as read back from the store, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSession {
    #[serde(serialize_with = "serialize_key")]
    pub canonical_key: CanonicalKey,
    #[serde(flatten)]
    pub record: ValidatorSessionRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn serialize_key<S: serde::Serializer>(
    key: &CanonicalKey,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(key.as_str())
}

/// Row as it sits in SQLite, before validation.
struct RawRow {
    canonical_key: String,
    validator_session_id: String,
    test_suite_id: String,
    validator_name: String,
    suite_options: String,
    created_at: String,
    updated_at: String,
}

const SELECT_COLUMNS: &str = "SELECT canonical_key, validator_session_id, test_suite_id, \
                              validator_name, suite_options, created_at, updated_at \
                              FROM validator_sessions";

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    config: StoreConfig,
}

impl SessionStore {
    /// Opens (creating if needed) the database at `path` with default settings.
    pub fn new(path: PathBuf) -> Result<Self> {
        let config = StoreConfig::at_path(path.clone());
        Self::init(path, config)
    }

    /// Opens the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.resolved_path()?;
        Self::init(path, config.clone())
    }

    fn init(path: PathBuf, config: StoreConfig) -> Result<Self> {
        let store = Self { path, config };
        store.init_schema()?;
        info!(path = %store.path.display(), "Validator session store opened");
        Ok(store)
    }

    /// Inserts the record or replaces the one stored for the same context.
    pub fn upsert(&self, record: &ValidatorSessionRecord) -> Result<UpsertOutcome> {
        let key = canonicalize(&record.context)?;
        let suite_options = encode_options(&key, &record.context.suite_options)?;

        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| CacheError::storage("Failed to begin upsert", err))?;

            let previous: Option<String> = tx
                .query_row(
                    "SELECT validator_session_id FROM validator_sessions WHERE canonical_key = ?1",
                    params![key.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| CacheError::storage("Failed to read existing session", err))?;

            let outcome = match previous {
                None => UpsertOutcome::Inserted,
                Some(previous) if previous == record.validator_session_id => {
                    UpsertOutcome::Unchanged
                }
                Some(previous) => UpsertOutcome::Replaced { previous },
            };

            if outcome != UpsertOutcome::Unchanged {
                let now = Utc::now().to_rfc3339();
                tx.execute(
                    "INSERT INTO validator_sessions \
                        (canonical_key, validator_session_id, test_suite_id, validator_name, suite_options, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
                     ON CONFLICT(canonical_key) DO UPDATE SET \
                        validator_session_id = excluded.validator_session_id, \
                        test_suite_id = excluded.test_suite_id, \
                        validator_name = excluded.validator_name, \
                        suite_options = excluded.suite_options, \
                        updated_at = excluded.updated_at",
                    params![
                        key.as_str(),
                        record.validator_session_id,
                        record.context.test_suite_id,
                        record.context.validator_name,
                        suite_options,
                        now
                    ],
                )
                .map_err(|err| CacheError::storage("Failed to upsert validator session", err))?;
            }

            tx.commit()
                .map_err(|err| CacheError::storage("Failed to commit upsert", err))?;

            debug!(
                canonical_key = %key,
                validator_session_id = %record.validator_session_id,
                outcome = ?outcome,
                "Validator session upserted"
            );
            Ok(outcome)
        })
    }

    /// Inserts the record only when its context has no session yet.
    pub fn insert_if_absent(&self, record: &ValidatorSessionRecord) -> Result<InsertOutcome> {
        let key = canonicalize(&record.context)?;
        let suite_options = encode_options(&key, &record.context.suite_options)?;

        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| CacheError::storage("Failed to begin conditional insert", err))?;

            let now = Utc::now().to_rfc3339();
            let inserted = tx
                .execute(
                    "INSERT INTO validator_sessions \
                        (canonical_key, validator_session_id, test_suite_id, validator_name, suite_options, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
                     ON CONFLICT(canonical_key) DO NOTHING",
                    params![
                        key.as_str(),
                        record.validator_session_id,
                        record.context.test_suite_id,
                        record.context.validator_name,
                        suite_options,
                        now
                    ],
                )
                .map_err(|err| CacheError::storage("Failed to insert validator session", err))?;

            let outcome = if inserted > 0 {
                InsertOutcome::Inserted
            } else {
                let existing: String = tx
                    .query_row(
                        "SELECT validator_session_id FROM validator_sessions WHERE canonical_key = ?1",
                        params![key.as_str()],
                        |row| row.get(0),
                    )
                    .map_err(|err| CacheError::storage("Failed to read existing session", err))?;
                InsertOutcome::Existing(existing)
            };

            tx.commit()
                .map_err(|err| CacheError::storage("Failed to commit conditional insert", err))?;

            debug!(
                canonical_key = %key,
                validator_session_id = %record.validator_session_id,
                outcome = ?outcome,
                "Conditional validator session insert"
            );
            Ok(outcome)
        })
    }

    /// Returns the session id stored for `ctx`, if any.
    pub fn lookup(&self, ctx: &ValidationContext) -> Result<Option<String>> {
        let key = canonicalize(ctx)?;
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT validator_session_id FROM validator_sessions WHERE canonical_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| CacheError::storage("Failed to query validator session", err))
        })
    }

    /// Full stored row for `ctx`, including timestamps.
    pub fn get(&self, ctx: &ValidationContext) -> Result<Option<StoredSession>> {
        let key = canonicalize(ctx)?;
        let raw = self.with_connection(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE canonical_key = ?1"),
                params![key.as_str()],
                read_raw_row,
            )
            .optional()
            .map_err(|err| CacheError::storage("Failed to query validator session", err))
        })?;
        raw.map(decode_row).transpose()
    }

    /// All stored sessions in first-insertion order.
    pub fn list(&self) -> Result<Vec<StoredSession>> {
        let raw_rows = self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!("{SELECT_COLUMNS} ORDER BY rowid ASC"))
                .map_err(|err| CacheError::storage("Failed to prepare session listing", err))?;
            let rows = stmt
                .query_map([], read_raw_row)
                .map_err(|err| CacheError::storage("Failed to read session rows", err))?;

            let mut raw_rows = Vec::new();
            for row in rows {
                raw_rows.push(
                    row.map_err(|err| CacheError::storage("Failed to decode session row", err))?,
                );
            }
            Ok(raw_rows)
        })?;

        raw_rows.into_iter().map(decode_row).collect()
    }

    pub fn count(&self) -> Result<u64> {
        let count = self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM validator_sessions", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|err| CacheError::storage("Failed to count validator sessions", err))
        })?;
        Ok(count.max(0) as u64)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS validator_sessions (
                    canonical_key TEXT PRIMARY KEY,
                    validator_session_id TEXT NOT NULL,
                    test_suite_id TEXT NOT NULL,
                    validator_name TEXT NOT NULL,
                    suite_options TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 COMMIT;",
            )
            .map_err(|err| CacheError::storage("Failed to initialize schema", err))
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.connect()?;
        op(&mut conn)
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)
                    .map_err(|err| CacheError::storage("Failed to create store directory", err))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| CacheError::storage("Failed to open sqlite db", err))?;

        conn.pragma_update(None, "busy_timeout", self.config.busy_timeout_ms as i64)
            .map_err(|err| CacheError::storage("Failed to set busy_timeout", err))?;
        conn.pragma_update(None, "journal_mode", self.config.journal_mode.pragma_value())
            .map_err(|err| CacheError::storage("Failed to set journal_mode", err))?;
        conn.pragma_update(None, "synchronous", self.config.synchronous.pragma_value())
            .map_err(|err| CacheError::storage("Failed to set synchronous", err))?;

        Ok(conn)
    }
}

fn encode_options(key: &CanonicalKey, options: &SuiteOptionSet) -> Result<String> {
    options.to_json().map_err(|err| CacheError::CorruptRecord {
        canonical_key: key.to_string(),
        details: format!("suite options not serializable: {err}"),
    })
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        canonical_key: row.get(0)?,
        validator_session_id: row.get(1)?,
        test_suite_id: row.get(2)?,
        validator_name: row.get(3)?,
        suite_options: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn decode_row(raw: RawRow) -> Result<StoredSession> {
    let corrupt = |details: String| CacheError::CorruptRecord {
        canonical_key: raw.canonical_key.clone(),
        details,
    };

    let suite_options = SuiteOptionSet::from_json(&raw.suite_options)
        .map_err(|err| corrupt(format!("suite_options: {err}")))?;
    let context = ValidationContext::new(
        raw.test_suite_id.clone(),
        raw.validator_name.clone(),
        suite_options,
    );
    let canonical_key = canonicalize(&context).map_err(|err| corrupt(err.to_string()))?;
    if canonical_key.as_str() != raw.canonical_key {
        return Err(corrupt("stored key does not match the row's context".to_string()));
    }

    let created_at = parse_rfc3339(&raw.created_at)
        .ok_or_else(|| corrupt(format!("created_at: {}", raw.created_at)))?;
    let updated_at = parse_rfc3339(&raw.updated_at)
        .ok_or_else(|| corrupt(format!("updated_at: {}", raw.updated_at)))?;

    Ok(StoredSession {
        canonical_key,
        record: ValidatorSessionRecord::new(context, raw.validator_session_id.clone()),
        created_at,
        updated_at,
    })
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
