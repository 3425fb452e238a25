//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite persistence for conversation sessions, chat messages and the
//! local case store:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - Version-tracked migrations (`PRAGMA user_version`)
//! - WAL mode for concurrent readers during writes

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::ModerationVerdict;
use crate::copilot::ambiguity::ActiveCase;
use crate::copilot::bridge::NewCaseRequest;
use crate::copilot::reply::FormSuggestion;
use crate::copilot::snapshot::ContextSnapshot;
use crate::types::{FairError, Result, ResultExt, SessionId, ValidationError, ValidationErrorKind};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 2;

/// Migration definitions
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "Add supplementary case fields",
    up: "ALTER TABLE cases ADD COLUMN opposing_party TEXT;
         ALTER TABLE cases ADD COLUMN amount_in_dispute TEXT",
}];

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: String,
    pub case_id: Option<String>,
    pub context_snapshot: ContextSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAuthor {
    User,
    Assistant,
}

impl MessageAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Moderation outcome recorded on a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationMeta {
    pub flagged: bool,
    pub blocked: bool,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl From<&ModerationVerdict> for ModerationMeta {
    fn from(verdict: &ModerationVerdict) -> Self {
        Self {
            flagged: verdict.flagged,
            blocked: verdict.blocked,
            categories: verdict.categories.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation: Option<ModerationMeta>,
    /// Stream ended before the model finished
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_suggestion: Option<FormSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub session_id: SessionId,
    pub author: MessageAuthor,
    pub content: String,
    pub meta: MessageMeta,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub author: MessageAuthor,
    pub content: String,
    pub meta: MessageMeta,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            author: MessageAuthor::User,
            content: content.into(),
            meta: MessageMeta::default(),
        }
    }

    pub fn assistant(content: impl Into<String>, meta: MessageMeta) -> Self {
        Self {
            author: MessageAuthor::Assistant,
            content: content.into(),
            meta,
        }
    }
}

/// Newest-first page of messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<StoredMessage>,
    /// Cursor for the next (older) page
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub case_type: String,
    pub jurisdiction: String,
    pub case_number: Option<String>,
    pub hearing_date: Option<String>,
    pub opposing_party: Option<String>,
    pub amount_in_dispute: Option<String>,
    pub description: String,
    pub status: String,
    pub created_at: String,
}

// =============================================================================
// Pool
// =============================================================================

/// Connection pool configuration
///
/// Pool size is dynamically calculated based on CPU cores.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    const MIN_POOL_SIZE: u32 = 4;
    const MAX_POOL_SIZE: u32 = 32;
    const POOL_SIZE_MULTIPLIER: f32 = 2.0;

    /// clamp(cores * 2, MIN, MAX)
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        let calculated = (cores as f32 * Self::POOL_SIZE_MULTIPLIER) as u32;
        calculated.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(2),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (creating parent directories) and initialize the database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Self::open_with_config(path, PoolConfig::default())?;
        db.initialize()?;
        Ok(db)
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(config.connection_timeout_secs))
            .build(manager)
            .map_err(|e| FairError::Storage(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Open an initialized in-memory database (tests, one-shot CLI turns).
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| FairError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA wal_autocheckpoint = 1000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            FairError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Create tables on a fresh database, migrate an existing one.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(SCHEMA)
                .with_context("Failed to initialize database schema")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to set schema version")?;
            debug!(version = SCHEMA_VERSION, "Initialized database schema");
            return Ok(());
        }

        drop(conn);
        self.migrate(current_version)
    }

    fn migrate(&self, current_version: u32) -> Result<()> {
        let conn = self.conn()?;

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                info!(
                    "Applied migration {}: {}",
                    migration.version, migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }

    /// Get a raw connection for advanced operations.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.conn()
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// If the closure errors or panics, the transaction is rolled back and
    /// an error is returned instead of poisoning the connection pool.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());

                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(FairError::Storage(format!("Transaction panicked: {}", panic_msg)))
            }
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn create_session(
        &self,
        user_id: &str,
        case_id: Option<&str>,
        snapshot: &ContextSnapshot,
    ) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            id: SessionId::generate(),
            user_id: user_id.to_string(),
            case_id: case_id.map(str::to_string),
            context_snapshot: snapshot.clone(),
            created_at: now,
            updated_at: now,
            archived: false,
        };

        self.conn()?
            .execute(
                "INSERT INTO conversation_sessions
                 (id, user_id, case_id, context_snapshot, created_at, updated_at, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)",
                params![
                    record.id.as_str(),
                    record.user_id,
                    record.case_id,
                    serde_json::to_string(&snapshot.to_stored()?)?,
                    now.to_rfc3339(),
                ],
            )
            .with_context("Failed to create session")?;

        debug!(session_id = %record.id, user_id, "Created conversation session");
        Ok(record)
    }

    pub fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, user_id, case_id, context_snapshot, created_at, updated_at, archived
                 FROM conversation_sessions WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, bool>(6)?,
                    ))
                },
            )
            .optional()
            .with_context("Failed to load session")?;

        let Some((id, user_id, case_id, snapshot, created_at, updated_at, archived)) = row else {
            return Ok(None);
        };

        let stored: serde_json::Value = serde_json::from_str(&snapshot)?;
        Ok(Some(SessionRecord {
            id: SessionId::new(id),
            user_id,
            case_id,
            context_snapshot: ContextSnapshot::from_stored(&stored)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            archived,
        }))
    }

    /// Load a session owned by `user_id`. Other users' sessions are reported
    /// as not found.
    pub fn get_session_for_user(&self, id: &SessionId, user_id: &str) -> Result<SessionRecord> {
        match self.get_session(id)? {
            Some(session) if session.user_id == user_id => Ok(session),
            Some(_) => {
                warn!(session_id = %id, "Session requested by a different user");
                Err(FairError::SessionNotFound(id.to_string()))
            }
            None => Err(FairError::SessionNotFound(id.to_string())),
        }
    }

    pub fn update_snapshot(&self, id: &SessionId, snapshot: &ContextSnapshot) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE conversation_sessions SET context_snapshot = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&snapshot.to_stored()?)?,
                    Utc::now().to_rfc3339(),
                    id.as_str()
                ],
            )
            .with_context("Failed to update session snapshot")?;

        if updated == 0 {
            return Err(FairError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn link_case(&self, id: &SessionId, case_id: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE conversation_sessions SET case_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![case_id, Utc::now().to_rfc3339(), id.as_str()],
            )
            .with_context("Failed to link case to session")?;
        Ok(())
    }

    /// Soft delete: the session and its history stay readable but accept no
    /// further turns.
    pub fn archive_session(&self, id: &SessionId) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE conversation_sessions SET archived = 1, updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id.as_str()],
            )
            .with_context("Failed to archive session")?;
        if updated == 0 {
            return Err(FairError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Append messages and touch the session in one transaction.
    pub fn append_messages(
        &self,
        session_id: &SessionId,
        messages: &[NewMessage],
    ) -> Result<Vec<StoredMessage>> {
        self.transaction(|conn| {
            let mut stored = Vec::with_capacity(messages.len());

            for message in messages {
                let now = Utc::now();
                let record = StoredMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    session_id: session_id.clone(),
                    author: message.author,
                    content: message.content.clone(),
                    meta: message.meta.clone(),
                    created_at: now,
                };

                conn.execute(
                    "INSERT INTO chat_messages (id, session_id, author, content, meta, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.id,
                        session_id.as_str(),
                        record.author.as_str(),
                        record.content,
                        serde_json::to_string(&record.meta)?,
                        now.to_rfc3339(),
                    ],
                )
                .with_context("Failed to append message")?;

                stored.push(record);
            }

            let touched = conn
                .execute(
                    "UPDATE conversation_sessions SET updated_at = ?1 WHERE id = ?2",
                    params![Utc::now().to_rfc3339(), session_id.as_str()],
                )
                .with_context("Failed to touch session")?;
            if touched == 0 {
                return Err(FairError::SessionNotFound(session_id.to_string()));
            }

            Ok(stored)
        })
    }

    /// Newest-first page, starting strictly before the `before` message id.
    pub fn list_messages(
        &self,
        session_id: &SessionId,
        limit: usize,
        before: Option<&str>,
    ) -> Result<MessagePage> {
        let conn = self.conn()?;

        let before_seq: i64 = match before {
            Some(cursor) => conn
                .query_row(
                    "SELECT seq FROM chat_messages WHERE id = ?1 AND session_id = ?2",
                    params![cursor, session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .with_context("Failed to resolve message cursor")?
                .ok_or_else(|| {
                    FairError::from(
                        ValidationError::new(ValidationErrorKind::Format, "Unknown message cursor")
                            .with_field("before"),
                    )
                })?,
            None => i64::MAX,
        };

        let mut stmt = conn.prepare(
            "SELECT id, session_id, author, content, meta, created_at
             FROM chat_messages
             WHERE session_id = ?1 AND seq < ?2
             ORDER BY seq DESC
             LIMIT ?3",
        )?;

        let mut messages = stmt
            .query_map(
                params![session_id.as_str(), before_seq, (limit + 1) as i64],
                message_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let next_before = if messages.len() > limit {
            messages.truncate(limit);
            messages.last().map(|m| m.id.clone())
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_before,
        })
    }

    /// The last `limit` messages, oldest first (prompt replay order).
    pub fn recent_messages(&self, session_id: &SessionId, limit: usize) -> Result<Vec<StoredMessage>> {
        let mut page = self.list_messages(session_id, limit, None)?;
        page.messages.reverse();
        Ok(page.messages)
    }

    /// The last `limit` user-authored message bodies, oldest first.
    pub fn recent_user_messages(&self, session_id: &SessionId, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT content FROM chat_messages
             WHERE session_id = ?1 AND author = 'user'
             ORDER BY seq DESC LIMIT ?2",
        )?;
        let mut contents = stmt
            .query_map(params![session_id.as_str(), limit as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        contents.reverse();
        Ok(contents)
    }

    // =========================================================================
    // Cases
    // =========================================================================

    pub fn insert_case(&self, request: &NewCaseRequest) -> Result<CaseRecord> {
        let record = CaseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            title: request.title.clone(),
            case_type: request.case_type.as_str().to_string(),
            jurisdiction: request.jurisdiction.clone(),
            case_number: request.case_number.clone(),
            hearing_date: request.hearing_date.clone(),
            opposing_party: request.opposing_party.clone(),
            amount_in_dispute: request.amount_in_dispute.clone(),
            description: request.description.clone(),
            status: "active".to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.conn()?
            .execute(
                "INSERT INTO cases
                 (id, user_id, title, case_type, jurisdiction, case_number, hearing_date,
                  opposing_party, amount_in_dispute, description, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.user_id,
                    record.title,
                    record.case_type,
                    record.jurisdiction,
                    record.case_number,
                    record.hearing_date,
                    record.opposing_party,
                    record.amount_in_dispute,
                    record.description,
                    record.status,
                    record.created_at,
                ],
            )
            .with_context("Failed to insert case")?;

        Ok(record)
    }

    pub fn get_case(&self, id: &str) -> Result<Option<CaseRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, user_id, title, case_type, jurisdiction, case_number, hearing_date,
                    opposing_party, amount_in_dispute, description, status, created_at
             FROM cases WHERE id = ?1",
            params![id],
            case_from_row,
        )
        .optional()
        .with_context("Failed to load case")
    }

    pub fn list_active_cases(&self, user_id: &str) -> Result<Vec<ActiveCase>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, case_number FROM cases
             WHERE user_id = ?1 AND status = 'active'
             ORDER BY created_at",
        )?;
        let cases = stmt
            .query_map(params![user_id], |row| {
                Ok(ActiveCase {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    case_number: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cases)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let author: String = row.get(2)?;
    let meta: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: SessionId::new(row.get::<_, String>(1)?),
        author: MessageAuthor::parse(&author).unwrap_or(MessageAuthor::Assistant),
        content: row.get(3)?,
        meta: serde_json::from_str(&meta).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
    })
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<CaseRecord> {
    Ok(CaseRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        case_type: row.get(3)?,
        jurisdiction: row.get(4)?,
        case_number: row.get(5)?,
        hearing_date: row.get(6)?,
        opposing_party: row.get(7)?,
        amount_in_dispute: row.get(8)?,
        description: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(value = s, error = %e, "Unparseable stored timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copilot::collected::{CaseType, CollectedInfo};
    use crate::copilot::stage::ConversationStage;
    use tempfile::TempDir;

    fn db() -> Database {
        Database::open_in_memory().expect("Failed to open in-memory database")
    }

    #[test]
    fn test_schema_tables() {
        let db = db();
        let conn = db.connection().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"conversation_sessions".to_string()));
        assert!(tables.contains(&"chat_messages".to_string()));
        assert!(tables.contains(&"cases".to_string()));
    }

    #[test]
    fn test_session_round_trip() {
        let db = db();
        let snapshot = ContextSnapshot {
            conversation_stage: ConversationStage::GatherMin,
            collected_info: CollectedInfo {
                case_type: Some(CaseType::Eviction),
                ..Default::default()
            },
            ..Default::default()
        };

        let created = db.create_session("user-1", None, &snapshot).unwrap();
        let loaded = db.get_session_for_user(&created.id, "user-1").unwrap();
        assert_eq!(loaded.context_snapshot, snapshot);
        assert_eq!(loaded.case_id, None);

        let err = db.get_session_for_user(&created.id, "user-2").unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");

        let missing = db.get_session(&SessionId::new("nope")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_snapshot_and_link_case() {
        let db = db();
        let session = db.create_session("u", None, &ContextSnapshot::default()).unwrap();

        let mut snapshot = ContextSnapshot::default();
        snapshot.conversation_stage = ConversationStage::ConfirmCreate;
        db.update_snapshot(&session.id, &snapshot).unwrap();
        db.link_case(&session.id, "case-1").unwrap();

        let loaded = db.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.context_snapshot.conversation_stage, ConversationStage::ConfirmCreate);
        assert_eq!(loaded.case_id.as_deref(), Some("case-1"));

        let err = db
            .update_snapshot(&SessionId::new("missing"), &snapshot)
            .unwrap_err();
        assert!(matches!(err, FairError::SessionNotFound(_)));
    }

    #[test]
    fn test_archive_session() {
        let db = db();
        let session = db.create_session("u", None, &ContextSnapshot::default()).unwrap();

        db.archive_session(&session.id).unwrap();
        assert!(db.get_session(&session.id).unwrap().unwrap().archived);

        let err = db.archive_session(&SessionId::new("missing")).unwrap_err();
        assert!(matches!(err, FairError::SessionNotFound(_)));
    }

    #[test]
    fn test_message_pagination_newest_first() {
        let db = db();
        let session = db.create_session("u", None, &ContextSnapshot::default()).unwrap();

        let batch: Vec<NewMessage> = (0..5).map(|i| NewMessage::user(format!("m{i}"))).collect();
        db.append_messages(&session.id, &batch).unwrap();

        let page = db.list_messages(&session.id, 2, None).unwrap();
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3"]);

        let cursor = page.next_before.unwrap();
        let page = db.list_messages(&session.id, 2, Some(&cursor)).unwrap();
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m1"]);

        let cursor = page.next_before.unwrap();
        let page = db.list_messages(&session.id, 2, Some(&cursor)).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(page.next_before.is_none());

        let recent = db.recent_messages(&session.id, 3).unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_unknown_cursor_is_validation_error() {
        let db = db();
        let session = db.create_session("u", None, &ContextSnapshot::default()).unwrap();
        let err = db.list_messages(&session.id, 10, Some("bogus")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_assistant_meta_persisted() {
        let db = db();
        let session = db.create_session("u", None, &ContextSnapshot::default()).unwrap();
        let meta = MessageMeta {
            tokens: Some(42),
            partial: true,
            moderation: Some(ModerationMeta {
                flagged: true,
                blocked: true,
                categories: vec!["violence".into()],
            }),
            ..Default::default()
        };
        db.append_messages(
            &session.id,
            &[NewMessage::user("hi"), NewMessage::assistant("partial reply", meta.clone())],
        )
        .unwrap();

        let page = db.list_messages(&session.id, 10, None).unwrap();
        assert_eq!(page.messages[0].author, MessageAuthor::Assistant);
        assert_eq!(page.messages[0].meta, meta);
        assert_eq!(db.recent_user_messages(&session.id, 3).unwrap(), vec!["hi"]);
    }

    #[test]
    fn test_append_to_missing_session_rolls_back() {
        let db = db();
        let err = db
            .append_messages(&SessionId::new("ghost"), &[NewMessage::user("hi")])
            .unwrap_err();
        // Foreign key or missing-session check, either way nothing is stored.
        assert!(matches!(err, FairError::Storage(_) | FairError::SessionNotFound(_)));
        let count: i64 = db
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cases_and_active_list() {
        let db = db();
        let request = NewCaseRequest {
            user_id: "u".into(),
            title: "Eviction - Marion County".into(),
            case_type: CaseType::Eviction,
            jurisdiction: "Marion County".into(),
            case_number: None,
            hearing_date: Some("2025-11-03".into()),
            opposing_party: None,
            amount_in_dispute: None,
            description: "notice".into(),
        };
        let created = db.insert_case(&request).unwrap();
        let loaded = db.get_case(&created.id).unwrap().unwrap();
        assert_eq!(loaded, created);

        let active = db.list_active_cases("u").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Eviction - Marion County");
        assert!(db.list_active_cases("other").unwrap().is_empty());
    }

    #[test]
    fn test_transaction_panic_safety() {
        let db = db();
        let result: Result<()> = db.transaction(|_conn| panic!("Intentional panic for testing"));
        assert!(result.is_err());
        // Pool still usable
        assert!(db.create_session("u", None, &ContextSnapshot::default()).is_ok());
    }

    #[test]
    fn test_migrates_old_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE cases (
                    id TEXT PRIMARY KEY, user_id TEXT NOT NULL, title TEXT NOT NULL,
                    case_type TEXT NOT NULL, jurisdiction TEXT NOT NULL, case_number TEXT,
                    hearing_date TEXT, description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'active', created_at TEXT NOT NULL);
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let version: u32 = db
            .connection()
            .unwrap()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let columns: Vec<String> = db
            .connection()
            .unwrap()
            .prepare("SELECT name FROM pragma_table_info('cases')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(columns.contains(&"opposing_party".to_string()));
    }
}
