//! Session persistence — async `SessionStore` trait with libSQL and
//! in-memory backends, plus the per-user lock map that linearizes
//! read-modify-write turns.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{
    ConversationState, FlowData, Interaction, Location, OnboardingPhase, Session,
};

fn new_interaction(phone: &str, query_text: &str, media_url: Option<&str>) -> Interaction {
    Interaction {
        id: Uuid::new_v4(),
        phone: phone.to_string(),
        query_text: query_text.to_string(),
        media_url: media_url.map(String::from),
        created_at: Utc::now(),
    }
}

/// Backend-agnostic session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for `phone`, creating a fresh one on first contact.
    async fn get_or_create(&self, phone: &str) -> Result<Session, StoreError>;

    /// Fetch an existing session, if any.
    async fn get(&self, phone: &str) -> Result<Option<Session>, StoreError>;

    /// Persist the session. The stored version must match
    /// `session.version`; on success the version is bumped in place.
    /// A mismatch returns [`StoreError::StaleWrite`].
    async fn save(&self, session: &mut Session) -> Result<(), StoreError>;

    /// Append one interaction log row. Never mutated or deleted.
    async fn record_interaction(
        &self,
        phone: &str,
        query_text: &str,
        media_url: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Per-user async mutexes.
///
/// Every inbound turn acquires the lock for its sender before touching the
/// session, so updates to one user's session are linearized even when two
/// messages from the same phone arrive back to back.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

// ── In-memory backend (tests) ───────────────────────────────────────

/// In-memory store used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    interactions: RwLock<Vec<Interaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged interactions (test hook).
    pub async fn interaction_count(&self) -> usize {
        self.interactions.read().await.len()
    }

    /// Snapshot of the logged interactions (test hook).
    pub async fn interactions(&self) -> Vec<Interaction> {
        self.interactions.read().await.clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_or_create(&self, phone: &str) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .entry(phone.to_string())
            .or_insert_with(|| Session::new(phone))
            .clone())
    }

    async fn get(&self, phone: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(phone).cloned())
    }

    async fn save(&self, session: &mut Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.phone)
            && existing.version != session.version
        {
            return Err(StoreError::StaleWrite {
                phone: session.phone.clone(),
                version: session.version,
            });
        }
        session.version += 1;
        sessions.insert(session.phone.clone(), session.clone());
        Ok(())
    }

    async fn record_interaction(
        &self,
        phone: &str,
        query_text: &str,
        media_url: Option<&str>,
    ) -> Result<(), StoreError> {
        self.interactions
            .write()
            .await
            .push(new_interaction(phone, query_text, media_url));
        Ok(())
    }
}

// ── libSQL backend ──────────────────────────────────────────────────

/// libSQL-backed store. A single connection is reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlStore {
    conn: Connection,
}

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sessions (
        phone TEXT PRIMARY KEY,
        name TEXT,
        onboarding TEXT NOT NULL DEFAULT 'not_started',
        state TEXT NOT NULL DEFAULT 'main_menu',
        location TEXT,
        language TEXT NOT NULL DEFAULT 'en',
        farm_size_acres REAL,
        crops TEXT NOT NULL DEFAULT '[]',
        scratch TEXT,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS interactions (
        id TEXT PRIMARY KEY,
        phone TEXT NOT NULL,
        query_text TEXT NOT NULL,
        media_url TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_interactions_phone ON interactions(phone);
"#;

impl LibSqlStore {
    /// Open (or create) a local database file and apply the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create db directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self { conn };
        store.init_schema().await?;
        info!(path = %path.display(), "Session store opened");
        Ok(store)
    }

    /// In-memory database (tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS _migrations (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Migration(format!("_migrations table: {e}")))?;

        let mut rows = self
            .conn
            .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
            .await
            .map_err(|e| StoreError::Migration(format!("version query: {e}")))?;
        let current: i64 = match rows
            .next()
            .await
            .map_err(|e| StoreError::Migration(format!("version read: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| StoreError::Migration(format!("version parse: {e}")))?,
            None => 0,
        };

        if current < SCHEMA_VERSION {
            self.conn
                .execute_batch(SCHEMA)
                .await
                .map_err(|e| StoreError::Migration(format!("initial_schema: {e}")))?;
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
                    params![SCHEMA_VERSION, "initial_schema"],
                )
                .await
                .map_err(|e| StoreError::Migration(format!("seed version: {e}")))?;
        }
        Ok(())
    }
}

fn row_to_session(row: &libsql::Row) -> Result<Session, StoreError> {
    let q = |e: libsql::Error| StoreError::Query(format!("session row: {e}"));

    let phone: String = row.get(0).map_err(q)?;
    let name: Option<String> = row.get(1).ok();
    let onboarding: String = row.get(2).map_err(q)?;
    let state: String = row.get(3).map_err(q)?;
    let location_json: Option<String> = row.get(4).ok().filter(|s: &String| !s.is_empty());
    let language: String = row.get(5).map_err(q)?;
    let farm_size_acres: Option<f64> = row.get(6).ok();
    let crops_json: String = row.get(7).map_err(q)?;
    let scratch_json: Option<String> = row.get(8).ok().filter(|s: &String| !s.is_empty());
    let version: i64 = row.get(9).map_err(q)?;

    let location: Option<Location> = match location_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| StoreError::Serialization(format!("location: {e}")))?,
        None => None,
    };
    // Scratch that no longer deserializes is dropped, not fatal: the flow
    // it belonged to aborts to the menu on its next turn.
    let scratch: Option<FlowData> = scratch_json.and_then(|json| {
        serde_json::from_str(&json)
            .map_err(|e| tracing::warn!(phone = %phone, "Dropping unreadable scratch: {e}"))
            .ok()
    });
    let crops: Vec<String> = serde_json::from_str(&crops_json).unwrap_or_default();

    Ok(Session {
        phone,
        name,
        onboarding: OnboardingPhase::parse(&onboarding),
        state: ConversationState::parse(&state),
        location,
        language,
        farm_size_acres,
        crops,
        scratch,
        version,
    })
}

const SESSION_COLUMNS: &str = "phone, name, onboarding, state, location, language, \
     farm_size_acres, crops, scratch, version";

#[async_trait]
impl SessionStore for LibSqlStore {
    async fn get_or_create(&self, phone: &str) -> Result<Session, StoreError> {
        if let Some(session) = self.get(phone).await? {
            return Ok(session);
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO sessions (phone, created_at, updated_at) \
                 VALUES (?1, ?2, ?3)",
                params![phone, now.clone(), now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("create session: {e}")))?;

        // Re-read: a concurrent insert may have won the OR IGNORE race.
        self.get(phone)
            .await?
            .ok_or_else(|| StoreError::Query(format!("session vanished after insert: {phone}")))
    }

    async fn get(&self, phone: &str) -> Result<Option<Session>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get session: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get session: {e}")))?
        {
            Some(row) => Ok(Some(row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &mut Session) -> Result<(), StoreError> {
        let location_json = session
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("location: {e}")))?;
        let scratch_json = session
            .scratch
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("scratch: {e}")))?;
        let crops_json = serde_json::to_string(&session.crops)
            .map_err(|e| StoreError::Serialization(format!("crops: {e}")))?;

        let changed = self
            .conn
            .execute(
                "UPDATE sessions SET name = ?1, onboarding = ?2, state = ?3, location = ?4, \
                 language = ?5, farm_size_acres = ?6, crops = ?7, scratch = ?8, \
                 version = version + 1, updated_at = ?9 \
                 WHERE phone = ?10 AND version = ?11",
                params![
                    opt_text(session.name.as_deref()),
                    session.onboarding.as_str(),
                    session.state.as_str(),
                    opt_text(location_json.as_deref()),
                    session.language.clone(),
                    opt_real(session.farm_size_acres),
                    crops_json,
                    opt_text(scratch_json.as_deref()),
                    Utc::now().to_rfc3339(),
                    session.phone.clone(),
                    session.version,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save session: {e}")))?;

        if changed == 0 {
            return Err(StoreError::StaleWrite {
                phone: session.phone.clone(),
                version: session.version,
            });
        }
        session.version += 1;
        Ok(())
    }

    async fn record_interaction(
        &self,
        phone: &str,
        query_text: &str,
        media_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let interaction = new_interaction(phone, query_text, media_url);
        self.conn
            .execute(
                "INSERT INTO interactions (id, phone, query_text, media_url, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    interaction.id.to_string(),
                    interaction.phone,
                    interaction.query_text,
                    opt_text(interaction.media_url.as_deref()),
                    interaction.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("record interaction: {e}")))?;
        Ok(())
    }
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}
