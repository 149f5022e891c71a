//! SQLite journal of committed batches, keyed by session.
//!
//! Every batch a journaled provider commits is stored before it is applied, so
//! a session can be rebuilt later by replaying its batches in order.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::*;
use crate::provider::{ChangeJournal, JournalResult};

pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "feed-model")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("feed-model.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Session operations
    // ============================================================

    /// Create a session row. Without an id a v4 UUID is used.
    pub fn create_session(&self, id: Option<&str>) -> Result<SessionRecord> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (id, status, change_count, created_at) VALUES (?, ?, 0, ?)",
            (&id, SessionStatus::Active.as_str(), now.to_rfc3339()),
        )
        .with_context(|| format!("Failed to create session {}", id))?;

        Ok(SessionRecord {
            id,
            status: SessionStatus::Active,
            change_count: 0,
            created_at: now,
            finished_at: None,
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, status, change_count, created_at, finished_at
             FROM sessions WHERE id = ?",
        )?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(session_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// All sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, status, change_count, created_at, finished_at
             FROM sessions ORDER BY created_at DESC, id",
        )?;

        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    pub fn finish_session(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE sessions SET status = ?, finished_at = ? WHERE id = ? AND status = ?",
            (
                SessionStatus::Finished.as_str(),
                Utc::now().to_rfc3339(),
                id,
                SessionStatus::Active.as_str(),
            ),
        )?;
        Ok(rows > 0)
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM sessions WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Change journal
    // ============================================================

    /// Store one batch. The session row is created on first use.
    ///
    /// Finished sessions reject new batches, so a replay only ever sees one
    /// provider's history.
    ///
    /// Returns the batch's sequence number within the session.
    pub fn append_change(&self, session_id: &str, change: &Change) -> Result<i64> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, status, change_count, created_at)
             VALUES (?, ?, 0, ?)",
            (session_id, SessionStatus::Active.as_str(), &now),
        )?;
        let (status, seq): (String, i64) = tx.query_row(
            "SELECT status, change_count FROM sessions WHERE id = ?",
            [session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        // A finished journal is closed for good
        if SessionStatus::from_str(&status) == Some(SessionStatus::Finished) {
            anyhow::bail!("Session {} is finished and accepts no more batches", session_id);
        }

        tx.execute(
            "INSERT INTO changes (session_id, seq, mutation_source_token, has_cached_bindings, committed_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                session_id,
                seq,
                change.mutation_source_token.as_ref().map(|t| t.to_string()),
                change.has_cached_bindings as i32,
                &now,
            ),
        )?;

        for (position, structure) in change.structure_changes.iter().enumerate() {
            let payload = structure
                .payload
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO structure_changes (session_id, seq, position, operation, content_id, parent_id, payload)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    session_id,
                    seq,
                    position as i64,
                    structure.operation.as_str(),
                    structure.content_id.as_str(),
                    structure.parent_content_id.as_ref().map(|p| p.to_string()),
                    payload,
                ),
            )?;
        }

        tx.execute(
            "UPDATE sessions SET change_count = change_count + 1 WHERE id = ?",
            [session_id],
        )?;
        tx.commit()?;

        Ok(seq)
    }

    /// All batches of a session in commit order, ready to replay.
    ///
    /// The first batch carries the session id so a replaying provider binds to it.
    pub fn load_changes(&self, session_id: &str) -> Result<Vec<Change>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut headers_stmt = conn.prepare(
            "SELECT seq, mutation_source_token, has_cached_bindings
             FROM changes WHERE session_id = ? ORDER BY seq",
        )?;
        let headers = headers_stmt
            .query_map([session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i32>(2)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut structures_stmt = conn.prepare(
            "SELECT operation, content_id, parent_id, payload
             FROM structure_changes WHERE session_id = ? AND seq = ? ORDER BY position",
        )?;

        let mut changes = Vec::with_capacity(headers.len());
        for (seq, source_token, has_cached_bindings) in headers {
            let rows = structures_stmt
                .query_map((session_id, seq), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut structure_changes = Vec::with_capacity(rows.len());
            for (operation, content_id, parent_id, payload) in rows {
                let operation = Operation::from_str(&operation)
                    .ok_or_else(|| anyhow::anyhow!("Unknown operation in journal: {}", operation))?;
                let payload = payload
                    .map(|p| serde_json::from_str::<StreamPayload>(&p))
                    .transpose()
                    .with_context(|| format!("Corrupt payload for {} in batch {}", content_id, seq))?;
                structure_changes.push(StreamStructure {
                    operation,
                    content_id: ContentId::new(content_id),
                    parent_content_id: parent_id.map(ContentId::new),
                    payload,
                });
            }

            changes.push(Change {
                structure_changes,
                stream_session: (seq == 0).then(|| StreamSession::new(session_id)),
                mutation_source_token: source_token.map(ContentId::new),
                has_cached_bindings,
            });
        }

        Ok(changes)
    }

    /// Every structure a session recorded, flattened across batches.
    pub fn load_structures(&self, session_id: &str) -> Result<Vec<StreamStructure>> {
        let structures = self
            .load_changes(session_id)?
            .into_iter()
            .flat_map(|change| change.structure_changes)
            .collect();
        Ok(structures)
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl ChangeJournal for SessionStore {
    fn record(&self, session_id: &str, change: &Change) -> JournalResult<()> {
        let seq = self.append_change(session_id, change)?;
        tracing::debug!(session = session_id, seq, "Journaled batch");
        Ok(())
    }

    fn finish(&self, session_id: &str) -> JournalResult<()> {
        self.finish_session(session_id)?;
        Ok(())
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        status: SessionStatus::from_str(&row.get::<_, String>(1)?).unwrap_or(SessionStatus::Active),
        change_count: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        finished_at: row.get::<_, Option<String>>(4)?.map(parse_datetime),
    })
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
