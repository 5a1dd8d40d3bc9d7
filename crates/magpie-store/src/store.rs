//! Durable per-conversation transcript log.
//!
//! Each append is a single-row transaction; the `Mutex<Connection>`
//! serialises writes across conversation tasks. Read order is chronological
//! so the assembler can reconstruct tool-call batch boundaries.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::error::Result;
use crate::types::{MessageType, Role, Turn};

pub struct TranscriptStore {
    db: Mutex<Connection>,
}

impl TranscriptStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Record a user or assistant textual turn.
    pub fn append_text(
        &self,
        conversation_id: &str,
        role: Role,
        author_id: &str,
        content: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO turns
             (conversation_id, author_id, role, message_type, content, created_at)
             VALUES (?1, ?2, ?3, 'text', ?4, ?5)",
            rusqlite::params![
                conversation_id,
                author_id,
                role.to_string(),
                content,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Record that the assistant requested a tool call.
    ///
    /// When the tool declared a positive validity duration, computes
    /// `expires_at = now + validity` and returns it so the paired response
    /// can be stamped with the same instant.
    pub fn append_tool_call(
        &self,
        conversation_id: &str,
        author_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        raw_arguments: &str,
        validity: Duration,
    ) -> Result<Option<String>> {
        let now = Utc::now();
        let expires_at = if validity > Duration::ZERO {
            chrono::Duration::from_std(validity)
                .ok()
                .map(|d| (now + d).to_rfc3339())
        } else {
            None
        };

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO turns
             (conversation_id, author_id, role, message_type, content,
              tool_call_id, tool_name, expires_at, created_at)
             VALUES (?1, ?2, 'assistant', 'tool_call', ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                conversation_id,
                author_id,
                raw_arguments,
                tool_call_id,
                tool_name,
                expires_at,
                now.to_rfc3339(),
            ],
        )?;
        Ok(expires_at)
    }

    /// Record the paired tool result. `expires_at` must be the value returned
    /// by [`append_tool_call`](Self::append_tool_call) so both rows age
    /// together.
    pub fn append_tool_response(
        &self,
        conversation_id: &str,
        author_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        response_text: &str,
        expires_at: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO turns
             (conversation_id, author_id, role, message_type, content,
              tool_call_id, tool_name, expires_at, created_at)
             VALUES (?1, ?2, 'tool', 'tool_response', ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                conversation_id,
                author_id,
                response_text,
                tool_call_id,
                tool_name,
                expires_at,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Up to the most recent `limit` turns, oldest first.
    pub fn fetch_recent(&self, conversation_id: &str, limit: u32) -> Result<Vec<Turn>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, author_id, role, message_type, content,
                    tool_call_id, tool_name, expires_at, created_at
             FROM turns
             WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let raw: Vec<RawTurn> = stmt
            .query_map(rusqlite::params![conversation_id, limit], |row| {
                Ok(RawTurn {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    author_id: row.get(2)?,
                    role: row.get(3)?,
                    message_type: row.get(4)?,
                    content: row.get(5)?,
                    tool_call_id: row.get(6)?,
                    tool_name: row.get(7)?,
                    expires_at: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        // Reverse so oldest first.
        let mut turns: Vec<Turn> = raw.into_iter().filter_map(RawTurn::parse).collect();
        turns.reverse();
        Ok(turns)
    }

    /// Remove all turns for a conversation. Idempotent; returns rows removed.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM turns WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        debug!(conversation = conversation_id, removed = n, "conversation deleted");
        Ok(n)
    }

    /// Remove turns older than `retention`.
    ///
    /// Rows stamped with `expires_at` age by that shared instant, so a
    /// tool_call and its tool_response leave in the same sweep. A second pass
    /// removes any tool_response whose call was swept, keeping the pairing
    /// invariant under per-row `created_at` aging.
    pub fn sweep_expired(&self, retention: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());
        self.sweep_before(&cutoff.to_rfc3339())
    }

    fn sweep_before(&self, cutoff: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let aged = db.execute(
            "DELETE FROM turns WHERE COALESCE(expires_at, created_at) < ?1",
            [cutoff],
        )?;
        let orphaned = db.execute(
            "DELETE FROM turns
             WHERE message_type = 'tool_response'
               AND NOT EXISTS (
                   SELECT 1 FROM turns c
                   WHERE c.message_type = 'tool_call'
                     AND c.conversation_id = turns.conversation_id
                     AND c.tool_call_id = turns.tool_call_id
               )",
            [],
        )?;
        if aged + orphaned > 0 {
            debug!(aged, orphaned, "retention sweep removed turns");
        }
        Ok(aged + orphaned)
    }
}

/// Row as stored; parsed into [`Turn`] after the statement is drained.
struct RawTurn {
    id: i64,
    conversation_id: String,
    author_id: String,
    role: String,
    message_type: String,
    content: String,
    tool_call_id: Option<String>,
    tool_name: Option<String>,
    expires_at: Option<String>,
    created_at: String,
}

impl RawTurn {
    fn parse(self) -> Option<Turn> {
        let role: Role = match self.role.parse() {
            Ok(r) => r,
            Err(e) => {
                warn!(id = self.id, error = %e, "skipping corrupt turn row");
                return None;
            }
        };
        let message_type: MessageType = match self.message_type.parse() {
            Ok(t) => t,
            Err(e) => {
                warn!(id = self.id, error = %e, "skipping corrupt turn row");
                return None;
            }
        };
        Some(Turn {
            id: self.id,
            conversation_id: self.conversation_id,
            author_id: self.author_id,
            role,
            message_type,
            content: self.content,
            tool_call_id: self.tool_call_id,
            tool_name: self.tool_name,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}
