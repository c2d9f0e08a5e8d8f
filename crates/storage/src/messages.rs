use chrono::{DateTime, Utc};
use conductor_domain::error::Result;

use crate::migrations::storage_err;
use crate::records::MessageRecord;
use crate::Storage;

impl Storage {
    /// Append a message, computing its sequence atomically (§4.A
    /// AppendMessage, §8 property 3 — sequences are dense per session).
    /// The single connection mutex held for the whole read-then-insert
    /// gives the "per-session lock" the spec asks for; no other writer
    /// can observe or mutate this session's sequence counter meanwhile.
    pub fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &serde_json::Value,
        metadata: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;

        let next_sequence: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1 FROM messages WHERE session_id = ?1",
                rusqlite::params![session_id],
                |row| row.get(0),
            )
            .map_err(storage_err)?;

        tx.execute(
            "INSERT INTO messages (session_id, sequence, role, content, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                session_id,
                next_sequence,
                role,
                content.to_string(),
                metadata.to_string(),
                timestamp.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;

        tx.execute(
            "UPDATE sessions SET message_count = message_count + 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![session_id, timestamp.to_rfc3339()],
        )
        .map_err(storage_err)?;

        tx.commit().map_err(storage_err)?;
        Ok(next_sequence)
    }

    /// Sequence ASC, returns `(rows, has_more)` (§4.A GetMessages).
    pub fn get_messages(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MessageRecord>, bool)> {
        let conn = self.conn.lock();
        let fetch_limit = if limit <= 0 { i64::MAX } else { limit + 1 };
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, sequence, role, content, metadata, timestamp
                 FROM messages WHERE session_id = ?1 ORDER BY sequence ASC LIMIT ?2 OFFSET ?3",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(rusqlite::params![session_id, fetch_limit, offset], row_to_message)
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        let has_more = limit > 0 && out.len() as i64 > limit;
        if has_more {
            out.truncate(limit as usize);
        }
        Ok((out, has_more))
    }

    /// Used by the bridge/session manager to assert §8 property 3 in tests
    /// and by admission logic that needs the current count without a
    /// round-trip through the in-memory session handle.
    pub fn message_count(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let content: String = row.get(4)?;
    let metadata: String = row.get(5)?;
    let timestamp: String = row.get(6)?;
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        sequence: row.get(2)?,
        role: row.get(3)?,
        content: serde_json::from_str(&content).unwrap_or(serde_json::Value::Null),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SessionRecord;

    fn fresh_with_session(id: &str) -> Storage {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        std::mem::forget(dir);
        let now = Utc::now();
        storage
            .record_session(&SessionRecord {
                id: id.into(),
                created_at: now,
                updated_at: now,
                status: "idle".into(),
                options: serde_json::Value::Null,
                message_count: 0,
                cost_usd: 0.0,
                error_message: None,
                git_branch: None,
            })
            .unwrap();
        storage
    }

    #[test]
    fn sequences_are_dense_and_monotonic() {
        let storage = fresh_with_session("s1");
        for i in 0..5 {
            let seq = storage
                .append_message(
                    "s1",
                    "user",
                    &serde_json::json!({"text": format!("msg {i}")}),
                    &serde_json::Value::Null,
                    Utc::now(),
                )
                .unwrap();
            assert_eq!(seq, i);
        }
        let (rows, has_more) = storage.get_messages("s1", 0, 0).unwrap();
        assert_eq!(rows.len(), 5);
        assert!(!has_more);
        let sequences: Vec<i64> = rows.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn get_messages_paginates_with_has_more() {
        let storage = fresh_with_session("s1");
        for i in 0..3 {
            storage
                .append_message("s1", "user", &serde_json::json!(i), &serde_json::Value::Null, Utc::now())
                .unwrap();
        }
        let (rows, has_more) = storage.get_messages("s1", 2, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(has_more);
    }
}
