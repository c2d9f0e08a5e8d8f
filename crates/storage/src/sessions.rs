use chrono::{DateTime, Utc};
use conductor_domain::error::Result;

use crate::migrations::storage_err;
use crate::records::SessionRecord;
use crate::Storage;

impl Storage {
    /// Insert a brand-new session row (§4.A Record/UpdateSession).
    pub fn record_session(&self, record: &SessionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, created_at, updated_at, status, options, message_count, cost_usd, error_message, git_branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.id,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.status,
                record.options.to_string(),
                record.message_count,
                record.cost_usd,
                record.error_message,
                record.git_branch,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Overwrite an existing session row's mutable fields.
    pub fn update_session(&self, record: &SessionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET updated_at = ?2, status = ?3, message_count = ?4, cost_usd = ?5, error_message = ?6, git_branch = ?7
             WHERE id = ?1",
            rusqlite::params![
                record.id,
                record.updated_at.to_rfc3339(),
                record.status,
                record.message_count,
                record.cost_usd,
                record.error_message,
                record.git_branch,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, created_at, updated_at, status, options, message_count, cost_usd, error_message, git_branch
                 FROM sessions WHERE id = ?1",
            )
            .map_err(storage_err)?;
        let mut rows = stmt.query(rusqlite::params![id]).map_err(storage_err)?;
        if let Some(row) = rows.next().map_err(storage_err)? {
            Ok(Some(row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    /// `status` one of `{all, active, ended}` (§4.H Listing contract).
    pub fn list_sessions(&self, status: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let sql = match status {
            "active" => {
                "SELECT id, created_at, updated_at, status, options, message_count, cost_usd, error_message, git_branch
                 FROM sessions WHERE status != 'ended' ORDER BY updated_at DESC"
            }
            "ended" => {
                "SELECT id, created_at, updated_at, status, options, message_count, cost_usd, error_message, git_branch
                 FROM sessions WHERE status = 'ended' ORDER BY updated_at DESC"
            }
            _ => {
                "SELECT id, created_at, updated_at, status, options, message_count, cost_usd, error_message, git_branch
                 FROM sessions ORDER BY updated_at DESC"
            }
        };
        let mut stmt = conn.prepare(sql).map_err(storage_err)?;
        let rows = stmt
            .query_map([], row_to_session)
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    pub fn get_unique_sessions(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT DISTINCT conversation_id FROM claude_commands UNION SELECT DISTINCT conversation_id FROM shell_commands")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    pub fn delete_sessions_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;
        let cutoff_s = cutoff.to_rfc3339();
        let ids: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id FROM sessions WHERE updated_at < ?1")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(rusqlite::params![cutoff_s], |row| row.get::<_, String>(0))
                .map_err(storage_err)?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(storage_err)?);
            }
            ids
        };
        for id in &ids {
            tx.execute("DELETE FROM messages WHERE session_id = ?1", rusqlite::params![id])
                .map_err(storage_err)?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id])
                .map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(ids.len())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let created_at: String = row.get(1)?;
    let updated_at: String = row.get(2)?;
    let options: String = row.get(4)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        status: row.get(3)?,
        options: serde_json::from_str(&options).unwrap_or(serde_json::Value::Null),
        message_count: row.get(5)?,
        cost_usd: row.get(6)?,
        error_message: row.get(7)?,
        git_branch: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Storage {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        std::mem::forget(dir);
        storage
    }

    #[test]
    fn record_and_get_roundtrips() {
        let storage = fresh();
        let now = Utc::now();
        let record = SessionRecord {
            id: "s1".into(),
            created_at: now,
            updated_at: now,
            status: "idle".into(),
            options: serde_json::json!({"tools": ["Read"]}),
            message_count: 0,
            cost_usd: 0.0,
            error_message: None,
            git_branch: None,
        };
        storage.record_session(&record).unwrap();
        let fetched = storage.get_session("s1").unwrap().unwrap();
        assert_eq!(fetched.status, "idle");
    }

    #[test]
    fn list_sessions_filters_by_status() {
        let storage = fresh();
        let now = Utc::now();
        for (id, status) in [("a", "idle"), ("b", "ended")] {
            storage
                .record_session(&SessionRecord {
                    id: id.into(),
                    created_at: now,
                    updated_at: now,
                    status: status.into(),
                    options: serde_json::Value::Null,
                    message_count: 0,
                    cost_usd: 0.0,
                    error_message: None,
                    git_branch: None,
                })
                .unwrap();
        }
        assert_eq!(storage.list_sessions("active").unwrap().len(), 1);
        assert_eq!(storage.list_sessions("ended").unwrap().len(), 1);
        assert_eq!(storage.list_sessions("all").unwrap().len(), 2);
    }
}
