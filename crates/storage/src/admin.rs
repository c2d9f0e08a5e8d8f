use conductor_domain::error::Result;

use crate::migrations::storage_err;
use crate::Storage;

impl Storage {
    /// Bulk-delete analytics history; callers must follow with [`Storage::vacuum`]
    /// per §4.A ("bulk deletion ... must be followed by a storage compaction").
    pub fn delete_all_history(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "DELETE FROM shell_commands; DELETE FROM claude_commands; DELETE FROM user_messages;",
        )
        .map_err(storage_err)
    }

    pub fn delete_all_notifications(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM notifications", [])
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AnalyticsFields;
    use chrono::Utc;

    #[test]
    fn delete_all_history_clears_tables_and_vacuum_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        let fields = AnalyticsFields {
            conversation_id: "c1".into(),
            session_name: None,
            working_directory: None,
            git_branch: None,
            model_provider: None,
            model_name: None,
            executed_at: Utc::now(),
        };
        storage.record_shell_command(&fields, "ls", None, true).unwrap();
        storage.delete_all_history().unwrap();
        storage.vacuum().unwrap();

        let q = crate::query::Query::new();
        assert!(storage.get_shell_commands(&q).unwrap().is_empty());
    }
}
