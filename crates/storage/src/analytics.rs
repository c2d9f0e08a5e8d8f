use chrono::{DateTime, Utc};
use conductor_domain::error::Result;

use crate::migrations::storage_err;
use crate::query::Query;
use crate::records::{
    AnalyticsFields, ClaudeCommand, CommandStat, Notification, NotificationStats, ShellCommand,
    UserMessage,
};
use crate::Storage;

fn fields_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<AnalyticsFields> {
    let executed_at: String = row.get(offset + 6)?;
    Ok(AnalyticsFields {
        conversation_id: row.get(offset)?,
        session_name: row.get(offset + 1)?,
        working_directory: row.get(offset + 2)?,
        git_branch: row.get(offset + 3)?,
        model_provider: row.get(offset + 4)?,
        model_name: row.get(offset + 5)?,
        executed_at: DateTime::parse_from_rfc3339(&executed_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl Storage {
    pub fn record_shell_command(
        &self,
        fields: &AnalyticsFields,
        command: &str,
        output: Option<&str>,
        success: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO shell_commands
             (conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, command, output, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                fields.conversation_id,
                fields.session_name,
                fields.working_directory,
                fields.git_branch,
                fields.model_provider,
                fields.model_name,
                fields.executed_at.to_rfc3339(),
                command,
                output,
                success,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_claude_command(
        &self,
        fields: &AnalyticsFields,
        tool_name: &str,
        input: &serde_json::Value,
        output: Option<&str>,
        success: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO claude_commands
             (conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, tool_name, input, output, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                fields.conversation_id,
                fields.session_name,
                fields.working_directory,
                fields.git_branch,
                fields.model_provider,
                fields.model_name,
                fields.executed_at.to_rfc3339(),
                tool_name,
                input.to_string(),
                output,
                success,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_user_message(&self, fields: &AnalyticsFields, content: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO user_messages
             (conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                fields.conversation_id,
                fields.session_name,
                fields.working_directory,
                fields.git_branch,
                fields.model_provider,
                fields.model_name,
                fields.executed_at.to_rfc3339(),
                content,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_notification(&self, fields: &AnalyticsFields, title: &str, body: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notifications
             (conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, title, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                fields.conversation_id,
                fields.session_name,
                fields.working_directory,
                fields.git_branch,
                fields.model_provider,
                fields.model_name,
                fields.executed_at.to_rfc3339(),
                title,
                body,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_shell_commands(&self, query: &Query) -> Result<Vec<ShellCommand>> {
        self.get_analytics(
            "shell_commands",
            query,
            "id, conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, command, output, success",
            |row| {
                Ok(ShellCommand {
                    id: row.get(0)?,
                    fields: fields_from_row(row, 1)?,
                    command: row.get(8)?,
                    output: row.get(9)?,
                    success: row.get(10)?,
                })
            },
        )
    }

    pub fn get_claude_commands(&self, query: &Query) -> Result<Vec<ClaudeCommand>> {
        let conn = self.conn.lock();
        let (where_clause, mut params) = where_and_params(query);
        let sql = format!(
            "SELECT id, conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, tool_name, input, output, success
             FROM claude_commands {where_clause} ORDER BY executed_at DESC{}",
            limit_offset_sql(query)
        );
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        params.extend(limit_offset_params(query));
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                let input: String = row.get(9)?;
                Ok(ClaudeCommand {
                    id: row.get(0)?,
                    fields: fields_from_row(row, 1)?,
                    tool_name: row.get(8)?,
                    input: serde_json::from_str(&input).unwrap_or(serde_json::Value::Null),
                    output: row.get(10)?,
                    success: row.get(11)?,
                })
            })
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    pub fn get_user_messages(&self, query: &Query) -> Result<Vec<UserMessage>> {
        self.get_analytics(
            "user_messages",
            query,
            "id, conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, content",
            |row| {
                Ok(UserMessage {
                    id: row.get(0)?,
                    fields: fields_from_row(row, 1)?,
                    content: row.get(8)?,
                })
            },
        )
    }

    pub fn get_notifications(&self, query: &Query) -> Result<Vec<Notification>> {
        self.get_analytics(
            "notifications",
            query,
            "id, conversation_id, session_name, working_directory, git_branch, model_provider, model_name, executed_at, title, body",
            |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    fields: fields_from_row(row, 1)?,
                    title: row.get(8)?,
                    body: row.get(9)?,
                })
            },
        )
    }

    fn get_analytics<T>(
        &self,
        table: &str,
        query: &Query,
        columns: &str,
        map_row: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        let (where_clause, mut params) = where_and_params(query);
        let sql = format!(
            "SELECT {columns} FROM {table} {where_clause} ORDER BY executed_at DESC{}",
            limit_offset_sql(query)
        );
        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        params.extend(limit_offset_params(query));
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), map_row)
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    pub fn get_notification_stats(&self) -> Result<NotificationStats> {
        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, COUNT(*) FROM notifications GROUP BY conversation_id ORDER BY COUNT(*) DESC",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(storage_err)?;
        let mut by_conversation = Vec::new();
        for row in rows {
            by_conversation.push(row.map_err(storage_err)?);
        }
        Ok(NotificationStats { total, by_conversation })
    }

    /// `tool_name` is the command kind (e.g. a specific shell command or
    /// Claude tool name); `limit` bounds the number of distinct tools
    /// returned, ranked by frequency.
    pub fn get_command_stats(&self, tool_name: Option<&str>, limit: i64) -> Result<Vec<CommandStat>> {
        let conn = self.conn.lock();
        let sql = if tool_name.is_some() {
            "SELECT tool_name, COUNT(*) c FROM claude_commands WHERE tool_name = ?1 GROUP BY tool_name ORDER BY c DESC LIMIT ?2"
        } else {
            "SELECT tool_name, COUNT(*) c FROM claude_commands GROUP BY tool_name ORDER BY c DESC LIMIT ?1"
        };
        let mut stmt = conn.prepare(sql).map_err(storage_err)?;
        let rows = if let Some(name) = tool_name {
            stmt.query_map(rusqlite::params![name, limit], |row| {
                Ok(CommandStat {
                    tool_name: row.get(0)?,
                    count: row.get(1)?,
                })
            })
        } else {
            stmt.query_map(rusqlite::params![limit], |row| {
                Ok(CommandStat {
                    tool_name: row.get(0)?,
                    count: row.get(1)?,
                })
            })
        }
        .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }
}

fn where_and_params(query: &Query) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(conv) = &query.conversation_id {
        clauses.push("conversation_id = ?".to_string());
        params.push(Box::new(conv.clone()));
    }
    if let Some(tool) = &query.tool_name {
        clauses.push("tool_name = ?".to_string());
        params.push(Box::new(tool.clone()));
    }
    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), params)
    }
}

fn limit_offset_sql(query: &Query) -> String {
    match query.effective_limit() {
        Some(_) => " LIMIT ? OFFSET ?".to_string(),
        None => String::new(),
    }
}

fn limit_offset_params(query: &Query) -> Vec<Box<dyn rusqlite::ToSql>> {
    match query.effective_limit() {
        Some(limit) => vec![Box::new(limit), Box::new(query.offset)],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_filters_shell_commands() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        let fields = AnalyticsFields {
            conversation_id: "conv1".into(),
            session_name: None,
            working_directory: Some("/tmp".into()),
            git_branch: None,
            model_provider: None,
            model_name: None,
            executed_at: Utc::now(),
        };
        storage.record_shell_command(&fields, "ls", Some("a\nb"), true).unwrap();

        let mut q = Query::new();
        q.conversation_id = Some("conv1".into());
        let rows = storage.get_shell_commands(&q).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "ls");
        assert!(rows[0].success);
    }
}
