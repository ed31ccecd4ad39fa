use crate::error::Result;
use crate::profiles::ProfileKind;
use crate::types::ExtractionResult;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

const STATUS_OK: &str = "ok";
const STATUS_ERROR: &str = "error";

/// Append-only log of every extraction, used to resume interrupted runs.
pub struct Db {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub created_at: String,
    pub file_name: String,
    pub model: String,
    pub status: String,
    pub error_message: Option<String>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS extractions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                file_name TEXT NOT NULL,
                model TEXT NOT NULL,
                profile TEXT NOT NULL,
                status TEXT NOT NULL,
                result_json TEXT,
                error_message TEXT,
                raw_response TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_extractions_lookup ON extractions(file_name, model, profile);
            ",
        )?;
        Ok(Db { conn })
    }

    pub fn add_extraction(
        &self,
        file_name: &str,
        model: &str,
        profile: ProfileKind,
        result: &ExtractionResult,
    ) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let (status, result_json, error_message, raw_response) = match result {
            ExtractionResult::Parsed(v) => (STATUS_OK, Some(serde_json::to_string(v)?), None, None),
            ExtractionResult::Failed(e) => (
                STATUS_ERROR,
                None,
                Some(e.error.as_str()),
                e.raw_response.as_deref(),
            ),
        };
        self.conn.execute(
            "INSERT INTO extractions (created_at, file_name, model, profile, status, result_json, error_message, raw_response) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                created_at,
                file_name,
                model,
                profile.to_string(),
                status,
                result_json,
                error_message,
                raw_response
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Parsed output of the newest entry for (file, model, profile), if that entry succeeded.
    pub fn latest_success(&self, file_name: &str, model: &str, profile: ProfileKind) -> Result<Option<Value>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, result_json FROM extractions WHERE file_name = ? AND model = ? AND profile = ? ORDER BY id DESC LIMIT 1",
                params![file_name, model, profile.to_string()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((status, Some(json))) if status == STATUS_OK => Ok(Some(serde_json::from_str(&json)?)),
            _ => Ok(None),
        }
    }

    pub fn get_history(&self, file_name: &str) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, file_name, model, status, error_message FROM extractions WHERE file_name = ? ORDER BY id",
        )?;
        let rows = stmt.query_map(params![file_name], |r| {
            Ok(HistoryRecord {
                id: r.get(0)?,
                created_at: r.get(1)?,
                file_name: r.get(2)?,
                model: r.get(3)?,
                status: r.get(4)?,
                error_message: r.get(5)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn latest_success_reflects_newest_entry() {
        let db = Db::open_in_memory().unwrap();
        let p = ProfileKind::Supplier;
        assert_eq!(db.latest_success("a.pdf", "m1", p).unwrap(), None);

        db.add_extraction("a.pdf", "m1", p, &ExtractionResult::Parsed(json!({"x": "1"})))
            .unwrap();
        assert_eq!(db.latest_success("a.pdf", "m1", p).unwrap(), Some(json!({"x": "1"})));

        db.add_extraction("a.pdf", "m1", p, &ExtractionResult::failed("quota", Some("raw".into())))
            .unwrap();
        assert_eq!(db.latest_success("a.pdf", "m1", p).unwrap(), None);
    }

    #[test]
    fn lookups_are_scoped_by_profile_and_model() {
        let db = Db::open_in_memory().unwrap();
        db.add_extraction("a.pdf", "m1", ProfileKind::Supplier, &ExtractionResult::Parsed(json!({})))
            .unwrap();
        assert_eq!(db.latest_success("a.pdf", "m1", ProfileKind::Transporter).unwrap(), None);
        assert_eq!(db.latest_success("a.pdf", "m2", ProfileKind::Supplier).unwrap(), None);
    }

    #[test]
    fn history_lists_entries_in_order() {
        let db = Db::open_in_memory().unwrap();
        db.add_extraction("a.pdf", "m1", ProfileKind::Supplier, &ExtractionResult::failed("boom", None))
            .unwrap();
        db.add_extraction("a.pdf", "m2", ProfileKind::Supplier, &ExtractionResult::Parsed(json!({})))
            .unwrap();
        let h = db.get_history("a.pdf").unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].status, "error");
        assert_eq!(h[0].error_message.as_deref(), Some("boom"));
        assert_eq!(h[1].model, "m2");
    }

    #[test]
    fn reopening_file_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("extractions.db");
        {
            let db = Db::new(&path).unwrap();
            db.add_extraction("a.pdf", "m1", ProfileKind::Supplier, &ExtractionResult::Parsed(json!({"k": 1})))
                .unwrap();
        }
        let db = Db::new(&path).unwrap();
        assert_eq!(
            db.latest_success("a.pdf", "m1", ProfileKind::Supplier).unwrap(),
            Some(json!({"k": 1}))
        );
    }
}
