//! SQLite-backed job history.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection};

use super::{HistoryError, JobHistory};
use crate::job::JobSnapshot;

/// SQLite-backed job history.
pub struct SqliteJobHistory {
    conn: Mutex<Connection>,
}

impl SqliteJobHistory {
    /// Open (or create) the history database at `path`.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory history (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn =
            Connection::open_in_memory().map_err(|e| HistoryError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_history (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                provider TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                error_kind TEXT,
                created_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                snapshot TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_job_history_finished_at ON job_history(finished_at DESC);
            CREATE INDEX IF NOT EXISTS idx_job_history_status ON job_history(status);
            "#,
        )
        .map_err(|e| HistoryError::Database(e.to_string()))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobHistory for SqliteJobHistory {
    fn record(&self, job: &JobSnapshot) -> Result<(), HistoryError> {
        if !job.is_terminal() {
            return Err(HistoryError::NotFinished(job.id.clone()));
        }
        let snapshot =
            serde_json::to_string(job).map_err(|e| HistoryError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                r#"
                INSERT OR REPLACE INTO job_history
                    (id, url, status, provider, attempt, error_kind, created_at, finished_at, snapshot)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    job.id,
                    job.url,
                    job.status.as_str(),
                    job.provider.as_str(),
                    job.attempt,
                    job.error.as_ref().map(|e| e.kind.as_str()),
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    snapshot,
                ],
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<JobSnapshot>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT snapshot FROM job_history ORDER BY finished_at DESC, rowid DESC LIMIT ?1",
            )
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row in rows {
            let json = row.map_err(|e| HistoryError::Database(e.to_string()))?;
            let job: JobSnapshot = serde_json::from_str(&json)
                .map_err(|e| HistoryError::Serialization(e.to_string()))?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    fn count(&self) -> Result<u64, HistoryError> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM job_history", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| HistoryError::Database(e.to_string()))
    }
}
