use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use lorabridge_domain::error::{DomainError, DomainResult};
use lorabridge_domain::repository::OutboxRepository;
use lorabridge_domain::types::{NewOutboxRecord, OutboxRecord, PublishStatus, RecordId};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS device_data (
    deveui TEXT,
    datetime TEXT,
    payload TEXT,
    done INTEGER CHECK(done IN (0, 1))
)";

/// Outbox store over a single SQLite connection.
///
/// Calls serialize on the connection mutex; operations are short
/// single-statement transactions so contention stays negligible at
/// relay ingest rates.
pub struct SqliteOutbox {
    conn: Mutex<Connection>,
}

impl SqliteOutbox {
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening outbox db at {}", path.as_ref().display()))?;
        info!(path = %path.as_ref().display(), "Outbox database opened");
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory outbox db")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")
            .context("setting synchronous=FULL")?;
        conn.execute(SCHEMA, []).context("creating device_data")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> DomainResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DomainError::RepositoryError(anyhow!("outbox connection poisoned")))
    }
}

#[async_trait]
impl OutboxRepository for SqliteOutbox {
    async fn append(&self, record: NewOutboxRecord) -> DomainResult<RecordId> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO device_data (deveui, datetime, payload, done) VALUES (?1, ?2, ?3, 0)",
            (&record.dev_eui, &record.received_at, &record.payload),
        )
        .map_err(|e| DomainError::OutboxWriteFailed(e.to_string()))?;
        let id = conn.last_insert_rowid();
        debug!(dev_eui = %record.dev_eui, record_id = id, "Outbox record appended");
        Ok(id)
    }

    async fn mark_delivered(&self, dev_eui: &str, received_at: &str) -> DomainResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE device_data SET done = 1 WHERE deveui = ?1 AND datetime = ?2",
                (dev_eui, received_at),
            )
            .map_err(|e| DomainError::RepositoryError(anyhow!(e)))?;
        debug!(dev_eui = %dev_eui, rows = updated, "Outbox record marked delivered");
        Ok(())
    }

    async fn list_pending(&self) -> DomainResult<Vec<OutboxRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT deveui, datetime, payload, done FROM device_data
                 WHERE done = 0 ORDER BY datetime ASC",
            )
            .map_err(|e| DomainError::RepositoryError(anyhow!(e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(OutboxRecord {
                    dev_eui: row.get(0)?,
                    received_at: row.get(1)?,
                    payload: row.get(2)?,
                    published: PublishStatus::from_i64(row.get(3)?),
                })
            })
            .map_err(|e| DomainError::RepositoryError(anyhow!(e)))?;

        let mut pending = Vec::new();
        for row in rows {
            pending.push(row.map_err(|e| DomainError::RepositoryError(anyhow!(e)))?);
        }
        Ok(pending)
    }

    async fn prune_older_than(&self, age: Duration) -> DomainResult<u64> {
        let age = chrono::Duration::from_std(age)
            .map_err(|e| DomainError::RepositoryError(anyhow!("retention overflow: {e}")))?;
        // Timestamps are stored as RFC 3339 text in UTC, so lexicographic
        // comparison matches chronological order.
        let cutoff = (Utc::now() - age).to_rfc3339();

        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM device_data WHERE datetime < ?1", [&cutoff])
            .map_err(|e| DomainError::RepositoryError(anyhow!(e)))?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Pruned aged outbox records");
        }
        Ok(removed as u64)
    }
}
