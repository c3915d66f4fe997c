//! SQLite-backed queue database implementation.
//!
//! Handles connection, migrations, write-locked transactions and timestamp
//! helpers. Job and video operations live in `jobs` and `videos`.

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long a connection waits on another process's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the SQLite-backed queue database.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/vidq/queue.db` on Debian, unless the config names a path.
#[derive(Clone)]
pub struct QueueDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl QueueDb {
    /// Open (or create) the default queue database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("vidq")?;
        let state_dir = xdg_dirs.get_state_home().join("vidq");
        Self::open_at(state_dir.join("queue.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("open queue database {}", path.display()))?;
        let db = QueueDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open `path` when given, otherwise the default location.
    pub async fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::open_at(p).await,
            None => Self::open_default().await,
        }
    }

    async fn migrate(&self) -> Result<()> {
        // - `video_url_meta` and `storage_metadata` hold JSON objects.
        // - `download_jobs_one_active` keeps at most one pending/running job per video.
        const SCHEMA: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                title TEXT,
                video_url TEXT NOT NULL,
                video_url_direct TEXT,
                video_url_meta TEXT,
                viral_score REAL,
                momentum REAL,
                is_surge INTEGER NOT NULL DEFAULT 0,
                surge_factor REAL,
                status TEXT NOT NULL DEFAULT 'new',
                marked_for_deletion INTEGER NOT NULL DEFAULT 0,
                storage_provider TEXT,
                bucket TEXT,
                object_key TEXT,
                storage_etag TEXT,
                filesize INTEGER,
                mime_type TEXT,
                downloaded_at INTEGER,
                storage_metadata TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_attempt_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS download_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id INTEGER NOT NULL REFERENCES videos(id),
                status TEXT NOT NULL DEFAULT 'pending',
                worker_id TEXT,
                scheduled_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER,
                last_error TEXT,
                payload TEXT,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS download_jobs_one_active
            ON download_jobs(video_id)
            WHERE status IN ('pending', 'running')
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS download_jobs_claim_order
            ON download_jobs(status, scheduled_at, id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS videos_status
            ON videos(status)
            "#,
        ];

        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("migrate queue database")?;
        }
        Ok(())
    }

    /// Start a transaction that takes the database write lock up front.
    pub(crate) async fn begin_immediate(&self) -> Result<ImmediateTx> {
        ImmediateTx::begin(&self.pool).await
    }
}

/// A `BEGIN IMMEDIATE` transaction on one pooled connection.
///
/// Read-then-write sequences inside it cannot race another writer, and
/// lock waits honour the busy timeout instead of failing on upgrade.
/// Dropped without `commit` it rolls back by discarding the connection.
pub(crate) struct ImmediateTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTx {
    async fn begin(pool: &Pool<Sqlite>) -> Result<Self> {
        // Guard first: a begin abandoned mid lock wait must not return the
        // connection to the pool with a transaction about to open on it.
        let mut tx = ImmediateTx {
            conn: pool.acquire().await?,
            open: true,
        };
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx.conn).await?;
        Ok(tx)
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub(crate) async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    pub(crate) async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.open {
            // Never hand a connection with an open transaction back to the pool.
            self.conn.close_on_drop();
        }
    }
}

/// Current time as Unix milliseconds (for DB timestamps).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Cap a diagnostic so `last_error` columns stay short.
pub fn truncate_diagnostic(msg: &str) -> String {
    const MAX: usize = 512;
    if msg.len() <= MAX {
        return msg.to_string();
    }
    let mut end = MAX;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub async fn open_memory() -> Result<QueueDb> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = QueueDb { pool };
    db.migrate().await?;
    Ok(db)
}
