use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::{debug, info, warn};

use super::StateStore;
use crate::{Error, Result};
use crate::domain::{MonitorRecord, SubscriptionSet};

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS monitor_record (
        scope TEXT NOT NULL,
        nickname TEXT NOT NULL,
        last_level INTEGER NOT NULL,
        last_death TEXT NOT NULL,
        destination_channel TEXT,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (scope, nickname)
    )
"#;

const UPSERT_SQL: &str = r#"
    INSERT INTO monitor_record (scope, nickname, last_level, last_death, destination_channel, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(scope, nickname) DO UPDATE SET
        last_level = excluded.last_level,
        last_death = excluded.last_death,
        destination_channel = excluded.destination_channel,
        updated_at = excluded.updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct MonitorRecordRow {
    scope: String,
    nickname: String,
    last_level: i64,
    last_death: String,
    destination_channel: Option<String>,
}

/// SQLite-backed store. Whole-set saves run in one transaction, so WAL
/// readers never observe a partial set.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) the database at `path`.
    ///
    /// A file SQLite reports as corrupt or not a database is moved aside,
    /// together with its `-wal`/`-shm` files, and replaced with a fresh
    /// database. Any other error (busy, locked, permissions) is returned.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        match Self::connect_file(path).await {
            Ok(store) => Ok(store),
            Err(e) if is_corruption_error(&e) => {
                let aside = corrupt_path(path);
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "subscription database is corrupt, starting with empty state"
                );
                move_aside(path, &aside).await?;
                Self::connect_file(path).await
            }
            Err(e) => Err(e),
        }
    }

    /// Private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        // Fails fast on a file that is not a database.
        sqlx::query("SELECT COUNT(*) FROM monitor_record")
            .fetch_one(&pool)
            .await?;
        Ok(Self { pool })
    }

    async fn connect_file(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!(path = %path.display(), "subscription database opened");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{stamp}"));
    path.with_file_name(name)
}

/// SQLITE_CORRUPT (11) or SQLITE_NOTADB (26), including extended codes.
fn is_corruption_error(err: &Error) -> bool {
    let Error::Database(sqlx::Error::Database(db_err)) = err else {
        return false;
    };

    let primary = db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);
    if matches!(primary, Some(11) | Some(26)) {
        return true;
    }

    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("file is not a database") || msg.contains("database disk image is malformed")
}

/// Rename the database and whatever journal files sit next to it.
async fn move_aside(path: &Path, aside: &Path) -> Result<()> {
    for suffix in ["-wal", "-shm"] {
        let sibling = with_suffix(path, suffix);
        if tokio::fs::try_exists(&sibling).await? {
            tokio::fs::rename(&sibling, with_suffix(aside, suffix)).await?;
        }
    }
    tokio::fs::rename(path, aside).await?;
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> SubscriptionSet {
        let rows = match sqlx::query_as::<_, MonitorRecordRow>(
            "SELECT scope, nickname, last_level, last_death, destination_channel \
             FROM monitor_record ORDER BY scope, nickname",
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "failed to read subscriptions, starting with empty state");
                return SubscriptionSet::new();
            }
        };

        let mut set = SubscriptionSet::new();
        for row in rows {
            let last_level = u32::try_from(row.last_level).unwrap_or_else(|_| {
                warn!(
                    scope = %row.scope,
                    nickname = %row.nickname,
                    level = row.last_level,
                    "stored level out of range, resetting baseline to 0"
                );
                0
            });
            set.insert(
                row.scope,
                row.nickname,
                MonitorRecord::new(last_level, row.last_death, row.destination_channel),
            );
        }
        debug!(records = set.len(), "subscriptions loaded");
        set
    }

    async fn save(&self, set: &SubscriptionSet) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM monitor_record")
            .execute(&mut *tx)
            .await?;
        for (scope, nickname, record) in set.iter() {
            sqlx::query(UPSERT_SQL)
                .bind(scope)
                .bind(nickname)
                .bind(i64::from(record.last_level))
                .bind(&record.last_death)
                .bind(&record.destination_channel)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn put(&self, scope: &str, nickname: &str, record: &MonitorRecord) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(scope)
            .bind(nickname)
            .bind(i64::from(record.last_level))
            .bind(&record.last_death)
            .bind(&record.destination_channel)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, scope: &str, nickname: &str) -> Result<()> {
        sqlx::query("DELETE FROM monitor_record WHERE scope = ? AND nickname = ?")
            .bind(scope)
            .bind(nickname)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
