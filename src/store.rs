//! Persistent home of the [`WatchConfig`].
//!
//! Each field is one row of `system_settings`, keyed by its canonical name
//! and holding the JSON-encoded value.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::models::{SystemSetting, WatchConfig};
use crate::utils::error::Result;

const CREATE_SETTINGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS system_settings (
        key TEXT PRIMARY KEY NOT NULL,
        value_json TEXT NOT NULL
    )
"#;

#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if let Some(dir) = sqlite_parent_dir(&config.url) {
            tokio::fs::create_dir_all(&dir).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!("Connected to settings database");

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_SETTINGS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Reads the stored configuration. Missing keys take their defaults; a
    /// row whose JSON cannot be decoded is treated as missing.
    pub async fn load(&self) -> Result<WatchConfig> {
        let rows: Vec<SystemSetting> =
            sqlx::query_as("SELECT key, value_json FROM system_settings")
                .fetch_all(&self.pool)
                .await?;

        let entries = rows.into_iter().filter_map(|row| match row.get_value() {
            Ok(value) => Some((row.key, value)),
            Err(e) => {
                warn!("Ignoring corrupt setting '{}': {}", row.key, e);
                None
            }
        });

        Ok(WatchConfig::from_entries(entries.collect::<Vec<_>>()))
    }

    /// Replaces every stored key with the given configuration.
    pub async fn save(&self, config: &WatchConfig) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM system_settings")
            .execute(&mut *tx)
            .await?;

        for (key, value) in config.to_entries() {
            let value_json = serde_json::to_string(&value)?;
            sqlx::query("INSERT INTO system_settings (key, value_json) VALUES (?, ?)")
                .bind(key)
                .bind(value_json)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Saved watch configuration");
        Ok(())
    }

    /// Stores a single raw key, used for imports from older layouts.
    pub async fn put_raw(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO system_settings (key, value_json) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        )
        .bind(key)
        .bind(value_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Directory holding a file-backed sqlite database, if the URL names one.
fn sqlite_parent_dir(url: &str) -> Option<std::path::PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }

    std::path::Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.to_path_buf())
}
