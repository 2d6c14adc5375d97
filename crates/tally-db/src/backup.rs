//! # Hot Backup
//!
//! Point-in-time copies of the ledger while writes keep running.
//!
//! `VACUUM INTO` runs on a read-only connection, so it sees one committed
//! snapshot and never waits for the writer lock. Scheduling is left to the
//! caller.
//!
//! ```text
//! backups/
//! ├── backup_20240601_020000_123_tally.db
//! ├── backup_20240602_020000_456_tally.db   ◄── newest
//! └── notes.txt                             (ignored by cleanup)
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{DbError, LedgerResult};
use crate::store::LedgerStore;

const BACKUP_PREFIX: &str = "backup_";

pub struct BackupService {
    store: LedgerStore,
}

impl BackupService {
    pub fn new(store: LedgerStore) -> Self {
        BackupService { store }
    }

    /// Backup directory. A relative setting is taken relative to the
    /// directory holding the database file.
    pub fn dir(&self) -> PathBuf {
        let configured = &self.store.backup_settings().dir;
        if configured.is_absolute() {
            return configured.clone();
        }
        match self.store.path().parent() {
            Some(parent) => parent.join(configured),
            None => configured.clone(),
        }
    }

    /// Writes a consistent copy of the database into the backup directory
    /// and returns its path.
    pub async fn create_backup(&self) -> LedgerResult<PathBuf> {
        let dir = self.dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DbError::Backup(format!("create {}: {e}", dir.display())))?;

        let db_name = self
            .store
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tally.db".to_string());
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let target = dir.join(format!("{BACKUP_PREFIX}{stamp}_{db_name}"));

        if let Err(e) = sqlx::query("VACUUM INTO ?1")
            .bind(target.to_string_lossy().into_owned())
            .execute(self.store.reader())
            .await
        {
            // a failed VACUUM INTO can leave a partial file behind
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(rm) if rm.kind() == ErrorKind::NotFound => {}
                Err(rm) => {
                    warn!(path = %target.display(), error = %rm, "Failed to remove partial backup")
                }
            }
            return Err(DbError::Backup(e.to_string()).into());
        }

        info!(path = %target.display(), "Backup created");
        Ok(target)
    }

    /// Backup files in the backup directory, oldest first.
    pub async fn list_backups(&self) -> LedgerResult<Vec<PathBuf>> {
        let dir = self.dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DbError::Backup(format!("read {}: {e}", dir.display())).into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DbError::Backup(format!("read {}: {e}", dir.display())))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_backup_name(&entry.path()) {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Deletes backups whose modification time is older than
    /// `retention_days`. Returns how many were removed. A file that cannot
    /// be removed is logged and skipped.
    pub async fn cleanup_old_backups(&self) -> LedgerResult<usize> {
        let retention_days = self.store.backup_settings().retention_days;
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(retention_days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for path in self.list_backups().await? {
            let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read backup metadata");
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Deleted old backup");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old backup"),
            }
        }
        Ok(removed)
    }
}

fn is_backup_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(BACKUP_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_store_configured, seed_product, stock};
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;

    #[tokio::test]
    async fn test_backup_is_a_readable_snapshot() {
        let (_dir, store) = open_store_configured(|_| {}).await;
        let id = seed_product(&store, "Rice", 10, 15).await;
        stock(&store, id, 12).await;

        let path = store.backups().create_backup().await.unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("backup_"));
        assert!(name.ends_with("_tally.db"));

        // later writes do not reach the copy
        stock(&store, id, 5).await;

        let copy = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path).read_only(true))
            .await
            .unwrap();
        let milli: i64 = sqlx::query_scalar("SELECT quantity_milli FROM inventory WHERE product_id = ?1")
            .bind(id)
            .fetch_one(&copy)
            .await
            .unwrap();
        assert_eq!(milli, 12_000);
        copy.close().await;

        assert_eq!(store.backups().list_backups().await.unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_backups() {
        let (dir, store) = open_store_configured(|config| config.backup.retention_days = 0).await;
        store.backups().create_backup().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.backups().create_backup().await.unwrap();
        let other = dir.path().join("backups").join("notes.txt");
        std::fs::write(&other, "keep").unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(store.backups().cleanup_old_backups().await.unwrap(), 2);
        assert!(store.backups().list_backups().await.unwrap().is_empty());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_backups_within_retention() {
        let (_dir, store) = open_store_configured(|config| config.backup.retention_days = 7).await;
        store.backups().create_backup().await.unwrap();

        assert_eq!(store.backups().cleanup_old_backups().await.unwrap(), 0);
        assert_eq!(store.backups().list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relative_dir_sits_next_to_database() {
        let (dir, store) =
            open_store_configured(|config| config.backup.dir = PathBuf::from("snapshots")).await;

        let path = store.backups().create_backup().await.unwrap();
        assert_eq!(path.parent().unwrap(), dir.path().join("snapshots"));
        assert_eq!(store.backups().list_backups().await.unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn test_list_without_directory_is_empty() {
        let (_dir, store) = open_store_configured(|_| {}).await;
        assert!(store.backups().list_backups().await.unwrap().is_empty());
    }
}
