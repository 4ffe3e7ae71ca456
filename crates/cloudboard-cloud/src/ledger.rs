//! Pending operation ledger
//!
//! Remembers operations that were still unresolved (timed out, cancelled or
//! untrackable) when a reconciliation pass ended, so the next pass re-queries
//! them instead of submitting the same change again.
//!
//! [`FileLedger`] keeps the ledger in `.cloudboard/operations.json`.

use crate::error::{CloudError, Result};
use crate::operation::AsyncOperation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudboard_core::{FeatureChange, FeatureName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

const LEDGER_VERSION: u32 = 1;
const LEDGER_FILE: &str = "operations.json";
const LEDGER_BACKUP: &str = "operations.json.backup";

/// Unresolved operation together with the change it was submitted for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub change: FeatureChange,
    pub operation: AsyncOperation,
    pub recorded_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn new(change: FeatureChange, operation: AsyncOperation) -> Self {
        Self {
            change,
            operation,
            recorded_at: Utc::now(),
        }
    }
}

fn entry_key(account_id: &str, feature: FeatureName) -> String {
    format!("{}:{}", account_id, feature)
}

/// Storage for unresolved operations, keyed by account and feature
#[async_trait]
pub trait OperationLedger: Send + Sync {
    async fn pending(&self, account_id: &str, feature: FeatureName) -> Result<Option<PendingEntry>>;

    async fn record(&self, account_id: &str, entry: PendingEntry) -> Result<()>;

    async fn clear(&self, account_id: &str, feature: FeatureName) -> Result<()>;
}

/// Process-local ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PendingEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CloudError::LedgerError("ledger mutex poisoned".into()))
    }
}

#[async_trait]
impl OperationLedger for MemoryLedger {
    async fn pending(&self, account_id: &str, feature: FeatureName) -> Result<Option<PendingEntry>> {
        Ok(self.entries()?.get(&entry_key(account_id, feature)).cloned())
    }

    async fn record(&self, account_id: &str, entry: PendingEntry) -> Result<()> {
        let key = entry_key(account_id, entry.change.feature_name());
        self.entries()?.insert(key, entry);
        Ok(())
    }

    async fn clear(&self, account_id: &str, feature: FeatureName) -> Result<()> {
        self.entries()?.remove(&entry_key(account_id, feature));
        Ok(())
    }
}

/// On-disk ledger contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerFile {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: BTreeMap<String, PendingEntry>,
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            updated_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }
}

/// Ledger persisted as JSON under a directory
pub struct FileLedger {
    dir: PathBuf,
    // Serializes read-modify-write cycles of concurrent tasks
    guard: tokio::sync::Mutex<()>,
}

impl FileLedger {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(LEDGER_BACKUP)
    }

    /// Load the ledger, empty when the file does not exist yet
    pub async fn load(&self) -> Result<LedgerFile> {
        let path = self.ledger_path();
        if !path.exists() {
            tracing::debug!("Ledger file not found, starting empty");
            return Ok(LedgerFile::default());
        }

        let content = fs::read_to_string(&path).await?;
        let ledger: LedgerFile = serde_json::from_str(&content)?;

        if ledger.version > LEDGER_VERSION {
            return Err(CloudError::LedgerError(format!(
                "Ledger version {} is newer than supported version {}",
                ledger.version, LEDGER_VERSION
            )));
        }

        tracing::debug!("Loaded ledger with {} pending operation(s)", ledger.entries.len());
        Ok(ledger)
    }

    async fn save(&self, ledger: &mut LedgerFile) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created ledger directory: {}", self.dir.display());
        }

        let path = self.ledger_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        ledger.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(ledger)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved ledger with {} pending operation(s)", ledger.entries.len());
        Ok(())
    }
}

#[async_trait]
impl OperationLedger for FileLedger {
    async fn pending(&self, account_id: &str, feature: FeatureName) -> Result<Option<PendingEntry>> {
        let _lock = self.guard.lock().await;
        let ledger = self.load().await?;
        Ok(ledger.entries.get(&entry_key(account_id, feature)).cloned())
    }

    async fn record(&self, account_id: &str, entry: PendingEntry) -> Result<()> {
        let _lock = self.guard.lock().await;
        let mut ledger = self.load().await?;
        ledger
            .entries
            .insert(entry_key(account_id, entry.change.feature_name()), entry);
        self.save(&mut ledger).await
    }

    async fn clear(&self, account_id: &str, feature: FeatureName) -> Result<()> {
        let _lock = self.guard.lock().await;
        let mut ledger = self.load().await?;
        if ledger.entries.remove(&entry_key(account_id, feature)).is_some() {
            self.save(&mut ledger).await?;
        }
        Ok(())
    }
}
