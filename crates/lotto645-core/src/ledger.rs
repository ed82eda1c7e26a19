//! Per-round purchase ledger.
//!
//! One JSON document holds the purchases of exactly one draw round. Saving an
//! entry for a new round discards the previous round; saving within the same
//! round upserts one user and leaves the others untouched.
//!
//! Read-merge-write runs under an in-process mutex and an exclusive `fs2`
//! lock on a sibling `.lock` file. The document itself is replaced through a
//! synced temp file and an atomic rename, so readers never see a torn write.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::purchase::PurchaseOutcome;

/// Default ledger location, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "logs/last_purchase.json";

/// Ledger persistence errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem failure.
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The stored document is not a valid ledger.
    #[error("ledger at {path} is corrupt: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-process lock was poisoned by a panicking writer.
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// One purchased line as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Slot label.
    #[serde(alias = "type")]
    pub slot: String,
    /// The six numbers.
    pub numbers: [u8; 6],
}

/// One user's purchase for the ledger's round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPurchase {
    /// Whether the purchase was accepted.
    pub success: bool,
    /// Purchased lines; empty unless accepted.
    #[serde(default)]
    pub games: Vec<GameRecord>,
}

impl From<&PurchaseOutcome> for UserPurchase {
    fn from(outcome: &PurchaseOutcome) -> Self {
        Self {
            success: outcome.is_accepted(),
            games: outcome
                .lines()
                .iter()
                .map(|line| GameRecord {
                    slot: line.slot.clone(),
                    numbers: line.numbers,
                })
                .collect(),
        }
    }
}

/// The persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Draw round every user entry belongs to.
    pub round: String,
    /// Date of the first purchase recorded for this round.
    pub purchase_date: String,
    /// Purchases keyed by user identifier.
    #[serde(default)]
    pub users: BTreeMap<String, UserPurchase>,
}

impl LedgerEntry {
    fn empty(round: &str, purchase_date: &str) -> Self {
        Self {
            round: round.to_string(),
            purchase_date: purchase_date.to_string(),
            users: BTreeMap::new(),
        }
    }
}

/// Handle to the ledger file. Share one instance across all accounts of a
/// run.
#[derive(Debug)]
pub struct PurchaseLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PurchaseLedger {
    /// Creates a handle; nothing is touched on disk until the first call.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Reads the stored entry. Absence of the file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error or [`LedgerError::Corrupt`].
    pub fn load(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Records `user_id`'s purchase for `round`.
    ///
    /// A stored entry for a different round, or one that cannot be parsed,
    /// is replaced by a fresh entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock cannot be taken or the file cannot be
    /// written.
    pub fn save(
        &self,
        user_id: &str,
        round: &str,
        purchase_date: &str,
        outcome: &PurchaseOutcome,
    ) -> Result<LedgerEntry, LedgerError> {
        let _guard = self.write_lock.lock().map_err(|_| LedgerError::Poisoned)?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;
        lock_file.lock_exclusive().map_err(|e| self.io_error(e))?;

        let result = self.merge_and_write(parent, user_id, round, purchase_date, outcome);

        if let Err(err) = FileExt::unlock(&lock_file) {
            debug!(
                error = %err,
                lock = %self.lock_path().display(),
                "explicit unlock failed, released on close"
            );
        }
        result
    }

    fn merge_and_write(
        &self,
        parent: &Path,
        user_id: &str,
        round: &str,
        purchase_date: &str,
        outcome: &PurchaseOutcome,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut entry = match self.load() {
            Ok(Some(existing)) if existing.round == round => existing,
            Ok(Some(existing)) => {
                info!(previous = %existing.round, round, "ledger rolled over to new round");
                LedgerEntry::empty(round, purchase_date)
            },
            Ok(None) => LedgerEntry::empty(round, purchase_date),
            Err(LedgerError::Corrupt { source, .. }) => {
                info!(error = %source, "discarding unreadable ledger");
                LedgerEntry::empty(round, purchase_date)
            },
            Err(err) => return Err(err),
        };

        entry
            .users
            .insert(user_id.to_string(), UserPurchase::from(outcome));

        let bytes = serde_json::to_vec_pretty(&entry).map_err(|source| LedgerError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        temp.write_all(&bytes).map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        sync_dir(parent);

        debug!(
            path = %self.path.display(),
            users = entry.users.len(),
            "ledger written"
        );
        Ok(entry)
    }
}

/// Best-effort directory sync so the rename survives a crash.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
