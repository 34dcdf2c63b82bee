//! Durable dedup ledger backed by redb.
//!
//! Maps item identifiers to a presence-only "seen" marker. This is the
//! foundation of the at-most-once guarantee: once an id is marked, the
//! classifier never again decides to respond to it. Entries are never
//! deleted by the core; the ledger is append-only from its perspective.
//!
//! Every write commits through a redb transaction before returning, so a
//! mark that was acted upon cannot be lost by a crash. Write transactions
//! are serialized by redb, which makes [`Ledger::mark_if_new`] atomic per
//! id: two watchers observing the same id near-simultaneously cannot both
//! be told "not yet seen".

use std::path::Path;

use redb::{Database, ReadableTableMetadata, TableDefinition};

use crate::error::{LedgerError, LedgerResult};

/// Table of seen item ids. Presence is the marker; values carry no payload.
const SEEN_TABLE: TableDefinition<&str, ()> = TableDefinition::new("seen");

/// Durable at-most-once ledger.
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Open or create the ledger at the given file path.
    ///
    /// Parent directories are created as needed, and the seen-table is
    /// created up front so readers never race table creation.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Io { source: e })?;
        }
        let db = Database::create(path).map_err(|e| LedgerError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        let txn = db.begin_write().map_err(|e| LedgerError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        txn.open_table(SEEN_TABLE).map_err(|e| LedgerError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        txn.commit().map_err(|e| LedgerError::Redb {
            message: format!("commit failed: {e}"),
        })?;

        Ok(Self { db })
    }

    /// Whether `id` has already been decided/handled.
    pub fn exists(&self, id: &str) -> LedgerResult<bool> {
        let txn = self.db.begin_read().map_err(|e| LedgerError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(SEEN_TABLE).map_err(|e| LedgerError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let result = table.get(id).map_err(|e| LedgerError::Redb {
            message: format!("get failed: {e}"),
        })?;
        Ok(result.is_some())
    }

    /// Mark `id` as seen. Idempotent: marking an already-present id is a no-op.
    pub fn mark_seen(&self, id: &str) -> LedgerResult<()> {
        self.mark_if_new(id).map(|_| ())
    }

    /// Mark `id` as seen if it is not already, in one atomic durable
    /// transaction. Returns `true` if this call created the entry.
    ///
    /// This is the check-then-write sequence the classifier's ledger gate
    /// relies on; the single write transaction is the mutual-exclusion
    /// discipline that preserves at-most-once under concurrent watchers.
    pub fn mark_if_new(&self, id: &str) -> LedgerResult<bool> {
        let txn = self.db.begin_write().map_err(|e| LedgerError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        let created = {
            let mut table = txn.open_table(SEEN_TABLE).map_err(|e| LedgerError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let previous = table.insert(id, ()).map_err(|e| LedgerError::Redb {
                message: format!("insert failed: {e}"),
            })?;
            previous.is_none()
        };
        txn.commit().map_err(|e| LedgerError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(created)
    }

    /// Number of marked ids (used by tests and the startup log line).
    pub fn len(&self) -> LedgerResult<u64> {
        let txn = self.db.begin_read().map_err(|e| LedgerError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(SEEN_TABLE).map_err(|e| LedgerError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        table.len().map_err(|e| LedgerError::Redb {
            message: format!("len failed: {e}"),
        })
    }

    /// Whether the ledger has no entries.
    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_ledger(dir: &TempDir) -> Ledger {
        Ledger::open(&dir.path().join("ledger.redb")).unwrap()
    }

    #[test]
    fn mark_and_exists() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        assert!(!ledger.exists("t1_abc").unwrap());
        ledger.mark_seen("t1_abc").unwrap();
        assert!(ledger.exists("t1_abc").unwrap());
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        ledger.mark_seen("t1_abc").unwrap();
        ledger.mark_seen("t1_abc").unwrap();
        assert!(ledger.exists("t1_abc").unwrap());
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn mark_if_new_reports_first_writer() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);

        assert!(ledger.mark_if_new("t1_abc").unwrap());
        assert!(!ledger.mark_if_new("t1_abc").unwrap());
    }

    #[test]
    fn marks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.redb");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.mark_seen("t1_persist").unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.exists("t1_persist").unwrap());
        assert!(!ledger.mark_if_new("t1_persist").unwrap());
    }

    #[test]
    fn fresh_ledger_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = open_ledger(&dir);
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn concurrent_marking_admits_one_writer() {
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(open_ledger(&dir));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                ledger.mark_if_new("t1_contested").unwrap()
            }));
        }

        let winners: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }
}
