//! Embedded sled database holding every piece of escalation state.

use crate::audit::AuditLog;
use crate::consent::ProfileStore;
use crate::cooldown::CooldownLedger;
use crate::error::EscalationResult;
use crate::queue::EscalationQueue;
use sled::Db;
use std::path::Path;

pub const TREE_CONSENT: &str = "consent";
pub const TREE_COOLDOWN: &str = "cooldown";
pub const TREE_CASES: &str = "cases";
pub const TREE_PENDING_INDEX: &str = "pending_index";
pub const TREE_AUDIT: &str = "audit";

/// All named trees, opened eagerly so a bad path fails at start-up.
pub const TREE_NAMES: [&str; 5] = [
    TREE_CONSENT,
    TREE_COOLDOWN,
    TREE_CASES,
    TREE_PENDING_INDEX,
    TREE_AUDIT,
];

/// Handle to the database. Cheap to clone; components borrow trees from it.
#[derive(Clone)]
pub struct EscalationStore {
    db: Db,
}

impl EscalationStore {
    /// Opens or creates the database at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> EscalationResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> EscalationResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> EscalationResult<Self> {
        for name in TREE_NAMES {
            db.open_tree(name)?;
        }
        tracing::debug!(target: "soulsync::store", trees = TREE_NAMES.len(), "Escalation store opened");
        Ok(Self { db })
    }

    pub fn profiles(&self) -> EscalationResult<ProfileStore> {
        Ok(ProfileStore::new(self.db.open_tree(TREE_CONSENT)?))
    }

    pub fn cooldown_ledger(&self, window_ms: i64) -> EscalationResult<CooldownLedger> {
        Ok(CooldownLedger::new(self.db.open_tree(TREE_COOLDOWN)?, window_ms))
    }

    pub fn queue(&self) -> EscalationResult<EscalationQueue> {
        Ok(EscalationQueue::new(
            self.db.open_tree(TREE_CASES)?,
            self.db.open_tree(TREE_PENDING_INDEX)?,
        ))
    }

    pub fn audit_log(&self) -> EscalationResult<AuditLog> {
        Ok(AuditLog::new(self.db.open_tree(TREE_AUDIT)?))
    }

    /// Number of entries per tree; used by tests and the health endpoint.
    pub fn tree_len(&self, name: &str) -> EscalationResult<usize> {
        Ok(self.db.open_tree(name)?.len())
    }

    pub async fn flush(&self) -> EscalationResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn raw_tree(&self, name: &str) -> sled::Tree {
        self.db.open_tree(name).unwrap()
    }
}
