//! Append-only audit trail of escalation actions.
//!
//! Users are identified only by a stable UUIDv5 hash of their id.

use crate::error::EscalationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Namespace for user-id hashes. Changing it orphans every stored hash.
const USER_HASH_NAMESPACE: Uuid = Uuid::from_bytes([
    0x5f, 0x0c, 0x6e, 0x1d, 0x9a, 0x42, 0x4b, 0x7e, 0x8c, 0x31, 0x2d, 0x77, 0xa4, 0x19, 0xe0, 0x53,
]);

pub fn hash_user_id(user_id: &str) -> String {
    Uuid::new_v5(&USER_HASH_NAMESPACE, user_id.as_bytes()).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CaseQueued,
    CaseApproved,
    CaseRejected,
    AlertSent,
    AlertFailed,
    SuppressedCooldown,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseQueued => "case_queued",
            Self::CaseApproved => "case_approved",
            Self::CaseRejected => "case_rejected",
            Self::AlertSent => "alert_sent",
            Self::AlertFailed => "alert_failed",
            Self::SuppressedCooldown => "suppressed_cooldown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id_hash: String,
    pub action: AuditAction,
    #[serde(default)]
    pub details: Value,
    pub timestamp_ms: i64,
}

/// Sled-backed log (`audit` tree, key = `{timestamp_ms:020}/{id}`).
#[derive(Clone)]
pub struct AuditLog {
    tree: sled::Tree,
}

impl AuditLog {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn append(
        &self,
        user_id: &str,
        action: AuditAction,
        details: Value,
        timestamp_ms: i64,
    ) -> EscalationResult<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            user_id_hash: hash_user_id(user_id),
            action,
            details,
            timestamp_ms,
        };
        let key = format!("{:020}/{}", timestamp_ms.max(0), entry.id);
        self.tree.insert(key.as_bytes(), serde_json::to_vec(&entry)?)?;
        tracing::debug!(
            target: "soulsync::audit",
            user = %entry.user_id_hash,
            action = action.as_str(),
            "Audit entry written"
        );
        Ok(entry)
    }

    /// Newest first, at most `limit` entries.
    pub fn recent(&self, limit: usize) -> EscalationResult<Vec<AuditEntry>> {
        let mut out = Vec::with_capacity(limit.min(256));
        for item in self.tree.iter().rev().take(limit) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EscalationStore;
    use serde_json::json;

    #[test]
    fn hash_is_stable_and_hides_id() {
        let a = hash_user_id("alice@example.com");
        assert_eq!(a, hash_user_id("alice@example.com"));
        assert_ne!(a, hash_user_id("bob@example.com"));
        assert!(!a.contains("alice"));
    }

    #[test]
    fn recent_is_newest_first() {
        let store = EscalationStore::temporary().unwrap();
        let log = store.audit_log().unwrap();
        log.append("u1", AuditAction::CaseQueued, json!({"n": 1}), 1_000).unwrap();
        log.append("u1", AuditAction::CaseApproved, json!({"n": 2}), 2_000).unwrap();
        log.append("u1", AuditAction::AlertSent, json!({"n": 3}), 3_000).unwrap();

        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, AuditAction::AlertSent);
        assert_eq!(recent[1].action, AuditAction::CaseApproved);
        assert_eq!(recent[0].user_id_hash, hash_user_id("u1"));
        assert_eq!(log.len(), 3);
    }
}
