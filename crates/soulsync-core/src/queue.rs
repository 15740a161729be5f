//! Durable queue of escalation cases awaiting a moderator decision.
//!
//! Cases live in the `cases` tree keyed by id. The `pending_index` tree maps
//! `{created_ms:020}/{id}` to the id, so iterating it yields pending cases in arrival
//! order with the id as tie-break. Both trees change together inside one sled transaction.
//!
//! This module only stores and transitions cases. Dispatch on approval is done by the
//! orchestrator, which owns the sender and the cooldown ledger.

use crate::error::{EscalationError, EscalationResult};
use crate::risk::RiskAssessment;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, Transactional};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Approved,
    Rejected,
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// What happened when an approved case was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    Sent { at_ms: i64 },
    Failed { reason: String, at_ms: i64 },
    /// Approved while the user's cooldown window was still open; nothing was sent.
    SuppressedCooldown { at_ms: i64 },
}

/// Everything the orchestrator supplies; id, status and timestamps are assigned here.
#[derive(Debug, Clone)]
pub struct EscalationCaseDraft {
    pub user_id: String,
    pub user_name: String,
    pub risk_assessment: RiskAssessment,
    pub message_content: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationCase {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub risk_assessment: RiskAssessment,
    /// The user's message that triggered the case.
    pub message_content: String,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: String,
    pub created_at_ms: i64,
    pub status: CaseStatus,
    #[serde(default)]
    pub resolved_at_ms: Option<i64>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
}

impl EscalationCase {
    fn pending_key(&self) -> String {
        pending_key(self.created_at_ms, &self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn target(&self) -> CaseStatus {
        match self {
            Self::Approve => CaseStatus::Approved,
            Self::Reject => CaseStatus::Rejected,
        }
    }
}

/// Result of approve/reject. `already_terminal` means this call changed nothing and
/// `case.status` is the decision someone else made earlier.
#[derive(Debug, Clone)]
pub struct Transition {
    pub case: EscalationCase,
    pub already_terminal: bool,
}

fn pending_key(created_at_ms: i64, id: &Uuid) -> String {
    format!("{:020}/{}", created_at_ms.max(0), id)
}

fn abort(err: EscalationError) -> ConflictableTransactionError<EscalationError> {
    ConflictableTransactionError::Abort(err)
}

#[derive(Clone)]
pub struct EscalationQueue {
    cases: sled::Tree,
    pending: sled::Tree,
}

impl EscalationQueue {
    pub(crate) fn new(cases: sled::Tree, pending: sled::Tree) -> Self {
        Self { cases, pending }
    }

    /// Persist a new pending case. Returns only after the write is flushed.
    pub fn enqueue(&self, draft: EscalationCaseDraft, now_ms: i64) -> EscalationResult<EscalationCase> {
        let case = EscalationCase {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            user_name: draft.user_name,
            risk_assessment: draft.risk_assessment,
            message_content: draft.message_content,
            emergency_contact_name: draft.emergency_contact_name,
            emergency_contact_phone: draft.emergency_contact_phone,
            created_at_ms: now_ms,
            status: CaseStatus::Pending,
            resolved_at_ms: None,
            delivery: None,
        };
        let case_key = case.id.to_string();
        let index_key = case.pending_key();
        let bytes = serde_json::to_vec(&case)?;

        (&self.cases, &self.pending)
            .transaction(|(cases, pending)| -> ConflictableTransactionResult<(), EscalationError> {
                cases.insert(case_key.as_bytes(), bytes.as_slice())?;
                pending.insert(index_key.as_bytes(), case_key.as_bytes())?;
                Ok(())
            })
            .map_err(EscalationError::from)?;
        self.cases.flush()?;

        tracing::info!(
            target: "soulsync::queue",
            case_id = %case.id,
            category = %case.risk_assessment.category,
            "Escalation case enqueued"
        );
        Ok(case)
    }

    /// Conditional `pending -> approved|rejected`. A terminal case is returned unchanged
    /// with `already_terminal = true`.
    pub fn resolve(&self, case_id: Uuid, decision: Decision, now_ms: i64) -> EscalationResult<Transition> {
        let case_key = case_id.to_string();
        let transition = (&self.cases, &self.pending)
            .transaction(|(cases, pending)| -> ConflictableTransactionResult<Transition, EscalationError> {
                let raw = cases
                    .get(case_key.as_bytes())?
                    .ok_or_else(|| abort(EscalationError::NotFound { case_id }))?;
                let mut case: EscalationCase =
                    serde_json::from_slice(&raw).map_err(|e| abort(EscalationError::Codec(e)))?;
                if case.status.is_terminal() {
                    return Ok(Transition {
                        case,
                        already_terminal: true,
                    });
                }
                case.status = decision.target();
                case.resolved_at_ms = Some(now_ms);
                let bytes = serde_json::to_vec(&case).map_err(|e| abort(EscalationError::Codec(e)))?;
                cases.insert(case_key.as_bytes(), bytes)?;
                pending.remove(case.pending_key().as_bytes())?;
                Ok(Transition {
                    case,
                    already_terminal: false,
                })
            })
            .map_err(EscalationError::from)?;

        if !transition.already_terminal {
            self.cases.flush()?;
            tracing::info!(
                target: "soulsync::queue",
                case_id = %case_id,
                status = transition.case.status.as_str(),
                "Escalation case resolved"
            );
        }
        Ok(transition)
    }

    /// Attach the dispatch result to an approved case.
    pub fn record_delivery(&self, case_id: Uuid, delivery: Delivery) -> EscalationResult<EscalationCase> {
        let case_key = case_id.to_string();
        let case = self
            .cases
            .transaction(|cases| -> ConflictableTransactionResult<EscalationCase, EscalationError> {
                let raw = cases
                    .get(case_key.as_bytes())?
                    .ok_or_else(|| abort(EscalationError::NotFound { case_id }))?;
                let mut case: EscalationCase =
                    serde_json::from_slice(&raw).map_err(|e| abort(EscalationError::Codec(e)))?;
                case.delivery = Some(delivery.clone());
                let bytes = serde_json::to_vec(&case).map_err(|e| abort(EscalationError::Codec(e)))?;
                cases.insert(case_key.as_bytes(), bytes)?;
                Ok(case)
            })
            .map_err(EscalationError::from)?;
        self.cases.flush()?;
        Ok(case)
    }

    pub fn get(&self, case_id: Uuid) -> EscalationResult<EscalationCase> {
        match self.cases.get(case_id.to_string().as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(EscalationError::NotFound { case_id }),
        }
    }

    /// Pending cases, oldest first, ties broken by id.
    pub fn list_pending(&self) -> EscalationResult<Vec<EscalationCase>> {
        let mut out = Vec::new();
        for entry in self.pending.iter() {
            let (index_key, case_key) = entry?;
            match self.cases.get(&case_key)? {
                Some(raw) => {
                    let case: EscalationCase = serde_json::from_slice(&raw)?;
                    if case.status == CaseStatus::Pending {
                        out.push(case);
                    }
                }
                None => {
                    return Err(EscalationError::Corrupt {
                        key: format!(
                            "{}/{}",
                            crate::store::TREE_PENDING_INDEX,
                            String::from_utf8_lossy(&index_key)
                        ),
                    })
                }
            }
        }
        Ok(out)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{Confidence, RiskCategory};
    use crate::store::EscalationStore;

    fn draft(user: &str) -> EscalationCaseDraft {
        EscalationCaseDraft {
            user_id: user.to_string(),
            user_name: "Alex".to_string(),
            risk_assessment: RiskAssessment {
                category: RiskCategory::Depression,
                source_text: "I feel hopeless".to_string(),
                display_text: "I feel hopeless".to_string(),
                confidence: Confidence::RegexMatch,
            },
            message_content: "I feel hopeless".to_string(),
            emergency_contact_name: Some("Sam".to_string()),
            emergency_contact_phone: "+15550100".to_string(),
        }
    }

    #[test]
    fn enqueue_assigns_pending_status() {
        let store = EscalationStore::temporary().unwrap();
        let queue = store.queue().unwrap();
        let case = queue.enqueue(draft("u1"), 1_000).unwrap();
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.created_at_ms, 1_000);
        assert_eq!(queue.get(case.id).unwrap(), case);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn pending_is_ordered_by_time_then_id() {
        let store = EscalationStore::temporary().unwrap();
        let queue = store.queue().unwrap();
        let late = queue.enqueue(draft("u1"), 3_000).unwrap();
        let tie_a = queue.enqueue(draft("u2"), 1_000).unwrap();
        let tie_b = queue.enqueue(draft("u3"), 1_000).unwrap();

        let mut ties = vec![tie_a.id, tie_b.id];
        ties.sort_by_key(|id| id.to_string());
        let listed: Vec<Uuid> = queue.list_pending().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![ties[0], ties[1], late.id]);
    }

    #[test]
    fn second_decision_reports_first() {
        let store = EscalationStore::temporary().unwrap();
        let queue = store.queue().unwrap();
        let case = queue.enqueue(draft("u1"), 1_000).unwrap();

        let first = queue.resolve(case.id, Decision::Reject, 2_000).unwrap();
        assert!(!first.already_terminal);
        assert_eq!(first.case.status, CaseStatus::Rejected);
        assert_eq!(first.case.resolved_at_ms, Some(2_000));

        let second = queue.resolve(case.id, Decision::Approve, 3_000).unwrap();
        assert!(second.already_terminal);
        assert_eq!(second.case.status, CaseStatus::Rejected);
        assert_eq!(second.case.resolved_at_ms, Some(2_000));
        assert!(queue.list_pending().unwrap().is_empty());
    }

    #[test]
    fn unknown_case_is_not_found() {
        let store = EscalationStore::temporary().unwrap();
        let queue = store.queue().unwrap();
        let err = queue.resolve(Uuid::new_v4(), Decision::Approve, 0).unwrap_err();
        assert!(err.is_not_found());
        assert!(queue.get(Uuid::new_v4()).unwrap_err().is_not_found());
    }

    #[test]
    fn delivery_is_recorded_on_the_case() {
        let store = EscalationStore::temporary().unwrap();
        let queue = store.queue().unwrap();
        let case = queue.enqueue(draft("u1"), 1_000).unwrap();
        queue.resolve(case.id, Decision::Approve, 2_000).unwrap();
        let updated = queue
            .record_delivery(case.id, Delivery::Failed { reason: "timeout".into(), at_ms: 2_100 })
            .unwrap();
        assert_eq!(updated.status, CaseStatus::Approved);
        assert_eq!(
            queue.get(case.id).unwrap().delivery,
            Some(Delivery::Failed { reason: "timeout".into(), at_ms: 2_100 })
        );
    }
}
