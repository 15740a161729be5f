//! Escalation orchestrator: classify a turn, gate on consent, then queue for review or
//! dispatch directly under the per-user cooldown.
//!
//! Every `(category, consent, cooldown, mode)` combination maps to one [`AlertOutcome`]:
//!
//! | category | consent + destination | mode      | cooldown | outcome               |
//! |----------|-----------------------|-----------|----------|-----------------------|
//! | none     | any                   | any       | any      | `None`                |
//! | > none   | missing               | any       | any      | `SuppressedNoConsent` |
//! | > none   | present               | moderated | any      | `Queued`              |
//! | > none   | present               | direct    | active   | `SuppressedCooldown`  |
//! | > none   | present               | direct    | clear    | `Sent` / `DispatchFailed` |
//!
//! In moderated mode the cooldown is checked when a moderator approves, not at enqueue time.

use crate::audit::{hash_user_id, AuditAction, AuditEntry, AuditLog};
use crate::clock::{Clock, SystemClock};
use crate::config::{DeploymentMode, EscalationConfig};
use crate::consent::{ConsentRecord, ConsentRegistry};
use crate::cooldown::{CooldownLedger, UserLocks};
use crate::error::EscalationResult;
use crate::generator::TextGenerator;
use crate::notify::{compose_alert, send_bounded, AlertContext, NotificationSender};
use crate::queue::{CaseStatus, Decision, Delivery, EscalationCase, EscalationCaseDraft, EscalationQueue};
use crate::risk::{RiskAssessment, RiskCategory, RiskClassifier};
use crate::store::EscalationStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const FRAMING_SYSTEM_PROMPT: &str = "You write one short, warm sentence to a trusted friend or family \
member who is about to be asked to check in on someone. No diagnosis, no advice, no quotes, \
at most 30 words. Output only the sentence.";

const MAX_FRAMING_CHARS: usize = 280;

/// One chat message, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user_id: String,
    pub text: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutcome {
    None,
    Queued,
    Sent,
    SuppressedCooldown,
    SuppressedNoConsent,
    DispatchFailed,
}

impl AlertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::SuppressedCooldown => "suppressed_cooldown",
            Self::SuppressedNoConsent => "suppressed_no_consent",
            Self::DispatchFailed => "dispatch_failed",
        }
    }

    /// The only thing a chat user ever learns about an escalation.
    pub fn user_banner(&self) -> Option<&'static str> {
        match self {
            Self::Queued => Some("Your emergency contact may be notified pending review."),
            Self::Sent => Some("We've let your emergency contact know you might need support."),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub risk_assessment: RiskAssessment,
    pub alert_outcome: AlertOutcome,
    /// Set when the turn created a case (moderated mode).
    pub case_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModerationResult {
    pub case_id: Uuid,
    pub status: CaseStatus,
    pub already_terminal: bool,
    pub delivery: Option<Delivery>,
}

impl ModerationResult {
    fn from_case(case: &EscalationCase, already_terminal: bool) -> Self {
        Self {
            case_id: case.id,
            status: case.status,
            already_terminal,
            delivery: case.delivery.clone(),
        }
    }
}

/// Who gets an alert, and about what.
struct DispatchTarget<'a> {
    user_id: &'a str,
    user_name: &'a str,
    contact_name: Option<&'a str>,
    destination: &'a str,
    category: RiskCategory,
    case_id: Option<Uuid>,
    /// Client timestamp of the turn that triggered a direct dispatch.
    turn_at_ms: Option<i64>,
}

pub struct EscalationOrchestrator {
    config: EscalationConfig,
    classifier: RiskClassifier,
    consent: Arc<dyn ConsentRegistry>,
    cooldown: CooldownLedger,
    queue: EscalationQueue,
    audit: AuditLog,
    sender: Arc<dyn NotificationSender>,
    generator: Option<Arc<dyn TextGenerator>>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl EscalationOrchestrator {
    /// Wire the orchestrator to `store`. Consent is read from the store's profile tree
    /// unless replaced with [`with_consent_registry`](Self::with_consent_registry).
    pub fn new(
        store: &EscalationStore,
        config: EscalationConfig,
        sender: Arc<dyn NotificationSender>,
    ) -> EscalationResult<Self> {
        let cooldown = store.cooldown_ledger(config.cooldown_ms)?;
        tracing::info!(
            target: "soulsync::orchestrator",
            mode = config.mode.as_str(),
            cooldown_ms = config.cooldown_ms,
            sender = sender.name(),
            "Escalation orchestrator ready"
        );
        Ok(Self {
            classifier: RiskClassifier::new(),
            consent: Arc::new(store.profiles()?),
            cooldown,
            queue: store.queue()?,
            audit: store.audit_log()?,
            sender,
            generator: None,
            clock: Arc::new(SystemClock),
            locks: UserLocks::new(),
            config,
        })
    }

    pub fn with_generator(mut self, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_consent_registry(mut self, consent: Arc<dyn ConsentRegistry>) -> Self {
        self.consent = consent;
        self
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn generator(&self) -> Option<&Arc<dyn TextGenerator>> {
        self.generator.as_ref()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Classify `turn.text` and act on it.
    pub async fn handle_turn(&self, turn: &ChatTurn) -> EscalationResult<TurnResult> {
        let assessment = self.classifier.classify(&turn.text);
        self.handle_assessed_turn(turn, assessment).await
    }

    /// Act on an assessment made elsewhere (e.g. from a generator reply label).
    pub async fn handle_assessed_turn(
        &self,
        turn: &ChatTurn,
        assessment: RiskAssessment,
    ) -> EscalationResult<TurnResult> {
        let category = assessment.category;
        if !category.is_actionable() {
            return Ok(TurnResult {
                risk_assessment: assessment,
                alert_outcome: AlertOutcome::None,
                case_id: None,
            });
        }

        let user_hash = hash_user_id(&turn.user_id);
        let consent = self.consent.get_consent(&turn.user_id)?;
        let Some(destination) = consent.destination().map(str::to_string) else {
            tracing::info!(
                target: "soulsync::orchestrator",
                user = %user_hash,
                category = %category,
                outcome = AlertOutcome::SuppressedNoConsent.as_str(),
                "Risk detected but no consent on file"
            );
            return Ok(TurnResult {
                risk_assessment: assessment,
                alert_outcome: AlertOutcome::SuppressedNoConsent,
                case_id: None,
            });
        };

        let (alert_outcome, case_id) = match self.config.mode {
            DeploymentMode::Moderated => {
                let case = self.enqueue_case(turn, &consent, destination, assessment.clone())?;
                (AlertOutcome::Queued, Some(case.id))
            }
            DeploymentMode::Direct => {
                let target = DispatchTarget {
                    user_id: &turn.user_id,
                    user_name: consent.display_user_name(),
                    contact_name: consent.contact_name.as_deref(),
                    destination: &destination,
                    category,
                    case_id: None,
                    turn_at_ms: Some(turn.timestamp_ms),
                };
                let outcome = match self.dispatch_locked(&target).await? {
                    Delivery::Sent { .. } => AlertOutcome::Sent,
                    Delivery::Failed { .. } => AlertOutcome::DispatchFailed,
                    Delivery::SuppressedCooldown { .. } => AlertOutcome::SuppressedCooldown,
                };
                (outcome, None)
            }
        };

        tracing::info!(
            target: "soulsync::orchestrator",
            user = %user_hash,
            category = %category,
            turn_at_ms = turn.timestamp_ms,
            outcome = alert_outcome.as_str(),
            "Turn escalation handled"
        );
        Ok(TurnResult {
            risk_assessment: assessment,
            alert_outcome,
            case_id,
        })
    }

    fn enqueue_case(
        &self,
        turn: &ChatTurn,
        consent: &ConsentRecord,
        destination: String,
        assessment: RiskAssessment,
    ) -> EscalationResult<EscalationCase> {
        let category = assessment.category;
        let draft = EscalationCaseDraft {
            user_id: turn.user_id.clone(),
            user_name: consent.display_user_name().to_string(),
            risk_assessment: assessment,
            message_content: turn.text.clone(),
            emergency_contact_name: consent.contact_name.clone(),
            emergency_contact_phone: destination,
        };
        let now = self.clock.now_ms();
        let case = self.queue.enqueue(draft, now)?;
        self.record_audit(
            &turn.user_id,
            AuditAction::CaseQueued,
            json!({ "case_id": case.id, "category": category, "turn_at_ms": turn.timestamp_ms }),
            now,
        );
        Ok(case)
    }

    /// Audit entries follow state that is already committed, so a failed append is logged
    /// and never undoes or hides that state.
    fn record_audit(&self, user_id: &str, action: AuditAction, details: serde_json::Value, at_ms: i64) {
        if let Err(e) = self.audit.append(user_id, action, details, at_ms) {
            tracing::error!(
                target: "soulsync::orchestrator",
                user = %hash_user_id(user_id),
                action = action.as_str(),
                error = %e,
                "Audit append failed"
            );
        }
    }

    /// Cooldown check, send and record under the user's lock. Cooldown is recorded only
    /// after a successful send.
    ///
    /// Errors can only come from the cooldown read before anything is sent. Once the
    /// transport has been called the result is always a [`Delivery`].
    async fn dispatch_locked(&self, target: &DispatchTarget<'_>) -> EscalationResult<Delivery> {
        let user_id = target.user_id;
        let details = |extra: serde_json::Value| {
            let mut d = json!({ "case_id": target.case_id, "category": target.category });
            if let Some(at) = target.turn_at_ms {
                d["turn_at_ms"] = json!(at);
            }
            if let (Some(map), serde_json::Value::Object(extra)) = (d.as_object_mut(), extra) {
                map.extend(extra);
            }
            d
        };

        let _guard = self.locks.lock(user_id).await;

        let now = self.clock.now_ms();
        if self.cooldown.is_on_cooldown(user_id, now)? {
            self.record_audit(user_id, AuditAction::SuppressedCooldown, details(json!({})), now);
            return Ok(Delivery::SuppressedCooldown { at_ms: now });
        }

        let message = self
            .compose(target.category, target.user_name, target.contact_name, now)
            .await;
        let result = send_bounded(
            self.sender.as_ref(),
            target.destination,
            &message,
            self.config.send_timeout(),
        )
        .await;
        let at_ms = self.clock.now_ms();

        match result {
            Ok(()) => {
                if let Err(e) = self.cooldown.record_alert_sent(user_id, at_ms) {
                    tracing::error!(
                        target: "soulsync::orchestrator",
                        user = %hash_user_id(user_id),
                        case_id = ?target.case_id,
                        error = %e,
                        "Alert sent but cooldown could not be recorded"
                    );
                }
                self.record_audit(
                    user_id,
                    AuditAction::AlertSent,
                    details(json!({ "sender": self.sender.name() })),
                    at_ms,
                );
                Ok(Delivery::Sent { at_ms })
            }
            Err(e) => {
                tracing::error!(
                    target: "soulsync::orchestrator",
                    user = %hash_user_id(user_id),
                    case_id = ?target.case_id,
                    sender = self.sender.name(),
                    error = %e,
                    "Alert dispatch FAILED; no cooldown recorded"
                );
                self.record_audit(
                    user_id,
                    AuditAction::AlertFailed,
                    details(json!({ "error": e.to_string() })),
                    at_ms,
                );
                Ok(Delivery::Failed {
                    reason: e.to_string(),
                    at_ms,
                })
            }
        }
    }

    async fn compose(
        &self,
        category: RiskCategory,
        user_name: &str,
        contact_name: Option<&str>,
        now_ms: i64,
    ) -> String {
        let framing = self.framing_sentence(category, user_name).await;
        compose_alert(&AlertContext {
            category,
            user_name,
            contact_name,
            framing: framing.as_deref(),
            at: DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now),
        })
    }

    /// Optional empathetic sentence. Only the category and the user's name reach the
    /// generator. Any failure or timeout yields `None`.
    async fn framing_sentence(&self, category: RiskCategory, user_name: &str) -> Option<String> {
        if !self.config.framing_enabled {
            return None;
        }
        let generator = self.generator.as_ref()?;
        let prompt = format!(
            "Person: {}. Situation: {}.",
            user_name,
            category.display_name()
        );
        let timeout = self.config.generator_timeout();
        match tokio::time::timeout(timeout, generator.complete(FRAMING_SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(completion)) => {
                let line = completion.text.lines().next().unwrap_or("").trim();
                if line.is_empty() {
                    return None;
                }
                Some(line.chars().take(MAX_FRAMING_CHARS).collect())
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "soulsync::orchestrator", error = %e, "Framing generation failed; using template only");
                None
            }
            Err(_) => {
                tracing::warn!(
                    target: "soulsync::orchestrator",
                    timeout_ms = timeout.as_millis() as u64,
                    "Framing generation timed out; using template only"
                );
                None
            }
        }
    }

    /// Moderator approval. The first approval commits the status and dispatches once to the
    /// case's stored contact; repeats report the existing state.
    ///
    /// Once the approval is committed, every path ends with a delivery stored on the case.
    pub async fn approve(&self, case_id: Uuid) -> EscalationResult<ModerationResult> {
        let now = self.clock.now_ms();
        let transition = self.queue.resolve(case_id, Decision::Approve, now)?;
        if transition.already_terminal {
            return Ok(ModerationResult::from_case(&transition.case, true));
        }
        let case = transition.case;

        let target = DispatchTarget {
            user_id: &case.user_id,
            user_name: &case.user_name,
            contact_name: case.emergency_contact_name.as_deref(),
            destination: &case.emergency_contact_phone,
            category: case.risk_assessment.category,
            case_id: Some(case.id),
            turn_at_ms: None,
        };
        let delivery = match self.dispatch_locked(&target).await {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(
                    target: "soulsync::orchestrator",
                    %case_id,
                    error = %e,
                    "Approved case could not be dispatched"
                );
                Delivery::Failed {
                    reason: e.to_string(),
                    at_ms: self.clock.now_ms(),
                }
            }
        };
        self.record_audit(
            &case.user_id,
            AuditAction::CaseApproved,
            json!({ "case_id": case.id, "category": case.risk_assessment.category }),
            now,
        );

        let case = match self.queue.record_delivery(case.id, delivery.clone()) {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!(
                    target: "soulsync::orchestrator",
                    %case_id,
                    error = %e,
                    "Delivery result could not be stored on the case"
                );
                EscalationCase {
                    delivery: Some(delivery),
                    ..case
                }
            }
        };
        Ok(ModerationResult::from_case(&case, false))
    }

    /// Moderator rejection. Never dispatches.
    pub async fn reject(&self, case_id: Uuid) -> EscalationResult<ModerationResult> {
        let now = self.clock.now_ms();
        let transition = self.queue.resolve(case_id, Decision::Reject, now)?;
        if !transition.already_terminal {
            self.record_audit(
                &transition.case.user_id,
                AuditAction::CaseRejected,
                json!({ "case_id": transition.case.id }),
                now,
            );
        }
        Ok(ModerationResult::from_case(&transition.case, transition.already_terminal))
    }

    pub fn list_pending(&self) -> EscalationResult<Vec<EscalationCase>> {
        self.queue.list_pending()
    }

    pub fn get_case(&self, case_id: Uuid) -> EscalationResult<EscalationCase> {
        self.queue.get(case_id)
    }

    pub fn recent_audit(&self, limit: usize) -> EscalationResult<Vec<AuditEntry>> {
        self.audit.recent(limit)
    }
}
