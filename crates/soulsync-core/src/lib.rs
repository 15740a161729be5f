//! SoulSync core: mood-risk detection and crisis escalation.
//!
//! A chat turn is classified into a [`RiskCategory`]. If the user has consented to an
//! emergency contact, the [`EscalationOrchestrator`] either queues the case for a moderator
//! or sends the alert directly, never more than once per cooldown window.
//!
//! State lives in one sled database ([`EscalationStore`]); transports and the optional
//! text generator are injected behind traits.

pub mod audit;
pub mod clock;
pub mod config;
pub mod consent;
pub mod cooldown;
pub mod error;
pub mod generator;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod risk;
pub mod store;

pub use audit::{hash_user_id, AuditAction, AuditEntry, AuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeploymentMode, EscalationConfig, DEFAULT_COOLDOWN_MS};
pub use consent::{ConsentRecord, ConsentRegistry, ProfileStore};
pub use cooldown::{CooldownLedger, UserLockGuard, UserLocks};
pub use error::{EscalationError, EscalationResult};
pub use generator::{
    generator_from_env, Completion, GeneratorError, OpenRouterGenerator, TextGenerator, TextStream,
    COMPANION_SYSTEM_PROMPT, FALLBACK_REPLY,
};
pub use notify::{
    compose_alert, send_bounded, sender_from_env, AlertContext, LogSender, NotificationSender, NotifyError,
    TelegramSender,
};
pub use orchestrator::{AlertOutcome, ChatTurn, EscalationOrchestrator, ModerationResult, TurnResult};
pub use queue::{CaseStatus, Decision, Delivery, EscalationCase, EscalationCaseDraft, EscalationQueue, Transition};
pub use risk::{
    strip_labels, trailing_label, Confidence, LabelStreamFilter, LabelTag, RiskAssessment, RiskCategory, RiskClassifier,
    RiskLevel, StrippedText,
};
pub use store::EscalationStore;
