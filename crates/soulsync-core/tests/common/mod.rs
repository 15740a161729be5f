//! Shared fixtures for the escalation integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use soulsync_core::{
    Clock, ConsentRecord, DeploymentMode, EscalationConfig, EscalationOrchestrator, EscalationStore,
    ManualClock, NotificationSender, NotifyError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const T0: i64 = 1_767_225_600_000;
pub const HOUR: i64 = 3_600_000;
pub const CONTACT: &str = "chat-42";

/// Sender that records every delivery and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("connection refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: EscalationStore,
    pub clock: Arc<ManualClock>,
    pub sender: Arc<RecordingSender>,
    pub orchestrator: Arc<EscalationOrchestrator>,
}

pub fn config(mode: DeploymentMode) -> EscalationConfig {
    let mut cfg = EscalationConfig::default().with_mode(mode).with_cooldown_ms(HOUR);
    cfg.send_timeout_ms = 2_000;
    cfg.generator_timeout_ms = 500;
    cfg
}

pub fn harness(mode: DeploymentMode) -> Harness {
    harness_with(config(mode), RecordingSender::new(), |o| o)
}

pub fn harness_with(
    cfg: EscalationConfig,
    sender: Arc<RecordingSender>,
    customize: impl FnOnce(EscalationOrchestrator) -> EscalationOrchestrator,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = EscalationStore::open_path(dir.path().join("db")).unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let orchestrator = EscalationOrchestrator::new(&store, cfg, sender.clone())
        .unwrap()
        .with_clock(clock.clone() as Arc<dyn Clock>);
    Harness {
        _dir: dir,
        store,
        clock,
        sender,
        orchestrator: Arc::new(customize(orchestrator)),
    }
}

impl Harness {
    pub fn grant_consent(&self, user_id: &str) {
        self.store
            .profiles()
            .unwrap()
            .set_consent(&ConsentRecord::granted(user_id, "Alex", "Sam", CONTACT, T0 - HOUR))
            .unwrap();
    }

    pub fn turn(&self, user_id: &str, text: &str) -> soulsync_core::ChatTurn {
        soulsync_core::ChatTurn {
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp_ms: self.clock.now_ms(),
        }
    }
}
