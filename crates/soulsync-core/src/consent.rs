//! Per-user consent and emergency contact.
//!
//! The orchestrator only reads through [`ConsentRegistry`]. Writes happen from the settings
//! flow via [`ProfileStore::set_consent`].

use crate::error::{EscalationError, EscalationResult};
use serde::{Deserialize, Serialize};

/// Consent to contact a trusted person, and who that person is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub user_id: String,
    /// Name used in alert copy ("Alex may need support").
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Phone number or chat id, depending on the transport.
    #[serde(default)]
    pub contact_destination: Option<String>,
    #[serde(default)]
    pub granted_at_ms: Option<i64>,
}

impl ConsentRecord {
    /// Record used when nothing is stored: consent not given.
    pub fn absent(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: String::new(),
            consent_given: false,
            contact_name: None,
            contact_destination: None,
            granted_at_ms: None,
        }
    }

    pub fn granted(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        contact_name: impl Into<String>,
        contact_destination: impl Into<String>,
        granted_at_ms: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            consent_given: true,
            contact_name: Some(contact_name.into()),
            contact_destination: Some(contact_destination.into()),
            granted_at_ms: Some(granted_at_ms),
        }
    }

    /// Where an alert may go. `None` unless consent is given and a non-empty
    /// destination is on file.
    pub fn destination(&self) -> Option<&str> {
        if !self.consent_given {
            return None;
        }
        self.contact_destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Name for alert copy, falling back to a neutral phrase.
    pub fn display_user_name(&self) -> &str {
        let name = self.user_name.trim();
        if name.is_empty() {
            "Your friend"
        } else {
            name
        }
    }
}

/// Read side of the profile store as seen by the orchestrator.
pub trait ConsentRegistry: Send + Sync {
    /// A missing record is returned as [`ConsentRecord::absent`], never as an error.
    fn get_consent(&self, user_id: &str) -> EscalationResult<ConsentRecord>;
}

/// Sled-backed profile store (`consent` tree, key = user id, value = JSON).
#[derive(Clone)]
pub struct ProfileStore {
    tree: sled::Tree,
}

impl ProfileStore {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Insert or replace the record for `record.user_id`.
    pub fn set_consent(&self, record: &ConsentRecord) -> EscalationResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(record.user_id.as_bytes(), bytes)?;
        tracing::info!(
            target: "soulsync::consent",
            consent_given = record.consent_given,
            has_destination = record.destination().is_some(),
            "Consent updated"
        );
        Ok(())
    }
}

impl ConsentRegistry for ProfileStore {
    fn get_consent(&self, user_id: &str) -> EscalationResult<ConsentRecord> {
        match self.tree.get(user_id.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|_| EscalationError::Corrupt {
                key: format!("{}/{}", crate::store::TREE_CONSENT, user_id),
            }),
            None => Ok(ConsentRecord::absent(user_id)),
        }
    }
}
