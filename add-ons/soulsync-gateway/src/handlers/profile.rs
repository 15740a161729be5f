//! Consent settings. The only write path into the profile store.

use super::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use soulsync_core::{ConsentRecord, ConsentRegistry};

#[derive(Debug, Deserialize)]
pub(crate) struct ConsentUpdate {
    #[serde(default)]
    pub user_name: Option<String>,
    pub consent_given: bool,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_destination: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// GET /api/v1/profile/:user_id/consent
pub(crate) async fn get_consent(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult<ConsentRecord> {
    Ok(Json(state.profiles.get_consent(&user_id)?))
}

/// PUT /api/v1/profile/:user_id/consent
///
/// Granting requires a destination. Revoking keeps the contact on file but clears the grant time.
pub(crate) async fn put_consent(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<ConsentUpdate>,
) -> ApiResult<ConsentRecord> {
    let previous = state.profiles.get_consent(&user_id)?;
    let destination = non_empty(update.contact_destination).or(previous.contact_destination.clone());
    if update.consent_given && destination.is_none() {
        return Err(ApiError::BadRequest(
            "contact_destination is required when consent is given".to_string(),
        ));
    }

    let granted_at_ms = match (update.consent_given, previous.consent_given) {
        (true, true) => previous.granted_at_ms.or(Some(state.orchestrator.now_ms())),
        (true, false) => Some(state.orchestrator.now_ms()),
        (false, _) => None,
    };
    let record = ConsentRecord {
        user_id: user_id.clone(),
        user_name: non_empty(update.user_name).unwrap_or(previous.user_name),
        consent_given: update.consent_given,
        contact_name: non_empty(update.contact_name).or(previous.contact_name),
        contact_destination: destination,
        granted_at_ms,
    };
    state.profiles.set_consent(&record)?;
    Ok(Json(record))
}
