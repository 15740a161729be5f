//! Moderator review routes.

use super::ApiResult;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use soulsync_core::{AuditEntry, EscalationCase, ModerationResult, RiskCategory, RiskLevel};
use uuid::Uuid;

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

/// Row in the pending list. Full detail comes from the per-case route.
#[derive(Debug, Serialize)]
pub(crate) struct CaseSummary {
    pub case_id: Uuid,
    pub user_name: String,
    pub category: RiskCategory,
    pub risk_level: RiskLevel,
    pub risk_score: f32,
    pub message_preview: String,
    pub created_at_ms: i64,
}

const PREVIEW_CHARS: usize = 120;

impl From<&EscalationCase> for CaseSummary {
    fn from(case: &EscalationCase) -> Self {
        let category = case.risk_assessment.category;
        let mut preview: String = case.message_content.chars().take(PREVIEW_CHARS).collect();
        if case.message_content.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        Self {
            case_id: case.id,
            user_name: case.user_name.clone(),
            category,
            risk_level: category.level(),
            risk_score: category.risk_score(),
            message_preview: preview,
            created_at_ms: case.created_at_ms,
        }
    }
}

/// GET /api/v1/moderator/queue – pending cases, oldest first.
pub(crate) async fn list_queue(State(state): State<AppState>) -> ApiResult<Vec<CaseSummary>> {
    let pending = state.orchestrator.list_pending()?;
    Ok(Json(pending.iter().map(CaseSummary::from).collect()))
}

/// GET /api/v1/moderator/escalation/:case_id
pub(crate) async fn get_case(State(state): State<AppState>, Path(case_id): Path<Uuid>) -> ApiResult<EscalationCase> {
    Ok(Json(state.orchestrator.get_case(case_id)?))
}

/// POST /api/v1/moderator/escalation/:case_id/approve
pub(crate) async fn approve_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
) -> ApiResult<ModerationResult> {
    let result = state.orchestrator.approve(case_id).await?;
    tracing::info!(
        target: "soulsync::gateway",
        %case_id,
        status = result.status.as_str(),
        already_terminal = result.already_terminal,
        "Moderator approved case"
    );
    Ok(Json(result))
}

/// POST /api/v1/moderator/escalation/:case_id/reject
pub(crate) async fn reject_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
) -> ApiResult<ModerationResult> {
    let result = state.orchestrator.reject(case_id).await?;
    tracing::info!(
        target: "soulsync::gateway",
        %case_id,
        status = result.status.as_str(),
        already_terminal = result.already_terminal,
        "Moderator rejected case"
    );
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuditQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/v1/moderator/audit?limit=N – newest first.
pub(crate) async fn recent_audit(
    State(state): State<AppState>,
    Query(q): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    let limit = q.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
    Ok(Json(state.orchestrator.recent_audit(limit)?))
}
