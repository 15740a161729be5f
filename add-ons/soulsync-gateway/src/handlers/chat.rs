//! End-user chat routes. Responses carry the cleaned reply and at most a banner about
//! escalation; label tags and moderator detail never reach this surface.

use super::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use soulsync_core::{
    AlertOutcome, ChatTurn, LabelStreamFilter, RiskAssessment, RiskCategory, RiskLevel, TurnResult,
    COMPANION_SYSTEM_PROMPT, FALLBACK_REPLY,
};
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub(crate) struct TurnRequest {
    pub user_id: String,
    pub text: String,
    /// Client timestamp, carried into logs and audit details. The server clock is used when absent.
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

impl TurnRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.user_id.trim().is_empty() {
            return Err(ApiError::BadRequest("user_id is required".to_string()));
        }
        Ok(())
    }

    fn to_turn(&self, now_ms: i64) -> ChatTurn {
        ChatTurn {
            user_id: self.user_id.trim().to_string(),
            text: self.text.clone(),
            timestamp_ms: self.timestamp_ms.unwrap_or(now_ms),
        }
    }
}

/// What the chat client sees of a turn.
#[derive(Debug, Serialize)]
pub(crate) struct TurnView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    pub category: RiskCategory,
    pub risk_level: RiskLevel,
    pub alert_outcome: AlertOutcome,
    pub banner: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
}

impl TurnView {
    fn from_result(result: &TurnResult, reply: Option<String>) -> Self {
        Self {
            reply,
            category: result.risk_assessment.category,
            risk_level: result.risk_assessment.level(),
            alert_outcome: result.alert_outcome,
            banner: result.alert_outcome.user_banner(),
            case_id: result.case_id,
        }
    }

    /// Escalation storage failed; the user still gets their reply.
    fn degraded(assessment: &RiskAssessment, reply: Option<String>) -> Self {
        Self {
            reply,
            category: assessment.category,
            risk_level: assessment.level(),
            alert_outcome: AlertOutcome::None,
            banner: None,
            case_id: None,
        }
    }
}

/// POST /api/v1/turns – classify a user message and act on it; no reply is generated.
pub(crate) async fn submit_turn(State(state): State<AppState>, Json(req): Json<TurnRequest>) -> ApiResult<TurnView> {
    req.validate()?;
    let turn = req.to_turn(state.orchestrator.now_ms());
    let result = state.orchestrator.handle_turn(&turn).await?;
    Ok(Json(TurnView::from_result(&result, None)))
}

/// POST /api/v1/chat – companion reply plus escalation handling.
///
/// A `{{Label}}` in the reply decides the category; otherwise keywords in the user's text do.
pub(crate) async fn chat_reply(State(state): State<AppState>, Json(req): Json<TurnRequest>) -> ApiResult<TurnView> {
    req.validate()?;
    let orchestrator = &state.orchestrator;
    let turn = req.to_turn(orchestrator.now_ms());

    let raw_reply = match orchestrator.generator() {
        Some(generator) => {
            let bounded = tokio::time::timeout(
                orchestrator.config().generator_timeout(),
                generator.generate(COMPANION_SYSTEM_PROMPT, &turn.text),
            )
            .await;
            match bounded {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(target: "soulsync::gateway", error = %e, "Reply generation failed; using fallback");
                    FALLBACK_REPLY.to_string()
                }
                Err(_) => {
                    tracing::warn!(target: "soulsync::gateway", "Reply generation timed out; using fallback");
                    FALLBACK_REPLY.to_string()
                }
            }
        }
        None => FALLBACK_REPLY.to_string(),
    };

    let assessment = orchestrator.classifier().assess(&turn.text, &raw_reply);
    let reply = assessment.display_text.clone();
    Ok(Json(escalate(&state, &turn, assessment, reply).await))
}

async fn escalate(state: &AppState, turn: &ChatTurn, assessment: RiskAssessment, reply: String) -> TurnView {
    match state.orchestrator.handle_assessed_turn(turn, assessment.clone()).await {
        Ok(result) => TurnView::from_result(&result, Some(reply)),
        Err(e) => {
            tracing::error!(
                target: "soulsync::gateway",
                error = %e,
                category = assessment.category.as_str(),
                "Escalation handling failed"
            );
            TurnView::degraded(&assessment, Some(reply))
        }
    }
}

/// POST /api/v1/chat/stream – reply as SSE `delta` events, then one `assessment` event.
pub(crate) async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<Sse<impl futures_util::Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    req.validate()?;
    let turn = req.to_turn(state.orchestrator.now_ms());

    let upstream = match state.orchestrator.generator() {
        Some(generator) => match generator.generate_stream(COMPANION_SYSTEM_PROMPT, &turn.text).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(target: "soulsync::gateway", error = %e, "Stream setup failed; using fallback");
                None
            }
        },
        None => None,
    };
    let chunk_timeout = state.orchestrator.config().generator_timeout();

    let stream = async_stream::stream! {
        let mut filter = LabelStreamFilter::new();
        let mut raw = String::new();
        match upstream {
            Some(mut upstream) => loop {
                match tokio::time::timeout(chunk_timeout, upstream.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        raw.push_str(&chunk);
                        let visible = filter.push(&chunk);
                        if !visible.is_empty() {
                            yield Ok(Event::default().event("delta").data(visible));
                        }
                    }
                    Ok(Some(Err(e))) => {
                        tracing::warn!(target: "soulsync::gateway", error = %e, "Reply stream failed mid-way");
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(target: "soulsync::gateway", "Reply stream stalled");
                        break;
                    }
                }
            },
            None => {
                raw.push_str(FALLBACK_REPLY);
                yield Ok(Event::default().event("delta").data(filter.push(FALLBACK_REPLY)));
            }
        }
        let (tail, _) = filter.finish();
        if !tail.is_empty() {
            yield Ok(Event::default().event("delta").data(tail));
        }

        let assessment = state.orchestrator.classifier().assess(&turn.text, &raw);
        let view = escalate(&state, &turn, assessment, String::new()).await;
        let view = TurnView { reply: None, ..view };
        match Event::default().event("assessment").json_data(&view) {
            Ok(event) => yield Ok(event),
            Err(e) => tracing::error!(target: "soulsync::gateway", error = %e, "Could not encode assessment event"),
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive")))
}
