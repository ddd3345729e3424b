//! Trigger, health and reconciliation endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, StartOutcome, StopOutcome};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use konakore_remote::{HealthResponse, TriggerAction, TriggerRequest, TriggerResponse};
use time::OffsetDateTime;

fn response(status: &str, message: &str) -> Json<TriggerResponse> {
    Json(TriggerResponse {
        status: status.to_string(),
        message: message.to_string(),
    })
}

/// Read the requested action. An empty body or a missing action means start.
fn parse_action(body: &[u8]) -> ApiResult<TriggerAction> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TriggerAction::Start);
    }
    let request: TriggerRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    match request.action {
        None => Ok(TriggerAction::Start),
        Some(action) => action.parse().map_err(ApiError::BadRequest),
    }
}

/// `POST /trigger`: start, stop or query the sync loop.
pub async fn trigger(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<TriggerResponse>> {
    let action = parse_action(&body)?;
    let controller = &state.controller;

    let reply = match action {
        TriggerAction::Start => match controller.start().await {
            StartOutcome::Started => response("triggered", "File sync process started"),
            StartOutcome::AlreadyRunning => {
                response("already_running", "Sync process is already active")
            }
        },
        TriggerAction::Stop => match controller.stop().await {
            StopOutcome::Stopping => response("stopping", "Stop signal sent to sync process"),
            StopOutcome::NotRunning => response("not_running", "Sync process is not active"),
        },
        TriggerAction::Status => {
            if controller.is_running().await {
                response("running", "Sync process is active")
            } else {
                response("stopped", "Sync process is not active")
            }
        }
    };
    Ok(reply)
}

/// `GET /health`. Always healthy while the listener answers.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        sync_running: state.controller.is_running().await,
        timestamp: OffsetDateTime::now_utc().unix_timestamp(),
    })
}

/// `POST /reconcile`: run one deep reconciliation pass in the background.
pub async fn reconcile(State(state): State<AppState>) -> Json<TriggerResponse> {
    if state.controller.reconcile_in_background() {
        response("triggered", "Reconciliation started")
    } else {
        response("already_running", "Reconciliation is already in progress")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_defaults_to_start() {
        assert_eq!(parse_action(b"").unwrap(), TriggerAction::Start);
        assert_eq!(parse_action(b"  \n").unwrap(), TriggerAction::Start);
        assert_eq!(parse_action(b"{}").unwrap(), TriggerAction::Start);
        assert_eq!(
            parse_action(br#"{"action":"stop"}"#).unwrap(),
            TriggerAction::Stop
        );
    }

    #[test]
    fn test_parse_action_rejects_unknown() {
        let err = parse_action(br#"{"action":"restart"}"#).unwrap_err();
        assert_eq!(err.code(), "bad_request");
        assert!(parse_action(b"not json").is_err());
    }
}
