//! API route handlers.
//!
//! Reads are served from the latest published snapshot. Writes are
//! published on the bus and reconciled on the next tick like any other
//! simulation traffic.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mirror_core::{
    topic_for, topics, EntityDocument, Message, MessageKind, RequestMsg, SceneDocument, Transport,
};
use serde::{Deserialize, Serialize};

use crate::{metrics, AppState};

/// Errors returned by the API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No snapshot has been published yet.
    #[error("Mirror not ready")]
    NotReady,
    /// The entity is not in the latest snapshot.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),
    /// Responses are produced by the mirror, not injected.
    #[error("Message kind {0} cannot be injected")]
    NotInjectable(MessageKind),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::EntityNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotInjectable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (code, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Acknowledgement for injected traffic.
#[derive(Debug, Serialize, Deserialize)]
pub struct Accepted {
    /// Topic the message was published on.
    pub topic: String,
    /// Subscribers that received it.
    pub delivered: usize,
    /// Request id, for injected requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// Body of `POST /api/requests`.
#[derive(Debug, Deserialize)]
pub struct RequestBody {
    /// Verb, e.g. `entity_delete`.
    pub verb: String,
    /// Verb argument.
    #[serde(default)]
    pub data: String,
    /// Numeric argument.
    #[serde(default)]
    pub dbl_data: Option<f64>,
}

/// Get the latest scene snapshot.
#[tracing::instrument(name = "get_scene", skip(state))]
pub async fn get_scene(State(state): State<AppState>) -> Result<Json<SceneDocument>, ApiError> {
    let doc = state.snapshots.latest().ok_or(ApiError::NotReady)?;
    Ok(Json(doc.as_ref().clone()))
}

/// Get pending message counts per kind.
#[tracing::instrument(name = "get_pending", skip(state))]
pub async fn get_pending(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<MessageKind, usize>>, ApiError> {
    let doc = state.snapshots.latest().ok_or(ApiError::NotReady)?;
    Ok(Json(doc.pending.clone()))
}

/// Get one entity from the latest snapshot.
#[tracing::instrument(name = "get_entity", skip(state))]
pub async fn get_entity(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<EntityDocument>, ApiError> {
    if state.snapshots.latest().is_none() {
        return Err(ApiError::NotReady);
    }
    state
        .snapshots
        .entity(&name)
        .map(Json)
        .ok_or(ApiError::EntityNotFound(name))
}

/// Publish a message on its topic, as the simulation would.
#[tracing::instrument(name = "post_message", skip(state, message), fields(kind = %message.kind()))]
pub async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let kind = message.kind();
    if kind == MessageKind::Response {
        return Err(ApiError::NotInjectable(kind));
    }
    let topic = topic_for(kind);
    let delivered = state.bus.publish(topic, message);
    metrics::record_injected(kind, delivered);
    tracing::debug!("Injected {kind} message to {delivered} subscribers");

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            topic: topic.to_string(),
            delivered,
            id: None,
        }),
    ))
}

/// Publish a request verb with a fresh id.
#[tracing::instrument(name = "post_request", skip(state, body), fields(verb = %body.verb))]
pub async fn post_request(
    State(state): State<AppState>,
    Json(body): Json<RequestBody>,
) -> (StatusCode, Json<Accepted>) {
    let id = state.next_request_id();
    let request = RequestMsg {
        id,
        verb: body.verb,
        data: body.data,
        dbl_data: body.dbl_data,
    };
    let delivered = state.bus.publish(topics::REQUEST, Message::Request(request));
    metrics::record_injected(MessageKind::Request, delivered);

    (
        StatusCode::ACCEPTED,
        Json(Accepted {
            topic: topics::REQUEST.to_string(),
            delivered,
            id: Some(id),
        }),
    )
}
