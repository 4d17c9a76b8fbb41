//! Signaling HTTP Handlers
//!
//! REST fallback carrier for clients without a persistent channel. Every
//! endpoint dispatches into the same handler core as the WebSocket carrier;
//! sessions created here hold no event channel, so peer discovery degrades
//! to polling the producers endpoint.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;
use vv_proto::{
    ConsumerDescriptor, DtlsParameters, MediaKind, ProducerId, ProducerInfo, RtpCapabilities,
    RtpParameters, TransportDescriptor, TransportDirection,
};

use super::error::SignalError;
use super::handler::{self, ID_REGEX};
use crate::api::AppState;

/// Create the signaling REST router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/capabilities", get(get_capabilities))
        .route("/rooms/{room_id}/transports", post(create_transport))
        .route(
            "/rooms/{room_id}/transports/{transport_id}/connect",
            post(connect_transport),
        )
        .route("/rooms/{room_id}/produce", post(produce))
        .route("/rooms/{room_id}/consume", post(consume))
        .route("/rooms/{room_id}/producers", get(list_producers))
        .route("/rooms/{room_id}/leave", post(leave))
}

/// Response containing router RTP capabilities.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    /// Router RTP capabilities, relayed from the media engine verbatim.
    #[schema(value_type = Object)]
    pub rtp_capabilities: RtpCapabilities,
}

/// Request to allocate a transport.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportRequest {
    /// Owning user.
    #[validate(regex(path = *ID_REGEX, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub user_id: String,
    /// Intended media direction.
    #[schema(value_type = String)]
    pub direction: TransportDirection,
}

/// Request to finish a transport's DTLS handshake.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    /// Client DTLS parameters.
    #[schema(value_type = Object)]
    pub dtls_parameters: DtlsParameters,
}

/// Response confirming a transport handshake.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConnectResponse {
    /// Always true; failures surface as error bodies.
    pub connected: bool,
}

/// Request to publish a track.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    /// Publishing user.
    #[validate(regex(path = *ID_REGEX, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub user_id: String,
    /// Send transport to publish over.
    #[validate(length(min = 1, max = 64))]
    pub transport_id: String,
    /// Track kind.
    #[schema(value_type = String)]
    pub kind: MediaKind,
    /// Track RTP parameters.
    #[schema(value_type = Object)]
    pub rtp_parameters: RtpParameters,
}

/// Response describing the accepted producer.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProduceResponse {
    /// Engine-allocated producer id.
    #[schema(value_type = String)]
    pub id: ProducerId,
    /// Kind accepted.
    #[schema(value_type = String)]
    pub kind: MediaKind,
}

/// Request to subscribe to a producer.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// Subscribing user.
    #[validate(regex(path = *ID_REGEX, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub user_id: String,
    /// Receive transport to subscribe over.
    #[validate(length(min = 1, max = 64))]
    pub transport_id: String,
    /// Producer to forward.
    #[validate(length(min = 1, max = 64))]
    pub producer_id: String,
    /// Subscriber's device RTP capabilities.
    pub rtp_capabilities: RtpCapabilities,
}

/// Query identifying the polling user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducersQuery {
    /// Caller; their own producers are excluded.
    pub user_id: String,
}

/// Response listing the producers visible to the caller.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProducersResponse {
    /// Live producers of every other member.
    #[schema(value_type = Vec<Object>)]
    pub producers: Vec<ProducerInfo>,
}

/// Request to leave a room.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    /// Leaving user.
    #[validate(regex(path = *ID_REGEX, message = "must be 1-64 characters of [A-Za-z0-9_-]"))]
    pub user_id: String,
}

/// Response confirming a leave.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LeaveResponse {
    /// Always true; leaving is idempotent.
    pub left: bool,
}

/// Get router RTP capabilities.
///
/// GET /api/capabilities
#[utoipa::path(
    get,
    path = "/api/capabilities",
    tag = "signaling",
    responses(
        (status = 200, description = "Router RTP capabilities"),
        (status = 503, description = "Media engine not ready"),
    ),
)]
pub async fn get_capabilities(
    State(state): State<AppState>,
) -> Result<Json<CapabilitiesResponse>, SignalError> {
    let rtp_capabilities = handler::get_capabilities(&state.engine).await?;
    Ok(Json(CapabilitiesResponse { rtp_capabilities }))
}

/// Allocate a WebRTC transport.
///
/// POST /api/rooms/{room_id}/transports
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/transports",
    tag = "signaling",
    responses(
        (status = 200, description = "Transport descriptor"),
        (status = 400, description = "Validation error"),
    ),
)]
pub async fn create_transport(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<CreateTransportRequest>,
) -> Result<Json<TransportDescriptor>, SignalError> {
    body.validate()
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    let descriptor = handler::create_transport(
        &state.engine,
        &state.rooms,
        &room_id.into(),
        &body.user_id.into(),
        body.direction,
    )
    .await?;
    Ok(Json(descriptor))
}

/// Finish the DTLS handshake for a transport.
///
/// POST /api/rooms/{room_id}/transports/{transport_id}/connect
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/transports/{transport_id}/connect",
    tag = "signaling",
    responses(
        (status = 200, description = "Transport connected"),
        (status = 404, description = "Room or transport not found"),
    ),
)]
pub async fn connect_transport(
    State(state): State<AppState>,
    Path((room_id, transport_id)): Path<(String, String)>,
    Json(body): Json<ConnectTransportRequest>,
) -> Result<Json<ConnectResponse>, SignalError> {
    handler::connect_transport(
        &state.engine,
        &state.rooms,
        &room_id.into(),
        &transport_id.into(),
        &body.dtls_parameters,
    )
    .await?;
    Ok(Json(ConnectResponse { connected: true }))
}

/// Publish a track.
///
/// POST /api/rooms/{room_id}/produce
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/produce",
    tag = "signaling",
    responses(
        (status = 200, description = "Producer created"),
        (status = 404, description = "Room or transport not found"),
    ),
)]
pub async fn produce(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<ProduceRequest>,
) -> Result<Json<ProduceResponse>, SignalError> {
    body.validate()
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    let (id, kind) = handler::produce(
        &state.engine,
        &state.rooms,
        &room_id.into(),
        &body.user_id.into(),
        &body.transport_id.into(),
        body.kind,
        body.rtp_parameters,
    )
    .await?;
    Ok(Json(ProduceResponse { id, kind }))
}

/// Subscribe to a producer.
///
/// POST /api/rooms/{room_id}/consume
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/consume",
    tag = "signaling",
    responses(
        (status = 200, description = "Consumer descriptor"),
        (status = 400, description = "Capabilities cannot consume the producer"),
        (status = 404, description = "Room, transport or producer not found"),
    ),
)]
pub async fn consume(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<ConsumerDescriptor>, SignalError> {
    body.validate()
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    let descriptor = handler::consume(
        &state.engine,
        &state.rooms,
        &room_id.into(),
        &body.user_id.into(),
        &body.transport_id.into(),
        &body.producer_id.into(),
        body.rtp_capabilities,
    )
    .await?;
    Ok(Json(descriptor))
}

/// List the producers visible to the caller.
///
/// GET /api/rooms/{room_id}/producers?userId=...
///
/// The polling substitute for new-producer pushes: clients on this carrier
/// diff the list against what they already consume.
#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/producers",
    tag = "signaling",
    responses(
        (status = 200, description = "Producers of every other member"),
        (status = 404, description = "Room not found"),
    ),
)]
pub async fn list_producers(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<ProducersQuery>,
) -> Result<Json<ProducersResponse>, SignalError> {
    let producers =
        handler::list_producers(&state.rooms, &room_id.into(), &query.user_id.into()).await?;
    Ok(Json(ProducersResponse { producers }))
}

/// Leave a room.
///
/// POST /api/rooms/{room_id}/leave
#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/leave",
    tag = "signaling",
    responses(
        (status = 200, description = "Session released"),
        (status = 400, description = "Validation error"),
    ),
)]
pub async fn leave(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<LeaveRequest>,
) -> Result<Json<LeaveResponse>, SignalError> {
    body.validate()
        .map_err(|e| SignalError::Validation(e.to_string()))?;

    handler::leave(
        &state.engine,
        &state.rooms,
        &room_id.into(),
        &body.user_id.into(),
    )
    .await;
    Ok(Json(LeaveResponse { left: true }))
}
