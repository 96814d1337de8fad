//! Request handlers and rejection mapping

use crate::directory::TeamRegistration;
use crate::error::{sanitize_error_message, ErrorResponse, GatewayError};
use crate::gateway::Gateway;
use crate::observability::metrics::metrics;
use crate::routing::RouteRequest;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// Query string of `GET /teams`
#[derive(Debug, Default, Deserialize)]
pub struct TeamsQuery {
    pub capability: Option<String>,
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn ok<T: Serialize>(value: &T) -> Result<Response, Infallible> {
    Ok(json_reply(value, StatusCode::OK))
}

/// Map a gateway error to its status code and structured body
pub fn error_reply(err: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, "Request rejected");
    }
    json_reply(&err.to_error_response(), status)
}

fn respond<T: Serialize>(result: Result<T, GatewayError>) -> Result<Response, Infallible> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => Ok(error_reply(&e)),
    }
}

pub async fn health(gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    ok(&gateway.liveness())
}

pub async fn register(
    registration: TeamRegistration,
    gateway: Arc<Gateway>,
) -> Result<Response, Infallible> {
    respond(gateway.register(registration).await)
}

pub async fn unregister(team_id: String, gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    respond(gateway.unregister(&team_id).await)
}

pub async fn list_teams(query: TeamsQuery, gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    ok(&gateway.teams(query.capability.as_deref()))
}

pub async fn get_team(team_id: String, gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    respond(gateway.team(&team_id))
}

pub async fn capabilities(gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    ok(&gateway.capabilities())
}

pub async fn route(request: RouteRequest, gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    respond(gateway.route(request).await)
}

pub async fn proxy(
    team_id: String,
    body: Value,
    gateway: Arc<Gateway>,
) -> Result<Response, Infallible> {
    respond(gateway.proxy(&team_id, body).await)
}

pub async fn stats(gateway: Arc<Gateway>) -> Result<Response, Infallible> {
    ok(&gateway.stats())
}

pub async fn metrics_snapshot() -> Result<Response, Infallible> {
    ok(&metrics().get_metrics())
}

/// Turn warp rejections into the same error body handlers produce
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, kind, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "No such route".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "invalid_input",
            "Request body too large".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "invalid_input",
            "Content-Length header required".to_string(),
        )
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "invalid_input", e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "invalid_input",
            "Method not allowed".to_string(),
        )
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Unhandled request".to_string(),
        )
    };

    let body = ErrorResponse {
        error: kind.to_string(),
        detail: sanitize_error_message(&detail),
        team_id: None,
        timestamp: Utc::now().to_rfc3339(),
    };
    Ok(json_reply(&body, status))
}
