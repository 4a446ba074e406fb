use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::error::{GateError, Result};
use crate::gate::AdmissionGate;

pub(crate) type RespBody = BoxBody<Bytes, hyper::Error>;

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| GateError::Http(format!("Failed to serialize response: {e}")))?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| GateError::Http(format!("Failed to build response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Readiness check - the gate is built, so requests can be decided
/// Reports whether admission control is enforcing or disabled
pub fn ready_check_response(gate: &AdmissionGate) -> Result<Response<RespBody>> {
    let admission = if gate.is_enabled() { "enforcing" } else { "disabled" };
    json_response(StatusCode::OK, &json!({"status": "ready", "admission": admission}))
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "alive"}))
}
