use bytes::Bytes;
use http::{HeaderValue, Method};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::gate::{names, AdmissionGate, GateOutcome, RequestInfo};
use crate::telemetry::Metrics;

pub(crate) type RespBody = BoxBody<Bytes, hyper::Error>;

/// The request being authorized: method and path from `X-Forwarded-Method`
/// and `X-Forwarded-Uri` when the fronting proxy sets them, otherwise the
/// request line itself. The query string is dropped.
pub fn forwarded_target(req_method: &Method, req_path: &str, headers: &http::HeaderMap) -> (Method, String) {
    let method = headers
        .get(names::FORWARDED_METHOD)
        .and_then(|v| Method::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| req_method.clone());
    let uri = headers
        .get(names::FORWARDED_URI)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(req_path);
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    let path = if path.is_empty() { "/" } else { path };
    (method, path.to_string())
}

fn body_bytes(bytes: Vec<u8>) -> RespBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed()
}

/// Render a gate outcome as the forward-auth reply.
///
/// Never fails: a body that cannot be serialized is sent empty.
pub fn outcome_response(outcome: GateOutcome) -> Response<RespBody> {
    let status = outcome.status();
    let body = match outcome.body() {
        Some(rejection) => match serde_json::to_vec(rejection) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Failed to serialize rejection body");
                None
            }
        },
        None => None,
    };

    let mut resp = Response::new(body_bytes(Vec::new()));
    *resp.status_mut() = status;
    *resp.headers_mut() = outcome.headers;
    if let Some(bytes) = body {
        resp.headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *resp.body_mut() = body_bytes(bytes);
    }
    resp
}

/// Decide one forward-auth request.
pub fn handle_request<B>(
    req: &hyper::Request<B>,
    peer: SocketAddr,
    gate: &AdmissionGate,
    metrics: Option<&Arc<Metrics>>,
) -> Response<RespBody> {
    let (method, path) = forwarded_target(req.method(), req.uri().path(), req.headers());
    let info = RequestInfo::new(&method, &path, req.headers(), peer);
    let outcome = gate.admit(&info);

    debug!(
        ?peer,
        method = %method,
        path = %path,
        decision = outcome.decision.label(),
        "Admission decided"
    );

    let resp = outcome_response(outcome);
    if let Some(m) = metrics {
        m.record_http_response(resp.status().as_u16());
    }
    resp
}
