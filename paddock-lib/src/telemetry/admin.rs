use hyper::Response;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::health::{json_response, RespBody};
use crate::error::Result;
use crate::gate::AdmissionGate;

/// Largest accepted `POST /load-factor` body
pub const MAX_ADMIN_BODY: usize = 1024;

#[derive(Debug, Deserialize)]
struct LoadFactorUpdate {
    factor: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadFactorView {
    factor: f64,
    min_factor: f64,
    max_factor: f64,
    adaptive: bool,
}

/// Counter store snapshot: key count, open windows, top consumers
pub fn stats_response(gate: &AdmissionGate) -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &gate.stats())
}

pub fn load_factor_response(gate: &AdmissionGate) -> Result<Response<RespBody>> {
    let (min_factor, max_factor) = gate.load_factor_bounds();
    json_response(
        StatusCode::OK,
        &LoadFactorView {
            factor: gate.load_factor(),
            min_factor,
            max_factor,
            adaptive: gate.is_adaptive(),
        },
    )
}

/// Apply `{"factor": <f64>}`. Requires the emergency token.
pub fn update_load_factor(
    gate: &AdmissionGate,
    token: Option<&str>,
    body: &[u8],
) -> Result<Response<RespBody>> {
    if !gate.check_override(token) {
        warn!("Rejected load factor update without a valid token");
        return json_response(StatusCode::FORBIDDEN, &json!({"error": "forbidden"}));
    }

    let update: LoadFactorUpdate = match serde_json::from_slice(body) {
        Ok(update) => update,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": format!("invalid body: {e}")}),
            )
        }
    };

    match gate.set_load_factor(update.factor) {
        Ok(_) => load_factor_response(gate),
        Err(e) => json_response(StatusCode::BAD_REQUEST, &json!({"error": e.to_string()})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{EmergencyOverride, LoadFactor, QuotaConfig, QuotaTable};
    use std::time::Duration;

    fn gate() -> AdmissionGate {
        let fallback = QuotaConfig { window: Duration::from_secs(60), max_requests: 10 };
        AdmissionGate::builder(QuotaTable::new(fallback))
            .emergency(EmergencyOverride::new(Some("t0ken".to_string())))
            .load_factor(LoadFactor::default())
            .build()
    }

    #[test]
    fn test_update_requires_token() -> Result<()> {
        let gate = gate();
        let resp = update_load_factor(&gate, Some("wrong"), br#"{"factor":0.5}"#)?;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(gate.load_factor(), 1.0);
        Ok(())
    }

    #[test]
    fn test_update_applies_factor() -> Result<()> {
        let gate = gate();
        let resp = update_load_factor(&gate, Some("t0ken"), br#"{"factor":0.5}"#)?;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(gate.load_factor(), 0.5);
        Ok(())
    }

    #[test]
    fn test_update_rejects_bad_body() -> Result<()> {
        let gate = gate();
        let resp = update_load_factor(&gate, Some("t0ken"), b"factor=0.5")?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
