use chrono::{DateTime, Utc};
use serde::Serialize;

use super::headers::iso8601;
use crate::admission::{AdmissionResult, QuotaConfig};

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const RATE_LIMIT_CONFIG_MISSING: &str = "RATE_LIMIT_CONFIG_MISSING";

/// JSON body returned with a rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionBody {
    pub success: bool,
    pub error: RejectionError,
    pub timestamp: String,
    pub path: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<RejectionDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionDetails {
    pub limit: u32,
    pub window_ms: u64,
    pub retry_after: u64,
    pub reset_time: String,
}

impl RejectionBody {
    /// 429 body for an exhausted quota.
    pub fn exceeded(
        quota: &QuotaConfig,
        result: &AdmissionResult,
        now: DateTime<Utc>,
        path: &str,
        method: &str,
    ) -> Self {
        let retry_after = result.retry_after_secs(now);
        Self {
            success: false,
            error: RejectionError {
                code: RATE_LIMIT_EXCEEDED,
                message: format!("Too many requests. Try again in {retry_after} seconds."),
                details: Some(RejectionDetails {
                    limit: quota.max_requests,
                    window_ms: u64::try_from(quota.window_ms()).unwrap_or(u64::MAX),
                    retry_after,
                    reset_time: iso8601(result.reset_at),
                }),
            },
            timestamp: iso8601(now),
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    /// 503 body for a category/role pair with no configured quota.
    pub fn unconfigured(now: DateTime<Utc>, path: &str, method: &str) -> Self {
        Self {
            success: false,
            error: RejectionError {
                code: RATE_LIMIT_CONFIG_MISSING,
                message: "Admission control is not configured for this request.".to_string(),
                details: None,
            },
            timestamp: iso8601(now),
            path: path.to_string(),
            method: method.to_string(),
        }
    }
}
