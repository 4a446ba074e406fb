use chrono::{DateTime, SecondsFormat, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::admission::{AdmissionResult, QuotaConfig};

/// Header names exchanged with callers
pub mod names {
    pub const LIMIT: &str = "x-ratelimit-limit";
    pub const REMAINING: &str = "x-ratelimit-remaining";
    pub const RESET: &str = "x-ratelimit-reset";
    pub const WINDOW: &str = "x-ratelimit-window";
    pub const HIT: &str = "x-ratelimit-hit";
    pub const RETRY_AFTER: &str = "retry-after";
    pub const BYPASSED: &str = "x-rate-limit-bypassed";
    pub const EMERGENCY_TOKEN: &str = "x-emergency-token";
    pub const FORWARDED_METHOD: &str = "x-forwarded-method";
    pub const FORWARDED_URI: &str = "x-forwarded-uri";
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Quota metadata attached to every checked request.
pub fn quota_headers(quota: &QuotaConfig, result: &AdmissionResult) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(6);
    insert(&mut headers, names::LIMIT, &quota.max_requests.to_string());
    insert(&mut headers, names::REMAINING, &result.remaining.to_string());
    insert(&mut headers, names::RESET, &iso8601(result.reset_at));
    insert(&mut headers, names::WINDOW, &quota.window_ms().to_string());
    headers
}

/// Quota metadata plus `Retry-After` and `X-RateLimit-Hit`, for denials.
pub fn denial_headers(
    quota: &QuotaConfig,
    result: &AdmissionResult,
    now: DateTime<Utc>,
) -> HeaderMap {
    let mut headers = quota_headers(quota, result);
    insert(&mut headers, names::RETRY_AFTER, &result.retry_after_secs(now).to_string());
    insert(&mut headers, names::HIT, &result.total_hits.to_string());
    headers
}

pub fn bypass_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(1);
    headers.insert(
        HeaderName::from_static(names::BYPASSED),
        HeaderValue::from_static("emergency"),
    );
    headers
}
