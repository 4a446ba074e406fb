use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{GateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    let admission = &cfg.admission;

    if admission.shards == 0 {
        return Err(GateError::Config("admission.shards must be > 0".to_string()));
    }
    if admission.reaper_interval_secs == 0 {
        return Err(GateError::Config("admission.reaper_interval_secs must be > 0".to_string()));
    }
    if !(admission.near_exhaustion_ratio > 0.0 && admission.near_exhaustion_ratio <= 1.0) {
        return Err(GateError::Config(format!(
            "admission.near_exhaustion_ratio must be in (0, 1], got {}",
            admission.near_exhaustion_ratio
        )));
    }

    // builds and checks every quota, including completeness of the matrix
    admission.quota_table()?;

    if admission.priority.enabled {
        if admission.priority.window_seconds == 0 {
            return Err(GateError::Config(
                "admission.priority.window_seconds must be > 0".to_string(),
            ));
        }
        if admission.priority.lane.trim().is_empty() {
            return Err(GateError::Config("admission.priority.lane cannot be empty".to_string()));
        }
    }

    let adaptive = &admission.adaptive;
    if !adaptive.min_factor.is_finite()
        || !adaptive.max_factor.is_finite()
        || adaptive.min_factor < 0.0
        || adaptive.min_factor > adaptive.max_factor
    {
        return Err(GateError::Config(format!(
            "admission.adaptive bounds are invalid: [{}, {}]",
            adaptive.min_factor, adaptive.max_factor
        )));
    }

    for route in &cfg.routes {
        if !route.prefix.starts_with('/') {
            return Err(GateError::Config(format!(
                "Route prefix must start with '/': {}",
                route.prefix
            )));
        }
        for method in &route.methods {
            if http::Method::from_bytes(method.as_bytes()).is_err() {
                return Err(GateError::Config(format!(
                    "Route {} has an invalid method: {}",
                    route.prefix, method
                )));
            }
        }
    }

    for header in [&cfg.identity.user_header, &cfg.identity.role_header] {
        if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(GateError::Config(format!("Invalid identity header name: {header}")));
        }
    }

    Ok(())
}
