use paddock_lib::admission::{EndpointCategory, RoleTag};
use paddock_lib::config::{load_from_path, load_from_str};
use paddock_lib::error::GateError;
use paddock_lib::gate::{EndpointClassifier, GateBuilder, RouteClassifier};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn expect_config_error(toml: &str, needle: &str) {
    match load_from_str(toml) {
        Err(GateError::Config(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in '{msg}'")
        }
        other => panic!("expected config error containing '{needle}', got {other:?}"),
    }
}

#[test]
fn test_loads_minimal_config_with_defaults() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"listen = "127.0.0.1:0""#)?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:0");
    assert_eq!(cfg.default_category, EndpointCategory::ResourceRead);
    assert_eq!(cfg.shutdown_secs, 10);
    assert!(cfg.admission.enabled);
    assert_eq!(cfg.admission.shards, 16);
    assert_eq!(cfg.admission.near_exhaustion_ratio, 0.8);
    assert!(!cfg.admission.priority.enabled);
    assert!(cfg.admission.emergency.token.is_none());
    assert_eq!(cfg.identity.user_header, "x-user-id");
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.telemetry.otel_log_level, "warn");

    let table = cfg.admission.quota_table()?;
    assert!(table.missing_pairs().is_empty());
    assert_eq!(table.fallback().max_requests(), 100);
    Ok(())
}

#[test]
fn test_shipped_config_loads() -> TestResult {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../config/paddock.toml");
    let cfg = load_from_path(path)?;

    assert!(cfg.admission.priority.enabled);
    assert_eq!(cfg.identity.trusted_proxies.len(), 2);

    let table = cfg.admission.quota_table()?;
    let bulk = table.lookup(EndpointCategory::Bulk, RoleTag::Admin).ok_or("bulk/admin")?;
    assert_eq!(bulk.max_requests(), 50);
    let bulk_worker = table.lookup(EndpointCategory::Bulk, RoleTag::Worker).ok_or("bulk/worker")?;
    assert_eq!(bulk_worker.max_requests(), 5);

    let classifier = RouteClassifier::new(&cfg.routes, cfg.default_category);
    assert_eq!(
        classifier.classify(&http::Method::PUT, "/api/cattle/12"),
        EndpointCategory::ResourceWrite
    );
    assert_eq!(
        classifier.classify(&http::Method::GET, "/api/cattle/bulk/export"),
        EndpointCategory::Bulk
    );

    let gate = GateBuilder::from_config(&cfg)?.build();
    assert!(gate.is_enabled());
    Ok(())
}

#[test]
fn test_rows_and_defaults_merge() -> TestResult {
    let cfg = load_from_str(
        r#"
listen = "127.0.0.1:0"

[admission.fallback]
window_seconds = 60
max_requests = 7

[[admission.quotas]]
category = "auth"
role = "super_admin"
window_seconds = 60
max_requests = 50
"#,
    )?;

    let table = cfg.admission.quota_table()?;
    assert_eq!(table.fallback().max_requests(), 7);
    assert_eq!(table.lookup(EndpointCategory::Auth, RoleTag::SuperAdmin).map(|q| q.max_requests()), Some(50));
    assert_eq!(table.lookup(EndpointCategory::Auth, RoleTag::Admin).map(|q| q.max_requests()), Some(5));
    Ok(())
}

#[test]
fn test_incomplete_table_is_rejected() {
    expect_config_error(
        r#"
listen = "127.0.0.1:0"

[admission.defaults]
auth = { window_seconds = 900, max_requests = 5 }
"#,
        "No quota configured for",
    );
}

#[test]
fn test_incomplete_table_allowed_when_not_required() -> TestResult {
    let cfg = load_from_str(
        r#"
listen = "127.0.0.1:0"

[admission]
require_complete_table = false

[admission.defaults]
auth = { window_seconds = 900, max_requests = 5 }
"#,
    )?;
    let table = cfg.admission.quota_table()?;
    assert!(table.lookup(EndpointCategory::Geo, RoleTag::Guest).is_none());
    Ok(())
}

#[test]
fn test_zero_window_is_rejected() {
    expect_config_error(
        r#"
listen = "127.0.0.1:0"

[[admission.quotas]]
category = "geo"
role = "guest"
window_seconds = 0
max_requests = 5
"#,
        "window",
    );
}

#[test]
fn test_invalid_knobs_are_rejected() {
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[admission]\nnear_exhaustion_ratio = 1.5\n",
        "near_exhaustion_ratio",
    );
    expect_config_error("listen = \"127.0.0.1:0\"\n[admission]\nshards = 0\n", "shards");
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[admission.adaptive]\nmin_factor = 0.9\nmax_factor = 0.5\n",
        "adaptive",
    );
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[[routes]]\nprefix = \"api\"\ncategory = \"geo\"\n",
        "must start with '/'",
    );
}

#[test]
fn test_unknown_names_fail_to_parse() {
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[[routes]]\nprefix = \"/x\"\ncategory = \"telepathy\"\n",
        "Failed to parse config",
    );
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[[admission.quotas]]\ncategory = \"geo\"\nrole = \"king\"\nwindow_seconds = 1\nmax_requests = 1\n",
        "Failed to parse config",
    );
    expect_config_error(
        "listen = \"127.0.0.1:0\"\n[identity]\ntrusted_proxies = [\"not-a-cidr\"]\n",
        "Failed to parse config",
    );
}
