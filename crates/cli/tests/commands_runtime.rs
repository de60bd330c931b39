use std::env;
use std::sync::{Mutex, OnceLock};

use eapproval_cli::commands::{doctor, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("EAPPROVAL_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("applied"));
    });
}

#[test]
fn migrate_returns_config_failure_for_short_api_token() {
    with_env(
        &[("EAPPROVAL_DATABASE_URL", "sqlite::memory:"), ("EAPPROVAL_SERVER_API_TOKEN", "short")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn seed_lists_every_demo_request() {
    with_env(&[("EAPPROVAL_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        for id in ["REQ-DEMO-LEAVE", "REQ-DEMO-PURCHASE", "REQ-DEMO-IT", "REQ-DEMO-MAINT"] {
            assert!(message.contains(id), "seed message should name {id}: {message}");
        }
    });
}

#[test]
fn seed_is_idempotent_and_clean_removes_the_demo_requests() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("eapproval.db").display());

    with_env(&[("EAPPROVAL_DATABASE_URL", &url)], || {
        let first = seed::run(false);
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run(false);
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(
            parse_payload(&first.output)["message"],
            parse_payload(&second.output)["message"]
        );

        let cleaned = seed::run(true);
        assert_eq!(cleaned.exit_code, 0, "expected clean success");
        assert_eq!(parse_payload(&cleaned.output)["message"], "removed 4 demo requests");

        let again = seed::run(true);
        assert_eq!(parse_payload(&again.output)["message"], "removed 0 demo requests");
    });
}

#[test]
fn doctor_passes_with_warning_once_schema_is_migrated() {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("eapproval.db").display());

    with_env(&[("EAPPROVAL_DATABASE_URL", &url)], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1, "unmigrated schema should fail readiness");
        let report = parse_payload(&before.output);
        assert_eq!(check_status(&report, "schema_readiness"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "warnings must not fail doctor: {}", after.output);
        let report = parse_payload(&after.output);
        assert_eq!(report["overall_status"], "warn");
        assert_eq!(check_status(&report, "schema_readiness"), "pass");
        assert_eq!(check_status(&report, "api_token"), "warn");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("EAPPROVAL_DATABASE_MAX_CONNECTIONS", "0")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "skipped");
    });
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "EAPPROVAL_DATABASE_URL",
        "EAPPROVAL_DATABASE_MAX_CONNECTIONS",
        "EAPPROVAL_DATABASE_TIMEOUT_SECS",
        "EAPPROVAL_SERVER_BIND_ADDRESS",
        "EAPPROVAL_SERVER_PORT",
        "EAPPROVAL_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "EAPPROVAL_SERVER_API_TOKEN",
        "EAPPROVAL_WORKFLOW_DEFAULT_SLA_HOURS",
        "EAPPROVAL_WORKFLOW_EVENT_BUFFER",
        "EAPPROVAL_LOGGING_LEVEL",
        "EAPPROVAL_LOGGING_FORMAT",
        "EAPPROVAL_LOG_LEVEL",
        "EAPPROVAL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
