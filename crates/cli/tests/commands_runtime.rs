use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use fieldrelay_cli::commands::{chain, config, doctor, employee, migrate};
use fieldrelay_core::store::records::{encode_location_node, location_map_headers};
use fieldrelay_core::store::LOCATION_MAP_TABLE;
use fieldrelay_core::{EmployeeLocation, LocationNode, NewEmployee, Role, Store};
use fieldrelay_db::{connect, migrations, SqlSheetStore};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("FIELDRELAY_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("FIELDRELAY_DATABASE_URL", "postgres://localhost/fieldrelay")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_redacts_the_messaging_token_and_names_its_source() {
    with_env(
        &[
            ("FIELDRELAY_DATABASE_URL", "sqlite::memory:"),
            ("FIELDRELAY_MESSAGING_API_TOKEN", "EAAG-very-secret-token"),
        ],
        || {
            let output = config::run();

            assert!(output.contains(
                "- messaging.api_token = EAAG*** (source: env (FIELDRELAY_MESSAGING_API_TOKEN))"
            ));
            assert!(!output.contains("very-secret"));
            assert!(output.contains("- organization.chain_order = SR > ASM > ZSM > BDO > CRO"));
            assert!(output.contains("- messaging.provider = DryRun (source: default)"));
        },
    );
}

#[test]
fn doctor_passes_on_a_migrated_database() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());

    with_env(&[("FIELDRELAY_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");
        assert_eq!(report["overall_status"], "pass", "{report}");
        let names: Vec<&str> =
            report["checks"].as_array().expect("checks").iter().filter_map(|c| c["name"].as_str()).collect();
        assert_eq!(
            names,
            vec!["config_validation", "messaging_readiness", "database_connectivity", "hierarchy_integrity"]
        );
    });
}

#[test]
fn doctor_flags_a_territory_mapped_to_two_areas() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    seed_locations(
        &url,
        &[node("Kushtia-01", "Kushtia", "ACL"), node("Kushtia-01", "Meherpur", "ACL")],
    );

    with_env(&[("FIELDRELAY_DATABASE_URL", url.as_str())], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");
        assert_eq!(report["overall_status"], "fail");

        let hierarchy = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .find(|check| check["name"] == "hierarchy_integrity")
            .expect("hierarchy check present")
            .clone();
        assert_eq!(hierarchy["status"], "fail");
        let details = hierarchy["details"].as_str().unwrap_or_default();
        assert!(details.contains("Kushtia-01"), "{details}");
    });
}

#[test]
fn added_employees_show_up_in_chain_previews() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    seed_locations(&url, &[node("Kushtia-01", "Kushtia", "ACL")]);

    with_env(&[("FIELDRELAY_DATABASE_URL", url.as_str())], || {
        let added = parse_payload(&employee::add(NewEmployee {
            name: "Rafiq Islam".to_string(),
            role: Role::new("sr"),
            email: "rafiq@example.com".to_string(),
            contact_number: "01711000001".to_string(),
            whatsapp_number: None,
            location: EmployeeLocation {
                territory: Some("Kushtia-01".to_string()),
                ..EmployeeLocation::default()
            },
            business_unit: Some("ACL".to_string()),
        })
        .output);
        assert_eq!(added["status"], "ok", "{added}");
        assert_eq!(added["data"]["id"], "SR001");

        let result = chain::run(&chain::ChainArgs {
            location: "Kushtia-01".to_string(),
            business_unit: Some("ACL".to_string()),
            workflow: Some("order".to_string()),
            ..chain::ChainArgs::default()
        });
        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["resolution"]["kind"], "hierarchy");
        assert_eq!(payload["data"]["tiers"][0]["role"], "SR");
        assert_eq!(payload["data"]["tiers"][0]["recipients"][0]["employee_id"], "SR001");
    });
}

#[test]
fn chain_rejects_unknown_workflows_and_levels() {
    with_env(&[("FIELDRELAY_DATABASE_URL", "sqlite::memory:")], || {
        let unknown_workflow = chain::run(&chain::ChainArgs {
            location: "Kushtia-01".to_string(),
            workflow: Some("payroll".to_string()),
            ..chain::ChainArgs::default()
        });
        assert_eq!(unknown_workflow.exit_code, 2);
        assert_eq!(parse_payload(&unknown_workflow.output)["error_class"], "invalid_argument");

        let bad_level = chain::run(&chain::ChainArgs {
            location: "Kushtia".to_string(),
            level: Some("bazaar".to_string()),
            ..chain::ChainArgs::default()
        });
        assert_eq!(bad_level.exit_code, 2);
    });
}

#[test]
fn import_reports_each_legacy_record() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    let file = dir.path().join("legacy.json");
    fs::write(
        &file,
        r#"[
            {"id": "ASM007", "name": "Nasima Akter", "role": "ASM", "email": "nasima@example.com", "area": "Kushtia"},
            {"name": "No Area", "role": "ASM", "email": "noarea@example.com"}
        ]"#,
    )
    .expect("write legacy file");

    with_env(&[("FIELDRELAY_DATABASE_URL", url.as_str())], || {
        let payload = parse_payload(&employee::import(&file).output);
        assert_eq!(payload["status"], "ok", "{payload}");
        assert_eq!(payload["message"], "imported 1, failed 1");

        let outcomes = payload["data"]["outcomes"].as_array().expect("outcomes");
        assert_eq!(outcomes[0]["outcome"], "imported");
        assert_eq!(outcomes[0]["id"], "ASM007");
        assert_eq!(outcomes[1]["outcome"], "failed");
        assert_eq!(outcomes[1]["email"], "noarea@example.com");
    });
}

#[test]
fn import_rejects_files_that_are_not_employee_arrays() {
    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("legacy.json");
    fs::write(&file, "{\"not\": \"an array\"}").expect("write file");

    with_env(&[("FIELDRELAY_DATABASE_URL", "sqlite::memory:")], || {
        let result = employee::import(&file);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

fn node(territory: &str, area: &str, business_unit: &str) -> LocationNode {
    LocationNode {
        zone: "Khulna".to_string(),
        district: "Kushtia".to_string(),
        area: area.to_string(),
        territory: territory.to_string(),
        business_unit: business_unit.to_string(),
        ..LocationNode::default()
    }
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("fieldrelay.db").display())
}

fn seed_locations(url: &str, nodes: &[LocationNode]) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let store = SqlSheetStore::new(pool.clone());
        store.ensure_headers(LOCATION_MAP_TABLE, &location_map_headers()).await.expect("headers");
        for node in nodes {
            store.append(LOCATION_MAP_TABLE, encode_location_node(node)).await.expect("append");
        }
        pool.close().await;
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FIELDRELAY_DATABASE_URL",
        "FIELDRELAY_DATABASE_MAX_CONNECTIONS",
        "FIELDRELAY_DATABASE_TIMEOUT_SECS",
        "FIELDRELAY_MESSAGING_PROVIDER",
        "FIELDRELAY_MESSAGING_BASE_URL",
        "FIELDRELAY_MESSAGING_API_TOKEN",
        "FIELDRELAY_MESSAGING_SENDER_ID",
        "FIELDRELAY_MESSAGING_DEFAULT_COUNTRY_CODE",
        "FIELDRELAY_MESSAGING_TIMEOUT_SECS",
        "FIELDRELAY_SERVER_BIND_ADDRESS",
        "FIELDRELAY_SERVER_PORT",
        "FIELDRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FIELDRELAY_LOGGING_LEVEL",
        "FIELDRELAY_LOGGING_FORMAT",
        "FIELDRELAY_LOG_LEVEL",
        "FIELDRELAY_LOG_FORMAT",
        "FIELDRELAY_WORKFLOW_UTC_OFFSET_MINUTES",
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
