use fieldrelay_core::config::{AppConfig, LoadOptions, MessagingProvider};
use fieldrelay_core::LocationMap;
use fieldrelay_db::{connect_with_config, SqlSheetStore};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_messaging(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["messaging_readiness", "database_connectivity", "hierarchy_integrity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_messaging(config: &AppConfig) -> DoctorCheck {
    let details = match config.messaging.provider {
        MessagingProvider::DryRun => {
            "dry_run provider: messages are logged, nothing is delivered".to_string()
        }
        MessagingProvider::WhatsappHttp => format!(
            "whatsapp_http provider posting to `{}`",
            config.messaging.base_url.as_deref().unwrap_or("<unset>")
        ),
    };
    DoctorCheck { name: "messaging_readiness", status: CheckStatus::Pass, details }
}

/// Connectivity plus the location-map tree check; the second is skipped when the first fails.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped_hierarchy("async runtime unavailable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    skipped_hierarchy("database unreachable"),
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let hierarchy = check_hierarchy(&SqlSheetStore::new(pool.clone())).await;
        pool.close().await;
        vec![connectivity, hierarchy]
    })
}

async fn check_hierarchy(store: &SqlSheetStore) -> DoctorCheck {
    let map = match LocationMap::load(store).await {
        Ok(map) => map,
        Err(error) => {
            return DoctorCheck {
                name: "hierarchy_integrity",
                status: CheckStatus::Fail,
                details: format!("location map unreadable (run `fieldrelay migrate`?): {error}"),
            };
        }
    };

    let violations = map.violations();
    if violations.is_empty() {
        return DoctorCheck {
            name: "hierarchy_integrity",
            status: CheckStatus::Pass,
            details: "every location value has a single parent".to_string(),
        };
    }

    let listed: Vec<String> = violations
        .iter()
        .map(|violation| {
            format!(
                "{} `{}` maps to {} {}",
                violation.child_level,
                violation.child,
                violation.parent_level,
                violation.parents.join(" / ")
            )
        })
        .collect();
    DoctorCheck { name: "hierarchy_integrity", status: CheckStatus::Fail, details: listed.join("; ") }
}

fn skipped_hierarchy(reason: &str) -> DoctorCheck {
    DoctorCheck {
        name: "hierarchy_integrity",
        status: CheckStatus::Skipped,
        details: format!("skipped: {reason}"),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
