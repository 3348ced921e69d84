use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fieldrelay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let messaging = &config.messaging;
    let api_token = redact_token(messaging.api_token.expose_secret());
    let chain_order: Vec<&str> =
        config.organization.chain_order.iter().map(|role| role.as_str()).collect();
    let workflows: Vec<&str> =
        config.workflows.definitions().iter().map(|definition| definition.kind.as_str()).collect();
    let utc_offset = config
        .workflow
        .utc_offset_minutes
        .map(|minutes| minutes.to_string())
        .unwrap_or_else(|| "<local>".to_string());

    let entries: Vec<(&str, String, Vec<&str>)> = vec![
        ("database.url", config.database.url.clone(), vec!["FIELDRELAY_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            vec!["FIELDRELAY_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            vec!["FIELDRELAY_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "messaging.provider",
            format!("{:?}", messaging.provider),
            vec!["FIELDRELAY_MESSAGING_PROVIDER"],
        ),
        (
            "messaging.base_url",
            messaging.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            vec!["FIELDRELAY_MESSAGING_BASE_URL"],
        ),
        ("messaging.api_token", api_token, vec!["FIELDRELAY_MESSAGING_API_TOKEN"]),
        (
            "messaging.sender_id",
            messaging.sender_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            vec!["FIELDRELAY_MESSAGING_SENDER_ID"],
        ),
        (
            "messaging.default_country_code",
            messaging.default_country_code.clone(),
            vec!["FIELDRELAY_MESSAGING_DEFAULT_COUNTRY_CODE"],
        ),
        (
            "messaging.timeout_secs",
            messaging.timeout_secs.to_string(),
            vec!["FIELDRELAY_MESSAGING_TIMEOUT_SECS"],
        ),
        ("server.bind_address", config.server.bind_address.clone(), vec!["FIELDRELAY_SERVER_BIND_ADDRESS"]),
        ("server.port", config.server.port.to_string(), vec!["FIELDRELAY_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            vec!["FIELDRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            vec!["FIELDRELAY_LOGGING_LEVEL", "FIELDRELAY_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            vec!["FIELDRELAY_LOGGING_FORMAT", "FIELDRELAY_LOG_FORMAT"],
        ),
        ("workflow.utc_offset_minutes", utc_offset, vec!["FIELDRELAY_WORKFLOW_UTC_OFFSET_MINUTES"]),
        ("organization.chain_order", chain_order.join(" > "), vec![]),
        ("workflows", workflows.join(", "), vec![]),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries {
        lines.push(render_line(key, &value, source(key, env_keys.as_slice())));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("fieldrelay.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/fieldrelay.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        return format!("{visible}***");
    }

    "<redacted>".to_string()
}
