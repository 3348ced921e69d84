use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::SystemClock;
use crate::roles::OrgPolicy;
use crate::workflow::catalog::{WorkflowCatalog, WorkflowDefinition};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub messaging: MessagingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub workflow: WorkflowConfig,
    pub organization: OrgPolicy,
    pub workflows: WorkflowCatalog,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    pub provider: MessagingProvider,
    pub base_url: Option<String>,
    pub api_token: SecretString,
    pub sender_id: Option<String>,
    pub default_country_code: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowConfig {
    /// Fixed offset for the submission-id day; `None` uses the process time zone.
    pub utc_offset_minutes: Option<i32>,
}

impl WorkflowConfig {
    pub fn clock(&self) -> SystemClock {
        self.utc_offset_minutes
            .and_then(SystemClock::with_offset_minutes)
            .unwrap_or_else(SystemClock::local)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingProvider {
    WhatsappHttp,
    DryRun,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub messaging_provider: Option<MessagingProvider>,
    pub messaging_base_url: Option<String>,
    pub messaging_api_token: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://fieldrelay.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            messaging: MessagingConfig {
                provider: MessagingProvider::DryRun,
                base_url: None,
                api_token: String::new().into(),
                sender_id: None,
                default_country_code: "880".to_string(),
                timeout_secs: 15,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            workflow: WorkflowConfig::default(),
            organization: OrgPolicy::standard(),
            workflows: WorkflowCatalog::standard(),
        }
    }
}

impl std::str::FromStr for MessagingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "whatsapp_http" | "whatsapp" => Ok(Self::WhatsappHttp),
            "dry_run" | "dry-run" => Ok(Self::DryRun),
            other => Err(ConfigError::Validation(format!(
                "unsupported messaging provider `{other}` (expected whatsapp_http|dry_run)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("fieldrelay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(messaging) = patch.messaging {
            if let Some(provider) = messaging.provider {
                self.messaging.provider = provider;
            }
            if let Some(base_url) = messaging.base_url {
                self.messaging.base_url = Some(base_url);
            }
            if let Some(api_token) = messaging.api_token {
                self.messaging.api_token = api_token.into();
            }
            if let Some(sender_id) = messaging.sender_id {
                self.messaging.sender_id = Some(sender_id);
            }
            if let Some(default_country_code) = messaging.default_country_code {
                self.messaging.default_country_code = default_country_code;
            }
            if let Some(timeout_secs) = messaging.timeout_secs {
                self.messaging.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(utc_offset_minutes) = workflow.utc_offset_minutes {
                self.workflow.utc_offset_minutes = Some(utc_offset_minutes);
            }
        }

        if let Some(organization) = patch.organization {
            self.organization = organization;
        }
        if let Some(workflows) = patch.workflows {
            self.workflows = WorkflowCatalog::new(workflows);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FIELDRELAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FIELDRELAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FIELDRELAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FIELDRELAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FIELDRELAY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FIELDRELAY_MESSAGING_PROVIDER") {
            self.messaging.provider = value.parse()?;
        }
        if let Some(value) = read_env("FIELDRELAY_MESSAGING_BASE_URL") {
            self.messaging.base_url = Some(value);
        }
        if let Some(value) = read_env("FIELDRELAY_MESSAGING_API_TOKEN") {
            self.messaging.api_token = value.into();
        }
        if let Some(value) = read_env("FIELDRELAY_MESSAGING_SENDER_ID") {
            self.messaging.sender_id = Some(value);
        }
        if let Some(value) = read_env("FIELDRELAY_MESSAGING_DEFAULT_COUNTRY_CODE") {
            self.messaging.default_country_code = value;
        }
        if let Some(value) = read_env("FIELDRELAY_MESSAGING_TIMEOUT_SECS") {
            self.messaging.timeout_secs = parse_u64("FIELDRELAY_MESSAGING_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FIELDRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FIELDRELAY_SERVER_PORT") {
            self.server.port = parse_u16("FIELDRELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FIELDRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FIELDRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("FIELDRELAY_LOGGING_LEVEL").or_else(|| read_env("FIELDRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FIELDRELAY_LOGGING_FORMAT").or_else(|| read_env("FIELDRELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("FIELDRELAY_WORKFLOW_UTC_OFFSET_MINUTES") {
            self.workflow.utc_offset_minutes =
                Some(parse_i32("FIELDRELAY_WORKFLOW_UTC_OFFSET_MINUTES", &value)?);
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(provider) = overrides.messaging_provider {
            self.messaging.provider = provider;
        }
        if let Some(base_url) = overrides.messaging_base_url {
            self.messaging.base_url = Some(base_url);
        }
        if let Some(api_token) = overrides.messaging_api_token {
            self.messaging.api_token = api_token.into();
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_messaging(&self.messaging)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_workflow(&self.workflow)?;
        self.organization.validate().map_err(ConfigError::Validation)?;
        self.workflows.validate(&self.organization).map_err(ConfigError::Validation)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("fieldrelay.toml"), PathBuf::from("config/fieldrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_messaging(messaging: &MessagingConfig) -> Result<(), ConfigError> {
    if messaging.timeout_secs == 0 || messaging.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "messaging.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let country_code = messaging.default_country_code.trim();
    let valid_country_code = (1..=3).contains(&country_code.len())
        && country_code.bytes().all(|byte| byte.is_ascii_digit());
    if !valid_country_code {
        return Err(ConfigError::Validation(
            "messaging.default_country_code must be 1-3 digits without `+` (e.g. `880`)".to_string(),
        ));
    }

    if messaging.provider == MessagingProvider::WhatsappHttp {
        let base_url = messaging.base_url.as_deref().map(str::trim).unwrap_or("");
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "messaging.base_url must start with http:// or https:// for the whatsapp_http provider"
                    .to_string(),
            ));
        }
        if messaging.api_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "messaging.api_token is required for the whatsapp_http provider. Set it in fieldrelay.toml or FIELDRELAY_MESSAGING_API_TOKEN".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if let Some(minutes) = workflow.utc_offset_minutes {
        if SystemClock::with_offset_minutes(minutes).is_none() {
            return Err(ConfigError::Validation(
                "workflow.utc_offset_minutes must be in range -1439..=1439".to_string(),
            ));
        }
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.trim().parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    messaging: Option<MessagingPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    workflow: Option<WorkflowPatch>,
    organization: Option<OrgPolicy>,
    workflows: Option<Vec<WorkflowDefinition>>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingPatch {
    provider: Option<MessagingProvider>,
    base_url: Option<String>,
    api_token: Option<String>,
    sender_id: Option<String>,
    default_country_code: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    utc_offset_minutes: Option<i32>,
}
