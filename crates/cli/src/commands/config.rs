use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use signoff_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One reported setting: dotted key, env var and the rendered (possibly redacted) value.
struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run(path: Option<PathBuf>) -> String {
    let options = LoadOptions {
        require_file: path.is_some(),
        config_path: path.clone(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = path.or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, env_key, value: String| Field { key, env_key, value };
    vec![
        field("database.url", "SIGNOFF_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "SIGNOFF_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "SIGNOFF_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field(
            "server.bind_address",
            "SIGNOFF_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        field("server.port", "SIGNOFF_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.public_base_url",
            "SIGNOFF_SERVER_PUBLIC_BASE_URL",
            config.server.public_base_url.clone(),
        ),
        field(
            "server.graceful_shutdown_secs",
            "SIGNOFF_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field("mail.transport", "SIGNOFF_MAIL_TRANSPORT", format!("{:?}", config.mail.transport)),
        field(
            "mail.webhook_url",
            "SIGNOFF_MAIL_WEBHOOK_URL",
            config.mail.webhook_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        field(
            "mail.api_key",
            "SIGNOFF_MAIL_API_KEY",
            config
                .mail
                .api_key
                .as_ref()
                .map(|key| redact_secret(key.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
        ),
        field("mail.from_address", "SIGNOFF_MAIL_FROM_ADDRESS", config.mail.from_address.clone()),
        field(
            "mail.timeout_secs",
            "SIGNOFF_MAIL_TIMEOUT_SECS",
            config.mail.timeout_secs.to_string(),
        ),
        field(
            "requests.id_prefix",
            "SIGNOFF_REQUESTS_ID_PREFIX",
            config.requests.id_prefix.clone(),
        ),
        field(
            "requests.id_width",
            "SIGNOFF_REQUESTS_ID_WIDTH",
            config.requests.id_width.to_string(),
        ),
        field(
            "routing.table_path",
            "SIGNOFF_ROUTING_TABLE_PATH",
            config.routing.table_path.display().to_string(),
        ),
        field("logging.level", "SIGNOFF_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "SIGNOFF_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["signoff.toml", "config/signoff.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

/// Keeps the last four characters of long keys so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    match chars.len() {
        0 => "<empty>".to_string(),
        len if len <= 8 => "<redacted>".to_string(),
        len => format!("***{}", chars[len - 4..].iter().collect::<String>()),
    }
}
