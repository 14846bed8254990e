use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::CommandResult;
use ksm_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = options.config_path.clone().or_else(detect_config_path);

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["KSM_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["KSM_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["KSM_DATABASE_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["KSM_LOGGING_LEVEL", "KSM_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["KSM_LOGGING_FORMAT", "KSM_LOG_FORMAT"]),
    ));
    lines.push(render_line(
        "analysis.default_method",
        config.analysis.default_method.as_str(),
        source("analysis.default_method", &["KSM_ANALYSIS_DEFAULT_METHOD"]),
    ));
    lines.push(render_line(
        "analysis.report_top_n",
        &config.analysis.report_top_n.to_string(),
        source("analysis.report_top_n", &["KSM_ANALYSIS_REPORT_TOP_N"]),
    ));

    CommandResult::success_with_data("config", lines.join("\n"), &config)
}

fn detect_config_path() -> Option<PathBuf> {
    ["ksm.toml", "config/ksm.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
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
