use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::DEFAULT_REPORT_TOP_N;
use crate::domain::analysis::AnalysisMethod;

const MAX_REPORT_TOP_N: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub analysis: AnalysisSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Operator defaults for analysis runs. Scoring weights live in the database, not here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AnalysisSettings {
    pub default_method: AnalysisMethod,
    pub report_top_n: usize,
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
    pub log_format: Option<LogFormat>,
    pub default_method: Option<AnalysisMethod>,
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
                url: "sqlite://ksm.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            analysis: AnalysisSettings {
                default_method: AnalysisMethod::Automated,
                report_top_n: DEFAULT_REPORT_TOP_N,
            },
        }
    }
}

impl FromStr for LogFormat {
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("ksm.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(analysis) = patch.analysis {
            if let Some(method) = analysis.default_method {
                self.analysis.default_method = parse_method("analysis.default_method", &method)?;
            }
            if let Some(report_top_n) = analysis.report_top_n {
                self.analysis.report_top_n = report_top_n;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KSM_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("KSM_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_override("KSM_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("KSM_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_override("KSM_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("KSM_LOGGING_LEVEL").or_else(|| read_env("KSM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("KSM_LOGGING_FORMAT").or_else(|| read_env("KSM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("KSM_ANALYSIS_DEFAULT_METHOD") {
            self.analysis.default_method = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "KSM_ANALYSIS_DEFAULT_METHOD".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("KSM_ANALYSIS_REPORT_TOP_N") {
            self.analysis.report_top_n = parse_override("KSM_ANALYSIS_REPORT_TOP_N", &value)?;
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(default_method) = overrides.default_method {
            self.analysis.default_method = default_method;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_analysis(&self.analysis)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("ksm.toml"), PathBuf::from("config/ksm.toml")]
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

/// Expands `${VAR}` references from the process environment. Unset variables are an error so a
/// typo never silently turns into an empty database URL.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after_open[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }
    output.push_str(rest);

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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_analysis(analysis: &AnalysisSettings) -> Result<(), ConfigError> {
    if analysis.report_top_n == 0 || analysis.report_top_n > MAX_REPORT_TOP_N {
        return Err(ConfigError::Validation(format!(
            "analysis.report_top_n must be in range 1..={MAX_REPORT_TOP_N}"
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_method(key: &str, value: &str) -> Result<AnalysisMethod, ConfigError> {
    value.parse::<AnalysisMethod>().map_err(|_| {
        ConfigError::Validation(format!(
            "{key} must be one of automated|simplified|manual (got `{value}`)"
        ))
    })
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    analysis: Option<AnalysisPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisPatch {
    default_method: Option<String>,
    report_top_n: Option<usize>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::analysis::AnalysisMethod;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;
        ensure(config.database.url == "sqlite://ksm.db", "default database file is ksm.db")?;
        ensure(config.analysis.report_top_n == 5, "report shows top five by default")?;
        ensure(
            config.analysis.default_method == AnalysisMethod::Automated,
            "automated scoring is the default method",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_KSM_DB_PATH", "/var/lib/ksm/procurement.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ksm.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_KSM_DB_PATH}"

[analysis]
default_method = "simplified"
report_top_n = 3
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite:///var/lib/ksm/procurement.db",
                "database url should be interpolated from environment",
            )?;
            ensure(
                config.analysis.default_method == AnalysisMethod::Simplified,
                "default method should come from the file",
            )?;
            ensure(config.analysis.report_top_n == 3, "report size should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_KSM_DB_PATH"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("ksm.toml");
        fs::write(&path, "[database]\nurl = \"${KSM_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "KSM_TEST_UNSET_VARIABLE"),
            "missing variable should be named",
        )
    }

    #[test]
    fn interpolation_keeps_plain_dollars_and_rejects_unterminated_references() -> Result<(), String>
    {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::set_var("TEST_KSM_INTERP_NAME", "procurement");

        let expanded = super::interpolate_env_vars("cost = \"$5\"\nname = \"${TEST_KSM_INTERP_NAME}.db\"")
            .map_err(|err| err.to_string())?;
        let unterminated = super::interpolate_env_vars("url = \"${TEST_KSM_INTERP_NAME\"");
        clear_vars(&["TEST_KSM_INTERP_NAME"]);

        ensure(
            expanded == "cost = \"$5\"\nname = \"procurement.db\"",
            "references expand and lone dollars pass through",
        )?;
        ensure(
            matches!(unterminated, Err(ConfigError::UnterminatedInterpolation)),
            "an unclosed reference is an error",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KSM_LOG_LEVEL", "warn");
        env::set_var("KSM_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["KSM_LOG_LEVEL", "KSM_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KSM_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("KSM_ANALYSIS_REPORT_TOP_N", "10");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("ksm.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"
max_connections = 2

[logging]
level = "warn"

[analysis]
report_top_n = 4
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.database.max_connections == 2, "file value should beat the default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.analysis.report_top_n == 10, "env report size should win over file")?;
            Ok(())
        })();

        clear_vars(&["KSM_DATABASE_URL", "KSM_ANALYSIS_REPORT_TOP_N"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KSM_ANALYSIS_REPORT_TOP_N", "0");
        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("analysis.report_top_n")
            );
            ensure(has_message, "validation failure should mention analysis.report_top_n")
        })();
        clear_vars(&["KSM_ANALYSIS_REPORT_TOP_N"]);
        result?;

        env::set_var("KSM_DATABASE_URL", "postgres://elsewhere");
        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("non-sqlite urls must be rejected".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("database.url")),
                "validation failure should mention database.url",
            )
        })();
        clear_vars(&["KSM_DATABASE_URL"]);
        result
    }

    #[test]
    fn unknown_method_in_env_is_an_invalid_override() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KSM_ANALYSIS_DEFAULT_METHOD", "gut-feeling");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "KSM_ANALYSIS_DEFAULT_METHOD", "offending key should be named")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };
        clear_vars(&["KSM_ANALYSIS_DEFAULT_METHOD"]);
        result
    }

    #[test]
    fn require_file_reports_missing_path() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        match AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Err(ConfigError::MissingConfigFile(path)) => {
                ensure(path == missing, "missing path should be reported as given")
            }
            other => Err(format!("unexpected result: {other:?}")),
        }
    }
}
