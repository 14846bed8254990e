pub mod analyze;
pub mod approve;
pub mod config;
pub mod migrate;
pub mod seed;
pub mod select;
pub mod show_analysis;
pub mod weights;

use std::future::Future;

use ksm_core::config::LoadOptions;
use ksm_core::errors::{ApplicationError, InterfaceError};
use ksm_service::{bootstrap, Application, BootstrapError, ServiceError};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// `(error_class, message, exit_code)` carried out of a command's async block.
pub(crate) type CommandError = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 3);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_error(command: &str, (error_class, message, exit_code): CommandError) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Bootstraps the application, runs `work` against it and closes the pool afterwards.
pub(crate) fn with_application<T, F, Fut>(
    command: &str,
    options: LoadOptions,
    work: F,
) -> Result<T, CommandResult>
where
    F: FnOnce(Application) -> Fut,
    Fut: Future<Output = Result<T, CommandError>>,
{
    let runtime = runtime(command)?;
    runtime
        .block_on(async {
            let app = bootstrap(options).await.map_err(classify_bootstrap)?;
            let pool = app.db_pool.clone();
            let outcome = work(app).await;
            pool.close().await;
            outcome
        })
        .map_err(|error| CommandResult::from_error(command, error))
}

pub(crate) fn classify_bootstrap(error: BootstrapError) -> CommandError {
    match error {
        BootstrapError::Config(error) => {
            ("config_validation", format!("configuration issue: {error}"), 2)
        }
        BootstrapError::DatabaseConnect(error) => ("db_connectivity", error.to_string(), 4),
        BootstrapError::Migration(error) => ("migration", error.to_string(), 5),
    }
}

/// Maps a service failure onto the user-facing error taxonomy. Storage detail is only logged,
/// under a correlation id that is echoed back in the outcome message.
pub(crate) fn classify_service(error: ServiceError) -> CommandError {
    let correlation_id = Uuid::new_v4().to_string();
    warn!(
        event_name = "cli.command_failed",
        correlation_id = %correlation_id,
        error = %error,
        "command failed"
    );

    let interface = ApplicationError::from(error).into_interface(correlation_id.clone());
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("validation", 6),
        InterfaceError::NotFound { .. } => ("not_found", 7),
        InterfaceError::ServiceUnavailable { .. } => ("persistence", 8),
        InterfaceError::Internal { .. } => ("internal", 3),
    };
    (error_class, format!("{interface} (correlation id {correlation_id})"), exit_code)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
