pub mod config;
pub mod dashboard;
pub mod decide;
pub mod digest;
pub mod doctor;
pub mod migrate;
pub mod submit;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_core::{WorkflowEngine, WorkflowError};
use signoff_db::{build_engine, connect_with_config, migrations};
use tracing::{debug, warn};

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
        Self::success_with(command, message, None::<()>)
    }

    /// Success carrying a structured payload under `data`.
    pub fn success_with<T: Serialize>(
        command: &str,
        message: impl Into<String>,
        data: Option<T>,
    ) -> Self {
        debug!(event_name = "cli.command.completed", command, "command finished");
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: data.and_then(|data| serde_json::to_value(data).ok()),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let message = message.into();
        warn!(
            event_name = "cli.command.failed",
            command,
            error_class,
            exit_code,
            message = %message,
            "command failed"
        );
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads config, opens and migrates the database, builds the engine and runs
/// `operation` on a current-thread runtime. Each setup stage has its own exit code.
pub(crate) fn with_engine<F, Fut>(command: &str, operation: F) -> CommandResult
where
    F: FnOnce(WorkflowEngine) -> Fut,
    Fut: Future<Output = Result<CommandResult, WorkflowError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }

        debug!(event_name = "cli.database.ready", command, "database connected and migrated");

        let result = match build_engine(&config, pool.clone()) {
            Ok(engine) => match operation(engine).await {
                Ok(result) => result,
                Err(error) => workflow_failure(command, error),
            },
            Err(error) => CommandResult::failure(command, "engine_init", error.to_string(), 6),
        };
        pool.close().await;
        result
    })
}

fn workflow_failure(command: &str, error: WorkflowError) -> CommandResult {
    match error {
        WorkflowError::Store(_) | WorkflowError::Counter(_) => {
            CommandResult::failure(command, "persistence", error.to_string(), 7)
        }
        WorkflowError::InvalidSubmission(_) => {
            CommandResult::failure(command, "invalid_input", error.to_string(), 8)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use signoff_core::store::StoreError;
    use signoff_core::WorkflowError;

    use super::{workflow_failure, CommandResult};

    #[test]
    fn success_payload_omits_missing_data() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(payload["status"], "ok");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn workflow_errors_map_to_distinct_exit_codes() {
        let outage =
            workflow_failure("digest", WorkflowError::Store(StoreError::Unavailable("gone".into())));
        assert_eq!(outage.exit_code, 7);

        let invalid = workflow_failure("submit", WorkflowError::InvalidSubmission("blank".into()));
        let payload: Value = serde_json::from_str(&invalid.output).expect("json");
        assert_eq!(invalid.exit_code, 8);
        assert_eq!(payload["error_class"], "invalid_input");
    }
}
