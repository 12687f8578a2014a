use signoff_core::config::{AppConfig, ConfigError};
use signoff_core::WorkflowEngine;
use signoff_db::{build_engine, connect_with_config, migrations, DbPool, EngineBuildError};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: WorkflowEngine,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Engine(#[from] EngineBuildError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let engine = build_engine(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        routes = engine.routing().routes().len(),
        mail_transport = ?config.mail.transport,
        "workflow engine ready"
    );

    Ok(Application { config, db_pool, engine })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use signoff_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    const ROUTES: &str = r#"
[[routes]]
department = "Sales"
team = "North America"
approvers = [
  { email = "lead.na@example.com", name = "Nora Lead", title = "Team Lead" },
]

[fallback]
approvers = [
  { email = "ops@example.com", name = "Owen Ops", title = "Operations Manager" },
]
"#;

    async fn bootstrap(routing_path: &Path) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                routing_table_path: Some(routing_path.to_path_buf()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })?;
        bootstrap_with_config(config).await
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_engine() {
        let mut routes = tempfile::NamedTempFile::new().expect("temp file");
        routes.write_all(ROUTES.as_bytes()).expect("write routes");

        let app = bootstrap(routes.path()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('sheet_header', 'sheet_row', 'sheet_cell', 'sequence_counter')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables should exist after bootstrap");
        assert_eq!(table_count, 4);
        assert_eq!(app.engine.routing().routes().len(), 1);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_a_missing_routing_table() {
        let result = bootstrap(Path::new("missing/routing.toml")).await;

        assert!(matches!(result, Err(BootstrapError::Engine(_))));
    }
}
