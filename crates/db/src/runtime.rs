use std::sync::Arc;

use signoff_core::config::AppConfig;
use signoff_core::notify::{notifier_from_config, MessageComposer, NotifyError};
use signoff_core::render::{RenderError, TemplateRenderer};
use signoff_core::routing::{RoutingTable, RoutingTableError};
use signoff_core::store::RequestStore;
use signoff_core::WorkflowEngine;
use thiserror::Error;

use crate::{DbPool, SqliteSequenceCounter, SqliteTable};

#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error("routing table could not be loaded: {0}")]
    Routing(#[from] RoutingTableError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("mail transport could not be configured: {0}")]
    Notify(#[from] NotifyError),
}

/// Wires the workflow engine to SQLite storage and the configured mail transport.
/// The pool must already be migrated.
pub fn build_engine(config: &AppConfig, pool: DbPool) -> Result<WorkflowEngine, EngineBuildError> {
    let routing = RoutingTable::load(&config.routing.table_path)?;
    let renderer = Arc::new(TemplateRenderer::new()?);
    let notifier = notifier_from_config(&config.mail)?;

    Ok(WorkflowEngine::new(
        RequestStore::new(Arc::new(SqliteTable::new(pool.clone()))),
        Arc::new(SqliteSequenceCounter::for_requests(pool)),
        notifier,
        Arc::new(routing),
        MessageComposer::new(renderer, config.server.public_base_url.clone()),
        config.requests.id_format(),
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;
    use signoff_core::config::AppConfig;
    use signoff_core::domain::request::{BusinessFields, RequestId, ResponseId};
    use signoff_core::engine::{Submission, SubmitKind};

    use super::{build_engine, EngineBuildError};
    use crate::{connect_with_settings, migrations::run_pending};

    const ROUTES: &str = r#"
[[routes]]
department = "Sales"
team = "North America"
approvers = [
  { email = "lead.na@example.com", name = "Nora Lead", title = "Team Lead" },
  { email = "vp.sales@example.com", name = "Vera Vp", title = "VP Sales" },
]

[fallback]
approvers = [
  { email = "ops@example.com", name = "Owen Ops", title = "Operations Manager" },
]
"#;

    #[tokio::test]
    async fn engine_built_from_config_mints_ids_from_sqlite() {
        let mut routes = tempfile::NamedTempFile::new().expect("temp file");
        routes.write_all(ROUTES.as_bytes()).expect("write routes");

        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let mut config = AppConfig::default();
        config.routing.table_path = routes.path().to_path_buf();
        let engine = build_engine(&config, pool).expect("build engine");

        let outcome = engine
            .submit(Submission {
                response_id: ResponseId("resp-1".to_string()),
                fields: BusinessFields {
                    employee_name: "Ada Employee".to_string(),
                    submitter_email: "ada@example.com".to_string(),
                    department: "Sales".to_string(),
                    team: "North America".to_string(),
                    description: "Conference travel".to_string(),
                    cost: Decimal::new(125_000, 2),
                },
            })
            .await
            .expect("submit");

        assert_eq!(outcome.kind, SubmitKind::Created);
        assert_eq!(outcome.request_id, RequestId("REQ-00001".to_string()));
        assert_eq!(outcome.chain_length, 2);
    }

    #[tokio::test]
    async fn missing_routing_table_is_reported() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let mut config = AppConfig::default();
        config.routing.table_path = "does/not/exist.toml".into();

        assert!(matches!(build_engine(&config, pool), Err(EngineBuildError::Routing(_))));
    }
}
