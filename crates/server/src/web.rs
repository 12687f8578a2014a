//! Approver pages and the intake API.
//!
//! HTML endpoints:
//! - `GET  /tasks/{task_id}`           single step with the approve/reject form
//! - `POST /tasks/{task_id}/approve`   form action, returns an acknowledgment page
//! - `POST /tasks/{task_id}/reject`    form action, returns an acknowledgment page
//! - `GET  /dashboard?email=`          approver dashboard
//!
//! JSON endpoints:
//! - `POST /api/v1/submissions`        intake event from the request form
//! - `GET  /api/v1/dashboard?email=`   dashboard data
//! - `POST /api/v1/digest`             weekly digest run, triggered by an outside scheduler

use axum::{
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signoff_core::domain::request::{BusinessFields, ResponseId};
use signoff_core::domain::step::{Decision, TaskId};
use signoff_core::engine::{ActionOutcome, Submission, SubmitKind, SubmitOutcome};
use signoff_core::projections::{Dashboard, DashboardEntry, DigestReport, TaskView};
use signoff_core::render::{
    format_cost, RecordContext, StepContext, ACKNOWLEDGMENT_PAGE, DASHBOARD_PAGE, TASK_PAGE,
};
use signoff_core::{
    ApplicationError, InterfaceError, MessageComposer, WorkflowEngine, WorkflowError,
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebState {
    engine: WorkflowEngine,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmissionPayload {
    pub response_id: String,
    pub employee_name: String,
    pub submitter_email: String,
    pub department: String,
    pub team: String,
    #[serde(default)]
    pub description: String,
    pub cost: Decimal,
}

impl From<SubmissionPayload> for Submission {
    fn from(payload: SubmissionPayload) -> Self {
        Self {
            response_id: ResponseId(payload.response_id.trim().to_string()),
            fields: BusinessFields {
                employee_name: payload.employee_name,
                submitter_email: payload.submitter_email,
                department: payload.department,
                team: payload.team,
                description: payload.description,
                cost: payload.cost,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionForm {
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub email: Option<String>,
}

impl DashboardQuery {
    fn approver_email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type JsonFailure = (StatusCode, Json<ApiError>);
type PageFailure = (StatusCode, Html<String>);

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(engine: WorkflowEngine) -> Router {
    Router::new()
        .route("/tasks/{task_id}", get(task_page))
        .route("/tasks/{task_id}/approve", post(approve_task))
        .route("/tasks/{task_id}/reject", post(reject_task))
        .route("/dashboard", get(dashboard_page))
        .route("/api/v1/submissions", post(submit))
        .route("/api/v1/dashboard", get(dashboard_json))
        .route("/api/v1/digest", post(run_digest))
        .with_state(WebState { engine })
}

// ---------------------------------------------------------------------------
// Page contexts
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AcknowledgmentContext<'a> {
    title: &'a str,
    message: &'a str,
    dashboard_url: Option<String>,
}

#[derive(Serialize)]
struct TaskPageContext {
    record: RecordContext,
    chain: Vec<StepContext>,
    actionable: bool,
    approve_url: String,
    reject_url: String,
    step_status: String,
}

impl TaskPageContext {
    fn new(view: &TaskView, composer: &MessageComposer) -> Self {
        let task_url = composer.task_url(&view.step.task_id);
        let chain = view
            .record
            .chain
            .iter()
            .map(|step| {
                let mut context = StepContext::from(step);
                context.current = step.task_id == view.step.task_id;
                context
            })
            .collect();

        Self {
            record: RecordContext::from(&view.record),
            chain,
            actionable: view.actionable,
            approve_url: format!("{task_url}/approve"),
            reject_url: format!("{task_url}/reject"),
            step_status: view.step.status.as_str().to_lowercase(),
        }
    }
}

#[derive(Serialize)]
struct DashboardRow {
    task_id: String,
    request_id: String,
    employee_name: String,
    department: String,
    team: String,
    description: String,
    cost: String,
    timestamp: String,
    comments: Option<String>,
}

impl From<&DashboardEntry> for DashboardRow {
    fn from(entry: &DashboardEntry) -> Self {
        Self {
            task_id: entry.task_id.0.clone(),
            request_id: entry.request_id.clone(),
            employee_name: entry.employee_name.clone(),
            department: entry.department.clone(),
            team: entry.team.clone(),
            description: entry.description.clone(),
            cost: format_cost(entry.cost),
            timestamp: entry.timestamp.format("%Y-%m-%d %H:%M UTC").to_string(),
            comments: entry.comments.clone(),
        }
    }
}

#[derive(Serialize)]
struct DashboardSection {
    label: &'static str,
    entries: Vec<DashboardRow>,
}

#[derive(Serialize)]
struct DashboardPageContext<'a> {
    dashboard: &'a Dashboard,
    sections: Vec<DashboardSection>,
    base_url: &'a str,
}

impl<'a> DashboardPageContext<'a> {
    fn new(dashboard: &'a Dashboard, base_url: &'a str) -> Self {
        let section = |label, entries: &[DashboardEntry]| DashboardSection {
            label,
            entries: entries.iter().map(DashboardRow::from).collect(),
        };
        Self {
            dashboard,
            sections: vec![
                section("Pending", &dashboard.pending),
                section("Approved", &dashboard.approved),
                section("Rejected", &dashboard.rejected),
            ],
            base_url,
        }
    }
}

// ---------------------------------------------------------------------------
// HTML handlers
// ---------------------------------------------------------------------------

async fn task_page(
    Path(task_id): Path<String>,
    State(state): State<WebState>,
) -> Result<Html<String>, PageFailure> {
    let task_id = TaskId(task_id);
    let view = state
        .engine
        .task_view(&task_id)
        .await
        .map_err(|error| state.page_failure(error, "task_page"))?
        .ok_or_else(|| state.task_not_found(&task_id))?;

    let context = TaskPageContext::new(&view, state.engine.composer());
    state.render_page(TASK_PAGE, &context)
}

async fn approve_task(
    Path(task_id): Path<String>,
    State(state): State<WebState>,
    Form(form): Form<DecisionForm>,
) -> Result<Html<String>, PageFailure> {
    decide(state, TaskId(task_id), Decision::Approve, form).await
}

async fn reject_task(
    Path(task_id): Path<String>,
    State(state): State<WebState>,
    Form(form): Form<DecisionForm>,
) -> Result<Html<String>, PageFailure> {
    decide(state, TaskId(task_id), Decision::Reject, form).await
}

async fn decide(
    state: WebState,
    task_id: TaskId,
    decision: Decision,
    form: DecisionForm,
) -> Result<Html<String>, PageFailure> {
    let comments = form.comments.filter(|comments| !comments.trim().is_empty());
    let outcome = match decision {
        Decision::Approve => state.engine.approve(&task_id, comments).await,
        Decision::Reject => state.engine.reject(&task_id, comments).await,
    }
    .map_err(|error| state.page_failure(error, "decide"))?;

    match outcome {
        ActionOutcome::Applied { request_id, next_task, .. } => {
            let (title, message) = match (decision, next_task) {
                (Decision::Approve, Some(_)) => (
                    "Approved",
                    format!("Request {request_id} approved. It has moved to the next approver."),
                ),
                (Decision::Approve, None) => (
                    "Approved",
                    format!(
                        "Request {request_id} is fully approved. The submitter has been notified."
                    ),
                ),
                (Decision::Reject, _) => (
                    "Rejected",
                    format!("Request {request_id} was rejected. The submitter has been notified."),
                ),
            };
            let dashboard_url = state.approver_dashboard_url(&task_id).await;
            Ok(state.acknowledgment(title, &message, dashboard_url))
        }
        ActionOutcome::NotFound { task_id } => Err(state.task_not_found(&task_id)),
        ActionOutcome::NotActionable { request_id, status, .. } => {
            let message = format!(
                "This step of request {request_id} {}. No changes were made.",
                status.refusal_phrase()
            );
            let dashboard_url = state.approver_dashboard_url(&task_id).await;
            let page = state.acknowledgment("No action taken", &message, dashboard_url);
            Err((StatusCode::CONFLICT, page))
        }
    }
}

async fn dashboard_page(
    Query(query): Query<DashboardQuery>,
    State(state): State<WebState>,
) -> Result<Html<String>, PageFailure> {
    let Some(email) = query.approver_email() else {
        return Err((
            StatusCode::BAD_REQUEST,
            state.acknowledgment("Missing email", "Add ?email= to open a dashboard.", None),
        ));
    };

    let dashboard = state
        .engine
        .dashboard(email)
        .await
        .map_err(|error| state.page_failure(error, "dashboard_page"))?;
    let context = DashboardPageContext::new(&dashboard, state.engine.composer().public_base_url());
    state.render_page(DASHBOARD_PAGE, &context)
}

// ---------------------------------------------------------------------------
// JSON handlers
// ---------------------------------------------------------------------------

async fn submit(
    State(state): State<WebState>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<(StatusCode, Json<SubmitOutcome>), JsonFailure> {
    let outcome = state
        .engine
        .submit(payload.into())
        .await
        .map_err(|error| json_failure(error, "submit"))?;

    info!(
        event_name = "web.submission.accepted",
        request_id = %outcome.request_id,
        response_id = %outcome.response_id,
        kind = ?outcome.kind,
        "intake event accepted"
    );

    let status =
        if outcome.kind == SubmitKind::Created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

async fn dashboard_json(
    Query(query): Query<DashboardQuery>,
    State(state): State<WebState>,
) -> Result<Json<Dashboard>, JsonFailure> {
    let Some(email) = query.approver_email() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "query parameter `email` is required".to_string(),
                correlation_id: correlation_id(),
            }),
        ));
    };

    let dashboard =
        state.engine.dashboard(email).await.map_err(|error| json_failure(error, "dashboard"))?;
    Ok(Json(dashboard))
}

async fn run_digest(State(state): State<WebState>) -> Result<Json<DigestReport>, JsonFailure> {
    let report =
        state.engine.send_weekly_digest().await.map_err(|error| json_failure(error, "digest"))?;
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl WebState {
    fn render_page<T: Serialize>(
        &self,
        template: &str,
        data: &T,
    ) -> Result<Html<String>, PageFailure> {
        self.engine.composer().renderer().render(template, data).map(Html).map_err(|error| {
            let interface = InterfaceError::Internal {
                message: error.to_string(),
                correlation_id: correlation_id(),
            };
            error!(
                event_name = "web.render.failed",
                template,
                correlation_id = %interface.correlation_id(),
                error = %error,
                "page template failed to render"
            );
            (status_for(&interface), fallback_page(&interface))
        })
    }

    fn acknowledgment(
        &self,
        title: &str,
        message: &str,
        dashboard_url: Option<String>,
    ) -> Html<String> {
        let context = AcknowledgmentContext { title, message, dashboard_url };
        self.render_page(ACKNOWLEDGMENT_PAGE, &context).unwrap_or_else(|(_, page)| page)
    }

    fn task_not_found(&self, task_id: &TaskId) -> PageFailure {
        let message = format!("No approval task matches `{task_id}`.");
        (StatusCode::NOT_FOUND, self.acknowledgment("Task not found", &message, None))
    }

    fn page_failure(&self, error: WorkflowError, operation: &'static str) -> PageFailure {
        let interface = interface_error(error, operation);
        let message =
            format!("{} (reference {})", interface.user_message(), interface.correlation_id());
        (status_for(&interface), self.acknowledgment("Something went wrong", &message, None))
    }

    async fn approver_dashboard_url(&self, task_id: &TaskId) -> Option<String> {
        let view = self.engine.task_view(task_id).await.ok().flatten()?;
        Some(self.engine.composer().dashboard_url(&view.step.email))
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn interface_error(error: WorkflowError, operation: &'static str) -> InterfaceError {
    let correlation_id = correlation_id();
    let application = ApplicationError::from(error);
    error!(
        event_name = "web.request.failed",
        operation,
        correlation_id = %correlation_id,
        error = %application,
        "request failed"
    );
    application.into_interface(correlation_id)
}

/// Plain page used when even the acknowledgment template cannot render.
fn fallback_page(error: &InterfaceError) -> Html<String> {
    Html(format!(
        "<h1>Something went wrong</h1><p>{} (reference {})</p>",
        error.user_message(),
        error.correlation_id()
    ))
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_failure(error: WorkflowError, operation: &'static str) -> JsonFailure {
    let interface = interface_error(error, operation);
    let message = match &interface {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        other => other.user_message().to_string(),
    };
    (
        status_for(&interface),
        Json(ApiError { error: message, correlation_id: interface.correlation_id().to_string() }),
    )
}
