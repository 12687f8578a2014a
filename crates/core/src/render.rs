use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::request::RequestRecord;
use crate::domain::step::ApprovalStep;

pub const TASK_ASSIGNED: &str = "email/task_assigned.html";
pub const REQUEST_PROGRESS: &str = "email/request_progress.html";
pub const REQUEST_RESOLVED: &str = "email/request_resolved.html";
pub const WEEKLY_DIGEST: &str = "email/weekly_digest.html";
pub const TASK_PAGE: &str = "web/task.html";
pub const DASHBOARD_PAGE: &str = "web/dashboard.html";
pub const ACKNOWLEDGMENT_PAGE: &str = "web/acknowledgment.html";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] tera::Error),
}

/// Renders the embedded email and page templates. Rendering is a pure function of the
/// template name and the serialized data.
#[derive(Debug)]
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (TASK_ASSIGNED, include_str!("../../../templates/email/task_assigned.html")),
            (REQUEST_PROGRESS, include_str!("../../../templates/email/request_progress.html")),
            (REQUEST_RESOLVED, include_str!("../../../templates/email/request_resolved.html")),
            (WEEKLY_DIGEST, include_str!("../../../templates/email/weekly_digest.html")),
            (TASK_PAGE, include_str!("../../../templates/web/task.html")),
            (DASHBOARD_PAGE, include_str!("../../../templates/web/dashboard.html")),
            (ACKNOWLEDGMENT_PAGE, include_str!("../../../templates/web/acknowledgment.html")),
        ])?;
        Ok(Self { tera })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, RenderError> {
        let context = Context::from_serialize(data)?;
        Ok(self.tera.render(name, &context)?)
    }
}

/// Request fields as the templates see them.
#[derive(Clone, Debug, Serialize)]
pub struct RecordContext {
    pub request_id: String,
    pub employee_name: String,
    pub submitter_email: String,
    pub department: String,
    pub team: String,
    pub description: String,
    pub cost: String,
    pub status: String,
    pub submitted_at: String,
}

impl From<&RequestRecord> for RecordContext {
    fn from(record: &RequestRecord) -> Self {
        Self {
            request_id: record.request_id.0.clone(),
            employee_name: record.fields.employee_name.clone(),
            submitter_email: record.fields.submitter_email.clone(),
            department: record.fields.department.clone(),
            team: record.fields.team.clone(),
            description: record.fields.description.clone(),
            cost: format_cost(record.fields.cost),
            status: record.status.as_str().to_string(),
            submitted_at: record.submitted_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StepContext {
    pub task_id: String,
    pub name: String,
    pub title: String,
    pub email: String,
    pub status: String,
    pub timestamp: String,
    pub comments: Option<String>,
    pub current: bool,
}

impl From<&ApprovalStep> for StepContext {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            task_id: step.task_id.0.clone(),
            name: step.name.clone(),
            title: step.title.clone(),
            email: step.email.clone(),
            status: step.status.as_str().to_string(),
            timestamp: step.timestamp.format("%Y-%m-%d %H:%M UTC").to_string(),
            comments: step.comments.clone(),
            current: false,
        }
    }
}

pub fn format_cost(cost: Decimal) -> String {
    format!("${:.2}", cost)
}
