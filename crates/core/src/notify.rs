//! Outbound email and message composition.
//!
//! The workflow engine only knows the [`Notifier`] seam. Deployments pick a transport
//! through `[mail] transport` in config: `log` writes the message to the tracing stream,
//! `webhook` posts it as JSON to a mail relay.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::config::{MailConfig, MailTransport};
use crate::domain::request::RequestRecord;
use crate::domain::step::{ApprovalStep, TaskId};
use crate::projections::DigestEntry;
use crate::render::{
    RecordContext, RenderError, TemplateRenderer, REQUEST_PROGRESS, REQUEST_RESOLVED,
    TASK_ASSIGNED, WEEKLY_DIGEST,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail relay rejected message for {to}: {reason}")]
    Rejected { to: String, reason: String },
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("no recipient address")]
    MissingRecipient,
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError>;
}

/// What happened to one notification attempt. Returned to callers so the CLI and HTTP
/// surfaces can report it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryRecord {
    Sent { to: String, subject: String },
    Deferred { to: String },
    Failed { to: String, error: String },
}

impl DeliveryRecord {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Sent { to, .. } | Self::Deferred { to } | Self::Failed { to, .. } => to,
        }
    }
}

/// Writes each message to the log instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        info!(
            event_name = "notify.log.sent",
            to = %email.to,
            subject = %email.subject,
            body_bytes = email.html_body.len(),
            "email delivered to log transport"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: Mutex<bool>,
}

impl InMemoryNotifier {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutboundEmail> {
        lock(&self.sent)
            .iter()
            .filter(|email| email.to.eq_ignore_ascii_case(address))
            .cloned()
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        if *lock(&self.failing) {
            return Err(NotifyError::Transport("in-memory notifier set to fail".to_string()));
        }
        lock(&self.sent).push(email.clone());
        Ok(())
    }
}

/// Posts `{from, to, subject, html}` to a mail relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
    from_address: String,
    api_key: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(
        endpoint: Url,
        from_address: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint, from_address: from_address.into(), api_key })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        let payload = json!({
            "from": self.from_address,
            "to": email.to,
            "subject": email.subject,
            "html": email.html_body,
        });
        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| NotifyError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                to: email.to.clone(),
                reason: format!("{status}: {}", reason.trim()),
            });
        }
        Ok(())
    }
}

/// Picks the transport named by `[mail] transport`.
pub fn notifier_from_config(mail: &MailConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match mail.transport {
        MailTransport::Log => Ok(Arc::new(LogNotifier)),
        MailTransport::Webhook => {
            let raw = mail.webhook_url.as_deref().ok_or_else(|| {
                NotifyError::Transport("webhook transport requires mail.webhook_url".to_string())
            })?;
            let endpoint = Url::parse(raw).map_err(|error| {
                NotifyError::Transport(format!("invalid mail.webhook_url `{raw}`: {error}"))
            })?;
            let notifier = WebhookNotifier::new(
                endpoint,
                mail.from_address.clone(),
                mail.api_key.clone(),
                Duration::from_secs(mail.timeout_secs.max(1)),
            )?;
            Ok(Arc::new(notifier))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentKind {
    New,
    Edited,
}

/// Builds the outbound emails from records and steps.
#[derive(Clone)]
pub struct MessageComposer {
    renderer: Arc<TemplateRenderer>,
    public_base_url: String,
}

#[derive(Serialize)]
struct PersonContext<'a> {
    name: &'a str,
    title: &'a str,
    comments: Option<&'a str>,
}

impl<'a> From<&'a ApprovalStep> for PersonContext<'a> {
    fn from(step: &'a ApprovalStep) -> Self {
        Self { name: &step.name, title: &step.title, comments: step.comments.as_deref() }
    }
}

impl MessageComposer {
    pub fn new(renderer: Arc<TemplateRenderer>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self { renderer, public_base_url }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    pub fn task_url(&self, task_id: &TaskId) -> String {
        format!("{}/tasks/{}", self.public_base_url, task_id)
    }

    pub fn dashboard_url(&self, email: &str) -> String {
        let base = format!("{}/dashboard", self.public_base_url);
        match Url::parse_with_params(&base, &[("email", email)]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{base}?email={email}"),
        }
    }

    pub fn task_assigned(
        &self,
        record: &RequestRecord,
        step: &ApprovalStep,
        kind: AssignmentKind,
    ) -> Result<OutboundEmail, NotifyError> {
        let subject = match kind {
            AssignmentKind::New => format!(
                "Approval needed: {} ({})",
                record.request_id, record.fields.employee_name
            ),
            AssignmentKind::Edited => {
                format!("Updated request awaiting approval: {}", record.request_id)
            }
        };
        let html_body = self.renderer.render(
            TASK_ASSIGNED,
            &json!({
                "recipient_name": step.name,
                "record": RecordContext::from(record),
                "step_title": step.title,
                "step_comments": step.comments,
                "action_url": self.task_url(&step.task_id),
                "edited": kind == AssignmentKind::Edited,
            }),
        )?;
        Ok(OutboundEmail { to: step.email.clone(), subject, html_body })
    }

    pub fn progress(
        &self,
        record: &RequestRecord,
        approved: &ApprovalStep,
        next: &ApprovalStep,
    ) -> Result<OutboundEmail, NotifyError> {
        let html_body = self.renderer.render(
            REQUEST_PROGRESS,
            &json!({
                "record": RecordContext::from(record),
                "approved_by": PersonContext::from(approved),
                "next": PersonContext::from(next),
            }),
        )?;
        Ok(OutboundEmail {
            to: record.fields.submitter_email.clone(),
            subject: format!("{} approved by {}", record.request_id, approved.name),
            html_body,
        })
    }

    pub fn resolved(
        &self,
        record: &RequestRecord,
        deciding_step: &ApprovalStep,
    ) -> Result<OutboundEmail, NotifyError> {
        let status = record.status.as_str();
        let html_body = self.renderer.render(
            REQUEST_RESOLVED,
            &json!({
                "record": RecordContext::from(record),
                "status": status.to_lowercase(),
                "decided_by": PersonContext::from(deciding_step),
            }),
        )?;
        Ok(OutboundEmail {
            to: record.fields.submitter_email.clone(),
            subject: format!("{} {}", record.request_id, status),
            html_body,
        })
    }

    pub fn digest(&self, entry: &DigestEntry) -> Result<OutboundEmail, NotifyError> {
        let html_body = self.renderer.render(
            WEEKLY_DIGEST,
            &json!({
                "name": entry.name,
                "pending_count": entry.pending_count,
                "dashboard_url": self.dashboard_url(&entry.email),
            }),
        )?;
        Ok(OutboundEmail {
            to: entry.email.clone(),
            subject: format!("Weekly approvals: {} pending", entry.pending_count),
            html_body,
        })
    }
}
