//! Approval workflow transitions: submit, approve, reject and edit-by-resubmission.
//!
//! Every call loads the table fresh, mutates the affected cells and then notifies.
//! State writes happen before any email is attempted and are never rolled back when
//! delivery fails. There is no locking: two actions racing on the same step both read
//! it as Pending and the later cell write wins.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::counter::{CounterError, RequestIdFormat, SequenceCounter};
use crate::domain::request::{
    BusinessFields, RequestId, RequestRecord, RequestStatus, ResponseId,
};
use crate::domain::step::{ApprovalStep, Decision, StepStatus, TaskId};
use crate::notify::{
    AssignmentKind, DeliveryRecord, MessageComposer, Notifier, NotifyError, OutboundEmail,
};
use crate::policy::{Delivery, NotificationPolicy};
use crate::projections::{self, Dashboard, DigestReport, TaskView};
use crate::routing::{RouteResolution, RoutingTable};
use crate::store::{ColumnLayout, RequestStore, StoreError, TaskLocation};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub response_id: ResponseId,
    pub fields: BusinessFields,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitKind {
    Created,
    /// Business fields rewritten; the existing chain is untouched.
    Edited,
    /// Business fields rewritten on a record that had no chain yet.
    EditedWithNewChain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub request_id: RequestId,
    pub response_id: ResponseId,
    pub kind: SubmitKind,
    pub chain_length: usize,
    /// Whether this call routed the chain through the fallback approvers. An edit that
    /// keeps the stored chain does no routing and reports false.
    pub routed_by_fallback: bool,
    pub active_task: Option<TaskId>,
    pub notification: Option<DeliveryRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied {
        request_id: RequestId,
        task_id: TaskId,
        decision: Decision,
        request_status: RequestStatus,
        next_task: Option<TaskId>,
        deliveries: Vec<DeliveryRecord>,
    },
    NotFound {
        task_id: TaskId,
    },
    /// The step exists but is not Pending. Nothing was written or sent.
    NotActionable {
        request_id: RequestId,
        task_id: TaskId,
        status: StepStatus,
    },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Counter(#[from] CounterError),
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: RequestStore,
    counter: Arc<dyn SequenceCounter>,
    notifier: Arc<dyn Notifier>,
    routing: Arc<RoutingTable>,
    composer: MessageComposer,
    id_format: RequestIdFormat,
    policy: NotificationPolicy,
}

impl WorkflowEngine {
    pub fn new(
        store: RequestStore,
        counter: Arc<dyn SequenceCounter>,
        notifier: Arc<dyn Notifier>,
        routing: Arc<RoutingTable>,
        composer: MessageComposer,
        id_format: RequestIdFormat,
    ) -> Self {
        Self {
            store,
            counter,
            notifier,
            routing,
            composer,
            id_format,
            policy: NotificationPolicy,
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    pub async fn submit(&self, submission: Submission) -> Result<SubmitOutcome, WorkflowError> {
        if submission.response_id.0.trim().is_empty() {
            return Err(WorkflowError::InvalidSubmission("response id is required".to_string()));
        }

        let snapshot = self.store.load_all().await?;
        let existing = snapshot.find_by_response_id(&submission.response_id).cloned();

        let Some(stored) = existing else {
            return self.create(snapshot.layout(), submission).await;
        };

        let mut record = stored.record;
        record.fields = submission.fields;
        self.store.write_business_fields(snapshot.layout(), stored.row, &record.fields).await?;

        if !record.chain.is_empty() {
            info!(
                event_name = "workflow.submit.edited",
                request_id = %record.request_id,
                response_id = %record.response_id,
                "business fields rewritten on existing request"
            );
            let notification = match record.active_step().cloned() {
                Some(step) => {
                    Some(self.notify_assignee(&record, &step, AssignmentKind::Edited).await)
                }
                None => None,
            };
            return Ok(SubmitOutcome {
                request_id: record.request_id.clone(),
                response_id: record.response_id.clone(),
                kind: SubmitKind::Edited,
                chain_length: record.chain.len(),
                routed_by_fallback: false,
                active_task: record.active_step().map(|step| step.task_id.clone()),
                notification,
            });
        }

        let resolution = self.routing.resolve(&record.fields.selector_key());
        record.chain = build_chain(&resolution);
        record.status = RequestStatus::Pending;
        self.store.write_chain(snapshot.layout(), stored.row, &record.chain).await?;
        self.store.write_status(snapshot.layout(), stored.row, record.status).await?;
        info!(
            event_name = "workflow.submit.chain_built",
            request_id = %record.request_id,
            response_id = %record.response_id,
            chain_length = record.chain.len(),
            fallback = resolution.is_fallback,
            "chain built for existing request"
        );

        self.finish_routing(record, SubmitKind::EditedWithNewChain, resolution.is_fallback).await
    }

    async fn create(
        &self,
        layout: &ColumnLayout,
        submission: Submission,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let sequence = self.counter.next().await?;
        let request_id = self.id_format.format(sequence);
        let resolution = self.routing.resolve(&submission.fields.selector_key());
        let record = RequestRecord {
            request_id,
            response_id: submission.response_id,
            submitted_at: Utc::now(),
            fields: submission.fields,
            status: RequestStatus::Pending,
            chain: build_chain(&resolution),
        };

        let (row, _) = self.store.insert_record(layout, &record).await?;
        if resolution.is_fallback {
            warn!(
                event_name = "workflow.submit.routing_fallback",
                request_id = %record.request_id,
                selector_key = %resolution.selector_key,
                "no route configured; using fallback approvers"
            );
        }
        info!(
            event_name = "workflow.submit.created",
            request_id = %record.request_id,
            response_id = %record.response_id,
            row,
            chain_length = record.chain.len(),
            "request created"
        );

        self.finish_routing(record, SubmitKind::Created, resolution.is_fallback).await
    }

    async fn finish_routing(
        &self,
        record: RequestRecord,
        kind: SubmitKind,
        routed_by_fallback: bool,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let active = record.active_step().cloned();
        let notification = match &active {
            Some(step) => Some(self.notify_assignee(&record, step, AssignmentKind::New).await),
            None => None,
        };
        Ok(SubmitOutcome {
            request_id: record.request_id,
            response_id: record.response_id,
            kind,
            chain_length: record.chain.len(),
            routed_by_fallback,
            active_task: active.map(|step| step.task_id),
            notification,
        })
    }

    pub async fn approve(
        &self,
        task_id: &TaskId,
        comments: Option<String>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.decide(task_id, Decision::Approve, comments).await
    }

    pub async fn reject(
        &self,
        task_id: &TaskId,
        comments: Option<String>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.decide(task_id, Decision::Reject, comments).await
    }

    async fn decide(
        &self,
        task_id: &TaskId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let snapshot = self.store.load_all().await?;
        let Some(location) = snapshot.find_by_task_id(task_id) else {
            info!(
                event_name = "workflow.step.not_found",
                task_id = %task_id,
                decision = decision.as_str(),
                "no step with this task id; ignoring"
            );
            return Ok(ActionOutcome::NotFound { task_id: task_id.clone() });
        };

        let TaskLocation { mut record, mut step, step_position, row, column, step_columns } =
            location;
        let now = Utc::now();
        if let Err(error) = step.decide(decision, comments, now) {
            info!(
                event_name = "workflow.step.not_actionable",
                request_id = %record.request_id,
                task_id = %task_id,
                status = %step.status,
                reason = %error,
                "step is not pending; ignoring"
            );
            return Ok(ActionOutcome::NotActionable {
                request_id: record.request_id,
                task_id: task_id.clone(),
                status: step.status,
            });
        }

        self.store.write_step(row, column, &step).await?;
        record.chain[step_position] = step.clone();
        let event_name = match decision {
            Decision::Approve => "workflow.step.approved",
            Decision::Reject => "workflow.step.rejected",
        };
        info!(
            event_name,
            request_id = %record.request_id,
            task_id = %task_id,
            step = step_position + 1,
            "step decided"
        );

        let successor = match decision {
            Decision::Approve if step.has_next => record.chain.get(step_position + 1).cloned(),
            Decision::Approve | Decision::Reject => None,
        };

        let mut deliveries = Vec::new();
        let next_task = match successor {
            Some(mut next) => {
                if let Err(error) = next.activate(now) {
                    warn!(
                        event_name = "workflow.step.successor_not_waiting",
                        request_id = %record.request_id,
                        task_id = %next.task_id,
                        reason = %error,
                        "successor step was not waiting; leaving it untouched"
                    );
                    None
                } else {
                    let next_column = step_columns[step_position + 1];
                    self.store.write_step(row, next_column, &next).await?;
                    record.chain[step_position + 1] = next.clone();
                    info!(
                        event_name = "workflow.step.activated",
                        request_id = %record.request_id,
                        task_id = %next.task_id,
                        step = step_position + 2,
                        "next step activated"
                    );

                    let progress = self.composer.progress(&record, &step, &next);
                    deliveries.push(
                        self.deliver(&record.request_id, &record.fields.submitter_email, progress)
                            .await,
                    );
                    let delivery = self.notify_assignee(&record, &next, AssignmentKind::New).await;
                    deliveries.push(delivery);
                    Some(next.task_id)
                }
            }
            None => {
                let status = match decision {
                    Decision::Approve => RequestStatus::Approved,
                    Decision::Reject => RequestStatus::Rejected,
                };
                self.store.write_status(snapshot.layout(), row, status).await?;
                record.status = status;
                info!(
                    event_name = "workflow.request.resolved",
                    request_id = %record.request_id,
                    status = %status,
                    "request resolved"
                );

                let resolved = self.composer.resolved(&record, &step);
                deliveries.push(
                    self.deliver(&record.request_id, &record.fields.submitter_email, resolved)
                        .await,
                );
                None
            }
        };

        Ok(ActionOutcome::Applied {
            request_id: record.request_id,
            task_id: task_id.clone(),
            decision,
            request_status: record.status,
            next_task,
            deliveries,
        })
    }

    pub async fn dashboard(&self, email: &str) -> Result<Dashboard, WorkflowError> {
        let snapshot = self.store.load_all().await?;
        Ok(projections::dashboard(&snapshot, email))
    }

    pub async fn task_view(&self, task_id: &TaskId) -> Result<Option<TaskView>, WorkflowError> {
        let snapshot = self.store.load_all().await?;
        Ok(projections::task_view(&snapshot, task_id))
    }

    /// Sends one summary to every high-level approver with at least one pending step.
    pub async fn send_weekly_digest(&self) -> Result<DigestReport, WorkflowError> {
        let snapshot = self.store.load_all().await?;
        let entries = projections::digest_entries(&snapshot);

        let mut report = DigestReport { approvers: entries.len(), ..DigestReport::default() };
        for entry in &entries {
            report.pending_items += entry.pending_count;
            let email = self.composer.digest(entry);
            let context = RequestId(format!("digest:{}", entry.email));
            report.deliveries.push(self.deliver(&context, &entry.email, email).await);
        }

        info!(
            event_name = "workflow.digest.sent",
            approvers = report.approvers,
            pending_items = report.pending_items,
            "weekly digest run finished"
        );
        Ok(report)
    }

    async fn notify_assignee(
        &self,
        record: &RequestRecord,
        step: &ApprovalStep,
        kind: AssignmentKind,
    ) -> DeliveryRecord {
        match self.policy.decide_for_step(step) {
            Delivery::Deferred => {
                info!(
                    event_name = "workflow.notify.deferred",
                    request_id = %record.request_id,
                    task_id = %step.task_id,
                    role = step.role.as_str(),
                    "high-level approver; left for the weekly digest"
                );
                DeliveryRecord::Deferred { to: step.email.clone() }
            }
            Delivery::Instant => {
                let email = self.composer.task_assigned(record, step, kind);
                self.deliver(&record.request_id, &step.email, email).await
            }
        }
    }

    async fn deliver(
        &self,
        request_id: &RequestId,
        to: &str,
        composed: Result<OutboundEmail, NotifyError>,
    ) -> DeliveryRecord {
        let result = match composed {
            Ok(_) if to.trim().is_empty() => Err(NotifyError::MissingRecipient),
            Ok(email) => self.notifier.send(&email).await.map(|()| email.subject),
            Err(error) => Err(error),
        };

        match result {
            Ok(subject) => DeliveryRecord::Sent { to: to.to_string(), subject },
            Err(error) => {
                warn!(
                    event_name = "workflow.notify.failed",
                    request_id = %request_id,
                    to,
                    error = %error,
                    "notification failed; state change stands"
                );
                DeliveryRecord::Failed { to: to.to_string(), error: error.to_string() }
            }
        }
    }
}

/// First step Pending, the rest Waiting. A fallback route annotates the first step.
fn build_chain(resolution: &RouteResolution<'_>) -> Vec<ApprovalStep> {
    let now = Utc::now();
    let count = resolution.approvers.len();
    let mut chain: Vec<ApprovalStep> = resolution
        .approvers
        .iter()
        .enumerate()
        .map(|(position, template)| {
            ApprovalStep::waiting(
                template.email.clone(),
                template.name.clone(),
                template.title.clone(),
                template.resolved_role(),
                position + 1 < count,
                now,
            )
        })
        .collect();

    if let Some(first) = chain.first_mut() {
        first.status = StepStatus::Pending;
        first.comments = resolution.fallback_comment();
    }
    chain
}
