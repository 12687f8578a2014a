use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    #[default]
    Waiting,
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Completes "this step ..." when an action was refused.
    pub fn refusal_phrase(self) -> &'static str {
        match self {
            Self::Waiting => "has not been activated yet",
            Self::Pending => "is still pending",
            Self::Approved => "was already approved",
            Self::Rejected => "was already rejected",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seniority tag carried on every step. Resolved once when the chain is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Manager,
    MidLevel,
    HighLevel,
}

impl ApproverRole {
    /// Classifies a free-text title. Only used when a template or a stored cell carries
    /// no explicit role.
    pub fn classify(title: &str) -> Self {
        let title = title.to_lowercase();
        if title.contains("director") || title.contains("vp") {
            Self::HighLevel
        } else if title.contains("supervisor") || title.contains("lead") {
            Self::MidLevel
        } else {
            Self::Manager
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::MidLevel => "mid_level",
            Self::HighLevel => "high_level",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn resulting_status(self) -> StepStatus {
        match self {
            Self::Approve => StepStatus::Approved,
            Self::Reject => StepStatus::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StepTransitionError {
    #[error("step `{task_id}` is {status} and cannot be decided")]
    NotPending { task_id: TaskId, status: StepStatus },
    #[error("step `{task_id}` is {status} and cannot be activated")]
    NotWaiting { task_id: TaskId, status: StepStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub task_id: TaskId,
    pub email: String,
    pub name: String,
    pub title: String,
    pub role: ApproverRole,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub has_next: bool,
}

impl ApprovalStep {
    pub fn waiting(
        email: impl Into<String>,
        name: impl Into<String>,
        title: impl Into<String>,
        role: ApproverRole,
        has_next: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: TaskId::generate(),
            email: email.into(),
            name: name.into(),
            title: title.into(),
            role,
            status: StepStatus::Waiting,
            timestamp: now,
            comments: None,
            has_next,
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), StepTransitionError> {
        if self.status != StepStatus::Waiting {
            return Err(StepTransitionError::NotWaiting {
                task_id: self.task_id.clone(),
                status: self.status,
            });
        }
        self.status = StepStatus::Pending;
        self.timestamp = now;
        Ok(())
    }

    pub fn decide(
        &mut self,
        decision: Decision,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StepTransitionError> {
        if self.status != StepStatus::Pending {
            return Err(StepTransitionError::NotPending {
                task_id: self.task_id.clone(),
                status: self.status,
            });
        }
        self.status = decision.resulting_status();
        self.timestamp = now;
        if let Some(comments) = comments.filter(|value| !value.trim().is_empty()) {
            self.comments = Some(comments);
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == StepStatus::Pending
    }

    pub fn matches_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}
