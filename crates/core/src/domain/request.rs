use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::chain::ChainState;
use crate::domain::step::{ApprovalStep, TaskId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates a record with the submission instance that created it. Resubmitting the
/// same instance edits the record instead of creating a new one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub String);

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Unknown or empty cells read back as `Pending`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessFields {
    pub employee_name: String,
    pub submitter_email: String,
    pub department: String,
    pub team: String,
    pub description: String,
    pub cost: Decimal,
}

impl BusinessFields {
    pub fn selector_key(&self) -> String {
        selector_key(&self.department, &self.team)
    }
}

pub fn selector_key(department: &str, team: &str) -> String {
    format!("{department}|{team}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub response_id: ResponseId,
    pub submitted_at: DateTime<Utc>,
    pub fields: BusinessFields,
    pub status: RequestStatus,
    pub chain: Vec<ApprovalStep>,
}

impl RequestRecord {
    pub fn chain_state(&self) -> ChainState {
        ChainState::of(&self.chain)
    }

    pub fn active_step(&self) -> Option<&ApprovalStep> {
        self.chain.iter().find(|step| step.is_active())
    }

    pub fn step_position(&self, task_id: &TaskId) -> Option<usize> {
        self.chain.iter().position(|step| &step.task_id == task_id)
    }
}
