use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;
use crate::domain::step::{ApprovalStep, StepStatus};

/// Position of a request in its approval chain, derived from step statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainState {
    /// No step activated yet. Transient between routing and the first write.
    Routing,
    AwaitingStep(usize),
    Resolved(RequestStatus),
}

impl ChainState {
    pub fn of(chain: &[ApprovalStep]) -> Self {
        if chain.iter().any(|step| step.status == StepStatus::Rejected) {
            return Self::Resolved(RequestStatus::Rejected);
        }

        if let Some(position) = chain.iter().position(ApprovalStep::is_active) {
            return Self::AwaitingStep(position);
        }

        if !chain.is_empty() && chain.iter().all(|step| step.status == StepStatus::Approved) {
            return Self::Resolved(RequestStatus::Approved);
        }

        Self::Routing
    }

    pub fn overall_status(self) -> RequestStatus {
        match self {
            Self::Resolved(status) => status,
            Self::Routing | Self::AwaitingStep(_) => RequestStatus::Pending,
        }
    }
}

pub fn pending_count(chain: &[ApprovalStep]) -> usize {
    chain.iter().filter(|step| step.is_active()).count()
}
