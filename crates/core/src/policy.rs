use serde::{Deserialize, Serialize};

use crate::domain::step::{ApprovalStep, ApproverRole};

/// How an approver learns that a step is waiting on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Instant,
    /// No per-request email; the step is counted in the weekly digest.
    Deferred,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NotificationPolicy;

impl NotificationPolicy {
    pub fn decide(&self, role: ApproverRole) -> Delivery {
        match role {
            ApproverRole::HighLevel => Delivery::Deferred,
            ApproverRole::MidLevel | ApproverRole::Manager => Delivery::Instant,
        }
    }

    pub fn decide_for_title(&self, title: &str) -> Delivery {
        self.decide(ApproverRole::classify(title))
    }

    pub fn decide_for_step(&self, step: &ApprovalStep) -> Delivery {
        self.decide(step.role)
    }
}
