//! Cell codec for approval steps.
//!
//! A stored row mixes scalar business fields with serialized steps. A cell is a step
//! when its text decodes into an object with a non-empty `taskId`; every other cell is
//! scalar data. Decoding never fails.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::step::{ApprovalStep, ApproverRole, StepStatus, TaskId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellValue {
    Step(ApprovalStep),
    Scalar(String),
}

impl CellValue {
    pub fn as_step(&self) -> Option<&ApprovalStep> {
        match self {
            Self::Step(step) => Some(step),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Step(_) => None,
        }
    }
}

/// Wire shape of a step cell. Only `taskId` is required: a missing `status` reads as
/// Waiting, a missing `timestamp` as the epoch, a missing `role` is classified from the
/// title.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepCell {
    task_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    role: Option<ApproverRole>,
    #[serde(default)]
    status: StepStatus,
    #[serde(default)]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    comments: Option<String>,
    #[serde(default)]
    has_next: bool,
}

impl From<StepCell> for ApprovalStep {
    fn from(cell: StepCell) -> Self {
        let role = cell.role.unwrap_or_else(|| ApproverRole::classify(&cell.title));
        Self {
            task_id: TaskId(cell.task_id),
            email: cell.email,
            name: cell.name,
            title: cell.title,
            role,
            status: cell.status,
            timestamp: cell.timestamp,
            comments: cell.comments,
            has_next: cell.has_next,
        }
    }
}

pub fn encode_step(step: &ApprovalStep) -> Result<String, serde_json::Error> {
    serde_json::to_string(step)
}

pub fn decode_cell(text: &str) -> CellValue {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return CellValue::Scalar(text.to_string());
    }

    match serde_json::from_str::<StepCell>(trimmed) {
        Ok(cell) if !cell.task_id.trim().is_empty() => CellValue::Step(cell.into()),
        _ => CellValue::Scalar(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::{decode_cell, encode_step, CellValue};
    use crate::domain::step::{ApprovalStep, ApproverRole, StepStatus};

    #[test]
    fn encoded_step_decodes_back_to_the_same_step() {
        let mut step = ApprovalStep::waiting(
            "vp.sales@example.com",
            "Victor Park",
            "VP Sales",
            ApproverRole::HighLevel,
            false,
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).single().expect("valid timestamp"),
        );
        step.comments = Some("needs budget code".to_string());

        let encoded = encode_step(&step).expect("encode");
        assert!(encoded.contains("\"taskId\""));
        assert!(encoded.contains("\"hasNext\":false"));

        assert_eq!(decode_cell(&encoded), CellValue::Step(step));
    }

    #[test]
    fn business_values_stay_scalar() {
        for raw in ["Sales", "1250.00", "", "REQ-00001", "{not json", "[1,2,3]"] {
            assert_eq!(decode_cell(raw), CellValue::Scalar(raw.to_string()), "value `{raw}`");
        }
    }

    #[test]
    fn json_objects_without_task_id_stay_scalar() {
        let raw = r#"{"note":"free text that happens to be json"}"#;
        assert_eq!(decode_cell(raw), CellValue::Scalar(raw.to_string()));

        let blank_id = r#"{"taskId":" ","status":"Pending","timestamp":"2026-03-02T09:30:00Z"}"#;
        assert!(decode_cell(blank_id).as_scalar().is_some());
    }

    #[test]
    fn cells_without_role_are_classified_from_title() {
        let raw = r#"{"taskId":"t-1","email":"dir@example.com","name":"Dana","title":"Finance Director","status":"Pending","timestamp":"2026-03-02T09:30:00Z","hasNext":true}"#;
        let step = decode_cell(raw);
        let step = step.as_step().expect("should decode as a step");

        assert_eq!(step.role, ApproverRole::HighLevel);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.has_next);
        assert!(step.comments.is_none());
    }

    #[test]
    fn task_id_alone_marks_a_step_cell() {
        let raw = r#"{"taskId":"t-9","email":"a@example.com","name":"A","title":"Lead","status":"Pending","hasNext":false}"#;
        let step = decode_cell(raw);
        let step = step.as_step().expect("taskId should be enough to decode a step");

        assert_eq!(step.task_id.as_str(), "t-9");
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.timestamp, DateTime::<Utc>::default());

        let bare = decode_cell(r#"{"taskId":"t-10"}"#);
        assert_eq!(bare.as_step().map(|step| step.status), Some(StepStatus::Waiting));
    }
}
