//! Read-only views derived from a loaded [`Snapshot`]. Nothing here writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::request::{RequestRecord, RequestStatus};
use crate::domain::step::{ApprovalStep, ApproverRole, StepStatus, TaskId};
use crate::notify::DeliveryRecord;
use crate::store::Snapshot;

/// Approved and rejected buckets keep only the most recently updated entries.
pub const HISTORY_LIMIT: usize = 20;

const TITLE_SEPARATOR: &str = " / ";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardEntry {
    pub request_id: String,
    pub task_id: TaskId,
    pub employee_name: String,
    pub submitter_email: String,
    pub department: String,
    pub team: String,
    pub description: String,
    pub cost: Decimal,
    pub request_status: RequestStatus,
    pub step_status: StepStatus,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub comments: Option<String>,
}

impl DashboardEntry {
    fn new(record: &RequestRecord, step: &ApprovalStep) -> Self {
        Self {
            request_id: record.request_id.0.clone(),
            task_id: step.task_id.clone(),
            employee_name: record.fields.employee_name.clone(),
            submitter_email: record.fields.submitter_email.clone(),
            department: record.fields.department.clone(),
            team: record.fields.team.clone(),
            description: record.fields.description.clone(),
            cost: record.fields.cost,
            request_status: record.status,
            step_status: step.status,
            title: step.title.clone(),
            timestamp: step.timestamp,
            comments: step.comments.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub approver_email: String,
    pub title_label: String,
    pub pending: Vec<DashboardEntry>,
    pub approved: Vec<DashboardEntry>,
    pub rejected: Vec<DashboardEntry>,
}

pub fn dashboard(snapshot: &Snapshot, email: &str) -> Dashboard {
    let mut view = Dashboard { approver_email: email.trim().to_string(), ..Dashboard::default() };
    let mut titles: Vec<&str> = Vec::new();

    for stored in snapshot.records() {
        for step in stored.record.chain.iter().filter(|step| step.matches_email(email)) {
            let title = step.title.trim();
            if !title.is_empty() && !titles.contains(&title) {
                titles.push(title);
            }

            let entry = DashboardEntry::new(&stored.record, step);
            match step.status {
                StepStatus::Pending => view.pending.push(entry),
                StepStatus::Approved => view.approved.push(entry),
                StepStatus::Rejected => view.rejected.push(entry),
                StepStatus::Waiting => {}
            }
        }
    }

    view.title_label = titles.join(TITLE_SEPARATOR);
    sort_newest_first(&mut view.pending);
    sort_newest_first(&mut view.approved);
    sort_newest_first(&mut view.rejected);
    view.approved.truncate(HISTORY_LIMIT);
    view.rejected.truncate(HISTORY_LIMIT);
    view
}

fn sort_newest_first(entries: &mut [DashboardEntry]) {
    entries.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
}

/// One step together with the record that owns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub record: RequestRecord,
    pub step: ApprovalStep,
    pub step_position: usize,
    pub actionable: bool,
}

pub fn task_view(snapshot: &Snapshot, task_id: &TaskId) -> Option<TaskView> {
    let location = snapshot.find_by_task_id(task_id)?;
    let actionable = location.step.is_active();
    Some(TaskView {
        record: location.record,
        step: location.step,
        step_position: location.step_position,
        actionable,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    pub email: String,
    pub name: String,
    pub pending_count: usize,
}

/// Pending high-level steps counted per approver, ordered by email.
pub fn digest_entries(snapshot: &Snapshot) -> Vec<DigestEntry> {
    let mut counts: BTreeMap<String, DigestEntry> = BTreeMap::new();
    let pending_high_level = snapshot
        .records()
        .iter()
        .flat_map(|stored| stored.record.chain.iter())
        .filter(|step| step.status == StepStatus::Pending && step.role == ApproverRole::HighLevel);

    for step in pending_high_level {
        let key = step.email.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        counts
            .entry(key.clone())
            .or_insert_with(|| DigestEntry {
                email: key,
                name: step.name.clone(),
                pending_count: 0,
            })
            .pending_count += 1;
    }

    counts.into_values().collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub approvers: usize,
    pub pending_items: usize,
    pub deliveries: Vec<DeliveryRecord>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{dashboard, digest_entries, task_view, HISTORY_LIMIT};
    use crate::codec::encode_step;
    use crate::domain::step::{ApprovalStep, ApproverRole, StepStatus, TaskId};
    use crate::store::{Snapshot, Table, BASE_HEADERS};

    fn step(email: &str, title: &str, status: StepStatus, minutes_ago: i64) -> ApprovalStep {
        let mut step = ApprovalStep::waiting(
            email,
            "Approver",
            title,
            ApproverRole::classify(title),
            false,
            Utc::now() - Duration::minutes(minutes_ago),
        );
        step.status = status;
        step
    }

    fn snapshot(rows: Vec<Vec<ApprovalStep>>) -> Snapshot {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut headers: Vec<String> = BASE_HEADERS.iter().map(|h| (*h).to_string()).collect();
        headers.extend((0..width).map(crate::store::step_header));

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, chain)| {
                let mut cells = vec![String::new(); BASE_HEADERS.len()];
                cells[0] = format!("REQ-{index:05}");
                cells[1] = format!("resp-{index}");
                cells[3] = format!("Employee {index}");
                cells[8] = "100".to_string();
                cells.extend(chain.iter().map(|step| encode_step(step).expect("encode")));
                cells
            })
            .collect();
        Snapshot::from_table(Table { headers, rows })
    }

    #[test]
    fn dashboard_buckets_matching_steps_by_status() {
        let snapshot = snapshot(vec![
            vec![
                step("lead.na@example.com", "Team Lead", StepStatus::Approved, 30),
                step("vp.sales@example.com", "VP Sales", StepStatus::Pending, 10),
            ],
            vec![step("LEAD.NA@example.com", "Sales Lead", StepStatus::Pending, 5)],
            vec![step("lead.na@example.com", "Team Lead", StepStatus::Rejected, 60)],
            vec![step("lead.na@example.com", "Team Lead", StepStatus::Waiting, 1)],
        ]);

        let view = dashboard(&snapshot, "Lead.NA@example.com");
        assert_eq!(view.pending.len(), 1);
        assert_eq!(view.pending[0].request_id, "REQ-00001");
        assert_eq!(view.pending[0].cost, Decimal::new(100, 0));
        assert_eq!(view.approved.len(), 1);
        assert_eq!(view.rejected.len(), 1);
        assert_eq!(view.title_label, "Team Lead / Sales Lead");
        assert!(view
            .pending
            .iter()
            .chain(&view.approved)
            .chain(&view.rejected)
            .all(|entry| entry.title != "VP Sales"));
    }

    #[test]
    fn history_buckets_are_truncated_and_newest_first() {
        let rows = (0..25)
            .map(|minutes| vec![step("vp@example.com", "VP", StepStatus::Approved, minutes)])
            .collect();
        let view = dashboard(&snapshot(rows), "vp@example.com");

        assert_eq!(view.approved.len(), HISTORY_LIMIT);
        assert_eq!(view.approved[0].request_id, "REQ-00000");
        assert!(view
            .approved
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp));
    }

    #[test]
    fn digest_counts_pending_high_level_steps_per_email() {
        let snapshot = snapshot(vec![
            vec![step("vp.sales@example.com", "VP Sales", StepStatus::Pending, 1)],
            vec![step("VP.Sales@example.com", "VP Sales", StepStatus::Pending, 2)],
            vec![step("director@example.com", "Director", StepStatus::Approved, 3)],
            vec![step("lead.na@example.com", "Team Lead", StepStatus::Pending, 4)],
            vec![step("cfo.director@example.com", "Finance Director", StepStatus::Pending, 5)],
        ]);

        let entries = digest_entries(&snapshot);
        let summary: Vec<(&str, usize)> =
            entries.iter().map(|entry| (entry.email.as_str(), entry.pending_count)).collect();
        assert_eq!(summary, vec![("cfo.director@example.com", 1), ("vp.sales@example.com", 2)]);
    }

    #[test]
    fn task_view_marks_only_pending_steps_actionable() {
        let first = step("lead.na@example.com", "Team Lead", StepStatus::Approved, 5);
        let second = step("vp.sales@example.com", "VP Sales", StepStatus::Pending, 1);
        let snapshot = snapshot(vec![vec![first.clone(), second.clone()]]);

        let view = task_view(&snapshot, &second.task_id).expect("task exists");
        assert!(view.actionable);
        assert_eq!(view.step_position, 1);
        assert!(!task_view(&snapshot, &first.task_id).expect("task exists").actionable);
        assert!(task_view(&snapshot, &TaskId("nope".to_string())).is_none());
    }
}
