//! Request records over a tabular backend.
//!
//! The backend is a header-first table offering whole-table reads, single-cell writes,
//! column appends and row appends. Columns are located by header name, so step columns
//! (`Step 1`, `Step 2`, ...) can be appended for longer chains without touching existing
//! rows. Every read decodes every cell through [`crate::codec`] and indexes the result
//! by task id and response id. Writes are independent and immediately visible; there is
//! no transaction and no local cache.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::codec::{decode_cell, encode_step, CellValue};
use crate::domain::request::{
    BusinessFields, RequestId, RequestRecord, RequestStatus, ResponseId,
};
use crate::domain::step::{ApprovalStep, TaskId};

pub mod memory;

pub use memory::InMemoryTable;

pub const REQUEST_ID: &str = "Request ID";
pub const RESPONSE_ID: &str = "Response ID";
pub const SUBMITTED_AT: &str = "Submitted At";
pub const EMPLOYEE_NAME: &str = "Employee Name";
pub const SUBMITTER_EMAIL: &str = "Submitter Email";
pub const DEPARTMENT: &str = "Department";
pub const TEAM: &str = "Team";
pub const DESCRIPTION: &str = "Description";
pub const COST: &str = "Cost";
pub const STATUS: &str = "Status";

pub const BASE_HEADERS: [&str; 10] = [
    REQUEST_ID,
    RESPONSE_ID,
    SUBMITTED_AT,
    EMPLOYEE_NAME,
    SUBMITTER_EMAIL,
    DEPARTMENT,
    TEAM,
    DESCRIPTION,
    COST,
    STATUS,
];

pub fn step_header(position: usize) -> String {
    format!("Step {}", position + 1)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("cell ({row}, {column}) is outside the table")]
    OutOfRange { row: usize, column: usize },
    #[error("column `{0}` is missing from the table")]
    MissingColumn(String),
    #[error("could not encode step: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raw table contents. `rows` are data rows only; the backend keeps headers separately.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn read_all(&self) -> Result<Table, StoreError>;
    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<(), StoreError>;
    async fn append_columns(&self, headers: &[String]) -> Result<(), StoreError>;
    /// Appends a data row and returns its index.
    async fn append_row(&self, values: &[String]) -> Result<usize, StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct ColumnLayout {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnLayout {
    pub fn from_headers(headers: Vec<String>) -> Self {
        let mut layout = Self::default();
        layout.extend(headers);
        layout
    }

    pub fn position(&self, header: &str) -> Option<usize> {
        self.positions.get(header).copied()
    }

    pub fn require(&self, header: &str) -> Result<usize, StoreError> {
        self.position(header).ok_or_else(|| StoreError::MissingColumn(header.to_string()))
    }

    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|header| !self.positions.contains_key(*header)).cloned().collect()
    }

    pub fn extend(&mut self, headers: impl IntoIterator<Item = String>) {
        for header in headers {
            let position = self.headers.len();
            self.positions.entry(header.clone()).or_insert(position);
            self.headers.push(header);
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn required_headers(step_count: usize) -> Vec<String> {
        BASE_HEADERS
            .iter()
            .map(|header| (*header).to_string())
            .chain((0..step_count).map(step_header))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub row: usize,
    pub record: RequestRecord,
    /// Column of each chain step, in chain order.
    pub step_columns: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskLocation {
    pub record: RequestRecord,
    pub step: ApprovalStep,
    pub step_position: usize,
    pub row: usize,
    pub column: usize,
    pub step_columns: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordIndex {
    by_task: HashMap<TaskId, (usize, usize)>,
    by_response: HashMap<ResponseId, usize>,
}

impl RecordIndex {
    fn build(records: &[StoredRecord]) -> Self {
        let mut index = Self::default();
        for (position, stored) in records.iter().enumerate() {
            let response_id = stored.record.response_id.clone();
            if let Some(first) = index.by_response.get(&response_id) {
                warn!(
                    event_name = "store.index.duplicate_response_id",
                    response_id = %response_id,
                    first_row = records[*first].row,
                    duplicate_row = stored.row,
                    "response id appears on more than one row; first row wins"
                );
            } else {
                index.by_response.insert(response_id, position);
            }

            for (step_position, step) in stored.record.chain.iter().enumerate() {
                index.by_task.entry(step.task_id.clone()).or_insert((position, step_position));
            }
        }
        index
    }
}

/// One fresh read of the whole table, decoded and indexed.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    layout: ColumnLayout,
    records: Vec<StoredRecord>,
    index: RecordIndex,
}

impl Snapshot {
    pub fn from_table(table: Table) -> Self {
        let layout = ColumnLayout::from_headers(table.headers);
        let records: Vec<StoredRecord> = table
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row, cells)| decode_row(&layout, row, cells))
            .collect();
        let index = RecordIndex::build(&records);
        Self { layout, records, index }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    pub fn find_by_task_id(&self, task_id: &TaskId) -> Option<TaskLocation> {
        let (position, step_position) = *self.index.by_task.get(task_id)?;
        let stored = &self.records[position];
        Some(TaskLocation {
            record: stored.record.clone(),
            step: stored.record.chain[step_position].clone(),
            step_position,
            row: stored.row,
            column: stored.step_columns[step_position],
            step_columns: stored.step_columns.clone(),
        })
    }

    pub fn find_by_response_id(&self, response_id: &ResponseId) -> Option<&StoredRecord> {
        self.index.by_response.get(response_id).map(|position| &self.records[*position])
    }

    pub fn find_row_by_response_id(&self, response_id: &ResponseId) -> Option<usize> {
        self.find_by_response_id(response_id).map(|stored| stored.row)
    }

    pub fn request_ids(&self) -> impl Iterator<Item = &RequestId> {
        self.records.iter().map(|stored| &stored.record.request_id)
    }
}

fn decode_row(layout: &ColumnLayout, row: usize, cells: &[String]) -> Option<StoredRecord> {
    let decoded: Vec<CellValue> = cells.iter().map(|cell| decode_cell(cell)).collect();
    let scalar = |header: &str| -> String {
        layout
            .position(header)
            .and_then(|column| decoded.get(column))
            .and_then(CellValue::as_scalar)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let request_id = scalar(REQUEST_ID);
    let response_id = scalar(RESPONSE_ID);
    if request_id.is_empty() && response_id.is_empty() {
        return None;
    }

    let (step_columns, chain): (Vec<usize>, Vec<ApprovalStep>) = decoded
        .iter()
        .enumerate()
        .filter_map(|(column, cell)| cell.as_step().map(|step| (column, step.clone())))
        .unzip();

    let record = RequestRecord {
        request_id: RequestId(request_id),
        response_id: ResponseId(response_id),
        submitted_at: parse_timestamp(&scalar(SUBMITTED_AT)),
        fields: BusinessFields {
            employee_name: scalar(EMPLOYEE_NAME),
            submitter_email: scalar(SUBMITTER_EMAIL),
            department: scalar(DEPARTMENT),
            team: scalar(TEAM),
            description: scalar(DESCRIPTION),
            cost: parse_cost(row, &scalar(COST)),
        },
        status: RequestStatus::parse_lenient(&scalar(STATUS)),
        chain,
    };

    Some(StoredRecord { row, record, step_columns })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_default()
}

/// Accepts the formats people type into a cost field (`$1,250.00`, ` 99 `).
pub fn parse_cost(row: usize, raw: &str) -> Decimal {
    let cleaned: String =
        raw.chars().filter(|ch| !matches!(ch, '$' | ',' | ' ' | '\u{a0}')).collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned).unwrap_or_else(|_| {
        warn!(
            event_name = "store.decode.invalid_cost",
            row,
            value = raw,
            "cost cell is not a number; reading as zero"
        );
        Decimal::ZERO
    })
}

fn business_cells(fields: &BusinessFields) -> [(&'static str, String); 6] {
    [
        (EMPLOYEE_NAME, fields.employee_name.clone()),
        (SUBMITTER_EMAIL, fields.submitter_email.clone()),
        (DEPARTMENT, fields.department.clone()),
        (TEAM, fields.team.clone()),
        (DESCRIPTION, fields.description.clone()),
        (COST, fields.cost.to_string()),
    ]
}

#[derive(Clone)]
pub struct RequestStore {
    backend: Arc<dyn TabularStore>,
}

impl RequestStore {
    pub fn new(backend: Arc<dyn TabularStore>) -> Self {
        Self { backend }
    }

    pub async fn load_all(&self) -> Result<Snapshot, StoreError> {
        let table = self.backend.read_all().await?;
        Ok(Snapshot::from_table(table))
    }

    pub async fn find_by_task_id(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TaskLocation>, StoreError> {
        Ok(self.load_all().await?.find_by_task_id(task_id))
    }

    pub async fn find_row_by_response_id(
        &self,
        response_id: &ResponseId,
    ) -> Result<Option<usize>, StoreError> {
        Ok(self.load_all().await?.find_row_by_response_id(response_id))
    }

    pub async fn write_cell(
        &self,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<(), StoreError> {
        self.backend.write_cell(row, column, value).await
    }

    pub async fn append_columns(&self, headers: &[String]) -> Result<(), StoreError> {
        self.backend.append_columns(headers).await
    }

    /// Appends whatever base or step headers the layout lacks for a chain of
    /// `step_count` steps and returns the extended layout.
    pub async fn ensure_layout(
        &self,
        layout: &ColumnLayout,
        step_count: usize,
    ) -> Result<ColumnLayout, StoreError> {
        let missing = layout.missing(&ColumnLayout::required_headers(step_count));
        let mut layout = layout.clone();
        if !missing.is_empty() {
            self.append_columns(&missing).await?;
            layout.extend(missing);
        }
        Ok(layout)
    }

    /// Writes a new row holding the record's header fields and one cell per step.
    /// Returns the row index and the column of each step.
    pub async fn insert_record(
        &self,
        layout: &ColumnLayout,
        record: &RequestRecord,
    ) -> Result<(usize, Vec<usize>), StoreError> {
        let layout = self.ensure_layout(layout, record.chain.len()).await?;
        let mut values = vec![String::new(); layout.len()];

        values[layout.require(REQUEST_ID)?] = record.request_id.0.clone();
        values[layout.require(RESPONSE_ID)?] = record.response_id.0.clone();
        values[layout.require(SUBMITTED_AT)?] = record.submitted_at.to_rfc3339();
        values[layout.require(STATUS)?] = record.status.as_str().to_string();
        for (header, value) in business_cells(&record.fields) {
            values[layout.require(header)?] = value;
        }

        let mut step_columns = Vec::with_capacity(record.chain.len());
        for (position, step) in record.chain.iter().enumerate() {
            let column = layout.require(&step_header(position))?;
            values[column] = encode_step(step)?;
            step_columns.push(column);
        }

        let row = self.backend.append_row(&values).await?;
        Ok((row, step_columns))
    }

    pub async fn write_business_fields(
        &self,
        layout: &ColumnLayout,
        row: usize,
        fields: &BusinessFields,
    ) -> Result<(), StoreError> {
        for (header, value) in business_cells(fields) {
            self.write_cell(row, layout.require(header)?, &value).await?;
        }
        Ok(())
    }

    /// Writes a chain into an existing row that has none yet.
    pub async fn write_chain(
        &self,
        layout: &ColumnLayout,
        row: usize,
        chain: &[ApprovalStep],
    ) -> Result<Vec<usize>, StoreError> {
        let layout = self.ensure_layout(layout, chain.len()).await?;
        let mut step_columns = Vec::with_capacity(chain.len());
        for (position, step) in chain.iter().enumerate() {
            let column = layout.require(&step_header(position))?;
            self.write_step(row, column, step).await?;
            step_columns.push(column);
        }
        Ok(step_columns)
    }

    pub async fn write_step(
        &self,
        row: usize,
        column: usize,
        step: &ApprovalStep,
    ) -> Result<(), StoreError> {
        let encoded = encode_step(step)?;
        self.write_cell(row, column, &encoded).await
    }

    pub async fn write_status(
        &self,
        layout: &ColumnLayout,
        row: usize,
        status: RequestStatus,
    ) -> Result<(), StoreError> {
        self.write_cell(row, layout.require(STATUS)?, status.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        parse_cost, step_header, InMemoryTable, RequestStore, Snapshot, StoreError, Table,
        BASE_HEADERS, COST, STATUS,
    };
    use crate::codec::encode_step;
    use crate::domain::request::{
        BusinessFields, RequestId, RequestRecord, RequestStatus, ResponseId,
    };
    use crate::domain::step::{ApprovalStep, ApproverRole, StepStatus, TaskId};

    fn record(response_id: &str, steps: usize) -> RequestRecord {
        let now = Utc::now();
        let chain = (0..steps)
            .map(|position| {
                let mut step = ApprovalStep::waiting(
                    format!("approver{position}@example.com"),
                    format!("Approver {position}"),
                    "Manager",
                    ApproverRole::Manager,
                    position + 1 < steps,
                    now,
                );
                if position == 0 {
                    step.status = StepStatus::Pending;
                }
                step
            })
            .collect();

        RequestRecord {
            request_id: RequestId(format!("REQ-{response_id}")),
            response_id: ResponseId(response_id.to_string()),
            submitted_at: now,
            fields: BusinessFields {
                employee_name: "Ada Employee".to_string(),
                submitter_email: "ada@example.com".to_string(),
                department: "Sales".to_string(),
                team: "North America".to_string(),
                description: "Conference travel".to_string(),
                cost: Decimal::new(125_000, 2),
            },
            status: RequestStatus::Pending,
            chain,
        }
    }

    #[tokio::test]
    async fn insert_then_load_restores_record_and_indexes() {
        let backend = Arc::new(InMemoryTable::default());
        let store = RequestStore::new(backend.clone());

        let snapshot = store.load_all().await.expect("load empty");
        let record = record("resp-1", 2);
        let (row, step_columns) =
            store.insert_record(snapshot.layout(), &record).await.expect("insert");
        assert_eq!(row, 0);
        assert_eq!(step_columns, vec![BASE_HEADERS.len(), BASE_HEADERS.len() + 1]);

        let table = backend.table();
        assert_eq!(table.headers.last().map(String::as_str), Some("Step 2"));

        let snapshot = store.load_all().await.expect("reload");
        assert_eq!(snapshot.records().len(), 1);
        assert_eq!(snapshot.records()[0].record, record);

        let second = &record.chain[1];
        let location = snapshot.find_by_task_id(&second.task_id).expect("task indexed");
        assert_eq!(location.step_position, 1);
        assert_eq!(location.column, BASE_HEADERS.len() + 1);
        assert_eq!(location.row, 0);
        assert_eq!(snapshot.find_row_by_response_id(&ResponseId("resp-1".to_string())), Some(0));
        assert!(snapshot.find_by_task_id(&TaskId("missing".to_string())).is_none());
    }

    #[tokio::test]
    async fn longer_chain_appends_step_columns_without_touching_existing_rows() {
        let backend = Arc::new(InMemoryTable::default());
        let store = RequestStore::new(backend.clone());

        let snapshot = store.load_all().await.expect("load");
        store.insert_record(snapshot.layout(), &record("short", 1)).await.expect("insert short");
        let snapshot = store.load_all().await.expect("reload");
        store.insert_record(snapshot.layout(), &record("long", 3)).await.expect("insert long");

        let table = backend.table();
        assert_eq!(table.headers.len(), BASE_HEADERS.len() + 3);
        assert_eq!(table.headers[BASE_HEADERS.len() + 2], step_header(2));

        let snapshot = store.load_all().await.expect("reload");
        assert_eq!(snapshot.records()[0].record.chain.len(), 1);
        assert_eq!(snapshot.records()[1].record.chain.len(), 3);
    }

    #[tokio::test]
    async fn status_and_step_writes_are_visible_on_next_load() {
        let backend = Arc::new(InMemoryTable::default());
        let store = RequestStore::new(backend);

        let snapshot = store.load_all().await.expect("load");
        let mut record = record("resp-9", 1);
        let (row, step_columns) =
            store.insert_record(snapshot.layout(), &record).await.expect("insert");

        let snapshot = store.load_all().await.expect("reload");
        record.chain[0].status = StepStatus::Approved;
        store.write_step(row, step_columns[0], &record.chain[0]).await.expect("write step");
        store
            .write_status(snapshot.layout(), row, RequestStatus::Approved)
            .await
            .expect("write status");

        let snapshot = store.load_all().await.expect("reload");
        let stored = &snapshot.records()[0].record;
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.chain[0].status, StepStatus::Approved);
    }

    #[test]
    fn headers_are_resolved_by_name_not_position() {
        let step = record("x", 1).chain.remove(0);
        let table = Table {
            headers: vec![
                STATUS.to_string(),
                "Response ID".to_string(),
                "Request ID".to_string(),
                "Notes".to_string(),
                "Step 1".to_string(),
                COST.to_string(),
            ],
            rows: vec![vec![
                "Rejected".to_string(),
                "resp-7".to_string(),
                "REQ-00007".to_string(),
                "free text".to_string(),
                encode_step(&step).expect("encode"),
                "$1,250.50".to_string(),
            ]],
        };

        let snapshot = Snapshot::from_table(table);
        let stored = &snapshot.records()[0];
        assert_eq!(stored.record.request_id.0, "REQ-00007");
        assert_eq!(stored.record.status, RequestStatus::Rejected);
        assert_eq!(stored.record.fields.cost, Decimal::new(125_050, 2));
        assert_eq!(stored.step_columns, vec![4]);
        assert_eq!(stored.record.chain, vec![step]);
    }

    #[test]
    fn blank_rows_are_skipped_and_duplicate_response_ids_keep_first_row() {
        let headers: Vec<String> = BASE_HEADERS.iter().map(|h| (*h).to_string()).collect();
        let row = |request: &str, response: &str| {
            let mut cells = vec![String::new(); headers.len()];
            cells[0] = request.to_string();
            cells[1] = response.to_string();
            cells
        };
        let snapshot = Snapshot::from_table(Table {
            headers: headers.clone(),
            rows: vec![row("REQ-1", "dup"), vec![String::new(); 3], row("REQ-2", "dup")],
        });

        assert_eq!(snapshot.records().len(), 2);
        assert_eq!(snapshot.find_row_by_response_id(&ResponseId("dup".to_string())), Some(0));
    }

    #[test]
    fn cost_parsing_is_lenient() {
        assert_eq!(parse_cost(0, "$1,000.25"), Decimal::new(100_025, 2));
        assert_eq!(parse_cost(0, ""), Decimal::ZERO);
        assert_eq!(parse_cost(0, "about ten"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_operation() {
        let backend = Arc::new(InMemoryTable::default());
        backend.set_unavailable(true);
        let store = RequestStore::new(backend);

        assert!(matches!(store.load_all().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.write_cell(0, 0, "x").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.append_columns(&["Extra".to_string()]).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
