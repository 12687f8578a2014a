pub mod codec;
pub mod config;
pub mod counter;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod policy;
pub mod projections;
pub mod render;
pub mod routing;
pub mod store;

pub use counter::{CounterError, InMemorySequenceCounter, RequestIdFormat, SequenceCounter};
pub use domain::chain::ChainState;
pub use domain::request::{BusinessFields, RequestId, RequestRecord, RequestStatus, ResponseId};
pub use domain::step::{ApprovalStep, ApproverRole, Decision, StepStatus, TaskId};
pub use engine::{
    ActionOutcome, Submission, SubmitKind, SubmitOutcome, WorkflowEngine, WorkflowError,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{
    notifier_from_config, DeliveryRecord, InMemoryNotifier, LogNotifier, MessageComposer,
    Notifier, NotifyError, OutboundEmail, WebhookNotifier,
};
pub use policy::{Delivery, NotificationPolicy};
pub use projections::{Dashboard, DashboardEntry, DigestEntry, DigestReport, TaskView};
pub use render::{RenderError, TemplateRenderer};
pub use routing::{RouteResolution, RoutingTable, RoutingTableError};
pub use store::{InMemoryTable, RequestStore, Snapshot, StoreError, Table, TabularStore};
