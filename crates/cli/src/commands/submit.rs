use rust_decimal::Decimal;
use signoff_core::domain::request::{BusinessFields, ResponseId};
use signoff_core::engine::{Submission, SubmitKind};

use crate::commands::{with_engine, CommandResult};

#[derive(Debug, Clone)]
pub struct SubmitArgs {
    pub response_id: String,
    pub employee_name: String,
    pub submitter_email: String,
    pub department: String,
    pub team: String,
    pub description: String,
    pub cost: Decimal,
}

impl From<SubmitArgs> for Submission {
    fn from(args: SubmitArgs) -> Self {
        Self {
            response_id: ResponseId(args.response_id.trim().to_string()),
            fields: BusinessFields {
                employee_name: args.employee_name,
                submitter_email: args.submitter_email,
                department: args.department,
                team: args.team,
                description: args.description,
                cost: args.cost,
            },
        }
    }
}

pub fn run(args: SubmitArgs) -> CommandResult {
    with_engine("submit", |engine| async move {
        let outcome = engine.submit(args.into()).await?;
        let message = match outcome.kind {
            SubmitKind::Created if outcome.routed_by_fallback => format!(
                "created {} and routed it to the fallback approvers",
                outcome.request_id
            ),
            SubmitKind::Created => format!(
                "created {} with {} approval steps",
                outcome.request_id, outcome.chain_length
            ),
            SubmitKind::Edited => {
                format!("updated {}; approval chain unchanged", outcome.request_id)
            }
            SubmitKind::EditedWithNewChain => {
                format!("updated {} and built its approval chain", outcome.request_id)
            }
        };
        Ok(CommandResult::success_with("submit", message, Some(outcome)))
    })
}
