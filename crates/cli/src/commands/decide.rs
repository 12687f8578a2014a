use signoff_core::domain::step::{Decision, TaskId};
use signoff_core::engine::ActionOutcome;

use crate::commands::{with_engine, CommandResult};

pub fn approve(task_id: &str, comments: Option<String>) -> CommandResult {
    run("approve", Decision::Approve, task_id, comments)
}

pub fn reject(task_id: &str, comments: Option<String>) -> CommandResult {
    run("reject", Decision::Reject, task_id, comments)
}

fn run(
    command: &'static str,
    decision: Decision,
    task_id: &str,
    comments: Option<String>,
) -> CommandResult {
    let task_id = TaskId(task_id.trim().to_string());
    let comments = comments.filter(|comments| !comments.trim().is_empty());

    with_engine(command, |engine| async move {
        let outcome = match decision {
            Decision::Approve => engine.approve(&task_id, comments).await?,
            Decision::Reject => engine.reject(&task_id, comments).await?,
        };

        Ok(match &outcome {
            ActionOutcome::Applied { request_id, request_status, next_task, .. } => {
                let message = match next_task {
                    Some(next) => format!("{request_id}: step recorded, next task {next}"),
                    None => format!("{request_id}: request is now {}", request_status.as_str()),
                };
                CommandResult::success_with(command, message, Some(&outcome))
            }
            ActionOutcome::NotFound { task_id } => CommandResult::failure(
                command,
                "not_found",
                format!("no approval step has task id `{task_id}`"),
                9,
            ),
            ActionOutcome::NotActionable { request_id, status, .. } => CommandResult::failure(
                command,
                "not_actionable",
                format!("{request_id}: step {}; nothing was changed", status.refusal_phrase()),
                10,
            ),
        })
    })
}
