use crate::commands::{with_engine, CommandResult};

pub fn run(email: &str) -> CommandResult {
    let email = email.trim().to_string();
    if email.is_empty() {
        return CommandResult::failure("dashboard", "invalid_input", "--email must not be blank", 8);
    }

    with_engine("dashboard", |engine| async move {
        let dashboard = engine.dashboard(&email).await?;
        let message = format!(
            "{}: {} pending, {} approved, {} rejected",
            dashboard.approver_email,
            dashboard.pending.len(),
            dashboard.approved.len(),
            dashboard.rejected.len()
        );
        Ok(CommandResult::success_with("dashboard", message, Some(dashboard)))
    })
}
