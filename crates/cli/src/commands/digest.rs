use signoff_core::notify::DeliveryRecord;

use crate::commands::{with_engine, CommandResult};

pub fn run() -> CommandResult {
    with_engine("digest", |engine| async move {
        let report = engine.send_weekly_digest().await?;
        let failed = report
            .deliveries
            .iter()
            .filter(|delivery| matches!(delivery, DeliveryRecord::Failed { .. }))
            .count();
        let message = format!(
            "digest covered {} pending items for {} approvers ({failed} deliveries failed)",
            report.pending_items, report.approvers
        );
        Ok(CommandResult::success_with("digest", message, Some(report)))
    })
}
