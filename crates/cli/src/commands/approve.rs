use crate::commands::{classify_service, with_application, CommandError, CommandResult};
use ksm_core::config::LoadOptions;
use ksm_service::ApprovalSummary;

pub fn run(
    options: LoadOptions,
    reference: &str,
    actor: &str,
    notes: Option<&str>,
) -> CommandResult {
    let reference = reference.trim();

    let result = with_application("approve", options, |app| async move {
        let summary =
            app.service.approve(reference, actor, notes).await.map_err(classify_service)?;
        Ok::<ApprovalSummary, CommandError>(summary)
    });

    match result {
        Ok(summary) => {
            let message = format!(
                "{} approved: {} line items across {} vendors",
                summary.reference, summary.approved_items_count, summary.approved_vendors_count
            );
            CommandResult::success_with_data("approve", message, &summary)
        }
        Err(failure) => failure,
    }
}
