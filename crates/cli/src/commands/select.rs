use crate::commands::{classify_service, with_application, CommandError, CommandResult};
use ksm_core::config::LoadOptions;
use ksm_core::selection::SelectionDecision;
use ksm_service::SelectionOutcome;

pub fn run(
    options: LoadOptions,
    actor: &str,
    items: &[(String, u32)],
    unselect: &[String],
    notes: Option<&str>,
) -> CommandResult {
    let decisions = decisions(items, unselect);
    if decisions.is_empty() {
        return CommandResult::failure(
            "select",
            "validation",
            "nothing to do; pass --item ITEM_ID=QTY or --unselect ITEM_ID",
            6,
        );
    }

    let result = with_application("select", options, |app| async move {
        let outcome =
            app.service.select_items(&decisions, actor, notes).await.map_err(classify_service)?;
        Ok::<SelectionOutcome, CommandError>(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success_with_data(
            "select",
            format!("{} line items updated", outcome.updated_count),
            &outcome,
        ),
        Err(failure) => failure,
    }
}

/// Selections first, then unselections, each in the order given on the command line.
fn decisions(items: &[(String, u32)], unselect: &[String]) -> Vec<SelectionDecision> {
    items
        .iter()
        .map(|(item_id, quantity)| SelectionDecision::select(item_id.clone(), *quantity))
        .chain(unselect.iter().map(|item_id| SelectionDecision::unselect(item_id.clone())))
        .collect()
}
