use crate::commands::{classify_service, with_application, CommandError, CommandResult};
use ksm_core::config::LoadOptions;
use ksm_core::domain::analysis::AnalysisMethod;
use ksm_core::domain::request::PurchaseRequestId;
use ksm_service::AnalysisOutcome;

/// Runs an analysis with `method`, falling back to `analysis.default_method`. The rendered
/// report becomes the outcome message; the ranked results travel in `data`.
pub fn run(
    options: LoadOptions,
    request_id: &str,
    method: Option<AnalysisMethod>,
) -> CommandResult {
    let request_id = PurchaseRequestId(request_id.trim().to_string());

    let result = with_application("analyze", options, |app| async move {
        let method = method.unwrap_or(app.config.analysis.default_method);
        let outcome = app.service.analyze(&request_id, method).await.map_err(classify_service)?;
        Ok::<AnalysisOutcome, CommandError>(outcome)
    });

    match result {
        Ok(outcome) => {
            CommandResult::success_with_data("analyze", outcome.report.clone(), &outcome)
        }
        Err(failure) => failure,
    }
}
