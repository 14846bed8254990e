use crate::commands::{classify_service, with_application, CommandError, CommandResult};
use ksm_core::config::LoadOptions;
use ksm_core::domain::request::PurchaseRequestId;
use ksm_service::StoredAnalysis;

pub fn run(options: LoadOptions, request_id: &str) -> CommandResult {
    let request_id = PurchaseRequestId(request_id.trim().to_string());

    let result = with_application("show-analysis", options, |app| async move {
        let stored = app.service.get_analysis(&request_id).await.map_err(classify_service)?;
        Ok::<StoredAnalysis, CommandError>(stored)
    });

    match result {
        Ok(stored) => {
            let leader = stored
                .ranked_results
                .first()
                .map(|ranked| {
                    format!(
                        "; rank 1 is {} ({}) at {:.2}",
                        ranked.offer.offer_id.0, ranked.offer.vendor_name, ranked.offer.total_score
                    )
                })
                .unwrap_or_default();
            let message = format!(
                "{} analysis of {} from {} covering {} offers{leader}",
                stored.method.as_str(),
                stored.request_id.0,
                stored.analysis_date.to_rfc3339(),
                stored.ranked_results.len(),
            );
            CommandResult::success_with_data("show-analysis", message, &stored)
        }
        Err(failure) => failure,
    }
}
