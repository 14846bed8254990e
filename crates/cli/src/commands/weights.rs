use crate::commands::{classify_service, with_application, CommandError, CommandResult};
use ksm_core::analysis::{AnalysisConfig, AnalysisConfigPatch};
use ksm_core::config::LoadOptions;

pub fn show(options: LoadOptions) -> CommandResult {
    let result = with_application("weights", options, |app| async move {
        let config = app.service.get_config().await.map_err(classify_service)?;
        Ok::<AnalysisConfig, CommandError>(config)
    });

    match result {
        Ok(config) => CommandResult::success_with_data("weights", describe(&config), &config),
        Err(failure) => failure,
    }
}

/// Applies a partial update; omitted fields keep their stored value.
pub fn update(options: LoadOptions, patch: AnalysisConfigPatch) -> CommandResult {
    if patch.is_empty() {
        return CommandResult::failure(
            "set-weights",
            "validation",
            "no configuration fields supplied; pass at least one of --price, --quality, --delivery, --reputation, --payment, --min-vendor-count, --score-threshold, --price-variance-threshold",
            6,
        );
    }

    let result = with_application("set-weights", options, |app| async move {
        let config = app.service.update_config(&patch).await.map_err(classify_service)?;
        Ok::<AnalysisConfig, CommandError>(config)
    });

    match result {
        Ok(config) => CommandResult::success_with_data("set-weights", describe(&config), &config),
        Err(failure) => failure,
    }
}

fn describe(config: &AnalysisConfig) -> String {
    let weights = &config.weights;
    format!(
        "price {:.2}, quality {:.2}, delivery {:.2}, reputation {:.2}, payment {:.2}; min vendors {}, score threshold {:.2}, price variance threshold {:.2}",
        weights.price,
        weights.quality,
        weights.delivery,
        weights.reputation,
        weights.payment,
        config.min_vendor_count,
        config.score_threshold,
        config.price_variance_threshold,
    )
}
