use crate::commands::{with_application, CommandError, CommandResult};
use ksm_core::config::LoadOptions;
use ksm_db::{DemoScenario, ProcurementRepositories, SeedResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let result = with_application("seed", options, |app| async move {
        let repos = ProcurementRepositories::sql(app.db_pool.clone());
        let scenario = DemoScenario::r1();

        let seeded = scenario
            .seed(&repos)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 8u8))?;

        let verification = scenario
            .verify(&repos)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 8u8))?;
        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_failure_message(&failed_checks), 6u8));
        }

        Ok::<SeedResult, CommandError>(seeded)
    });

    match result {
        Ok(seeded) => {
            let data = SeedData::from(&seeded);
            CommandResult::success_with_data("seed", seed_message(&seeded), &data)
        }
        Err(failure) => failure,
    }
}

#[derive(serde::Serialize)]
struct SeedData<'a> {
    request_id: &'a str,
    reference: &'a str,
    offers_seeded: usize,
    line_items_seeded: usize,
}

impl<'a> From<&'a SeedResult> for SeedData<'a> {
    fn from(seeded: &'a SeedResult) -> Self {
        Self {
            request_id: &seeded.request_id,
            reference: &seeded.reference,
            offers_seeded: seeded.offers_seeded,
            line_items_seeded: seeded.line_items_seeded,
        }
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    format!(
        "demo scenario loaded: request {} ({}) with {} offers and {} quoted line items",
        seeded.reference, seeded.request_id, seeded.offers_seeded, seeded.line_items_seeded
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
