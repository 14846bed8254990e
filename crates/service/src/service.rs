use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use ksm_core::analysis::{
    rank_offers, recommend, AnalysisConfig, AnalysisConfigPatch, RankedOffer, Recommendation,
    ReportBuilder, ReportInput, ScoreCalculator,
};
use ksm_core::domain::analysis::{AnalysisMethod, AnalysisResult};
use ksm_core::domain::request::{PurchaseRequest, PurchaseRequestId, RequestStatus};
use ksm_core::errors::DomainError;
use ksm_core::selection::{ApprovedVendorOffer, SelectionDecision};
use ksm_db::ProcurementRepositories;

use crate::errors::ServiceError;
use crate::handoff::{OrderCreator, TracingHandoff, VendorNotifier};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub request_id: PurchaseRequestId,
    pub method: AnalysisMethod,
    pub analysis_date: DateTime<Utc>,
    pub ranked_results: Vec<RankedOffer>,
    pub recommendation: Option<Recommendation>,
    pub report: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredAnalysis {
    pub request_id: PurchaseRequestId,
    pub method: AnalysisMethod,
    pub analysis_date: DateTime<Utc>,
    pub ranked_results: Vec<RankedOffer>,
    pub recommendation: Option<Recommendation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SelectionOutcome {
    pub updated_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApprovalSummary {
    pub reference: String,
    pub status: RequestStatus,
    pub approved_items_count: usize,
    pub approved_vendors_count: usize,
    pub approved_offers: Vec<ApprovedVendorOffer>,
}

/// Library-level entry point for analysis, selection and approval.
#[derive(Clone)]
pub struct ProcurementService {
    repos: ProcurementRepositories,
    orders: Arc<dyn OrderCreator>,
    notifier: Arc<dyn VendorNotifier>,
    report: ReportBuilder,
}

impl ProcurementService {
    pub fn new(repos: ProcurementRepositories) -> Self {
        Self {
            repos,
            orders: Arc::new(TracingHandoff),
            notifier: Arc::new(TracingHandoff),
            report: ReportBuilder::default(),
        }
    }

    pub fn with_handoff(
        mut self,
        orders: Arc<dyn OrderCreator>,
        notifier: Arc<dyn VendorNotifier>,
    ) -> Self {
        self.orders = orders;
        self.notifier = notifier;
        self
    }

    pub fn with_report_top_n(mut self, top_n: usize) -> Self {
        self.report = ReportBuilder::new(top_n);
        self
    }

    /// Scores every open offer of the request, persists the rows and renders the report.
    ///
    /// Re-running on unchanged data overwrites the same rows with the same scores.
    pub async fn analyze(
        &self,
        request_id: &PurchaseRequestId,
        method: AnalysisMethod,
    ) -> Result<AnalysisOutcome, ServiceError> {
        const OPERATION: &str = "analyze";

        let request = self.require_request(OPERATION, request_id).await?;
        let config = self
            .repos
            .analysis
            .load_active_config()
            .await
            .map_err(|error| ServiceError::from_repository(OPERATION, error))?;
        let candidates = self
            .repos
            .offers
            .list_candidates(request_id)
            .await
            .map_err(|error| ServiceError::from_repository(OPERATION, error))?;
        if candidates.is_empty() {
            return Err(DomainError::NoOffersToAnalyze { request_id: request_id.0.clone() }.into());
        }

        let analysis_date = Utc::now();
        let scored = ScoreCalculator::from_config(&config).evaluate(method, &candidates);
        let results: Vec<AnalysisResult> = scored
            .iter()
            .map(|offer| AnalysisResult {
                request_id: request_id.clone(),
                offer_id: offer.offer_id.clone(),
                scores: offer.scores,
                total_score: offer.total_score,
                recommendation_level: offer.recommendation_level,
                analysis_method: method,
                analysis_date,
            })
            .collect();
        self.repos
            .analysis
            .save_results(request_id, &results)
            .await
            .map_err(|error| ServiceError::from_repository(OPERATION, error))?;

        let ranked_results = rank_offers(scored);
        let recommendation = recommend(&ranked_results);
        let report = self
            .report
            .build(&ReportInput {
                request: &request,
                method,
                analysis_date,
                ranked: &ranked_results,
                recommendation: recommendation.as_ref(),
                config: &config,
            })
            .map_err(|error| ServiceError::Report(error.to_string()))?;

        info!(
            event_name = "analysis.completed",
            request_id = %request_id.0,
            reference = %request.reference,
            method = method.as_str(),
            offer_count = ranked_results.len(),
            recommended_offer = recommendation
                .as_ref()
                .map(|recommendation| recommendation.recommended_vendor.offer.offer_id.0.as_str())
                .unwrap_or("none"),
            "vendor offer analysis completed"
        );

        Ok(AnalysisOutcome {
            request_id: request_id.clone(),
            method,
            analysis_date,
            ranked_results,
            recommendation,
            report,
        })
    }

    pub async fn get_analysis(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<StoredAnalysis, ServiceError> {
        const OPERATION: &str = "get_analysis";

        self.require_request(OPERATION, request_id).await?;
        let rows = self
            .repos
            .analysis
            .list_results(request_id)
            .await
            .map_err(|error| ServiceError::from_repository(OPERATION, error))?;
        let Some(latest) = rows.iter().max_by_key(|row| row.analysis_date) else {
            return Err(ServiceError::NotFound(format!("analysis for purchase request {}", request_id.0)));
        };
        let method = latest.analysis_method;
        let analysis_date = latest.analysis_date;

        let ranked_results = rank_offers(rows.into_iter().map(|row| row.scored).collect());
        let recommendation = recommend(&ranked_results);

        Ok(StoredAnalysis {
            request_id: request_id.clone(),
            method,
            analysis_date,
            ranked_results,
            recommendation,
        })
    }

    pub async fn get_config(&self) -> Result<AnalysisConfig, ServiceError> {
        self.repos
            .analysis
            .load_active_config()
            .await
            .map_err(|error| ServiceError::from_repository("get_config", error))
    }

    /// Merges `patch` into the active configuration. Invalid results are rejected before any
    /// write.
    pub async fn update_config(
        &self,
        patch: &AnalysisConfigPatch,
    ) -> Result<AnalysisConfig, ServiceError> {
        const OPERATION: &str = "update_config";

        let current = self.get_config().await?;
        let next = current.apply_patch(patch)?;
        self.repos
            .analysis
            .save_config(&next)
            .await
            .map_err(|error| ServiceError::from_repository(OPERATION, error))?;

        info!(
            event_name = "analysis.config_updated",
            price_weight = next.weights.price,
            quality_weight = next.weights.quality,
            delivery_weight = next.weights.delivery,
            reputation_weight = next.weights.reputation,
            payment_weight = next.weights.payment,
            "analysis configuration updated"
        );
        Ok(next)
    }

    pub async fn select_items(
        &self,
        selections: &[SelectionDecision],
        actor: &str,
        notes: Option<&str>,
    ) -> Result<SelectionOutcome, ServiceError> {
        let actor = require_actor(actor)?;
        let plan = self
            .repos
            .selection
            .apply_selections(selections, actor, notes, Utc::now())
            .await
            .map_err(|error| ServiceError::from_repository("select_items", error))?;

        info!(
            event_name = "selection.applied",
            actor = %actor,
            updated_count = plan.updated_count(),
            "vendor item selection applied"
        );
        Ok(SelectionOutcome { updated_count: plan.updated_count() })
    }

    /// Commits the current selection of the request and then hands approved offers over to the
    /// order and notification collaborators.
    pub async fn approve(
        &self,
        reference: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ApprovalSummary, ServiceError> {
        let actor = require_actor(actor)?;
        let plan = self
            .repos
            .selection
            .finalize_approval(reference, actor, notes, Utc::now())
            .await
            .map_err(|error| ServiceError::from_repository("approve", error))?;

        info!(
            event_name = "approval.finalized",
            request_id = %plan.request.id.0,
            reference = %reference,
            actor = %actor,
            approved_items = plan.approved_items_count(),
            approved_vendors = plan.approved_vendors_count(),
            "vendor selection approved"
        );

        for offer in &plan.approved_offers {
            self.hand_off(&plan.request, offer).await;
        }

        Ok(ApprovalSummary {
            reference: plan.request.reference.clone(),
            status: plan.request.status,
            approved_items_count: plan.approved_items_count(),
            approved_vendors_count: plan.approved_vendors_count(),
            approved_offers: plan.approved_offers,
        })
    }

    async fn hand_off(&self, request: &PurchaseRequest, offer: &ApprovedVendorOffer) {
        if let Err(error) = self.orders.create_order(request, offer).await {
            warn!(
                event_name = "approval.handoff_failed",
                collaborator = "order_creator",
                reference = %request.reference,
                offer_id = %offer.offer_id.0,
                error = %error,
                "purchase order hand-off failed"
            );
        }
        if let Err(error) = self.notifier.notify_vendor(request, offer).await {
            warn!(
                event_name = "approval.handoff_failed",
                collaborator = "vendor_notifier",
                reference = %request.reference,
                vendor_id = %offer.vendor_id.0,
                error = %error,
                "vendor notification failed"
            );
        }
    }

    async fn require_request(
        &self,
        operation: &'static str,
        request_id: &PurchaseRequestId,
    ) -> Result<PurchaseRequest, ServiceError> {
        self.repos
            .requests
            .find_by_id(request_id)
            .await
            .map_err(|error| ServiceError::from_repository(operation, error))?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase request {}", request_id.0)))
    }
}

fn require_actor(actor: &str) -> Result<&str, ServiceError> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(DomainError::InvariantViolation("actor is required".to_string()).into());
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use ksm_core::analysis::{AnalysisConfig, AnalysisConfigPatch};
    use ksm_core::domain::analysis::AnalysisMethod;
    use ksm_core::domain::offer::VendorOfferId;
    use ksm_core::domain::request::{PurchaseRequest, PurchaseRequestId, RequestStatus};
    use ksm_core::errors::DomainError;
    use ksm_core::selection::{ApprovedVendorOffer, SelectionDecision};
    use ksm_db::fixtures::{
        DemoScenario, R1_LINE_A_ID, R1_LINE_B_ID, R1_OFFER_A_ID, R1_OFFER_B_ID, R1_REFERENCE,
        R1_REQUEST_ID,
    };
    use ksm_db::{connect_with_settings, migrations, InMemoryProcurementStore, ProcurementRepositories};

    use super::ProcurementService;
    use crate::errors::ServiceError;
    use crate::handoff::{HandoffError, OrderCreator, VendorNotifier};

    async fn r1_service() -> (ProcurementService, ProcurementRepositories) {
        let repos = ProcurementRepositories::in_memory(Arc::new(InMemoryProcurementStore::new()));
        DemoScenario::r1().seed(&repos).await.expect("seed r1");
        (ProcurementService::new(repos.clone()), repos)
    }

    fn r1_id() -> PurchaseRequestId {
        PurchaseRequestId(R1_REQUEST_ID.to_string())
    }

    #[derive(Default)]
    struct FailingHandoff {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OrderCreator for FailingHandoff {
        async fn create_order(
            &self,
            _request: &PurchaseRequest,
            offer: &ApprovedVendorOffer,
        ) -> Result<(), HandoffError> {
            self.calls.lock().expect("lock").push(format!("order:{}", offer.offer_id.0));
            Err(HandoffError("order system unavailable".to_string()))
        }
    }

    #[async_trait]
    impl VendorNotifier for FailingHandoff {
        async fn notify_vendor(
            &self,
            _request: &PurchaseRequest,
            offer: &ApprovedVendorOffer,
        ) -> Result<(), HandoffError> {
            self.calls.lock().expect("lock").push(format!("notify:{}", offer.vendor_id.0));
            Err(HandoffError("mail relay unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn r1_ranks_the_cheaper_slower_offer_first() {
        let (service, repos) = r1_service().await;

        let outcome = service.analyze(&r1_id(), AnalysisMethod::Automated).await.expect("analyze");

        let first = &outcome.ranked_results[0];
        let second = &outcome.ranked_results[1];
        assert_eq!(first.offer.offer_id.0, R1_OFFER_B_ID);
        assert_eq!((first.offer.scores.price, first.offer.scores.delivery), (100.0, 70.0));
        assert_eq!((second.offer.scores.price, second.offer.scores.delivery), (60.0, 90.0));
        assert_eq!(first.offer.total_score, 78.0);
        assert_eq!(second.offer.total_score, 69.75);

        let recommendation = outcome.recommendation.expect("recommendation");
        assert_eq!(recommendation.recommended_vendor.offer.vendor_name, "CV Maju Bersama");
        assert_eq!(recommendation.alternative_vendors.len(), 1);
        assert!(outcome.report.contains("CV Maju Bersama"));

        let request = repos.requests.find_by_id(&r1_id()).await.expect("find").expect("present");
        assert_eq!(request.status, RequestStatus::UnderAnalysis);
    }

    #[tokio::test]
    async fn reanalysis_is_idempotent_in_sqlite() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repos = ProcurementRepositories::sql(pool.clone());
        DemoScenario::r1().seed(&repos).await.expect("seed r1");
        let service = ProcurementService::new(repos);

        let first = service.analyze(&r1_id(), AnalysisMethod::Automated).await.expect("first run");
        let second = service.analyze(&r1_id(), AnalysisMethod::Automated).await.expect("second run");

        let scores = |ranked: &[ksm_core::analysis::RankedOffer]| {
            ranked
                .iter()
                .map(|offer| (offer.offer.offer_id.clone(), offer.offer.scores, offer.offer.total_score))
                .collect::<Vec<_>>()
        };
        assert_eq!(scores(&first.ranked_results), scores(&second.ranked_results));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analysis_result WHERE request_id = ?")
            .bind(R1_REQUEST_ID)
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 2);

        let stored = service.get_analysis(&r1_id()).await.expect("stored analysis");
        assert_eq!(scores(&stored.ranked_results), scores(&second.ranked_results));
        assert_eq!(stored.analysis_date, second.analysis_date);
    }

    #[tokio::test]
    async fn manual_analysis_stores_placeholder_scores() {
        let (service, _repos) = r1_service().await;

        let outcome = service.analyze(&r1_id(), AnalysisMethod::Manual).await.expect("analyze");

        assert!(outcome.ranked_results.iter().all(|offer| offer.offer.total_score == 0.0));
        // equal totals fall back to submission order
        assert_eq!(outcome.ranked_results[0].offer.offer_id.0, R1_OFFER_A_ID);
        assert!(outcome.report.to_lowercase().contains("pending manual scoring"));
    }

    #[tokio::test]
    async fn unknown_request_and_missing_offers_are_reported() {
        let (service, repos) = r1_service().await;

        let missing = service
            .analyze(&PurchaseRequestId("PR-404".to_string()), AnalysisMethod::Automated)
            .await
            .expect_err("unknown request");
        assert!(missing.is_not_found());

        let mut empty = DemoScenario::r1();
        empty.request.id = PurchaseRequestId("PR-EMPTY".to_string());
        empty.request.reference = "REQ-EMPTY".to_string();
        repos.requests.save(empty.request.clone()).await.expect("save empty request");

        let error = service
            .analyze(&empty.request.id, AnalysisMethod::Automated)
            .await
            .expect_err("no offers");
        assert!(matches!(error, ServiceError::Validation(DomainError::NoOffersToAnalyze { .. })));

        let never_analysed = service.get_analysis(&r1_id()).await.expect_err("not analysed yet");
        assert!(never_analysed.is_not_found());
    }

    #[tokio::test]
    async fn weight_sweep_only_accepts_sums_close_to_one() {
        let (service, _repos) = r1_service().await;
        let mut rng = StdRng::seed_from_u64(0x6b736d);

        for _ in 0..200 {
            let weights: [f64; 5] = std::array::from_fn(|_| rng.gen_range(0.0..=0.5));
            let sum: f64 = weights.iter().sum();
            let before = service.get_config().await.expect("config");

            let result = service
                .update_config(&AnalysisConfigPatch {
                    price_weight: Some(weights[0]),
                    quality_weight: Some(weights[1]),
                    delivery_weight: Some(weights[2]),
                    reputation_weight: Some(weights[3]),
                    payment_weight: Some(weights[4]),
                    ..AnalysisConfigPatch::default()
                })
                .await;

            if (sum - 1.0).abs() > 0.01 {
                assert!(
                    matches!(result, Err(ServiceError::Validation(DomainError::InvalidAnalysisConfig(_)))),
                    "sum {sum} must be rejected"
                );
                assert_eq!(service.get_config().await.expect("config"), before);
            } else {
                assert!(result.is_ok(), "sum {sum} must be accepted");
            }
        }

        let accepted = service
            .update_config(&AnalysisConfigPatch {
                price_weight: Some(0.30),
                quality_weight: Some(0.30),
                delivery_weight: Some(0.20),
                reputation_weight: Some(0.15),
                payment_weight: Some(0.05),
                ..AnalysisConfigPatch::default()
            })
            .await
            .expect("valid weights");
        assert_eq!(service.get_config().await.expect("config"), accepted);
        assert_ne!(accepted, AnalysisConfig::default());
    }

    #[tokio::test]
    async fn over_allocating_selection_is_rejected() {
        let (service, repos) = r1_service().await;

        let error = service
            .select_items(
                &[SelectionDecision::select(R1_LINE_A_ID, 6), SelectionDecision::select(R1_LINE_B_ID, 5)],
                "staff.a",
                None,
            )
            .await
            .expect_err("11 of 10 units");
        assert!(matches!(error, ServiceError::Validation(DomainError::AllocationExceeded { .. })));

        let items = repos
            .offers
            .list_line_items(&VendorOfferId(R1_OFFER_A_ID.to_string()))
            .await
            .expect("list");
        assert!(items.iter().all(|item| !item.is_selected()));

        let blank_actor = service
            .select_items(&[SelectionDecision::select(R1_LINE_A_ID, 1)], "  ", None)
            .await
            .expect_err("actor required");
        assert!(matches!(blank_actor, ServiceError::Validation(DomainError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn approve_without_selection_changes_nothing() {
        let (service, repos) = r1_service().await;
        service.analyze(&r1_id(), AnalysisMethod::Automated).await.expect("analyze");

        let error = service.approve(R1_REFERENCE, "manager", None).await.expect_err("nothing selected");
        assert!(matches!(error, ServiceError::Validation(DomainError::NothingSelected { .. })));

        let request = repos.requests.find_by_id(&r1_id()).await.expect("find").expect("present");
        assert_eq!(request.status, RequestStatus::UnderAnalysis);
        assert_eq!(request.approved_at, None);
    }

    #[tokio::test]
    async fn approval_survives_failing_handoff() {
        let (service, _repos) = r1_service().await;
        let handoff = Arc::new(FailingHandoff::default());
        let service = service.with_handoff(handoff.clone(), handoff.clone());

        service.analyze(&r1_id(), AnalysisMethod::Automated).await.expect("analyze");
        let selected = service
            .select_items(
                &[SelectionDecision::select(R1_LINE_A_ID, 4), SelectionDecision::select(R1_LINE_B_ID, 6)],
                "staff.a",
                Some("split delivery"),
            )
            .await
            .expect("select");
        assert_eq!(selected.updated_count, 2);

        let summary = service.approve(R1_REFERENCE, "manager", Some("ok")).await.expect("approve");
        assert_eq!(summary.status, RequestStatus::VendorSelected);
        assert_eq!(summary.approved_items_count, 2);
        assert_eq!(summary.approved_vendors_count, 2);

        let calls = handoff.calls.lock().expect("lock").clone();
        assert_eq!(calls.len(), 4, "one order and one notification per approved offer: {calls:?}");

        let again = service.approve(R1_REFERENCE, "manager", None).await.expect_err("already approved");
        assert!(matches!(again, ServiceError::Validation(DomainError::InvalidRequestTransition { .. })));
    }
}
