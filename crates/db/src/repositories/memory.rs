use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use ksm_core::analysis::{AnalysisConfig, OfferCandidate, ScoredOffer};
use ksm_core::domain::analysis::AnalysisResult;
use ksm_core::domain::offer::{OfferLineItem, OfferStatus, VendorOffer, VendorOfferId};
use ksm_core::domain::request::{
    PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem,
};
use ksm_core::domain::vendor::Vendor;
use ksm_core::selection::{
    ensure_selection_open, plan_approval, plan_selections, AllocationGroup, AllocationPlan,
    ApprovalPlan, OfferSelectionState, SelectionDecision,
};

use super::{
    AnalysisRepository, OfferRepository, PurchaseRequestRepository, RepositoryError,
    SelectionRepository, StoredAnalysisRow,
};

#[derive(Default)]
struct ProcurementState {
    requests: BTreeMap<String, PurchaseRequest>,
    requested_items: BTreeMap<String, RequestedLineItem>,
    vendors: HashMap<String, Vendor>,
    offers: BTreeMap<String, VendorOffer>,
    line_items: BTreeMap<String, OfferLineItem>,
    attachments: BTreeMap<String, Vec<String>>,
    results: BTreeMap<(String, String), AnalysisResult>,
    config: Option<AnalysisConfig>,
}

impl ProcurementState {
    fn offers_for_request<'a>(
        &'a self,
        request_id: &'a PurchaseRequestId,
    ) -> impl Iterator<Item = &'a VendorOffer> + 'a {
        self.offers.values().filter(move |offer| offer.request_id == *request_id)
    }

    fn line_items_for_offer(&self, offer_id: &VendorOfferId) -> Vec<OfferLineItem> {
        self.line_items.values().filter(|item| item.offer_id == *offer_id).cloned().collect()
    }

    fn prior_selected_offers(&self, offer: &VendorOffer) -> u32 {
        let count = self
            .offers
            .values()
            .filter(|prior| {
                prior.vendor_id == offer.vendor_id
                    && prior.request_id != offer.request_id
                    && matches!(prior.status, OfferStatus::Selected | OfferStatus::PartiallySelected)
            })
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn owner_statuses(
        &self,
        item: &OfferLineItem,
    ) -> Result<(RequestStatus, OfferStatus), RepositoryError> {
        let offer = self
            .offers
            .get(&item.offer_id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("vendor offer {}", item.offer_id.0)))?;
        let request = self.requests.get(&offer.request_id.0).ok_or_else(|| {
            RepositoryError::NotFound(format!("purchase request {}", offer.request_id.0))
        })?;
        Ok((request.status, offer.status))
    }
}

/// Process-local store implementing every repository seam. Each operation takes the state lock
/// once, so a selection batch is validated and applied without interleaving.
#[derive(Default)]
pub struct InMemoryProcurementStore {
    state: RwLock<ProcurementState>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PurchaseRequestRepository for InMemoryProcurementStore {
    async fn find_by_id(
        &self,
        id: &PurchaseRequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.values().find(|request| request.reference == reference).cloned())
    }

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn save_requested_item(&self, item: RequestedLineItem) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.requests.contains_key(&item.request_id.0) {
            return Err(RepositoryError::NotFound(format!("purchase request {}", item.request_id.0)));
        }
        state.requested_items.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn list_requested_items(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<RequestedLineItem>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .requested_items
            .values()
            .filter(|item| item.request_id == *request_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl OfferRepository for InMemoryProcurementStore {
    async fn save_vendor(&self, vendor: Vendor) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.vendors.insert(vendor.id.0.clone(), vendor);
        Ok(())
    }

    async fn save_offer(&self, offer: VendorOffer) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.requests.contains_key(&offer.request_id.0) {
            return Err(RepositoryError::NotFound(format!("purchase request {}", offer.request_id.0)));
        }
        if !state.vendors.contains_key(&offer.vendor_id.0) {
            return Err(RepositoryError::NotFound(format!("vendor {}", offer.vendor_id.0)));
        }
        state.offers.insert(offer.id.0.clone(), offer);
        Ok(())
    }

    async fn save_line_item(&self, item: OfferLineItem) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.offers.contains_key(&item.offer_id.0) {
            return Err(RepositoryError::NotFound(format!("vendor offer {}", item.offer_id.0)));
        }
        if !state.requested_items.contains_key(&item.requested_item_id.0) {
            return Err(RepositoryError::NotFound(format!(
                "requested item {}",
                item.requested_item_id.0
            )));
        }
        state.line_items.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn save_attachment(
        &self,
        offer_id: &VendorOfferId,
        file_name: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.offers.contains_key(&offer_id.0) {
            return Err(RepositoryError::NotFound(format!("vendor offer {}", offer_id.0)));
        }
        state.attachments.entry(offer_id.0.clone()).or_default().push(file_name.to_string());
        Ok(())
    }

    async fn find_offer(&self, id: &VendorOfferId) -> Result<Option<VendorOffer>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.offers.get(&id.0).cloned())
    }

    async fn list_line_items(
        &self,
        offer_id: &VendorOfferId,
    ) -> Result<Vec<OfferLineItem>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.line_items_for_offer(offer_id))
    }

    async fn list_candidates(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<OfferCandidate>, RepositoryError> {
        let state = self.state.read().await;
        let mut open: Vec<&VendorOffer> =
            state.offers_for_request(request_id).filter(|offer| offer.status.is_open()).collect();
        open.sort_by(|left, right| {
            left.submitted_at.cmp(&right.submitted_at).then_with(|| left.id.cmp(&right.id))
        });

        open.into_iter()
            .map(|offer| {
                let vendor = state.vendors.get(&offer.vendor_id.0).cloned().ok_or_else(|| {
                    RepositoryError::NotFound(format!("vendor {}", offer.vendor_id.0))
                })?;
                let mut attachment_names =
                    state.attachments.get(&offer.id.0).cloned().unwrap_or_default();
                attachment_names.sort();

                Ok(OfferCandidate {
                    offer: offer.clone(),
                    vendor,
                    attachment_names,
                    prior_selected_offers: state.prior_selected_offers(offer),
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl AnalysisRepository for InMemoryProcurementStore {
    async fn save_results(
        &self,
        request_id: &PurchaseRequestId,
        results: &[AnalysisResult],
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        // check everything first so a bad row leaves the store untouched
        if !state.requests.contains_key(&request_id.0) {
            return Err(RepositoryError::NotFound(format!("purchase request {}", request_id.0)));
        }
        for result in results {
            if result.request_id != *request_id {
                return Err(RepositoryError::Decode(format!(
                    "analysis row for offer {} belongs to request {}, not {}",
                    result.offer_id.0, result.request_id.0, request_id.0
                )));
            }
            if !state.offers.contains_key(&result.offer_id.0) {
                return Err(RepositoryError::NotFound(format!("vendor offer {}", result.offer_id.0)));
            }
        }

        for result in results {
            state
                .results
                .insert((request_id.0.clone(), result.offer_id.0.clone()), result.clone());
            if let Some(offer) = state.offers.get_mut(&result.offer_id.0) {
                if offer.status == OfferStatus::Submitted {
                    offer.status = OfferStatus::UnderReview;
                }
            }
        }

        if let Some(request) = state.requests.get_mut(&request_id.0) {
            if request.mark_under_analysis() {
                request.updated_at = Utc::now();
            }
        }

        Ok(())
    }

    async fn list_results(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<StoredAnalysisRow>, RepositoryError> {
        let state = self.state.read().await;

        state
            .results
            .values()
            .filter(|result| result.request_id == *request_id)
            .map(|result| {
                let offer = state.offers.get(&result.offer_id.0).ok_or_else(|| {
                    RepositoryError::NotFound(format!("vendor offer {}", result.offer_id.0))
                })?;
                let vendor = state.vendors.get(&offer.vendor_id.0).ok_or_else(|| {
                    RepositoryError::NotFound(format!("vendor {}", offer.vendor_id.0))
                })?;

                Ok(StoredAnalysisRow {
                    scored: ScoredOffer {
                        offer_id: offer.id.clone(),
                        vendor_id: vendor.id.clone(),
                        vendor_name: vendor.name.clone(),
                        submitted_at: offer.submitted_at,
                        total_price: offer.total_price,
                        scores: result.scores,
                        total_score: result.total_score,
                        recommendation_level: result.recommendation_level,
                    },
                    analysis_method: result.analysis_method,
                    analysis_date: result.analysis_date,
                })
            })
            .collect()
    }

    async fn load_active_config(&self) -> Result<AnalysisConfig, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.config.get_or_insert_with(AnalysisConfig::default).clone())
    }

    async fn save_config(&self, config: &AnalysisConfig) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.config = Some(config.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl SelectionRepository for InMemoryProcurementStore {
    async fn apply_selections(
        &self,
        decisions: &[SelectionDecision],
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AllocationPlan, RepositoryError> {
        let mut state = self.state.write().await;

        let mut requested_ids = BTreeSet::new();
        for item in decisions.iter().filter_map(|decision| state.line_items.get(&decision.item_id.0)) {
            let (request_status, offer_status) = state.owner_statuses(item)?;
            ensure_selection_open(&item.id, request_status, offer_status)?;
            requested_ids.insert(item.requested_item_id.0.clone());
        }

        let mut groups = Vec::with_capacity(requested_ids.len());
        for requested_id in requested_ids {
            let requested_item = state
                .requested_items
                .get(&requested_id)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("requested item {requested_id}")))?;
            let line_items = state
                .line_items
                .values()
                .filter(|item| item.requested_item_id.0 == requested_id)
                .cloned()
                .collect();
            groups.push(AllocationGroup { requested_item, line_items });
        }

        let plan = plan_selections(decisions, &groups, actor, notes, now)?;

        for change in &plan.changes {
            if let Some(item) = state.line_items.get_mut(&change.item_id.0) {
                item.selection = change.selection.clone();
            }
        }

        Ok(plan)
    }

    async fn finalize_approval(
        &self,
        reference: &str,
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalPlan, RepositoryError> {
        let mut state = self.state.write().await;

        let request = state
            .requests
            .values()
            .find(|request| request.reference == reference)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("purchase request {reference}")))?;

        let mut offers: Vec<OfferSelectionState> = state
            .offers_for_request(&request.id)
            .map(|offer| OfferSelectionState {
                offer: offer.clone(),
                line_items: state.line_items_for_offer(&offer.id),
            })
            .collect();
        offers.sort_by(|left, right| {
            left.offer
                .submitted_at
                .cmp(&right.offer.submitted_at)
                .then_with(|| left.offer.id.cmp(&right.offer.id))
        });

        let plan = plan_approval(request, offers, actor, notes, now)?;

        state.requests.insert(plan.request.id.0.clone(), plan.request.clone());
        for offer in &plan.updated_offers {
            state.offers.insert(offer.id.0.clone(), offer.clone());
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use ksm_core::domain::offer::{OfferStatus, VendorOfferId};
    use ksm_core::domain::request::{PurchaseRequestId, RequestStatus};
    use ksm_core::errors::DomainError;
    use ksm_core::selection::SelectionDecision;

    use super::InMemoryProcurementStore;
    use crate::fixtures::{
        DemoScenario, R1_LINE_A_ID, R1_LINE_B_ID, R1_OFFER_A_ID, R1_OFFER_B_ID, R1_REFERENCE,
        R1_REQUEST_ID,
    };
    use crate::repositories::{
        AnalysisRepository, OfferRepository, ProcurementRepositories, RepositoryError,
        SelectionRepository,
    };

    async fn seeded() -> (Arc<InMemoryProcurementStore>, ProcurementRepositories) {
        let store = Arc::new(InMemoryProcurementStore::new());
        let repos = ProcurementRepositories::in_memory(store.clone());
        DemoScenario::r1().seed(&repos).await.expect("seed r1");
        (store, repos)
    }

    #[tokio::test]
    async fn candidates_are_open_offers_in_submission_order() {
        let (store, _repos) = seeded().await;

        let candidates = store
            .list_candidates(&PurchaseRequestId(R1_REQUEST_ID.to_string()))
            .await
            .expect("candidates");

        let ids: Vec<_> = candidates.iter().map(|candidate| candidate.offer.id.0.as_str()).collect();
        assert_eq!(ids, vec![R1_OFFER_A_ID, R1_OFFER_B_ID]);
        assert!(candidates.iter().all(|candidate| candidate.prior_selected_offers == 0));
    }

    #[tokio::test]
    async fn batch_over_the_ceiling_leaves_state_untouched() {
        let (store, repos) = seeded().await;
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap();

        let error = store
            .apply_selections(
                &[SelectionDecision::select(R1_LINE_A_ID, 6), SelectionDecision::select(R1_LINE_B_ID, 5)],
                "staff.a",
                None,
                now,
            )
            .await
            .expect_err("over allocation");
        assert!(matches!(error, RepositoryError::Domain(DomainError::AllocationExceeded { .. })));

        for offer in [R1_OFFER_A_ID, R1_OFFER_B_ID] {
            let items = repos
                .offers
                .list_line_items(&VendorOfferId(offer.to_string()))
                .await
                .expect("list");
            assert!(items.iter().all(|item| !item.is_selected()));
        }
    }

    #[tokio::test]
    async fn approval_moves_request_and_selected_offer() {
        let (store, repos) = seeded().await;
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap();

        store
            .apply_selections(
                &[SelectionDecision::select(R1_LINE_A_ID, 4), SelectionDecision::select(R1_LINE_B_ID, 6)],
                "staff.a",
                None,
                now,
            )
            .await
            .expect("select");
        let plan = store.finalize_approval(R1_REFERENCE, "manager", None, now).await.expect("approve");

        assert_eq!(plan.approved_vendors_count(), 2);
        let request = repos.requests.find_by_reference(R1_REFERENCE).await.expect("find").expect("present");
        assert_eq!(request.status, RequestStatus::VendorSelected);
        let offer = repos
            .offers
            .find_offer(&VendorOfferId(R1_OFFER_A_ID.to_string()))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(offer.status, OfferStatus::Selected);
    }

    #[tokio::test]
    async fn config_defaults_are_stored_on_first_read() {
        let store = InMemoryProcurementStore::new();
        let config = store.load_active_config().await.expect("load");
        assert_eq!(config, ksm_core::analysis::AnalysisConfig::default());
    }

    #[tokio::test]
    async fn approved_selection_stays_locked() {
        let (store, repos) = seeded().await;
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap();

        store
            .apply_selections(&[SelectionDecision::select(R1_LINE_B_ID, 10)], "staff.a", None, now)
            .await
            .expect("select");
        store.finalize_approval(R1_REFERENCE, "manager", None, now).await.expect("approve");

        let error = store
            .apply_selections(
                &[SelectionDecision::unselect(R1_LINE_B_ID), SelectionDecision::select(R1_LINE_A_ID, 10)],
                "staff.b",
                None,
                now,
            )
            .await
            .expect_err("approved request is locked");
        assert!(matches!(
            error,
            RepositoryError::Domain(DomainError::SelectionLocked { ref item_id, .. }) if item_id == R1_LINE_B_ID
        ));

        let offer_a = repos
            .offers
            .list_line_items(&VendorOfferId(R1_OFFER_A_ID.to_string()))
            .await
            .expect("list");
        assert!(offer_a.iter().all(|item| !item.is_selected()));
        let offer_b = repos
            .offers
            .list_line_items(&VendorOfferId(R1_OFFER_B_ID.to_string()))
            .await
            .expect("list");
        assert_eq!(offer_b[0].selected_quantity(), 10);
    }
}
