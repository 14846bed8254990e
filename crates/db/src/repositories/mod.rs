use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use ksm_core::analysis::{AnalysisConfig, OfferCandidate, ScoredOffer};
use ksm_core::domain::analysis::{AnalysisMethod, AnalysisResult};
use ksm_core::domain::offer::{OfferLineItem, VendorOffer, VendorOfferId};
use ksm_core::domain::request::{PurchaseRequest, PurchaseRequestId, RequestedLineItem};
use ksm_core::domain::vendor::Vendor;
use ksm_core::errors::DomainError;
use ksm_core::selection::{AllocationPlan, ApprovalPlan, SelectionDecision};

use crate::DbPool;

pub mod analysis;
pub mod memory;
pub mod offer;
pub mod request;
pub mod selection;

pub use analysis::SqlAnalysisRepository;
pub use memory::InMemoryProcurementStore;
pub use offer::SqlOfferRepository;
pub use request::SqlPurchaseRequestRepository;
pub use selection::SqlSelectionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// A persisted analysis row joined with the offer and vendor data needed to rank it again.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredAnalysisRow {
    pub scored: ScoredOffer,
    pub analysis_method: AnalysisMethod,
    pub analysis_date: DateTime<Utc>,
}

#[async_trait]
pub trait PurchaseRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &PurchaseRequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PurchaseRequest>, RepositoryError>;

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError>;

    async fn save_requested_item(&self, item: RequestedLineItem) -> Result<(), RepositoryError>;

    async fn list_requested_items(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<RequestedLineItem>, RepositoryError>;
}

#[async_trait]
pub trait OfferRepository: Send + Sync {
    async fn save_vendor(&self, vendor: Vendor) -> Result<(), RepositoryError>;

    async fn save_offer(&self, offer: VendorOffer) -> Result<(), RepositoryError>;

    async fn save_line_item(&self, item: OfferLineItem) -> Result<(), RepositoryError>;

    async fn save_attachment(
        &self,
        offer_id: &VendorOfferId,
        file_name: &str,
    ) -> Result<(), RepositoryError>;

    async fn find_offer(&self, id: &VendorOfferId) -> Result<Option<VendorOffer>, RepositoryError>;

    async fn list_line_items(
        &self,
        offer_id: &VendorOfferId,
    ) -> Result<Vec<OfferLineItem>, RepositoryError>;

    /// Offers of the request still open for analysis (`submitted` or `under_review`), each with
    /// its vendor, attachment names and the vendor's selection history on other requests.
    async fn list_candidates(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<OfferCandidate>, RepositoryError>;
}

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Upserts one row per (request, offer) and moves the request and the analysed offers into
    /// review, all in one transaction.
    async fn save_results(
        &self,
        request_id: &PurchaseRequestId,
        results: &[AnalysisResult],
    ) -> Result<(), RepositoryError>;

    async fn list_results(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<StoredAnalysisRow>, RepositoryError>;

    /// Returns the active configuration, persisting the defaults on first use.
    async fn load_active_config(&self) -> Result<AnalysisConfig, RepositoryError>;

    async fn save_config(&self, config: &AnalysisConfig) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SelectionRepository: Send + Sync {
    /// Validates and applies a selection batch atomically. Batches touching the same requested
    /// items are serialised, so each one is validated against committed state.
    async fn apply_selections(
        &self,
        decisions: &[SelectionDecision],
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AllocationPlan, RepositoryError>;

    async fn finalize_approval(
        &self,
        reference: &str,
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalPlan, RepositoryError>;
}

/// One handle per repository seam, all backed by the same store.
#[derive(Clone)]
pub struct ProcurementRepositories {
    pub requests: Arc<dyn PurchaseRequestRepository>,
    pub offers: Arc<dyn OfferRepository>,
    pub analysis: Arc<dyn AnalysisRepository>,
    pub selection: Arc<dyn SelectionRepository>,
}

impl ProcurementRepositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            requests: Arc::new(SqlPurchaseRequestRepository::new(pool.clone())),
            offers: Arc::new(SqlOfferRepository::new(pool.clone())),
            analysis: Arc::new(SqlAnalysisRepository::new(pool.clone())),
            selection: Arc::new(SqlSelectionRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryProcurementStore>) -> Self {
        Self {
            requests: store.clone(),
            offers: store.clone(),
            analysis: store.clone(),
            selection: store,
        }
    }
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
        RepositoryError::Decode(format!("invalid {} date '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} decimal '{}': {}", field, value, err))
    })
}

pub(crate) fn to_u32(field: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{field} out of range: {value}")))
}
