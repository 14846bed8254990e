pub mod analysis;
pub mod config;
pub mod domain;
pub mod errors;
pub mod selection;

pub use analysis::{
    rank_offers, recommend, AnalysisConfig, AnalysisConfigPatch, AnalysisWeights, OfferCandidate,
    RankedOffer, Recommendation, ReportBuilder, ReportInput, RiskLevel, ScoreCalculator,
    ScoredOffer,
};
pub use domain::analysis::{AnalysisMethod, AnalysisResult, RecommendationLevel, ScoreBreakdown};
pub use domain::offer::{
    LineSelection, OfferLineItem, OfferLineItemId, OfferStatus, VendorOffer, VendorOfferId,
};
pub use domain::request::{
    PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem, RequestedLineItemId,
};
pub use domain::vendor::{Vendor, VendorCategory, VendorId, VendorStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use selection::{
    plan_approval, plan_selections, AllocationGroup, AllocationPlan, ApprovalPlan, ApprovedLine,
    ApprovedVendorOffer, OfferSelectionState, SelectionAction, SelectionChange, SelectionDecision,
};
