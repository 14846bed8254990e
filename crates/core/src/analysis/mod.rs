//! Vendor offer analysis
//!
//! Scores competing vendor offers for one purchase request, ranks them, and
//! renders a recommendation report. Everything here is pure: callers load the
//! offers and the active [`AnalysisConfig`] and pass them in.

pub mod config;
pub mod ranking;
pub mod report;
pub mod scoring;

pub use config::{AnalysisConfig, AnalysisConfigPatch, AnalysisWeights};
pub use ranking::{rank_offers, recommend, RankedOffer, Recommendation, RiskLevel};
pub use report::{ReportBuilder, ReportError, ReportInput};
pub use scoring::{OfferCandidate, ScoreCalculator, ScoredOffer};

/// Default scoring weights
pub const DEFAULT_WEIGHTS: AnalysisWeights = AnalysisWeights {
    price: 0.40,
    quality: 0.25,
    delivery: 0.20,
    reputation: 0.10,
    payment: 0.05,
};

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

pub const DEFAULT_MIN_VENDOR_COUNT: u32 = 3;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 60.0;
pub const DEFAULT_PRICE_VARIANCE_THRESHOLD: f64 = 0.20;

/// Neutral score used whenever an offer lacks the data for a dimension
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Runner-ups below this total are not offered as alternatives
pub const MIN_ALTERNATIVE_SCORE: f64 = 60.0;

/// Number of runner-ups listed next to the recommended vendor
pub const MAX_ALTERNATIVES: usize = 2;

pub const DEFAULT_REPORT_TOP_N: usize = 5;
