//! Scoring algorithms for vendor offers

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::analysis::{AnalysisMethod, RecommendationLevel, ScoreBreakdown};
use crate::domain::offer::{VendorOffer, VendorOfferId};
use crate::domain::vendor::{Vendor, VendorCategory, VendorId, VendorStatus};

use super::config::{AnalysisConfig, AnalysisWeights};
use super::NEUTRAL_SCORE;

const CERTIFICATE_KEYWORDS: [&str; 4] = ["sertifikat", "certificate", "iso", "quality"];

/// First matching pattern wins, so the order here is significant.
const PAYMENT_TERM_SCORES: [(&[&str], f64); 7] = [
    (&["cash", "lunas"], 100.0),
    (&["net-7", "7 hari"], 95.0),
    (&["net-15", "15 hari"], 90.0),
    (&["net-30", "30 hari"], 80.0),
    (&["advance", "uang muka"], 70.0),
    (&["net-60", "60 hari"], 60.0),
    (&["net-90", "90 hari"], 40.0),
];

/// Upper bounds (inclusive, in days) of the delivery score steps.
const DELIVERY_STEPS: [(u32, f64); 7] =
    [(3, 100.0), (7, 90.0), (14, 80.0), (21, 70.0), (30, 60.0), (45, 50.0), (60, 40.0)];
const DELIVERY_SLOWEST_SCORE: f64 = 30.0;

const HISTORY_POINTS_PER_SELECTION: f64 = 2.0;
const HISTORY_POINTS_CAP: f64 = 20.0;

/// Everything the engine needs to know about one offer, materialised by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferCandidate {
    pub offer: VendorOffer,
    pub vendor: Vendor,
    pub attachment_names: Vec<String>,
    /// Offers of this vendor on other requests that ended up (partially) selected
    pub prior_selected_offers: u32,
}

/// Scores of one offer, ready for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOffer {
    pub offer_id: VendorOfferId,
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub submitted_at: DateTime<Utc>,
    pub total_price: Option<Decimal>,
    pub scores: ScoreBreakdown,
    pub total_score: f64,
    pub recommendation_level: RecommendationLevel,
}

/// Score calculator for vendor offers
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    weights: AnalysisWeights,
}

impl ScoreCalculator {
    pub fn new(weights: AnalysisWeights) -> Self {
        Self { weights }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.weights)
    }

    /// Scores every candidate against the full set, preserving input order.
    pub fn evaluate(
        &self,
        method: AnalysisMethod,
        candidates: &[OfferCandidate],
    ) -> Vec<ScoredOffer> {
        candidates
            .iter()
            .map(|candidate| {
                let scores = self.score_offer(method, candidate, candidates);
                let total_score = self.total_score(&scores);
                ScoredOffer {
                    offer_id: candidate.offer.id.clone(),
                    vendor_id: candidate.vendor.id.clone(),
                    vendor_name: candidate.vendor.name.clone(),
                    submitted_at: candidate.offer.submitted_at,
                    total_price: candidate.offer.total_price,
                    scores,
                    total_score,
                    recommendation_level: RecommendationLevel::from_score(total_score),
                }
            })
            .collect()
    }

    /// Computes the five sub-scores of `candidate`. `all_offers` are the sibling offers of the
    /// same request, the candidate included.
    pub fn score_offer(
        &self,
        method: AnalysisMethod,
        candidate: &OfferCandidate,
        all_offers: &[OfferCandidate],
    ) -> ScoreBreakdown {
        let scores = match method {
            AnalysisMethod::Automated => ScoreBreakdown {
                price: self.price_score(candidate, all_offers),
                quality: self.quality_score(candidate),
                delivery: self.delivery_score(candidate),
                reputation: self.reputation_score(candidate),
                payment: self.payment_score(candidate),
            },
            AnalysisMethod::Simplified => ScoreBreakdown {
                price: self.price_score(candidate, all_offers),
                quality: clamp_score(NEUTRAL_SCORE + rating_adjustment(candidate)),
                delivery: self.delivery_score(candidate),
                reputation: NEUTRAL_SCORE,
                payment: NEUTRAL_SCORE,
            },
            // placeholder rows for a reviewer to fill in
            AnalysisMethod::Manual => ScoreBreakdown::default(),
        };

        ScoreBreakdown {
            price: round2(scores.price),
            quality: round2(scores.quality),
            delivery: round2(scores.delivery),
            reputation: round2(scores.reputation),
            payment: round2(scores.payment),
        }
    }

    /// Weighted sum of the sub-scores. Weights are trusted as stored; no renormalisation.
    pub fn total_score(&self, scores: &ScoreBreakdown) -> f64 {
        let total = scores.price * self.weights.price
            + scores.quality * self.weights.quality
            + scores.delivery * self.weights.delivery
            + scores.reputation * self.weights.reputation
            + scores.payment * self.weights.payment;

        round2(clamp_score(total))
    }

    /// Relative cheapness within the request: the cheapest offer gets 100, the most expensive 60.
    pub fn price_score(&self, candidate: &OfferCandidate, all_offers: &[OfferCandidate]) -> f64 {
        let Some(price) = candidate.offer.total_price else {
            return NEUTRAL_SCORE;
        };

        let priced: Vec<Decimal> =
            all_offers.iter().filter_map(|offer| offer.offer.total_price).collect();
        if priced.len() < 2 {
            return 70.0;
        }

        let (Some(min), Some(max)) = (priced.iter().min(), priced.iter().max()) else {
            return 70.0;
        };
        if max == min {
            return 80.0;
        }

        let ratio = ((*max - price) / (*max - *min)).to_f64().unwrap_or(0.0);
        clamp_score(60.0 + ratio * 40.0)
    }

    pub fn quality_score(&self, candidate: &OfferCandidate) -> f64 {
        let mut score = NEUTRAL_SCORE + rating_adjustment(candidate);

        if has_certificate_attachment(&candidate.attachment_names) {
            score += 20.0;
        }

        score += match candidate.vendor.category {
            VendorCategory::Preferred => 15.0,
            VendorCategory::Specialized => 10.0,
            VendorCategory::General | VendorCategory::Uncategorized => 0.0,
        };

        clamp_score(score)
    }

    pub fn delivery_score(&self, candidate: &OfferCandidate) -> f64 {
        let Some(days) = candidate.offer.delivery_time_days else {
            return NEUTRAL_SCORE;
        };

        DELIVERY_STEPS
            .iter()
            .find(|(max_days, _)| days <= *max_days)
            .map(|(_, score)| *score)
            .unwrap_or(DELIVERY_SLOWEST_SCORE)
    }

    pub fn reputation_score(&self, candidate: &OfferCandidate) -> f64 {
        let mut score = NEUTRAL_SCORE;

        if candidate.vendor.status == VendorStatus::Approved {
            score += 20.0;
        }

        score += match candidate.vendor.category {
            VendorCategory::Preferred => 25.0,
            VendorCategory::Specialized => 15.0,
            VendorCategory::General => 5.0,
            VendorCategory::Uncategorized => 0.0,
        };

        let history = f64::from(candidate.prior_selected_offers) * HISTORY_POINTS_PER_SELECTION;
        score += history.min(HISTORY_POINTS_CAP);

        clamp_score(score)
    }

    pub fn payment_score(&self, candidate: &OfferCandidate) -> f64 {
        let Some(terms) = candidate.offer.payment_terms.as_deref() else {
            return NEUTRAL_SCORE;
        };
        let terms = terms.to_lowercase();

        PAYMENT_TERM_SCORES
            .iter()
            .find(|(patterns, _)| patterns.iter().any(|pattern| terms.contains(pattern)))
            .map(|(_, score)| *score)
            .unwrap_or(NEUTRAL_SCORE)
    }
}

/// `(rating - 3) * 15` for a 1..=5 rating; ratings outside that range are ignored.
fn rating_adjustment(candidate: &OfferCandidate) -> f64 {
    match candidate.offer.quality_rating {
        Some(rating @ 1..=5) => (f64::from(rating) - 3.0) * 15.0,
        _ => 0.0,
    }
}

fn has_certificate_attachment(names: &[String]) -> bool {
    names.iter().any(|name| {
        let name = name.to_lowercase();
        CERTIFICATE_KEYWORDS.iter().any(|keyword| name.contains(keyword))
    })
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
