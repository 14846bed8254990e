use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::scoring::ScoredOffer;
use super::{MAX_ALTERNATIVES, MIN_ALTERNATIVE_SCORE};

const STRONG_DIMENSION_SCORE: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOffer {
    pub rank: u32,
    #[serde(flatten)]
    pub offer: ScoredOffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(total_score: f64) -> Self {
        if total_score < 70.0 {
            Self::High
        } else if total_score < 80.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended_vendor: RankedOffer,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub alternative_vendors: Vec<RankedOffer>,
}

/// Orders offers by descending total score and assigns ranks starting at 1.
///
/// Equal totals are ordered by earlier submission first, then by offer id, so the ranking
/// never depends on the order the offers were loaded in.
pub fn rank_offers(mut scored: Vec<ScoredOffer>) -> Vec<RankedOffer> {
    scored.sort_by(compare_for_ranking);
    scored
        .into_iter()
        .enumerate()
        .map(|(index, offer)| RankedOffer { rank: index as u32 + 1, offer })
        .collect()
}

fn compare_for_ranking(left: &ScoredOffer, right: &ScoredOffer) -> Ordering {
    right
        .total_score
        .total_cmp(&left.total_score)
        .then_with(|| left.submitted_at.cmp(&right.submitted_at))
        .then_with(|| left.offer_id.cmp(&right.offer_id))
}

/// Builds the recommendation from an already ranked list. `None` when nothing was ranked.
pub fn recommend(ranked: &[RankedOffer]) -> Option<Recommendation> {
    let top = ranked.first()?;

    let alternative_vendors = ranked
        .iter()
        .skip(1)
        .take(MAX_ALTERNATIVES)
        .filter(|offer| offer.offer.total_score >= MIN_ALTERNATIVE_SCORE)
        .cloned()
        .collect();

    Some(Recommendation {
        recommended_vendor: top.clone(),
        risk_level: RiskLevel::from_score(top.offer.total_score),
        reason: explain(&top.offer),
        alternative_vendors,
    })
}

fn explain(offer: &ScoredOffer) -> String {
    let scores = &offer.scores;
    let strengths: Vec<&str> = [
        (scores.price, "competitive pricing"),
        (scores.quality, "strong quality signals"),
        (scores.delivery, "fast delivery"),
        (scores.reputation, "established vendor reputation"),
        (scores.payment, "favourable payment terms"),
    ]
    .into_iter()
    .filter(|(score, _)| *score >= STRONG_DIMENSION_SCORE)
    .map(|(_, phrase)| phrase)
    .collect();

    if strengths.is_empty() {
        return "highest overall score among submitted offers".to_string();
    }

    let mut reason = strengths.join(", ");
    if let Some(first) = reason.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    reason
}
