use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::offer::VendorOfferId;
use crate::domain::request::PurchaseRequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Automated,
    Simplified,
    Manual,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Simplified => "simplified",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for AnalysisMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "automated" => Ok(Self::Automated),
            "simplified" => Ok(Self::Simplified),
            "manual" => Ok(Self::Manual),
            other => Err(format!(
                "unsupported analysis method `{other}` (expected automated|simplified|manual)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationLevel {
    StronglyRecommend,
    Recommend,
    Consider,
    NotRecommend,
}

impl RecommendationLevel {
    pub fn from_score(total_score: f64) -> Self {
        if total_score >= 90.0 {
            Self::StronglyRecommend
        } else if total_score >= 75.0 {
            Self::Recommend
        } else if total_score >= 60.0 {
            Self::Consider
        } else {
            Self::NotRecommend
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StronglyRecommend => "strongly_recommend",
            Self::Recommend => "recommend",
            Self::Consider => "consider",
            Self::NotRecommend => "not_recommend",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "strongly_recommend" => Some(Self::StronglyRecommend),
            "recommend" => Some(Self::Recommend),
            "consider" => Some(Self::Consider),
            "not_recommend" => Some(Self::NotRecommend),
            _ => None,
        }
    }
}

/// The five independent sub-scores of one offer, each in `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub price: f64,
    pub quality: f64,
    pub delivery: f64,
    pub reputation: f64,
    pub payment: f64,
}

/// Persisted scoring record, unique per (request, offer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: PurchaseRequestId,
    pub offer_id: VendorOfferId,
    pub scores: ScoreBreakdown,
    pub total_score: f64,
    pub recommendation_level: RecommendationLevel,
    pub analysis_method: AnalysisMethod,
    pub analysis_date: DateTime<Utc>,
}
