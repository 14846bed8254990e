use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

use super::{DEFAULT_MIN_VENDOR_COUNT, DEFAULT_PRICE_VARIANCE_THRESHOLD, DEFAULT_SCORE_THRESHOLD};
use super::{DEFAULT_WEIGHTS, WEIGHT_SUM_TOLERANCE};

/// Weights for the five scoring dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWeights {
    /// Weight for price competitiveness (default: 0.40)
    pub price: f64,
    /// Weight for quality signals (default: 0.25)
    pub quality: f64,
    /// Weight for delivery time (default: 0.20)
    pub delivery: f64,
    /// Weight for vendor reputation (default: 0.10)
    pub reputation: f64,
    /// Weight for payment terms (default: 0.05)
    pub payment: f64,
}

impl Default for AnalysisWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl AnalysisWeights {
    pub fn sum(&self) -> f64 {
        self.price + self.quality + self.delivery + self.reputation + self.payment
    }

    fn validate(&self) -> Result<(), DomainError> {
        let named = [
            ("price", self.price),
            ("quality", self.quality),
            ("delivery", self.delivery),
            ("reputation", self.reputation),
            ("payment", self.payment),
        ];
        for (name, weight) in named {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(DomainError::InvalidAnalysisConfig(format!(
                    "{name}_weight must be within 0.0..=1.0, got {weight}"
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(DomainError::InvalidAnalysisConfig(format!(
                "weights must sum to 1.0 (±{WEIGHT_SUM_TOLERANCE}), got {sum:.4}"
            )));
        }

        Ok(())
    }
}

/// Weights and thresholds used by one analysis run. Loaded once by the caller and passed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub weights: AnalysisWeights,
    pub min_vendor_count: u32,
    pub score_threshold: f64,
    pub price_variance_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            weights: AnalysisWeights::default(),
            min_vendor_count: DEFAULT_MIN_VENDOR_COUNT,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            price_variance_threshold: DEFAULT_PRICE_VARIANCE_THRESHOLD,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.weights.validate()?;

        if self.min_vendor_count == 0 {
            return Err(DomainError::InvalidAnalysisConfig(
                "min_vendor_count must be greater than zero".to_string(),
            ));
        }
        if !self.score_threshold.is_finite() || !(0.0..=100.0).contains(&self.score_threshold) {
            return Err(DomainError::InvalidAnalysisConfig(
                "score_threshold must be within 0..=100".to_string(),
            ));
        }
        if !self.price_variance_threshold.is_finite() || self.price_variance_threshold < 0.0 {
            return Err(DomainError::InvalidAnalysisConfig(
                "price_variance_threshold must be a non-negative fraction".to_string(),
            ));
        }

        Ok(())
    }

    /// Merges a partial update and validates the result. `self` is untouched on failure.
    pub fn apply_patch(&self, patch: &AnalysisConfigPatch) -> Result<Self, DomainError> {
        let mut next = self.clone();
        if let Some(value) = patch.price_weight {
            next.weights.price = value;
        }
        if let Some(value) = patch.quality_weight {
            next.weights.quality = value;
        }
        if let Some(value) = patch.delivery_weight {
            next.weights.delivery = value;
        }
        if let Some(value) = patch.reputation_weight {
            next.weights.reputation = value;
        }
        if let Some(value) = patch.payment_weight {
            next.weights.payment = value;
        }
        if let Some(value) = patch.min_vendor_count {
            next.min_vendor_count = value;
        }
        if let Some(value) = patch.score_threshold {
            next.score_threshold = value;
        }
        if let Some(value) = patch.price_variance_threshold {
            next.price_variance_threshold = value;
        }

        next.validate()?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfigPatch {
    pub price_weight: Option<f64>,
    pub quality_weight: Option<f64>,
    pub delivery_weight: Option<f64>,
    pub reputation_weight: Option<f64>,
    pub payment_weight: Option<f64>,
    pub min_vendor_count: Option<u32>,
    pub score_threshold: Option<f64>,
    pub price_variance_threshold: Option<f64>,
}

impl AnalysisConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
