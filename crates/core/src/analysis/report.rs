use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::analysis::AnalysisMethod;
use crate::domain::request::PurchaseRequest;

use super::config::AnalysisConfig;
use super::ranking::{RankedOffer, Recommendation};
use super::DEFAULT_REPORT_TOP_N;

const REPORT_TEMPLATE: &str = r#"VENDOR OFFER ANALYSIS - {{ reference }}
{{ title }} ({{ department }})
Method: {{ method }} | Analysed at: {{ analysis_date }}
{% if pending_manual %}
NOTICE: manual analysis; scores are placeholders pending manual scoring.
{% endif %}
Summary
  Offers analysed: {{ offer_count }}
  Offers at or above score threshold {{ score_threshold }}: {{ meeting_threshold }}
{% for warning in warnings %}  WARNING: {{ warning }}
{% endfor %}
Recommendation
{% if recommendation %}  Vendor: {{ recommendation.vendor_name }} (offer {{ recommendation.offer_id }})
  Score: {{ recommendation.score }} | Risk level: {{ recommendation.risk_level }}
  Reason: {{ recommendation.reason }}
{% if alternatives %}  Alternatives:
{% for alternative in alternatives %}    #{{ alternative.rank }} {{ alternative.vendor_name }} ({{ alternative.score }})
{% endfor %}{% else %}  Alternatives: none above the alternative threshold
{% endif %}{% else %}  No recommendation: no offers were ranked.
{% endif %}
Top {{ rows | length }} offers
{% for row in rows %}  #{{ row.rank }} {{ row.vendor_name }} - total {{ row.total }} ({{ row.level }})
     price {{ row.price }} | quality {{ row.quality }} | delivery {{ row.delivery }} | reputation {{ row.reputation }} | payment {{ row.payment }} | quoted {{ row.quoted }}
{% endfor %}"#;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report template failed to render: {0}")]
    Render(#[from] tera::Error),
}

pub struct ReportInput<'a> {
    pub request: &'a PurchaseRequest,
    pub method: AnalysisMethod,
    pub analysis_date: DateTime<Utc>,
    pub ranked: &'a [RankedOffer],
    pub recommendation: Option<&'a Recommendation>,
    pub config: &'a AnalysisConfig,
}

/// Renders the human-readable analysis summary.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    top_n: usize,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_TOP_N)
    }
}

#[derive(Serialize)]
struct RecommendationView {
    vendor_name: String,
    offer_id: String,
    score: String,
    risk_level: &'static str,
    reason: String,
}

#[derive(Serialize)]
struct AlternativeView {
    rank: u32,
    vendor_name: String,
    score: String,
}

#[derive(Serialize)]
struct RowView {
    rank: u32,
    vendor_name: String,
    total: String,
    level: &'static str,
    price: String,
    quality: String,
    delivery: String,
    reputation: String,
    payment: String,
    quoted: String,
}

impl ReportBuilder {
    pub fn new(top_n: usize) -> Self {
        Self { top_n: top_n.max(1) }
    }

    pub fn build(&self, input: &ReportInput<'_>) -> Result<String, ReportError> {
        let mut context = Context::new();
        context.insert("reference", &input.request.reference);
        context.insert("title", &input.request.title);
        context.insert("department", &input.request.department);
        context.insert("method", input.method.as_str());
        context.insert("analysis_date", &input.analysis_date.format("%Y-%m-%d %H:%M UTC").to_string());
        context.insert("pending_manual", &(input.method == AnalysisMethod::Manual));
        context.insert("offer_count", &input.ranked.len());
        context.insert("score_threshold", &format_score(input.config.score_threshold));
        context.insert(
            "meeting_threshold",
            &input
                .ranked
                .iter()
                .filter(|offer| offer.offer.total_score >= input.config.score_threshold)
                .count(),
        );
        context.insert("warnings", &warnings(input));

        let recommendation = input.recommendation.map(|recommendation| RecommendationView {
            vendor_name: recommendation.recommended_vendor.offer.vendor_name.clone(),
            offer_id: recommendation.recommended_vendor.offer.offer_id.0.clone(),
            score: format_score(recommendation.recommended_vendor.offer.total_score),
            risk_level: recommendation.risk_level.as_str(),
            reason: recommendation.reason.clone(),
        });
        context.insert("recommendation", &recommendation);

        let alternatives: Vec<AlternativeView> = input
            .recommendation
            .map(|recommendation| {
                recommendation
                    .alternative_vendors
                    .iter()
                    .map(|alternative| AlternativeView {
                        rank: alternative.rank,
                        vendor_name: alternative.offer.vendor_name.clone(),
                        score: format_score(alternative.offer.total_score),
                    })
                    .collect()
            })
            .unwrap_or_default();
        context.insert("alternatives", &alternatives);

        let rows: Vec<RowView> = input
            .ranked
            .iter()
            .take(self.top_n)
            .map(|ranked| {
                let offer = &ranked.offer;
                RowView {
                    rank: ranked.rank,
                    vendor_name: offer.vendor_name.clone(),
                    total: format_score(offer.total_score),
                    level: offer.recommendation_level.as_str(),
                    price: format_score(offer.scores.price),
                    quality: format_score(offer.scores.quality),
                    delivery: format_score(offer.scores.delivery),
                    reputation: format_score(offer.scores.reputation),
                    payment: format_score(offer.scores.payment),
                    quoted: offer
                        .total_price
                        .map(|price| price.to_string())
                        .unwrap_or_else(|| "n/a".to_string()),
                }
            })
            .collect();
        context.insert("rows", &rows);

        Ok(Tera::one_off(REPORT_TEMPLATE, &context, false)?)
    }
}

fn warnings(input: &ReportInput<'_>) -> Vec<String> {
    let mut warnings = Vec::new();

    let compared = input.ranked.len();
    if (compared as u64) < u64::from(input.config.min_vendor_count) {
        warnings.push(format!(
            "only {compared} offer(s) compared; at least {} recommended",
            input.config.min_vendor_count
        ));
    }

    if let Some(variance) = price_variance(input.ranked) {
        if variance > input.config.price_variance_threshold {
            warnings.push(format!(
                "price spread of {:.0}% exceeds the {:.0}% variance threshold",
                variance * 100.0,
                input.config.price_variance_threshold * 100.0
            ));
        }
    }

    warnings
}

/// `(max - min) / min` over quoted totals; `None` without two positive prices.
fn price_variance(ranked: &[RankedOffer]) -> Option<f64> {
    let prices: Vec<Decimal> = ranked
        .iter()
        .filter_map(|offer| offer.offer.total_price)
        .filter(|price| *price > Decimal::ZERO)
        .collect();
    if prices.len() < 2 {
        return None;
    }

    let min = prices.iter().min()?;
    let max = prices.iter().max()?;
    ((*max - *min) / *min).to_f64()
}

fn format_score(score: f64) -> String {
    format!("{score:.1}")
}
