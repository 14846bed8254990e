use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use ksm_core::analysis::{AnalysisConfig, AnalysisWeights, ScoredOffer};
use ksm_core::domain::analysis::{
    AnalysisMethod, AnalysisResult, RecommendationLevel, ScoreBreakdown,
};
use ksm_core::domain::offer::{OfferStatus, VendorOfferId};
use ksm_core::domain::request::{PurchaseRequestId, RequestStatus};
use ksm_core::domain::vendor::VendorId;

use super::{
    parse_decimal, parse_rfc3339, to_u32, AnalysisRepository, RepositoryError, StoredAnalysisRow,
};
use crate::DbPool;

const ACTIVE_CONFIG_ID: i64 = 1;

pub struct SqlAnalysisRepository {
    pool: DbPool,
}

impl SqlAnalysisRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisRepository for SqlAnalysisRepository {
    async fn save_results(
        &self,
        request_id: &PurchaseRequestId,
        results: &[AnalysisResult],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for result in results {
            if result.request_id != *request_id {
                return Err(RepositoryError::Decode(format!(
                    "analysis row for offer {} belongs to request {}, not {}",
                    result.offer_id.0, result.request_id.0, request_id.0
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO analysis_result (
                    request_id, offer_id, price_score, quality_score, delivery_score,
                    reputation_score, payment_score, total_score, recommendation_level,
                    analysis_method, analysis_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(request_id, offer_id) DO UPDATE SET
                    price_score = excluded.price_score,
                    quality_score = excluded.quality_score,
                    delivery_score = excluded.delivery_score,
                    reputation_score = excluded.reputation_score,
                    payment_score = excluded.payment_score,
                    total_score = excluded.total_score,
                    recommendation_level = excluded.recommendation_level,
                    analysis_method = excluded.analysis_method,
                    analysis_date = excluded.analysis_date
                "#,
            )
            .bind(&result.request_id.0)
            .bind(&result.offer_id.0)
            .bind(result.scores.price)
            .bind(result.scores.quality)
            .bind(result.scores.delivery)
            .bind(result.scores.reputation)
            .bind(result.scores.payment)
            .bind(result.total_score)
            .bind(result.recommendation_level.as_str())
            .bind(result.analysis_method.as_str())
            .bind(result.analysis_date.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE vendor_offer SET status = ? WHERE id = ? AND status = ?")
                .bind(OfferStatus::UnderReview.as_str())
                .bind(&result.offer_id.0)
                .bind(OfferStatus::Submitted.as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE purchase_request
             SET status = ?, updated_at = ?
             WHERE id = ? AND status IN (?, ?)",
        )
        .bind(RequestStatus::UnderAnalysis.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&request_id.0)
        .bind(RequestStatus::Draft.as_str())
        .bind(RequestStatus::Submitted.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_results(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<StoredAnalysisRow>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.offer_id, r.price_score, r.quality_score, r.delivery_score,
                r.reputation_score, r.payment_score, r.total_score, r.recommendation_level,
                r.analysis_method, r.analysis_date,
                o.vendor_id, o.submitted_at, o.total_price,
                v.name AS vendor_name
            FROM analysis_result r
            JOIN vendor_offer o ON o.id = r.offer_id
            JOIN vendor v ON v.id = o.vendor_id
            WHERE r.request_id = ?
            ORDER BY r.offer_id
            "#,
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_row_from_row).collect()
    }

    async fn load_active_config(&self) -> Result<AnalysisConfig, RepositoryError> {
        let row = sqlx::query(
            "SELECT price_weight, quality_weight, delivery_weight, reputation_weight,
                    payment_weight, min_vendor_count, score_threshold, price_variance_threshold
             FROM analysis_config
             WHERE id = ?",
        )
        .bind(ACTIVE_CONFIG_ID)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return config_from_row(&row);
        }

        let defaults = AnalysisConfig::default();
        upsert_config(&self.pool, &defaults, false).await?;
        Ok(defaults)
    }

    async fn save_config(&self, config: &AnalysisConfig) -> Result<(), RepositoryError> {
        upsert_config(&self.pool, config, true).await
    }
}

/// Writes the single active configuration row. With `overwrite = false` an existing row wins,
/// so two first reads racing each other both end up with the same stored defaults.
async fn upsert_config(
    pool: &DbPool,
    config: &AnalysisConfig,
    overwrite: bool,
) -> Result<(), RepositoryError> {
    let conflict = if overwrite {
        "DO UPDATE SET
            price_weight = excluded.price_weight,
            quality_weight = excluded.quality_weight,
            delivery_weight = excluded.delivery_weight,
            reputation_weight = excluded.reputation_weight,
            payment_weight = excluded.payment_weight,
            min_vendor_count = excluded.min_vendor_count,
            score_threshold = excluded.score_threshold,
            price_variance_threshold = excluded.price_variance_threshold,
            updated_at = excluded.updated_at"
    } else {
        "DO NOTHING"
    };
    let sql = format!(
        "INSERT INTO analysis_config (
            id, price_weight, quality_weight, delivery_weight, reputation_weight, payment_weight,
            min_vendor_count, score_threshold, price_variance_threshold, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) {conflict}"
    );

    sqlx::query(&sql)
        .bind(ACTIVE_CONFIG_ID)
        .bind(config.weights.price)
        .bind(config.weights.quality)
        .bind(config.weights.delivery)
        .bind(config.weights.reputation)
        .bind(config.weights.payment)
        .bind(i64::from(config.min_vendor_count))
        .bind(config.score_threshold)
        .bind(config.price_variance_threshold)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(())
}

fn config_from_row(row: &SqliteRow) -> Result<AnalysisConfig, RepositoryError> {
    Ok(AnalysisConfig {
        weights: AnalysisWeights {
            price: row.try_get("price_weight")?,
            quality: row.try_get("quality_weight")?,
            delivery: row.try_get("delivery_weight")?,
            reputation: row.try_get("reputation_weight")?,
            payment: row.try_get("payment_weight")?,
        },
        min_vendor_count: to_u32("analysis config min_vendor_count", row.try_get("min_vendor_count")?)?,
        score_threshold: row.try_get("score_threshold")?,
        price_variance_threshold: row.try_get("price_variance_threshold")?,
    })
}

fn stored_row_from_row(row: &SqliteRow) -> Result<StoredAnalysisRow, RepositoryError> {
    let level: String = row.try_get("recommendation_level")?;
    let recommendation_level = RecommendationLevel::parse(&level)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid recommendation level: {level}")))?;
    let method: String = row.try_get("analysis_method")?;
    let analysis_method = method
        .parse::<AnalysisMethod>()
        .map_err(|_| RepositoryError::Decode(format!("invalid analysis method: {method}")))?;
    let analysis_date: String = row.try_get("analysis_date")?;
    let submitted_at: String = row.try_get("submitted_at")?;
    let total_price: Option<String> = row.try_get("total_price")?;

    Ok(StoredAnalysisRow {
        scored: ScoredOffer {
            offer_id: VendorOfferId(row.try_get("offer_id")?),
            vendor_id: VendorId(row.try_get("vendor_id")?),
            vendor_name: row.try_get("vendor_name")?,
            submitted_at: parse_rfc3339("vendor offer submitted_at", &submitted_at)?,
            total_price: total_price
                .as_deref()
                .map(|price| parse_decimal("vendor offer total_price", price))
                .transpose()?,
            scores: ScoreBreakdown {
                price: row.try_get("price_score")?,
                quality: row.try_get("quality_score")?,
                delivery: row.try_get("delivery_score")?,
                reputation: row.try_get("reputation_score")?,
                payment: row.try_get("payment_score")?,
            },
            total_score: row.try_get("total_score")?,
            recommendation_level,
        },
        analysis_method,
        analysis_date: parse_rfc3339("analysis_date", &analysis_date)?,
    })
}
