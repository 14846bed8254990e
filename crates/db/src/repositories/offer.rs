use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};

use ksm_core::analysis::OfferCandidate;
use ksm_core::domain::offer::{
    LineSelection, OfferLineItem, OfferLineItemId, OfferStatus, VendorOffer, VendorOfferId,
};
use ksm_core::domain::request::{PurchaseRequestId, RequestedLineItemId};
use ksm_core::domain::vendor::{Vendor, VendorCategory, VendorId, VendorStatus};

use super::{parse_decimal, parse_rfc3339, to_u32, OfferRepository, RepositoryError};
use crate::DbPool;

pub(crate) const OFFER_COLUMNS: &str = "id, request_id, vendor_id, total_price, \
     delivery_time_days, quality_rating, payment_terms, status, submitted_at";

pub(crate) const LINE_ITEM_COLUMNS: &str = "id, offer_id, requested_item_id, unit_price, \
     total_price, quantity, specification, notes, brand, is_selected, selected_quantity, \
     selected_by, selected_at, selection_notes";

pub struct SqlOfferRepository {
    pool: DbPool,
}

impl SqlOfferRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferRepository for SqlOfferRepository {
    async fn save_vendor(&self, vendor: Vendor) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO vendor (id, name, category, status)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                status = excluded.status
            "#,
        )
        .bind(&vendor.id.0)
        .bind(&vendor.name)
        .bind(vendor.category.as_str())
        .bind(vendor.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_offer(&self, offer: VendorOffer) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO vendor_offer (
                id, request_id, vendor_id, total_price, delivery_time_days,
                quality_rating, payment_terms, status, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                total_price = excluded.total_price,
                delivery_time_days = excluded.delivery_time_days,
                quality_rating = excluded.quality_rating,
                payment_terms = excluded.payment_terms,
                status = excluded.status,
                submitted_at = excluded.submitted_at
            "#,
        )
        .bind(&offer.id.0)
        .bind(&offer.request_id.0)
        .bind(&offer.vendor_id.0)
        .bind(offer.total_price.map(|price| price.to_string()))
        .bind(offer.delivery_time_days.map(i64::from))
        .bind(offer.quality_rating.map(i64::from))
        .bind(&offer.payment_terms)
        .bind(offer.status.as_str())
        .bind(offer.submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_line_item(&self, item: OfferLineItem) -> Result<(), RepositoryError> {
        let selection = item.selection.as_ref();

        sqlx::query(
            r#"
            INSERT INTO vendor_offer_item (
                id, offer_id, requested_item_id, unit_price, total_price, quantity,
                specification, notes, brand, is_selected, selected_quantity,
                selected_by, selected_at, selection_notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                unit_price = excluded.unit_price,
                total_price = excluded.total_price,
                quantity = excluded.quantity,
                specification = excluded.specification,
                notes = excluded.notes,
                brand = excluded.brand,
                is_selected = excluded.is_selected,
                selected_quantity = excluded.selected_quantity,
                selected_by = excluded.selected_by,
                selected_at = excluded.selected_at,
                selection_notes = excluded.selection_notes
            "#,
        )
        .bind(&item.id.0)
        .bind(&item.offer_id.0)
        .bind(&item.requested_item_id.0)
        .bind(item.unit_price.to_string())
        .bind(item.total_price.to_string())
        .bind(i64::from(item.quantity))
        .bind(&item.specification)
        .bind(&item.notes)
        .bind(&item.brand)
        .bind(selection.is_some())
        .bind(selection.map(|selection| i64::from(selection.quantity)))
        .bind(selection.map(|selection| selection.selected_by.clone()))
        .bind(selection.map(|selection| selection.selected_at.to_rfc3339()))
        .bind(selection.and_then(|selection| selection.notes.clone()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_attachment(
        &self,
        offer_id: &VendorOfferId,
        file_name: &str,
    ) -> Result<(), RepositoryError> {
        let id = format!("att-{}", uuid::Uuid::new_v4());

        sqlx::query("INSERT INTO offer_attachment (id, offer_id, file_name) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&offer_id.0)
            .bind(file_name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_offer(&self, id: &VendorOfferId) -> Result<Option<VendorOffer>, RepositoryError> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM vendor_offer WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.as_ref().map(offer_from_row).transpose()
    }

    async fn list_line_items(
        &self,
        offer_id: &VendorOfferId,
    ) -> Result<Vec<OfferLineItem>, RepositoryError> {
        list_line_items_for_offer(&self.pool, offer_id).await
    }

    async fn list_candidates(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<OfferCandidate>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                o.id, o.request_id, o.vendor_id, o.total_price, o.delivery_time_days,
                o.quality_rating, o.payment_terms, o.status, o.submitted_at,
                v.name AS vendor_name,
                v.category AS vendor_category,
                v.status AS vendor_status,
                (
                    SELECT COUNT(*)
                    FROM vendor_offer prior
                    WHERE prior.vendor_id = o.vendor_id
                      AND prior.request_id <> o.request_id
                      AND prior.status IN ('selected', 'partially_selected')
                ) AS prior_selected_offers
            FROM vendor_offer o
            JOIN vendor v ON v.id = o.vendor_id
            WHERE o.request_id = ?
              AND o.status IN ('submitted', 'under_review')
            ORDER BY o.submitted_at, o.id
            "#,
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let offer = offer_from_row(row)?;
            let attachment_names: Vec<String> = sqlx::query_scalar(
                "SELECT file_name FROM offer_attachment WHERE offer_id = ? ORDER BY file_name",
            )
            .bind(&offer.id.0)
            .fetch_all(&self.pool)
            .await?;

            candidates.push(OfferCandidate {
                vendor: Vendor {
                    id: offer.vendor_id.clone(),
                    name: row.try_get("vendor_name")?,
                    category: VendorCategory::parse(row.try_get("vendor_category")?),
                    status: VendorStatus::parse(row.try_get("vendor_status")?),
                },
                attachment_names,
                prior_selected_offers: to_u32(
                    "prior selected offers",
                    row.try_get("prior_selected_offers")?,
                )?,
                offer,
            });
        }

        Ok(candidates)
    }
}

pub(crate) async fn list_line_items_for_offer<'e, E>(
    executor: E,
    offer_id: &VendorOfferId,
) -> Result<Vec<OfferLineItem>, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {LINE_ITEM_COLUMNS} FROM vendor_offer_item WHERE offer_id = ? ORDER BY id");
    let rows = sqlx::query(&sql).bind(&offer_id.0).fetch_all(executor).await?;

    rows.iter().map(line_item_from_row).collect()
}

pub(crate) fn offer_from_row(row: &SqliteRow) -> Result<VendorOffer, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = OfferStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid vendor offer status: {status}")))?;
    let total_price: Option<String> = row.try_get("total_price")?;
    let delivery_time_days: Option<i64> = row.try_get("delivery_time_days")?;
    let quality_rating: Option<i64> = row.try_get("quality_rating")?;
    let submitted_at: String = row.try_get("submitted_at")?;

    Ok(VendorOffer {
        id: VendorOfferId(row.try_get("id")?),
        request_id: PurchaseRequestId(row.try_get("request_id")?),
        vendor_id: VendorId(row.try_get("vendor_id")?),
        total_price: total_price
            .as_deref()
            .map(|price| parse_decimal("vendor offer total_price", price))
            .transpose()?,
        delivery_time_days: delivery_time_days
            .map(|days| to_u32("vendor offer delivery_time_days", days))
            .transpose()?,
        quality_rating: quality_rating
            .map(|rating| {
                u8::try_from(rating).map_err(|_| {
                    RepositoryError::Decode(format!("vendor offer quality_rating out of range: {rating}"))
                })
            })
            .transpose()?,
        payment_terms: row.try_get("payment_terms")?,
        status,
        submitted_at: parse_rfc3339("vendor offer submitted_at", &submitted_at)?,
    })
}

pub(crate) fn line_item_from_row(row: &SqliteRow) -> Result<OfferLineItem, RepositoryError> {
    let unit_price: String = row.try_get("unit_price")?;
    let total_price: String = row.try_get("total_price")?;
    let is_selected: bool = row.try_get("is_selected")?;

    let selection = if is_selected {
        let quantity: Option<i64> = row.try_get("selected_quantity")?;
        let selected_by: Option<String> = row.try_get("selected_by")?;
        let selected_at: Option<String> = row.try_get("selected_at")?;
        let (Some(quantity), Some(selected_by), Some(selected_at)) =
            (quantity, selected_by, selected_at)
        else {
            let id: String = row.try_get("id")?;
            return Err(RepositoryError::Decode(format!(
                "line item {id} is selected but its selection fields are incomplete"
            )));
        };
        Some(LineSelection {
            quantity: to_u32("line item selected_quantity", quantity)?,
            selected_by,
            selected_at: parse_rfc3339("line item selected_at", &selected_at)?,
            notes: row.try_get("selection_notes")?,
        })
    } else {
        None
    };

    Ok(OfferLineItem {
        id: OfferLineItemId(row.try_get("id")?),
        offer_id: VendorOfferId(row.try_get("offer_id")?),
        requested_item_id: RequestedLineItemId(row.try_get("requested_item_id")?),
        unit_price: parse_decimal("line item unit_price", &unit_price)?,
        total_price: parse_decimal("line item total_price", &total_price)?,
        quantity: to_u32("line item quantity", row.try_get("quantity")?)?,
        specification: row.try_get("specification")?,
        notes: row.try_get("notes")?,
        brand: row.try_get("brand")?,
        selection,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use ksm_core::domain::offer::{
        LineSelection, OfferLineItem, OfferLineItemId, OfferStatus, VendorOffer, VendorOfferId,
    };
    use ksm_core::domain::request::{
        PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem, RequestedLineItemId,
    };
    use ksm_core::domain::vendor::{Vendor, VendorCategory, VendorId, VendorStatus};

    use super::SqlOfferRepository;
    use crate::repositories::{OfferRepository, PurchaseRequestRepository, SqlPurchaseRequestRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_request(pool: &DbPool, id: &str, status: RequestStatus) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let repo = SqlPurchaseRequestRepository::new(pool.clone());
        repo.save(PurchaseRequest {
            id: PurchaseRequestId(id.to_string()),
            reference: format!("REQ-{id}"),
            title: "Item X".to_string(),
            status,
            department: "Operations".to_string(),
            required_date: None,
            total_budget: None,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("save request");
        repo.save_requested_item(RequestedLineItem {
            id: RequestedLineItemId(format!("RI-{id}")),
            request_id: PurchaseRequestId(id.to_string()),
            description: "Item X".to_string(),
            quantity: 10,
            specification: None,
        })
        .await
        .expect("save requested item");
    }

    fn vendor(id: &str, category: VendorCategory) -> Vendor {
        Vendor {
            id: VendorId(id.to_string()),
            name: format!("Vendor {id}"),
            category,
            status: VendorStatus::Approved,
        }
    }

    fn offer(id: &str, request: &str, vendor: &str, status: OfferStatus, minute: i64) -> VendorOffer {
        VendorOffer {
            id: VendorOfferId(id.to_string()),
            request_id: PurchaseRequestId(request.to_string()),
            vendor_id: VendorId(vendor.to_string()),
            total_price: Some(Decimal::new(100_000_00, 2)),
            delivery_time_days: Some(5),
            quality_rating: Some(4),
            payment_terms: Some("Net-30".to_string()),
            status,
            submitted_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    #[tokio::test]
    async fn offer_and_line_item_round_trip_through_sql() {
        let pool = setup_pool().await;
        insert_request(&pool, "PR-1", RequestStatus::Submitted).await;
        let repo = SqlOfferRepository::new(pool);
        repo.save_vendor(vendor("V-A", VendorCategory::Preferred)).await.expect("vendor");

        let stored = offer("OFF-A", "PR-1", "V-A", OfferStatus::Submitted, 0);
        repo.save_offer(stored.clone()).await.expect("save offer");
        assert_eq!(repo.find_offer(&stored.id).await.expect("find"), Some(stored.clone()));

        let mut line = OfferLineItem {
            id: OfferLineItemId("OLI-A1".to_string()),
            offer_id: stored.id.clone(),
            requested_item_id: RequestedLineItemId("RI-PR-1".to_string()),
            unit_price: Decimal::new(10_000_00, 2),
            total_price: Decimal::new(100_000_00, 2),
            quantity: 10,
            specification: Some("Grade A".to_string()),
            notes: None,
            brand: Some("Krisbow".to_string()),
            selection: None,
        };
        repo.save_line_item(line.clone()).await.expect("save line");
        assert_eq!(repo.list_line_items(&stored.id).await.expect("list"), vec![line.clone()]);

        line.selection = Some(LineSelection {
            quantity: 6,
            selected_by: "buyer@ksm".to_string(),
            selected_at: Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap(),
            notes: Some("split with B".to_string()),
        });
        repo.save_line_item(line.clone()).await.expect("update line");
        assert_eq!(repo.list_line_items(&stored.id).await.expect("list"), vec![line]);
    }

    #[tokio::test]
    async fn candidates_carry_vendor_attachments_and_history() {
        let pool = setup_pool().await;
        insert_request(&pool, "PR-1", RequestStatus::Submitted).await;
        insert_request(&pool, "PR-OLD", RequestStatus::VendorSelected).await;
        let repo = SqlOfferRepository::new(pool);
        repo.save_vendor(vendor("V-A", VendorCategory::Preferred)).await.expect("vendor a");
        repo.save_vendor(vendor("V-B", VendorCategory::General)).await.expect("vendor b");
        repo.save_vendor(vendor("V-C", VendorCategory::General)).await.expect("vendor c");

        repo.save_offer(offer("OFF-B", "PR-1", "V-B", OfferStatus::UnderReview, 5))
            .await
            .expect("offer b");
        repo.save_offer(offer("OFF-A", "PR-1", "V-A", OfferStatus::Submitted, 0))
            .await
            .expect("offer a");
        repo.save_offer(offer("OFF-C", "PR-1", "V-C", OfferStatus::Rejected, 1))
            .await
            .expect("offer c");
        repo.save_offer(offer("OFF-OLD", "PR-OLD", "V-A", OfferStatus::Selected, 0))
            .await
            .expect("historic offer");
        repo.save_attachment(&VendorOfferId("OFF-A".to_string()), "ISO-9001.pdf")
            .await
            .expect("attachment");

        let candidates =
            repo.list_candidates(&PurchaseRequestId("PR-1".to_string())).await.expect("candidates");
        let ids: Vec<_> = candidates.iter().map(|c| c.offer.id.0.as_str()).collect();
        assert_eq!(ids, vec!["OFF-A", "OFF-B"], "rejected offers are not analysed");

        assert_eq!(candidates[0].vendor.category, VendorCategory::Preferred);
        assert_eq!(candidates[0].attachment_names, vec!["ISO-9001.pdf".to_string()]);
        assert_eq!(candidates[0].prior_selected_offers, 1);
        assert_eq!(candidates[1].prior_selected_offers, 0);
    }
}
