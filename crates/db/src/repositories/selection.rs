use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use ksm_core::domain::offer::{OfferLineItem, OfferLineItemId, OfferStatus};
use ksm_core::domain::request::{RequestStatus, RequestedLineItemId};
use ksm_core::selection::{
    ensure_selection_open, plan_approval, plan_selections, AllocationGroup, AllocationPlan,
    ApprovalPlan, OfferSelectionState, SelectionDecision,
};

use super::offer::{line_item_from_row, list_line_items_for_offer, offer_from_row};
use super::offer::{LINE_ITEM_COLUMNS, OFFER_COLUMNS};
use super::request::{fetch_request, fetch_requested_item};
use super::{RepositoryError, SelectionRepository};
use crate::DbPool;

/// `BEGIN IMMEDIATE` takes SQLite's write lock up front so concurrent batches are serialised
/// instead of validating against the same snapshot.
const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

pub struct SqlSelectionRepository {
    pool: DbPool,
}

impl SqlSelectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SelectionRepository for SqlSelectionRepository {
    async fn apply_selections(
        &self,
        decisions: &[SelectionDecision],
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AllocationPlan, RepositoryError> {
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await?;
        let plan = apply_batch(&mut *tx, decisions, actor, notes, now).await?;
        tx.commit().await?;

        Ok(plan)
    }

    async fn finalize_approval(
        &self,
        reference: &str,
        actor: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalPlan, RepositoryError> {
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await?;
        let plan = approve_request(&mut *tx, reference, actor, notes, now).await?;
        tx.commit().await?;

        Ok(plan)
    }
}

async fn apply_batch(
    conn: &mut SqliteConnection,
    decisions: &[SelectionDecision],
    actor: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AllocationPlan, RepositoryError> {
    let mut requested_ids = BTreeSet::new();
    for decision in decisions {
        // unknown ids are reported by the planner
        if let Some(item) = fetch_line_item(&mut *conn, &decision.item_id).await? {
            let (request_status, offer_status) = fetch_owner_statuses(&mut *conn, &item).await?;
            ensure_selection_open(&item.id, request_status, offer_status)?;
            requested_ids.insert(item.requested_item_id);
        }
    }

    let mut groups = Vec::with_capacity(requested_ids.len());
    for requested_id in requested_ids {
        groups.push(load_group(&mut *conn, &requested_id).await?);
    }

    let plan = plan_selections(decisions, &groups, actor, notes, now)?;

    for change in &plan.changes {
        let selection = change.selection.as_ref();
        sqlx::query(
            "UPDATE vendor_offer_item
             SET is_selected = ?, selected_quantity = ?, selected_by = ?,
                 selected_at = ?, selection_notes = ?
             WHERE id = ?",
        )
        .bind(selection.is_some())
        .bind(selection.map(|selection| i64::from(selection.quantity)))
        .bind(selection.map(|selection| selection.selected_by.as_str()))
        .bind(selection.map(|selection| selection.selected_at.to_rfc3339()))
        .bind(selection.and_then(|selection| selection.notes.as_deref()))
        .bind(&change.item_id.0)
        .execute(&mut *conn)
        .await?;
    }

    Ok(plan)
}

async fn approve_request(
    conn: &mut SqliteConnection,
    reference: &str,
    actor: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ApprovalPlan, RepositoryError> {
    let request = fetch_request(&mut *conn, "reference", reference)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("purchase request {reference}")))?;

    let sql = format!(
        "SELECT {OFFER_COLUMNS} FROM vendor_offer WHERE request_id = ? ORDER BY submitted_at, id"
    );
    let rows = sqlx::query(&sql).bind(&request.id.0).fetch_all(&mut *conn).await?;
    let mut offers = Vec::with_capacity(rows.len());
    for row in &rows {
        let offer = offer_from_row(row)?;
        let line_items = list_line_items_for_offer(&mut *conn, &offer.id).await?;
        offers.push(OfferSelectionState { offer, line_items });
    }

    let plan = plan_approval(request, offers, actor, notes, now)?;

    sqlx::query(
        "UPDATE purchase_request
         SET status = ?, approved_by = ?, approved_at = ?, approval_notes = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(plan.request.status.as_str())
    .bind(&plan.request.approved_by)
    .bind(plan.request.approved_at.map(|ts| ts.to_rfc3339()))
    .bind(&plan.request.approval_notes)
    .bind(plan.request.updated_at.to_rfc3339())
    .bind(&plan.request.id.0)
    .execute(&mut *conn)
    .await?;

    for offer in &plan.updated_offers {
        sqlx::query("UPDATE vendor_offer SET status = ? WHERE id = ?")
            .bind(offer.status.as_str())
            .bind(&offer.id.0)
            .execute(&mut *conn)
            .await?;
    }

    Ok(plan)
}

async fn fetch_line_item(
    conn: &mut SqliteConnection,
    id: &OfferLineItemId,
) -> Result<Option<OfferLineItem>, RepositoryError> {
    let sql = format!("SELECT {LINE_ITEM_COLUMNS} FROM vendor_offer_item WHERE id = ?");
    let row = sqlx::query(&sql).bind(&id.0).fetch_optional(conn).await?;

    row.as_ref().map(line_item_from_row).transpose()
}

/// Every line quoting against the requested item, selected or not, as currently committed.
async fn load_group(
    conn: &mut SqliteConnection,
    requested_id: &RequestedLineItemId,
) -> Result<AllocationGroup, RepositoryError> {
    let requested_item = fetch_requested_item(&mut *conn, requested_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("requested item {}", requested_id.0)))?;

    let sql = format!(
        "SELECT {LINE_ITEM_COLUMNS} FROM vendor_offer_item WHERE requested_item_id = ? ORDER BY id"
    );
    let rows = sqlx::query(&sql).bind(&requested_id.0).fetch_all(&mut *conn).await?;
    let line_items = rows.iter().map(line_item_from_row).collect::<Result<Vec<_>, _>>()?;

    Ok(AllocationGroup { requested_item, line_items })
}

/// Status of the purchase request and of the vendor offer a line item belongs to.
async fn fetch_owner_statuses(
    conn: &mut SqliteConnection,
    item: &OfferLineItem,
) -> Result<(RequestStatus, OfferStatus), RepositoryError> {
    let row = sqlx::query(
        "SELECT pr.status AS request_status, vo.status AS offer_status
         FROM vendor_offer vo
         JOIN purchase_request pr ON pr.id = vo.request_id
         WHERE vo.id = ?",
    )
    .bind(&item.offer_id.0)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| RepositoryError::NotFound(format!("vendor offer {}", item.offer_id.0)))?;

    let request_status: String = row.try_get("request_status")?;
    let offer_status: String = row.try_get("offer_status")?;
    let request_status = RequestStatus::parse(&request_status).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid purchase request status: {request_status}"))
    })?;
    let offer_status = OfferStatus::parse(&offer_status).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid vendor offer status: {offer_status}"))
    })?;

    Ok((request_status, offer_status))
}
