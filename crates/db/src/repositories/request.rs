use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row};

use ksm_core::domain::request::{
    PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem, RequestedLineItemId,
};

use super::{parse_date, parse_decimal, parse_rfc3339, to_u32, PurchaseRequestRepository, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, reference, title, status, department, required_date, \
     total_budget, approved_by, approved_at, approval_notes, created_at, updated_at";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseRequestRecord {
    pub id: String,
    pub reference: String,
    pub title: String,
    pub status: String,
    pub department: String,
    pub required_date: Option<String>,
    pub total_budget: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub approval_notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PurchaseRequest> for PurchaseRequestRecord {
    fn from(value: PurchaseRequest) -> Self {
        Self {
            id: value.id.0,
            reference: value.reference,
            title: value.title,
            status: value.status.as_str().to_string(),
            department: value.department,
            required_date: value.required_date.map(|date| date.format("%Y-%m-%d").to_string()),
            total_budget: value.total_budget.map(|budget| budget.to_string()),
            approved_by: value.approved_by,
            approved_at: value.approved_at.map(|ts| ts.to_rfc3339()),
            approval_notes: value.approval_notes,
            created_at: value.created_at.to_rfc3339(),
            updated_at: value.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PurchaseRequestRecord> for PurchaseRequest {
    type Error = RepositoryError;

    fn try_from(value: PurchaseRequestRecord) -> Result<Self, Self::Error> {
        let status = RequestStatus::parse(&value.status).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid purchase request status: {}", value.status))
        })?;

        Ok(Self {
            id: PurchaseRequestId(value.id),
            reference: value.reference,
            title: value.title,
            status,
            department: value.department,
            required_date: value
                .required_date
                .as_deref()
                .map(|date| parse_date("purchase request required_date", date))
                .transpose()?,
            total_budget: value
                .total_budget
                .as_deref()
                .map(|budget| parse_decimal("purchase request total_budget", budget))
                .transpose()?,
            approved_by: value.approved_by,
            approved_at: value
                .approved_at
                .as_deref()
                .map(|ts| parse_rfc3339("purchase request approved_at", ts))
                .transpose()?,
            approval_notes: value.approval_notes,
            created_at: parse_rfc3339("purchase request created_at", &value.created_at)?,
            updated_at: parse_rfc3339("purchase request updated_at", &value.updated_at)?,
        })
    }
}

pub struct SqlPurchaseRequestRepository {
    pool: DbPool,
}

impl SqlPurchaseRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRequestRepository for SqlPurchaseRequestRepository {
    async fn find_by_id(
        &self,
        id: &PurchaseRequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        fetch_request(&self.pool, "id", &id.0).await
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        fetch_request(&self.pool, "reference", reference).await
    }

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        let record = PurchaseRequestRecord::from(request);

        sqlx::query(
            r#"
            INSERT INTO purchase_request (
                id, reference, title, status, department, required_date, total_budget,
                approved_by, approved_at, approval_notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                reference = excluded.reference,
                title = excluded.title,
                status = excluded.status,
                department = excluded.department,
                required_date = excluded.required_date,
                total_budget = excluded.total_budget,
                approved_by = excluded.approved_by,
                approved_at = excluded.approved_at,
                approval_notes = excluded.approval_notes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.reference)
        .bind(&record.title)
        .bind(&record.status)
        .bind(&record.department)
        .bind(&record.required_date)
        .bind(&record.total_budget)
        .bind(&record.approved_by)
        .bind(&record.approved_at)
        .bind(&record.approval_notes)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_requested_item(&self, item: RequestedLineItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO requested_item (id, request_id, description, quantity, specification)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                quantity = excluded.quantity,
                specification = excluded.specification
            "#,
        )
        .bind(&item.id.0)
        .bind(&item.request_id.0)
        .bind(&item.description)
        .bind(i64::from(item.quantity))
        .bind(&item.specification)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_requested_items(
        &self,
        request_id: &PurchaseRequestId,
    ) -> Result<Vec<RequestedLineItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, description, quantity, specification
             FROM requested_item
             WHERE request_id = ?
             ORDER BY id",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(requested_item_from_row).collect()
    }
}

/// Loads a request by `id` or `reference`; shared with the transactional repositories.
pub(crate) async fn fetch_request<'e, E>(
    executor: E,
    column: &'static str,
    value: &str,
) -> Result<Option<PurchaseRequest>, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM purchase_request WHERE {column} = ?");
    let row = sqlx::query(&sql).bind(value).fetch_optional(executor).await?;

    row.as_ref().map(purchase_request_from_row).transpose()
}

pub(crate) async fn fetch_requested_item<'e, E>(
    executor: E,
    id: &RequestedLineItemId,
) -> Result<Option<RequestedLineItem>, RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, request_id, description, quantity, specification
         FROM requested_item
         WHERE id = ?",
    )
    .bind(&id.0)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(requested_item_from_row).transpose()
}

fn purchase_request_record_from_row(
    row: &SqliteRow,
) -> Result<PurchaseRequestRecord, RepositoryError> {
    Ok(PurchaseRequestRecord {
        id: row.try_get("id")?,
        reference: row.try_get("reference")?,
        title: row.try_get("title")?,
        status: row.try_get("status")?,
        department: row.try_get("department")?,
        required_date: row.try_get("required_date")?,
        total_budget: row.try_get("total_budget")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        approval_notes: row.try_get("approval_notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn purchase_request_from_row(row: &SqliteRow) -> Result<PurchaseRequest, RepositoryError> {
    PurchaseRequest::try_from(purchase_request_record_from_row(row)?)
}

fn requested_item_from_row(row: &SqliteRow) -> Result<RequestedLineItem, RepositoryError> {
    Ok(RequestedLineItem {
        id: RequestedLineItemId(row.try_get("id")?),
        request_id: PurchaseRequestId(row.try_get("request_id")?),
        description: row.try_get("description")?,
        quantity: to_u32("requested item quantity", row.try_get("quantity")?)?,
        specification: row.try_get("specification")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use ksm_core::domain::request::{
        PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem, RequestedLineItemId,
    };

    use super::{PurchaseRequestRecord, SqlPurchaseRequestRepository};
    use crate::repositories::PurchaseRequestRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn request() -> PurchaseRequest {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        PurchaseRequest {
            id: PurchaseRequestId("PR-7".to_string()),
            reference: "REQ-2024-007".to_string(),
            title: "Safety helmets".to_string(),
            status: RequestStatus::Submitted,
            department: "HSE".to_string(),
            required_date: NaiveDate::from_ymd_opt(2024, 4, 15),
            total_budget: Some(Decimal::new(1_250_000_50, 2)),
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn record_conversion_keeps_optional_fields() {
        let original = request();
        let decoded = PurchaseRequest::try_from(PurchaseRequestRecord::from(original.clone()))
            .expect("decode request");
        assert_eq!(decoded, original);
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let mut record = PurchaseRequestRecord::from(request());
        record.status = "archived".to_string();
        assert!(PurchaseRequest::try_from(record).is_err());
    }

    #[tokio::test]
    async fn saves_and_finds_by_id_and_reference() {
        let pool = setup_pool().await;
        let repo = SqlPurchaseRequestRepository::new(pool);
        let mut original = request();
        repo.save(original.clone()).await.expect("save request");

        assert_eq!(repo.find_by_id(&original.id).await.expect("find"), Some(original.clone()));
        assert_eq!(
            repo.find_by_reference("REQ-2024-007").await.expect("find by reference"),
            Some(original.clone())
        );
        assert_eq!(repo.find_by_reference("REQ-0000").await.expect("missing"), None);

        original.status = RequestStatus::UnderAnalysis;
        repo.save(original.clone()).await.expect("update request");
        let found = repo.find_by_id(&original.id).await.expect("find").expect("present");
        assert_eq!(found.status, RequestStatus::UnderAnalysis);
    }

    #[tokio::test]
    async fn requested_items_are_listed_by_id() {
        let pool = setup_pool().await;
        let repo = SqlPurchaseRequestRepository::new(pool);
        let request = request();
        repo.save(request.clone()).await.expect("save request");

        for (id, quantity) in [("RI-2", 4), ("RI-1", 10)] {
            repo.save_requested_item(RequestedLineItem {
                id: RequestedLineItemId(id.to_string()),
                request_id: request.id.clone(),
                description: format!("Helmet batch {id}"),
                quantity,
                specification: Some("EN 397".to_string()),
            })
            .await
            .expect("save item");
        }

        let items = repo.list_requested_items(&request.id).await.expect("list items");
        let ids: Vec<_> = items.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["RI-1", "RI-2"]);
        assert_eq!(items[0].quantity, 10);
    }
}
