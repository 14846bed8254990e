use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use ksm_core::domain::offer::{
    OfferLineItem, OfferLineItemId, OfferStatus, VendorOffer, VendorOfferId,
};
use ksm_core::domain::request::{
    PurchaseRequest, PurchaseRequestId, RequestStatus, RequestedLineItem, RequestedLineItemId,
};
use ksm_core::domain::vendor::{Vendor, VendorCategory, VendorId, VendorStatus};

use crate::repositories::{ProcurementRepositories, RepositoryError};

pub const R1_REQUEST_ID: &str = "PR-2024-001";
pub const R1_REFERENCE: &str = "REQ-2024-001";
pub const R1_REQUESTED_ITEM_ID: &str = "RI-2024-001-1";
pub const R1_VENDOR_A_ID: &str = "V-SINAR-JAYA";
pub const R1_VENDOR_B_ID: &str = "V-MAJU-BERSAMA";
pub const R1_OFFER_A_ID: &str = "OFF-2024-001-A";
pub const R1_OFFER_B_ID: &str = "OFF-2024-001-B";
pub const R1_LINE_A_ID: &str = "OLI-2024-001-A1";
pub const R1_LINE_B_ID: &str = "OLI-2024-001-B1";

/// Units requested for the single R1 line item.
pub const R1_REQUESTED_QUANTITY: u32 = 10;

/// Deterministic demo data: one purchase request with competing vendor offers.
///
/// The R1 scenario has two offers for 10 units of one item:
/// 1. PT Sinar Jaya: 100,000 total, 5 days, rating 4
/// 2. CV Maju Bersama: 90,000 total, 20 days, rating 3
///
/// With the default weights B scores 78.00 and ranks above A at 69.75.
#[derive(Clone, Debug, PartialEq)]
pub struct DemoScenario {
    pub request: PurchaseRequest,
    pub requested_items: Vec<RequestedLineItem>,
    pub vendors: Vec<Vendor>,
    pub offers: Vec<VendorOffer>,
    pub line_items: Vec<OfferLineItem>,
    pub attachments: Vec<(VendorOfferId, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub request_id: String,
    pub reference: String,
    pub offers_seeded: usize,
    pub line_items_seeded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

impl DemoScenario {
    pub fn r1() -> Self {
        let created = at(2024, 3, 1, 7, 30);
        let request_id = PurchaseRequestId(R1_REQUEST_ID.to_string());
        let requested_item_id = RequestedLineItemId(R1_REQUESTED_ITEM_ID.to_string());

        let request = PurchaseRequest {
            id: request_id.clone(),
            reference: R1_REFERENCE.to_string(),
            title: "Item X".to_string(),
            status: RequestStatus::Submitted,
            department: "Operations".to_string(),
            required_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            total_budget: Some(Decimal::from(120_000)),
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_at: created,
            updated_at: created,
        };

        let requested_items = vec![RequestedLineItem {
            id: requested_item_id.clone(),
            request_id: request_id.clone(),
            description: "Item X".to_string(),
            quantity: R1_REQUESTED_QUANTITY,
            specification: None,
        }];

        let vendors = vec![
            vendor(R1_VENDOR_A_ID, "PT Sinar Jaya"),
            vendor(R1_VENDOR_B_ID, "CV Maju Bersama"),
        ];

        let quotes = [
            (R1_OFFER_A_ID, R1_VENDOR_A_ID, R1_LINE_A_ID, 10_000, 5, 4, at(2024, 3, 1, 8, 0)),
            (R1_OFFER_B_ID, R1_VENDOR_B_ID, R1_LINE_B_ID, 9_000, 20, 3, at(2024, 3, 1, 9, 0)),
        ];

        let mut offers = Vec::with_capacity(quotes.len());
        let mut line_items = Vec::with_capacity(quotes.len());
        for (offer_id, vendor_id, line_id, unit_price, days, rating, submitted_at) in quotes {
            let unit_price = Decimal::from(unit_price);
            let total_price = unit_price * Decimal::from(R1_REQUESTED_QUANTITY);
            offers.push(VendorOffer {
                id: VendorOfferId(offer_id.to_string()),
                request_id: request_id.clone(),
                vendor_id: VendorId(vendor_id.to_string()),
                total_price: Some(total_price),
                delivery_time_days: Some(days),
                quality_rating: Some(rating),
                payment_terms: Some("Net-30".to_string()),
                status: OfferStatus::Submitted,
                submitted_at,
            });
            line_items.push(OfferLineItem {
                id: OfferLineItemId(line_id.to_string()),
                offer_id: VendorOfferId(offer_id.to_string()),
                requested_item_id: requested_item_id.clone(),
                unit_price,
                total_price,
                quantity: R1_REQUESTED_QUANTITY,
                specification: None,
                notes: None,
                brand: None,
                selection: None,
            });
        }

        Self { request, requested_items, vendors, offers, line_items, attachments: Vec::new() }
    }

    /// Writes the scenario through the repository seams, so it works for both SQL and in-memory
    /// stores. Re-seeding resets the scenario rows to their initial state.
    pub async fn seed(&self, repos: &ProcurementRepositories) -> Result<SeedResult, RepositoryError> {
        repos.requests.save(self.request.clone()).await?;
        for item in &self.requested_items {
            repos.requests.save_requested_item(item.clone()).await?;
        }
        for vendor in &self.vendors {
            repos.offers.save_vendor(vendor.clone()).await?;
        }
        for offer in &self.offers {
            repos.offers.save_offer(offer.clone()).await?;
        }
        for item in &self.line_items {
            repos.offers.save_line_item(item.clone()).await?;
        }
        for (offer_id, file_name) in &self.attachments {
            repos.offers.save_attachment(offer_id, file_name).await?;
        }

        Ok(SeedResult {
            request_id: self.request.id.0.clone(),
            reference: self.request.reference.clone(),
            offers_seeded: self.offers.len(),
            line_items_seeded: self.line_items.len(),
        })
    }

    /// Checks that every scenario row is present, without comparing mutable state such as
    /// selections or statuses.
    pub async fn verify(
        &self,
        repos: &ProcurementRepositories,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let request = repos.requests.find_by_reference(&self.request.reference).await?;
        checks.push((
            format!("request {}", self.request.reference),
            request.map(|request| request.id == self.request.id).unwrap_or(false),
        ));

        let stored_items = repos.requests.list_requested_items(&self.request.id).await?;
        for item in &self.requested_items {
            checks.push((
                format!("requested item {}", item.id.0),
                stored_items.iter().any(|stored| stored.id == item.id),
            ));
        }

        for offer in &self.offers {
            checks.push((
                format!("offer {}", offer.id.0),
                repos.offers.find_offer(&offer.id).await?.is_some(),
            ));
            let stored_lines = repos.offers.list_line_items(&offer.id).await?;
            let expected = self.line_items.iter().filter(|item| item.offer_id == offer.id).count();
            checks.push((format!("line items of {}", offer.id.0), stored_lines.len() == expected));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

fn vendor(id: &str, name: &str) -> Vendor {
    Vendor {
        id: VendorId(id.to_string()),
        name: name.to_string(),
        category: VendorCategory::General,
        status: VendorStatus::Approved,
    }
}

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DemoScenario, R1_REFERENCE};
    use crate::repositories::{InMemoryProcurementStore, ProcurementRepositories};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn r1_seeds_and_verifies_in_sqlite() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repos = ProcurementRepositories::sql(pool);
        let scenario = DemoScenario::r1();

        let seeded = scenario.seed(&repos).await.expect("seed");
        assert_eq!(seeded.reference, R1_REFERENCE);
        assert_eq!(seeded.offers_seeded, 2);

        // seeding twice is harmless
        scenario.seed(&repos).await.expect("re-seed");

        let verification = scenario.verify(&repos).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);
    }

    #[tokio::test]
    async fn verification_reports_missing_rows() {
        let repos = ProcurementRepositories::in_memory(Arc::new(InMemoryProcurementStore::new()));

        let verification = DemoScenario::r1().verify(&repos).await.expect("verify");

        assert!(!verification.all_present);
        assert!(verification.checks.iter().any(|(label, present)| label.contains(R1_REFERENCE) && !present));
    }

    #[test]
    fn r1_offer_totals_match_quoted_quantity() {
        let scenario = DemoScenario::r1();
        for (offer, item) in scenario.offers.iter().zip(&scenario.line_items) {
            assert_eq!(offer.total_price, Some(item.total_price));
            assert_eq!(item.quantity, super::R1_REQUESTED_QUANTITY);
        }
    }
}
