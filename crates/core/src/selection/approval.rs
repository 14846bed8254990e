use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::offer::{OfferLineItem, OfferLineItemId, OfferStatus, VendorOffer, VendorOfferId};
use crate::domain::request::{PurchaseRequest, RequestStatus, RequestedLineItemId};
use crate::domain::vendor::VendorId;
use crate::errors::DomainError;

/// An offer of the request with all of its line items as currently committed.
#[derive(Clone, Debug, PartialEq)]
pub struct OfferSelectionState {
    pub offer: VendorOffer,
    pub line_items: Vec<OfferLineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedLine {
    pub item_id: OfferLineItemId,
    pub requested_item_id: RequestedLineItemId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedVendorOffer {
    pub offer_id: VendorOfferId,
    pub vendor_id: VendorId,
    pub status: OfferStatus,
    pub lines: Vec<ApprovedLine>,
}

/// State changes produced by finalizing a selection; applied atomically by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalPlan {
    pub request: PurchaseRequest,
    pub updated_offers: Vec<VendorOffer>,
    pub approved_offers: Vec<ApprovedVendorOffer>,
}

impl ApprovalPlan {
    pub fn approved_items_count(&self) -> usize {
        self.approved_offers.iter().map(|offer| offer.lines.len()).sum()
    }

    pub fn approved_vendors_count(&self) -> usize {
        self.approved_offers.iter().map(|offer| &offer.vendor_id).collect::<HashSet<_>>().len()
    }
}

/// Locks in the current selection of a request.
///
/// Offers with every line selected become `selected`, offers with some lines selected become
/// `partially_selected`; offers without selected lines are left as they are.
pub fn plan_approval(
    mut request: PurchaseRequest,
    offers: Vec<OfferSelectionState>,
    actor: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ApprovalPlan, DomainError> {
    let any_selected = offers.iter().any(|state| state.line_items.iter().any(OfferLineItem::is_selected));
    if !any_selected {
        return Err(DomainError::NothingSelected { reference: request.reference.clone() });
    }

    request.transition_to(RequestStatus::VendorSelected)?;
    request.approved_by = Some(actor.to_string());
    request.approved_at = Some(now);
    request.approval_notes = notes.map(str::to_string);
    request.updated_at = now;

    let mut updated_offers = Vec::new();
    let mut approved_offers = Vec::new();
    for OfferSelectionState { mut offer, line_items } in offers {
        let lines: Vec<ApprovedLine> = line_items
            .iter()
            .filter_map(|item| {
                item.selection.as_ref().map(|selection| ApprovedLine {
                    item_id: item.id.clone(),
                    requested_item_id: item.requested_item_id.clone(),
                    quantity: selection.quantity,
                    unit_price: item.unit_price,
                })
            })
            .collect();
        if lines.is_empty() {
            continue;
        }

        let next = if lines.len() == line_items.len() {
            OfferStatus::Selected
        } else {
            OfferStatus::PartiallySelected
        };
        offer.transition_to(next)?;

        approved_offers.push(ApprovedVendorOffer {
            offer_id: offer.id.clone(),
            vendor_id: offer.vendor_id.clone(),
            status: next,
            lines,
        });
        updated_offers.push(offer);
    }

    Ok(ApprovalPlan { request, updated_offers, approved_offers })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::offer::LineSelection;
    use crate::domain::request::PurchaseRequestId;

    fn request(status: RequestStatus) -> PurchaseRequest {
        let now = Utc::now();
        PurchaseRequest {
            id: PurchaseRequestId("PR-1".to_string()),
            reference: "REQ-2024-001".to_string(),
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
        }
    }

    fn state(offer_id: &str, vendor: &str, selected: &[Option<u32>]) -> OfferSelectionState {
        OfferSelectionState {
            offer: VendorOffer {
                id: VendorOfferId(offer_id.to_string()),
                request_id: PurchaseRequestId("PR-1".to_string()),
                vendor_id: VendorId(vendor.to_string()),
                total_price: None,
                delivery_time_days: None,
                quality_rating: None,
                payment_terms: None,
                status: OfferStatus::UnderReview,
                submitted_at: Utc::now(),
            },
            line_items: selected
                .iter()
                .enumerate()
                .map(|(index, quantity)| OfferLineItem {
                    id: OfferLineItemId(format!("{offer_id}-{index}")),
                    offer_id: VendorOfferId(offer_id.to_string()),
                    requested_item_id: RequestedLineItemId(format!("RI-{index}")),
                    unit_price: Decimal::from(1_000),
                    total_price: Decimal::from(10_000),
                    quantity: 10,
                    specification: None,
                    notes: None,
                    brand: None,
                    selection: quantity.map(|quantity| LineSelection {
                        quantity,
                        selected_by: "buyer".to_string(),
                        selected_at: Utc::now(),
                        notes: None,
                    }),
                })
                .collect(),
        }
    }

    #[test]
    fn fully_and_partially_selected_offers_get_matching_statuses() {
        let plan = plan_approval(
            request(RequestStatus::UnderAnalysis),
            vec![
                state("OFF-A", "V-A", &[Some(6), Some(2)]),
                state("OFF-B", "V-B", &[Some(4), None]),
                state("OFF-C", "V-C", &[None, None]),
            ],
            "manager",
            Some("approved in weekly review"),
            Utc::now(),
        )
        .expect("approval plan");

        assert_eq!(plan.request.status, RequestStatus::VendorSelected);
        assert_eq!(plan.request.approved_by.as_deref(), Some("manager"));
        assert_eq!(plan.request.approval_notes.as_deref(), Some("approved in weekly review"));

        let statuses: Vec<_> =
            plan.updated_offers.iter().map(|offer| (offer.id.0.as_str(), offer.status)).collect();
        assert_eq!(
            statuses,
            vec![("OFF-A", OfferStatus::Selected), ("OFF-B", OfferStatus::PartiallySelected)]
        );
        assert_eq!(plan.approved_items_count(), 3);
        assert_eq!(plan.approved_vendors_count(), 2);
    }

    #[test]
    fn nothing_selected_is_rejected() {
        let error = plan_approval(
            request(RequestStatus::UnderAnalysis),
            vec![state("OFF-A", "V-A", &[None])],
            "manager",
            None,
            Utc::now(),
        )
        .expect_err("no selections");

        assert_eq!(error, DomainError::NothingSelected { reference: "REQ-2024-001".to_string() });
    }

    #[test]
    fn already_approved_request_cannot_be_approved_again() {
        let error = plan_approval(
            request(RequestStatus::VendorSelected),
            vec![state("OFF-A", "V-A", &[Some(1)])],
            "manager",
            None,
            Utc::now(),
        )
        .expect_err("vendor_selected is only entered once");

        assert!(matches!(error, DomainError::InvalidRequestTransition { .. }));
    }
}
