use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{PurchaseRequestId, RequestedLineItemId};
use crate::domain::vendor::VendorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorOfferId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferLineItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Submitted,
    UnderReview,
    PartiallySelected,
    Selected,
    Rejected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::PartiallySelected => "partially_selected",
            Self::Selected => "selected",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "under_review" => Some(Self::UnderReview),
            "partially_selected" => Some(Self::PartiallySelected),
            "selected" => Some(Self::Selected),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Offers still competing for the request and therefore subject to analysis.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview)
    }
}

/// A vendor's quotation ("penawaran") against one purchase request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorOffer {
    pub id: VendorOfferId,
    pub request_id: PurchaseRequestId,
    pub vendor_id: VendorId,
    pub total_price: Option<Decimal>,
    pub delivery_time_days: Option<u32>,
    pub quality_rating: Option<u8>,
    pub payment_terms: Option<String>,
    pub status: OfferStatus,
    pub submitted_at: DateTime<Utc>,
}

impl VendorOffer {
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        matches!(
            (self.status, next),
            (OfferStatus::Submitted, OfferStatus::UnderReview)
                | (
                    OfferStatus::Submitted | OfferStatus::UnderReview,
                    OfferStatus::PartiallySelected | OfferStatus::Selected | OfferStatus::Rejected
                )
                | (
                    OfferStatus::PartiallySelected,
                    OfferStatus::PartiallySelected | OfferStatus::Selected
                )
        )
    }

    pub fn transition_to(&mut self, next: OfferStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOfferTransition { from: self.status, to: next })
    }
}

/// Selection state of one offer line; `None` on the line while it is unselected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSelection {
    pub quantity: u32,
    pub selected_by: String,
    pub selected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferLineItem {
    pub id: OfferLineItemId,
    pub offer_id: VendorOfferId,
    pub requested_item_id: RequestedLineItemId,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub quantity: u32,
    pub specification: Option<String>,
    pub notes: Option<String>,
    pub brand: Option<String>,
    pub selection: Option<LineSelection>,
}

impl OfferLineItem {
    pub fn is_selected(&self) -> bool {
        self.selection.is_some()
    }

    pub fn selected_quantity(&self) -> u32 {
        self.selection.as_ref().map(|selection| selection.quantity).unwrap_or(0)
    }
}
