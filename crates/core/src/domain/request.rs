use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PurchaseRequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestedLineItemId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Submitted,
    UnderAnalysis,
    VendorSelected,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderAnalysis => "under_analysis",
            Self::VendorSelected => "vendor_selected",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "under_analysis" => Some(Self::UnderAnalysis),
            "vendor_selected" => Some(Self::VendorSelected),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One procurement need raised by a department.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: PurchaseRequestId,
    pub reference: String,
    pub title: String,
    pub status: RequestStatus,
    pub department: String,
    pub required_date: Option<NaiveDate>,
    pub total_budget: Option<Decimal>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self.status, next),
            (RequestStatus::Draft, RequestStatus::Submitted)
                | (RequestStatus::Draft, RequestStatus::UnderAnalysis)
                | (RequestStatus::Submitted, RequestStatus::UnderAnalysis)
                | (RequestStatus::Draft, RequestStatus::VendorSelected)
                | (RequestStatus::Submitted, RequestStatus::VendorSelected)
                | (RequestStatus::UnderAnalysis, RequestStatus::VendorSelected)
                | (RequestStatus::VendorSelected, RequestStatus::Completed)
                | (
                    RequestStatus::Draft
                        | RequestStatus::Submitted
                        | RequestStatus::UnderAnalysis
                        | RequestStatus::VendorSelected,
                    RequestStatus::Cancelled
                )
        )
    }

    pub fn transition_to(&mut self, next: RequestStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidRequestTransition { from: self.status, to: next })
    }

    /// Moves a fresh request into analysis. Requests already past that point are left alone so
    /// re-running analysis never rewinds the lifecycle.
    pub fn mark_under_analysis(&mut self) -> bool {
        if matches!(self.status, RequestStatus::Draft | RequestStatus::Submitted) {
            self.status = RequestStatus::UnderAnalysis;
            return true;
        }
        false
    }
}

/// The quantity and specification originally asked for; the ceiling for split selections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLineItem {
    pub id: RequestedLineItemId,
    pub request_id: PurchaseRequestId,
    pub description: String,
    pub quantity: u32,
    pub specification: Option<String>,
}
