//! Item-level vendor selection
//!
//! Staff may split one requested line item across several vendors. The planner here validates a
//! whole batch of decisions against the allocation ceiling before anything is mutated; the
//! repository layer applies the resulting plan inside one transaction.

pub mod approval;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::offer::{LineSelection, OfferLineItem, OfferLineItemId, OfferStatus};
use crate::domain::request::{RequestStatus, RequestedLineItem};
use crate::errors::DomainError;

pub use approval::{plan_approval, ApprovalPlan, ApprovedLine, ApprovedVendorOffer, OfferSelectionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAction {
    Select,
    Unselect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionDecision {
    pub item_id: OfferLineItemId,
    pub action: SelectionAction,
    #[serde(default)]
    pub selected_quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SelectionDecision {
    pub fn select(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: OfferLineItemId(item_id.into()),
            action: SelectionAction::Select,
            selected_quantity: quantity,
            notes: None,
        }
    }

    pub fn unselect(item_id: impl Into<String>) -> Self {
        Self {
            item_id: OfferLineItemId(item_id.into()),
            action: SelectionAction::Unselect,
            selected_quantity: 0,
            notes: None,
        }
    }
}

/// A requested line item together with every vendor line quoting against it.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationGroup {
    pub requested_item: RequestedLineItem,
    pub line_items: Vec<OfferLineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionChange {
    pub item_id: OfferLineItemId,
    pub selection: Option<LineSelection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub changes: Vec<SelectionChange>,
}

impl AllocationPlan {
    pub fn updated_count(&self) -> usize {
        self.changes.len()
    }
}

/// Rejects changes to a line once its request has been approved or closed, or once its offer has
/// been decided.
pub fn ensure_selection_open(
    item_id: &OfferLineItemId,
    request_status: RequestStatus,
    offer_status: OfferStatus,
) -> Result<(), DomainError> {
    let request_locked = matches!(
        request_status,
        RequestStatus::VendorSelected | RequestStatus::Completed | RequestStatus::Cancelled
    );
    let offer_locked = matches!(
        offer_status,
        OfferStatus::Selected | OfferStatus::PartiallySelected | OfferStatus::Rejected
    );

    if request_locked || offer_locked {
        return Err(DomainError::SelectionLocked {
            item_id: item_id.0.clone(),
            request_status,
            offer_status,
        });
    }
    Ok(())
}

/// Validates a selection batch against the current committed state and returns the changes to
/// apply.
///
/// `groups` must hold every line item that references a requested item touched by the batch,
/// not only the items named in it: lines outside the batch keep their committed quantity and
/// count toward the ceiling.
pub fn plan_selections(
    decisions: &[SelectionDecision],
    groups: &[AllocationGroup],
    actor: &str,
    batch_notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AllocationPlan, DomainError> {
    if decisions.is_empty() {
        return Err(DomainError::EmptySelection);
    }

    let mut seen = HashSet::new();
    for decision in decisions {
        if !seen.insert(&decision.item_id) {
            return Err(DomainError::DuplicateSelection { item_id: decision.item_id.0.clone() });
        }
    }

    let items: HashMap<&OfferLineItemId, &OfferLineItem> = groups
        .iter()
        .flat_map(|group| group.line_items.iter())
        .map(|item| (&item.id, item))
        .collect();
    let by_item: HashMap<&OfferLineItemId, &SelectionDecision> =
        decisions.iter().map(|decision| (&decision.item_id, decision)).collect();

    for decision in decisions {
        let item = items
            .get(&decision.item_id)
            .ok_or_else(|| DomainError::LineItemNotFound { item_id: decision.item_id.0.clone() })?;
        if decision.action == SelectionAction::Select
            && (decision.selected_quantity == 0 || decision.selected_quantity > item.quantity)
        {
            return Err(DomainError::SelectionQuantityOutOfRange {
                item_id: item.id.0.clone(),
                selected: decision.selected_quantity,
                quoted: item.quantity,
            });
        }
    }

    for group in groups {
        let mut allocated: u64 = 0;
        let mut offending = None;
        for item in &group.line_items {
            let projected = match by_item.get(&item.id) {
                Some(decision) if decision.action == SelectionAction::Select => {
                    if offending.is_none() {
                        offending = Some(&item.id);
                    }
                    decision.selected_quantity
                }
                Some(_) => 0,
                None => item.selected_quantity(),
            };
            allocated += u64::from(projected);
        }

        if allocated > u64::from(group.requested_item.quantity) {
            let item_id = offending
                .map(|id| id.0.clone())
                .unwrap_or_else(|| group.requested_item.id.0.clone());
            return Err(DomainError::AllocationExceeded {
                requested_item_id: group.requested_item.id.0.clone(),
                item_id,
                requested: group.requested_item.quantity,
                allocated: u32::try_from(allocated).unwrap_or(u32::MAX),
            });
        }
    }

    let changes = decisions
        .iter()
        .map(|decision| SelectionChange {
            item_id: decision.item_id.clone(),
            selection: match decision.action {
                SelectionAction::Select => Some(LineSelection {
                    quantity: decision.selected_quantity,
                    selected_by: actor.to_string(),
                    selected_at: now,
                    notes: decision.notes.clone().or_else(|| batch_notes.map(str::to_string)),
                }),
                SelectionAction::Unselect => None,
            },
        })
        .collect();

    Ok(AllocationPlan { changes })
}
