//! Collaborators notified after an approval has been committed.
//!
//! Order creation and vendor notification live outside this system. Both are best effort: the
//! approval is already durable when they run, so their failures are logged and swallowed.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use ksm_core::domain::request::PurchaseRequest;
use ksm_core::selection::ApprovedVendorOffer;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandoffError(pub String);

#[async_trait]
pub trait OrderCreator: Send + Sync {
    async fn create_order(
        &self,
        request: &PurchaseRequest,
        offer: &ApprovedVendorOffer,
    ) -> Result<(), HandoffError>;
}

#[async_trait]
pub trait VendorNotifier: Send + Sync {
    async fn notify_vendor(
        &self,
        request: &PurchaseRequest,
        offer: &ApprovedVendorOffer,
    ) -> Result<(), HandoffError>;
}

/// Default collaborator that only records the hand-off in the logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHandoff;

#[async_trait]
impl OrderCreator for TracingHandoff {
    async fn create_order(
        &self,
        request: &PurchaseRequest,
        offer: &ApprovedVendorOffer,
    ) -> Result<(), HandoffError> {
        info!(
            event_name = "approval.order_requested",
            request_id = %request.id.0,
            reference = %request.reference,
            offer_id = %offer.offer_id.0,
            vendor_id = %offer.vendor_id.0,
            lines = offer.lines.len(),
            "purchase order hand-off recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl VendorNotifier for TracingHandoff {
    async fn notify_vendor(
        &self,
        request: &PurchaseRequest,
        offer: &ApprovedVendorOffer,
    ) -> Result<(), HandoffError> {
        info!(
            event_name = "approval.vendor_notified",
            reference = %request.reference,
            vendor_id = %offer.vendor_id.0,
            status = offer.status.as_str(),
            "vendor notification recorded"
        );
        Ok(())
    }
}
