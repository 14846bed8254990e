use thiserror::Error;

use crate::domain::offer::OfferStatus;
use crate::domain::request::RequestStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid purchase request transition from {from:?} to {to:?}")]
    InvalidRequestTransition { from: RequestStatus, to: RequestStatus },
    #[error("invalid vendor offer transition from {from:?} to {to:?}")]
    InvalidOfferTransition { from: OfferStatus, to: OfferStatus },
    #[error("invalid analysis config: {0}")]
    InvalidAnalysisConfig(String),
    #[error("no offers to analyze for purchase request `{request_id}`")]
    NoOffersToAnalyze { request_id: String },
    #[error("selection batch is empty")]
    EmptySelection,
    #[error("line item `{item_id}` appears more than once in the selection batch")]
    DuplicateSelection { item_id: String },
    #[error("line item `{item_id}` does not exist")]
    LineItemNotFound { item_id: String },
    #[error("selected quantity {selected} for line item `{item_id}` must be between 1 and the quoted {quoted}")]
    SelectionQuantityOutOfRange { item_id: String, selected: u32, quoted: u32 },
    #[error(
        "requested item `{requested_item_id}` would be allocated {allocated} units across vendors but only {requested} were requested (line item `{item_id}`)"
    )]
    AllocationExceeded { requested_item_id: String, item_id: String, requested: u32, allocated: u32 },
    #[error(
        "line item `{item_id}` can no longer be changed: request is {request_status:?} and offer is {offer_status:?}"
    )]
    SelectionLocked { item_id: String, request_status: RequestStatus, offer_status: OfferStatus },
    #[error("nothing selected for purchase request `{reference}`")]
    NothingSelected { reference: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure during {operation}: {message}")]
    Persistence { operation: String, message: String },
    #[error("report rendering failure: {0}")]
    Report(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested purchase request or offer was not found.",
            Self::ServiceUnavailable { .. } => {
                "The operation failed and nothing was saved. It is safe to retry."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::LineItemNotFound { item_id }) => {
                Self::NotFound { message: format!("line item `{item_id}`"), correlation_id }
            }
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            // storage detail stays in the logs; callers only learn which operation failed
            ApplicationError::Persistence { operation, .. } => Self::ServiceUnavailable {
                message: format!("{operation} could not be committed"),
                correlation_id,
            },
            ApplicationError::Report(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}
