pub mod bootstrap;
pub mod errors;
pub mod handoff;
pub mod service;

pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use errors::ServiceError;
pub use handoff::{HandoffError, OrderCreator, TracingHandoff, VendorNotifier};
pub use service::{
    AnalysisOutcome, ApprovalSummary, ProcurementService, SelectionOutcome, StoredAnalysis,
};
