//! Sales negotiation pipeline: stage catalog, transitions, repository,
//! aggregation, plus the per-client billing ledger.

pub mod billing;
pub mod catalog;
mod error;
pub mod model;
pub mod repository;
pub mod stats;
pub mod transition;
pub mod upgrade;

pub use billing::{BillingDraft, BillingLedger, BillingStatus, BillingSummary, MonthlyBilling};
pub use error::{CrmError, CrmResult};
pub use model::{
    Negotiation, NegotiationDraft, NegotiationHistoryEntry, NegotiationPatch, Stage, SubStage,
};
pub use repository::{NegotiationRepository, RepositoryConfig};
pub use stats::PipelineStats;
