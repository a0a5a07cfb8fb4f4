pub mod delivery;
pub mod record;
pub mod run;
pub mod store_config;
pub mod verification;

pub use delivery::{Delivery, DeliveryRow, DeliverySnapshot, DeliveryStatus};
pub use record::ExternalInvoiceRecord;
pub use run::{ReconciliationRun, RunStatus, RunSummary, RunTrigger};
pub use store_config::{ColumnMapping, StoreConfigRow, StoreReconciliationConfig};
pub use verification::{
    BulkItemResult, MatchStrategy, MatchType, VerificationKey, VerificationOutcome,
    VerificationRequest, VerificationResult,
};
