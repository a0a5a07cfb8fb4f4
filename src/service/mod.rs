pub mod audit;
pub mod bulk;
pub mod cache;
pub mod job;
pub mod resolver;
pub mod runs;
pub mod scheduler;

pub use audit::{AuditEntry, AuditLevel, AuditLogger};
pub use bulk::{BulkSettings, BulkVerifier};
pub use cache::{CacheStats, CleanupReport, VerificationCache};
pub use job::ReconciliationJob;
pub use resolver::resolve;
pub use runs::RunLedger;
pub use scheduler::{ReconciliationScheduler, SchedulerStatus};
