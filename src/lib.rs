pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use db::create_pool;
pub use external::HttpRecordClient;
pub use service::{BulkVerifier, ReconciliationJob, ReconciliationScheduler, VerificationCache};
