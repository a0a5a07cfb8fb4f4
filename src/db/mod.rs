pub mod pool;
pub mod postgres;
pub mod queries;
pub mod store;

pub use pool::create_pool;
pub use postgres::{PgDeliveryStore, PgStoreConfigSource};
pub use store::{DeliveryStore, StoreConfigLookup, StoreConfigSource};
