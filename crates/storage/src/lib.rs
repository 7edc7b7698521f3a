pub mod alarm_store;
pub mod catalog;
pub mod db;
pub mod error;
pub mod memory;

pub use alarm_store::{window_start, AlarmStore, PgAlarmStore};
pub use catalog::{EntityCatalog, PgEntityCatalog};
pub use db::{connect, run_migrations};
pub use error::StoreError;
pub use memory::{MemoryAlarmStore, StaticCatalog};
