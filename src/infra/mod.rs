//! Infrastructure adapters for queues, staging, observers, and the ledger.

pub mod ledger;
pub mod observers;
pub mod queue;
pub mod staging;

pub use ledger::InMemoryLedger;
pub use observers::ObserverHub;
pub use queue::{DeadLetter, InMemoryJobQueue};
pub use staging::InMemoryStagingStore;
#[cfg(feature = "redis")]
pub use staging::RedisStagingStore;
