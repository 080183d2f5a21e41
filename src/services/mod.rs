pub mod query;
pub mod scheduler;
pub mod signals;
pub mod snapshot_store;

pub use query::SignalQuery;
pub use scheduler::RefreshScheduler;
pub use signals::{EnrichOutcome, RationaleEnricher};
pub use snapshot_store::SnapshotStore;
