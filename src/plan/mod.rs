//! Pure decision logic.
//!
//! The planners only read tracker state and propose actions; the orchestrator in [`crate::sync`]
//! executes those actions and commits the results back. None of the functions here perform I/O or
//! consult the clock, so every decision can be tested against literal fixtures.

pub mod ingest;
pub mod reconcile;
pub mod retention;

pub use self::ingest::{plan_ingest, IngestFilters, IngestItem};
pub use self::reconcile::plan_reconciliation;
pub use self::retention::{plan_purge, plan_retention};
