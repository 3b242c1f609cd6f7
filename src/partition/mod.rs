//! Row-id partitioned query execution.

pub mod executor;
pub mod planner;

pub use executor::{PartitionedExport, PartitionedQueryExecutor};
pub use planner::{plan, PartitionBoundary, PartitionPlan};
