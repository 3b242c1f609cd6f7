//! Row-id range planning for partitioned execution.
//!
//! Splits `[0, row_count + 1)` into `partitions` contiguous half-open ranges.
//! Every range but the last is `row_count / partitions` ids wide; the last one
//! absorbs the remainder. Row ids are expected to be 1-based, so the final
//! `+ 1` makes the last range include id `row_count`.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Half-open row-id range `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBoundary {
    pub low: u64,
    pub high: u64,
}

impl PartitionBoundary {
    /// Number of row ids in the range.
    pub fn width(&self) -> u64 {
        self.high - self.low
    }
}

/// Ordered, gap-free boundaries; one per requested partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    row_count: u64,
    boundaries: Vec<PartitionBoundary>,
}

impl PartitionPlan {
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn boundaries(&self) -> &[PartitionBoundary] {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Rows per non-final partition.
    pub fn factor(&self) -> u64 {
        self.boundaries.first().map(|b| b.width()).unwrap_or(0)
    }
}

/// Computes the partition plan for `row_count` rows.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` if `partitions < 1` or `row_count < 0`.
pub fn plan(row_count: i64, partitions: i64) -> Result<PartitionPlan, AppError> {
    if partitions <= 0 {
        return Err(AppError::InvalidArgument(format!(
            "Partition count must be at least 1, got {}",
            partitions
        )));
    }
    if row_count < 0 {
        return Err(AppError::InvalidArgument(format!(
            "Row count must not be negative, got {}",
            row_count
        )));
    }

    let row_count = row_count as u64;
    let partitions = partitions as u64;
    let factor = row_count / partitions;

    let boundaries = (0..partitions)
        .map(|i| {
            if i + 1 < partitions {
                PartitionBoundary {
                    low: factor * i,
                    high: factor * (i + 1),
                }
            } else {
                PartitionBoundary {
                    low: factor * i,
                    high: row_count + 1,
                }
            }
        })
        .collect();

    Ok(PartitionPlan {
        row_count,
        boundaries,
    })
}
