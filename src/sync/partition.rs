// ABOUTME: Range Partitioner - slices the sync domain into fixed-size windows
// ABOUTME: Supports inclusive documentID ranges and distinct-key offset pages

use anyhow::{Context, Result};
use tokio_postgres::Client;

/// One bounded unit of synchronization work. Alive only for the duration
/// of a run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// Inclusive documentID sub-range
    Range { start: i64, end: i64 },
    /// Fixed-size window over an ordered distinct-key domain
    Page { offset: i64, limit: i64 },
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Range { start, end } => write!(f, "[{}, {}]", start, end),
            Partition::Page { offset, limit } => write!(f, "offset {} (limit {})", offset, limit),
        }
    }
}

/// Partitioning strategy for one job.
///
/// `IdRange` covers an inclusive `[lo, hi]` id domain with fixed-width
/// chunks; the chunk count is known up front. `OffsetPages` walks an
/// ordered domain in fixed-size pages; the end is data-driven (an empty
/// page), so the sequence is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    IdRange { lo: i64, hi: i64, width: i64 },
    OffsetPages { start_offset: i64, page_size: i64 },
}

impl ChunkPlan {
    /// Number of partitions, where knowable up front.
    pub fn len(&self) -> Option<u64> {
        match self {
            ChunkPlan::IdRange { lo, hi, width } => {
                if lo > hi {
                    return Some(0);
                }
                let span = hi - lo + 1;
                Some(((span + width - 1) / width) as u64)
            }
            ChunkPlan::OffsetPages { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn partitions(&self) -> PartitionIter {
        match *self {
            ChunkPlan::IdRange { lo, hi, width } => PartitionIter::Range {
                next: lo,
                hi,
                width,
            },
            ChunkPlan::OffsetPages {
                start_offset,
                page_size,
            } => PartitionIter::Pages {
                offset: start_offset,
                page_size,
            },
        }
    }
}

/// Iterator over a plan's partitions, in increasing order.
#[derive(Debug, Clone)]
pub enum PartitionIter {
    Range { next: i64, hi: i64, width: i64 },
    Pages { offset: i64, page_size: i64 },
}

impl Iterator for PartitionIter {
    type Item = Partition;

    fn next(&mut self) -> Option<Partition> {
        match self {
            PartitionIter::Range { next, hi, width } => {
                if *next > *hi {
                    return None;
                }
                let start = *next;
                let end = (start + *width - 1).min(*hi);
                *next = end + 1;
                Some(Partition::Range { start, end })
            }
            PartitionIter::Pages { offset, page_size } => {
                let part = Partition::Page {
                    offset: *offset,
                    limit: *page_size,
                };
                *offset += *page_size;
                Some(part)
            }
        }
    }
}

/// Inclusive documentID bounds for a county's canonical documents.
///
/// Returns `None` for a county with zero documents; callers must branch on
/// that and run zero chunks rather than doing arithmetic on absent bounds.
pub async fn document_bounds(client: &Client, county_id: i32) -> Result<Option<(i64, i64)>> {
    let row = client
        .query_one(
            "SELECT MIN(\"documentID\"), MAX(\"documentID\") FROM \"Document\" WHERE \"countyID\" = $1",
            &[&county_id],
        )
        .await
        .context("Failed to compute document bounds")?;

    let lo: Option<i64> = row.get(0);
    let hi: Option<i64> = row.get(1);

    match (lo, hi) {
        (Some(lo), Some(hi)) => Ok(Some((lo, hi))),
        _ => Ok(None),
    }
}
