// ABOUTME: Driver for sync jobs - one reusable chunk loop shared by all variants
// ABOUTME: Handles planning, retry, checkpointing, and chunk-granularity progress

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio_postgres::Client;

use crate::config::{LoaderConfig, PartySource};
use crate::db::{is_unique_violation, retry_transient};
use crate::sync::document::DocumentSync;
use crate::sync::partition::{document_bounds, ChunkPlan, Partition};
use crate::sync::party::PartySync;
use crate::sync::state::LoaderState;

/// Closed set of synchronization jobs the driver can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncJob {
    /// Canonical Document rows from the distinct external-key domain
    Documents,
    /// Party rows for one (staging table, column, role) combination
    Parties(PartySource),
}

impl SyncJob {
    /// Stable label used for checkpoint keys and log lines.
    pub fn label(&self) -> String {
        match self {
            SyncJob::Documents => "documents".to_string(),
            SyncJob::Parties(source) => source.label(),
        }
    }
}

/// Result of processing one partition.
#[derive(Debug, Clone, Copy)]
struct ChunkOutcome {
    inserted: u64,
    /// True when an offset-page job has walked off the end of its domain
    exhausted: bool,
}

/// Summary of one completed job.
#[derive(Debug, Clone)]
pub struct JobStats {
    pub label: String,
    pub chunks_completed: u64,
    pub rows_inserted: u64,
    pub duration_ms: u64,
}

/// Runs sync jobs against one source connection.
///
/// Every job follows the same loop: compute the partition plan, process
/// partitions in increasing order with bounded retry, commit, checkpoint,
/// and report progress at chunk granularity. A chunk failure aborts only
/// the in-flight chunk; everything committed before it stands, and the
/// persisted checkpoint points at the chunk to resume from. A job that
/// walks its whole domain clears its checkpoint, so the next invocation
/// covers rows staged in between.
pub struct SyncRunner<'a> {
    client: &'a Client,
    config: &'a LoaderConfig,
    state_path: PathBuf,
    resume: bool,
}

impl<'a> SyncRunner<'a> {
    pub fn new(client: &'a Client, config: &'a LoaderConfig, state_path: PathBuf, resume: bool) -> Self {
        Self {
            client,
            config,
            state_path,
            resume,
        }
    }

    /// Run the document job followed by all four party variants.
    pub async fn run_all(&self) -> Result<Vec<JobStats>> {
        let mut all_stats = Vec::new();
        all_stats.push(self.run(SyncJob::Documents).await?);
        for source in PartySource::ALL {
            all_stats.push(self.run(SyncJob::Parties(source)).await?);
        }
        Ok(all_stats)
    }

    /// Run one job to completion.
    pub async fn run(&self, job: SyncJob) -> Result<JobStats> {
        let start = std::time::Instant::now();
        let label = job.label();
        let county = self.config.county_id;

        let mut state =
            LoaderState::load_or_create(&self.state_path, &self.config.source_url).await;
        let checkpoint = if self.resume {
            state.get_job(county, &label).map(|c| c.next)
        } else {
            None
        };
        if let Some(next) = checkpoint {
            tracing::info!("{}: resuming county {} from {}", label, county, next);
        }

        let plan = match self.plan(job, checkpoint).await? {
            Some(plan) => plan,
            None => {
                // Empty domain: clean completion with zero chunks.
                tracing::info!(
                    "{}: county {} has no documents to scope, nothing to sync",
                    label,
                    county
                );
                if state.clear_job(county, &label).is_some() {
                    state.save(&self.state_path).await?;
                }
                return Ok(JobStats {
                    label,
                    chunks_completed: 0,
                    rows_inserted: 0,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        self.log_start(&label, &plan);
        let bar = make_progress_bar(&label, &plan);

        let mut stats = JobStats {
            label: label.clone(),
            chunks_completed: 0,
            rows_inserted: 0,
            duration_ms: 0,
        };

        for part in plan.partitions() {
            let outcome = retry_transient(
                || self.process_partition(job, part),
                self.config.max_retries,
                Duration::from_secs(1),
            )
            .await
            .with_context(|| format!("{}: chunk {} failed", label, part))?;

            if outcome.exhausted {
                break;
            }

            stats.chunks_completed += 1;
            stats.rows_inserted += outcome.inserted;

            state.advance_job(county, &label, next_boundary(&part), outcome.inserted);
            state.save(&self.state_path).await?;

            bar.inc(1);
            tracing::info!(
                "{}: chunk {} committed, {} rows inserted ({} total)",
                label,
                part,
                outcome.inserted,
                stats.rows_inserted
            );
        }

        // The job walked its whole domain. Drop the checkpoint so the next
        // run re-plans from the start of whatever the domain is then; a
        // retained boundary would skip rows staged after this run. Only a
        // mid-domain failure leaves a checkpoint behind.
        if state.clear_job(county, &label).is_some() {
            state.save(&self.state_path).await?;
        }

        bar.finish_and_clear();
        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "{}: done, {} rows inserted over {} chunks in {}ms",
            label,
            stats.rows_inserted,
            stats.chunks_completed,
            stats.duration_ms
        );
        Ok(stats)
    }

    /// Compute a job's partition plan. `None` means the domain is empty.
    async fn plan(&self, job: SyncJob, checkpoint: Option<i64>) -> Result<Option<ChunkPlan>> {
        match job {
            SyncJob::Documents => Ok(Some(ChunkPlan::OffsetPages {
                start_offset: checkpoint.unwrap_or(0),
                page_size: self.config.page_size,
            })),
            SyncJob::Parties(_) => {
                let bounds = document_bounds(self.client, self.config.county_id).await?;
                match bounds {
                    None => Ok(None),
                    Some((lo, hi)) => {
                        let lo = checkpoint.map_or(lo, |next| next.max(lo));
                        Ok(Some(ChunkPlan::IdRange {
                            lo,
                            hi,
                            width: self.config.chunk_width,
                        }))
                    }
                }
            }
        }
    }

    /// Process one partition, mapping unique-violation errors to a
    /// zero-insert no-op. Only connectivity failures propagate.
    async fn process_partition(&self, job: SyncJob, part: Partition) -> Result<ChunkOutcome> {
        let result = match (job, part) {
            (SyncJob::Parties(source), Partition::Range { start, end }) => {
                PartySync::new(self.config.county_id, source)
                    .process_range(self.client, start, end)
                    .await
                    .map(|inserted| ChunkOutcome {
                        inserted,
                        exhausted: false,
                    })
            }
            (SyncJob::Documents, Partition::Page { offset, limit }) => {
                DocumentSync::new(self.config.county_id)
                    .process_page(self.client, offset, limit)
                    .await
                    .map(|outcome| ChunkOutcome {
                        inserted: outcome.inserted,
                        exhausted: outcome.fetched == 0,
                    })
            }
            _ => bail!("partition kind does not match job {}", job.label()),
        };

        match result {
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(
                    "{}: unique constraint fired on chunk {}, treating as already synced",
                    job.label(),
                    part
                );
                Ok(ChunkOutcome {
                    inserted: 0,
                    exhausted: false,
                })
            }
            other => other,
        }
    }

    fn log_start(&self, label: &str, plan: &ChunkPlan) {
        match plan {
            ChunkPlan::IdRange { lo, hi, width } => tracing::info!(
                "{}: county {}, documentID {} -> {} ({} chunks of {})",
                label,
                self.config.county_id,
                lo,
                hi,
                plan.len().unwrap_or(0),
                width
            ),
            ChunkPlan::OffsetPages {
                start_offset,
                page_size,
            } => tracing::info!(
                "{}: county {}, paging distinct keys from offset {} ({} per page)",
                label,
                self.config.county_id,
                start_offset,
                page_size
            ),
        }
    }
}

/// Next checkpoint boundary after a committed partition.
fn next_boundary(part: &Partition) -> i64 {
    match part {
        Partition::Range { end, .. } => end + 1,
        Partition::Page { offset, limit } => offset + limit,
    }
}

fn make_progress_bar(label: &str, plan: &ChunkPlan) -> ProgressBar {
    let bar = match plan.len() {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} chunks")
                    .expect("Invalid progress bar template")
                    .progress_chars("█▓▒░"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} {pos} pages")
                    .expect("Invalid progress bar template"),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        }
    };
    bar.set_message(label.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_labels() {
        assert_eq!(SyncJob::Documents.label(), "documents");
        assert_eq!(
            SyncJob::Parties(PartySource::PrimeGrantor).label(),
            "party.prime_staging.grantor"
        );
    }

    #[test]
    fn test_next_boundary_after_range_chunk() {
        let part = Partition::Range {
            start: 0,
            end: 4_999,
        };
        assert_eq!(next_boundary(&part), 5_000);
    }

    #[test]
    fn test_next_boundary_after_page() {
        let part = Partition::Page {
            offset: 4_000,
            limit: 2_000,
        };
        assert_eq!(next_boundary(&part), 6_000);
    }

    #[test]
    fn test_resume_skips_committed_chunks() {
        // Restarting at the checkpoint boundary must cover exactly the
        // ranges an uninterrupted run would have covered from there.
        let full = ChunkPlan::IdRange {
            lo: 0,
            hi: 9_999,
            width: 5_000,
        };
        let full_chunks: Vec<Partition> = full.partitions().collect();
        assert_eq!(full_chunks.len(), 2);

        // First chunk committed at [0, 4999]; checkpoint says next = 5000
        let resumed = ChunkPlan::IdRange {
            lo: 5_000,
            hi: 9_999,
            width: 5_000,
        };
        let resumed_chunks: Vec<Partition> = resumed.partitions().collect();
        assert_eq!(resumed_chunks, full_chunks[1..].to_vec());
    }

    #[test]
    fn test_checkpoint_past_domain_end_yields_zero_chunks() {
        let plan = ChunkPlan::IdRange {
            lo: 10_000,
            hi: 9_999,
            width: 5_000,
        };
        assert_eq!(plan.partitions().count(), 0);
    }
}
