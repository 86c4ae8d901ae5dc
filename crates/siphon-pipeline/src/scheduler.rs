//! Batch partitioning and scheduling.
//!
//! Entries are dealt round-robin into `batch_count` batches, so files from
//! one server spread across batches instead of clumping. Batches run as
//! tokio tasks gated by a semaphore sized to the worker pool, each with a
//! wall-clock timeout. A batch fails as a unit only when something escapes
//! all per-file handling: a timeout, a panic, or an unusable staging root.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use siphon_core::{Config, SourceEntry, SourceList};
use siphon_storage::BlobStore;
use tokio::sync::Semaphore;

use crate::handler::{EntryHandler, EntryStats};

/// Deal entries round-robin into at most `batch_count` batches. Empty
/// batches are dropped, so fewer entries than batches yields singletons.
pub fn partition_batches(entries: Vec<SourceEntry>, batch_count: usize) -> Vec<Vec<SourceEntry>> {
    let batch_count = batch_count.max(1);
    let mut batches: Vec<Vec<SourceEntry>> = vec![Vec::new(); batch_count];
    for (index, entry) in entries.into_iter().enumerate() {
        batches[index % batch_count].push(entry);
    }
    batches.retain(|batch| !batch.is_empty());
    batches
}

/// How one batch ended.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub success: bool,
    pub elapsed_secs: f64,
    pub stats: EntryStats,
}

/// Run summary across all batches.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub batches: Vec<BatchOutcome>,
    pub totals: EntryStats,
}

impl IngestReport {
    pub fn succeeded_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.success).count()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches.len() - self.succeeded_batches()
    }
}

/// Run the full ingest: partition, schedule, tally.
pub async fn run_ingest(
    config: &Config,
    store: Arc<dyn BlobStore>,
    sources: &SourceList,
) -> anyhow::Result<IngestReport> {
    let handler = EntryHandler::new(store.clone(), config.download_root.clone());
    run_ingest_with_handler(config, store, handler, sources).await
}

/// As [`run_ingest`], with an explicit entry handler. Tests inject handlers
/// carrying a fixed fetcher through this.
pub async fn run_ingest_with_handler(
    config: &Config,
    store: Arc<dyn BlobStore>,
    handler: EntryHandler,
    sources: &SourceList,
) -> anyhow::Result<IngestReport> {
    store
        .ensure_container()
        .await
        .map_err(|e| anyhow::anyhow!("Prepare destination container: {e}"))?;

    let entries = sources.entries();
    let batches = partition_batches(entries, config.batch_count);
    tracing::info!(
        batches = batches.len(),
        worker_pool = config.worker_pool_size,
        fetch_concurrency = config.fetch_concurrency,
        "Starting ingest"
    );

    let semaphore = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
    let timeout = Duration::from_secs(config.worker_timeout_secs);

    let mut tasks = Vec::with_capacity(batches.len());
    for (index, batch) in batches.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let handler = handler.clone();
        let fetch_concurrency = config.fetch_concurrency;

        tasks.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(batch = index + 1, "Worker pool closed unexpectedly");
                    return BatchOutcome {
                        index,
                        success: false,
                        elapsed_secs: 0.0,
                        stats: EntryStats::default(),
                    };
                }
            };
            run_batch(index, batch, handler, fetch_concurrency, timeout).await
        }));
    }

    let mut report = IngestReport {
        batches: Vec::with_capacity(tasks.len()),
        totals: EntryStats::default(),
    };

    for (index, task) in tasks.into_iter().enumerate() {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(batch = index + 1, error = %e, "Batch task panicked");
                BatchOutcome {
                    index,
                    success: false,
                    elapsed_secs: 0.0,
                    stats: EntryStats::default(),
                }
            }
        };
        report.totals.absorb(outcome.stats);
        report.batches.push(outcome);
    }

    tracing::info!(
        succeeded = report.succeeded_batches(),
        failed = report.failed_batches(),
        uploaded = report.totals.uploaded,
        skipped = report.totals.skipped,
        file_failures = report.totals.failed,
        "Ingest finished"
    );

    Ok(report)
}

async fn run_batch(
    index: usize,
    batch: Vec<SourceEntry>,
    handler: EntryHandler,
    fetch_concurrency: usize,
    timeout: Duration,
) -> BatchOutcome {
    let files = batch.len();
    tracing::info!(batch = index + 1, files, "Batch started");
    let start = std::time::Instant::now();

    let result = tokio::time::timeout(
        timeout,
        process_batch(&handler, &batch, fetch_concurrency),
    )
    .await;

    let elapsed_secs = start.elapsed().as_secs_f64();
    match result {
        Ok(Ok(stats)) => {
            tracing::info!(
                batch = index + 1,
                files,
                uploaded = stats.uploaded,
                skipped = stats.skipped,
                failed = stats.failed,
                elapsed_secs,
                "Batch completed"
            );
            BatchOutcome {
                index,
                success: true,
                elapsed_secs,
                stats,
            }
        }
        Ok(Err(e)) => {
            tracing::error!(batch = index + 1, error = %e, "Batch failed");
            BatchOutcome {
                index,
                success: false,
                elapsed_secs,
                stats: EntryStats::default(),
            }
        }
        Err(_) => {
            tracing::error!(batch = index + 1, timeout_secs = timeout.as_secs(), "Batch timed out");
            BatchOutcome {
                index,
                success: false,
                elapsed_secs,
                stats: EntryStats::default(),
            }
        }
    }
}

/// Process every entry of a batch, sequentially or under a concurrency
/// bound. Per-entry failures are already absorbed by the handler; the only
/// error here is an unusable staging root.
async fn process_batch(
    handler: &EntryHandler,
    batch: &[SourceEntry],
    fetch_concurrency: usize,
) -> anyhow::Result<EntryStats> {
    tokio::fs::create_dir_all(handler.download_root())
        .await
        .with_context(|| {
            format!("Create staging root {}", handler.download_root().display())
        })?;

    let mut totals = EntryStats::default();

    if fetch_concurrency <= 1 {
        for entry in batch {
            totals.absorb(handler.handle_entry(entry).await);
        }
    } else {
        let gate = Arc::new(Semaphore::new(fetch_concurrency));
        let futures = batch.iter().map(|entry| {
            let gate = gate.clone();
            async move {
                let _permit = match gate.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return EntryStats::failed_one(),
                };
                handler.handle_entry(entry).await
            }
        });
        for stats in futures::future::join_all(futures).await {
            totals.absorb(stats);
        }
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<SourceEntry> {
        (0..n)
            .map(|i| SourceEntry {
                server: "ftp://host.example.com".to_string(),
                remote_path: format!("/file{i}.csv"),
            })
            .collect()
    }

    #[test]
    fn partition_deals_round_robin() {
        let batches = partition_batches(entries(7), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 2);
        // Entry i lands in batch i % 3.
        assert_eq!(batches[0][1].remote_path, "/file3.csv");
        assert_eq!(batches[2][0].remote_path, "/file2.csv");
    }

    #[test]
    fn partition_drops_empty_batches() {
        let batches = partition_batches(entries(2), 10);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn partition_of_nothing_is_nothing() {
        assert!(partition_batches(Vec::new(), 5).is_empty());
    }

    #[test]
    fn partition_tolerates_zero_batch_count() {
        let batches = partition_batches(entries(3), 0);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }
}
