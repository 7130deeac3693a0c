//! Live page metadata enrichment.
//!
//! The [`Enricher`] selects the records of a collection that need metadata,
//! fetches their pages (sequentially for tiny working sets, through a bounded
//! [`WorkerPool`] otherwise) and writes results back by position, so the
//! collection's order is never disturbed.
//!
//! A page answering 401, 403 or 407 gets exactly one more try against its
//! domain root. A record whose fetch fails ends with no metadata on a forced
//! refresh, and keeps whatever it had otherwise.

pub mod extract;
pub mod fetch;
pub mod pool;

use std::sync::Arc;

use bookmark_reorg_shared::{BookmarkRecord, EnrichConfig, EnrichMode, ProgressReporter};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use extract::extract_metadata;
pub use fetch::{FetchResult, HttpFetcher, PageFetcher};
pub use pool::WorkerPool;

/// Options for one enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Which records to work on.
    pub mode: EnrichMode,
    /// Existing metadata is discarded even when a fetch fails.
    pub force_refresh: bool,
}

impl EnrichOptions {
    /// Refetch every record and clear metadata that could not be refreshed.
    pub fn forced() -> Self {
        Self {
            mode: EnrichMode::All,
            force_refresh: true,
        }
    }
}

/// How a pass dispatched its fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing needed fetching.
    #[default]
    Skipped,
    /// One fetch at a time.
    Sequential,
    /// Through a worker pool of the given size.
    Pooled { workers: usize },
}

/// Summary of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    /// Records in the working set.
    pub selected: usize,
    /// Records that received fresh metadata.
    pub enriched: usize,
    /// Pages fetched fine but carried no title, description or tags.
    pub empty: usize,
    /// Records whose fetch failed.
    pub failed: usize,
    /// Domain-root retries after an access-denied answer.
    pub fallback_attempts: usize,
    /// HTTP requests issued, fallbacks included.
    pub requests: usize,
    pub dispatch: Dispatch,
}

/// Result of fetching one record, root fallback included.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: FetchResult,
    pub requests: usize,
    pub fell_back: bool,
}

/// Metadata enrichment engine over a [`PageFetcher`].
pub struct Enricher<F> {
    fetcher: Arc<F>,
    config: EnrichConfig,
}

impl<F: PageFetcher + 'static> Enricher<F> {
    pub fn new(fetcher: F, config: EnrichConfig) -> Self {
        Self::with_shared(Arc::new(fetcher), config)
    }

    /// Build an enricher around a fetcher the caller keeps a handle to.
    pub fn with_shared(fetcher: Arc<F>, config: EnrichConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    /// Enrich `records` in place and report what happened.
    ///
    /// Fetch failures never abort the pass; they are logged and counted.
    #[instrument(skip_all, fields(records = records.len(), mode = %options.mode, force = options.force_refresh))]
    pub async fn enrich(
        &self,
        records: &mut [BookmarkRecord],
        options: EnrichOptions,
        progress: &dyn ProgressReporter,
    ) -> EnrichReport {
        let selected = working_set(records, options);
        let mut report = EnrichReport {
            selected: selected.len(),
            ..EnrichReport::default()
        };

        if selected.is_empty() {
            info!("no records need metadata");
            return report;
        }

        let outcomes = if selected.len() <= self.config.sequential_cutoff {
            report.dispatch = Dispatch::Sequential;
            self.fetch_sequential(records, &selected, progress).await
        } else {
            let workers = self.config.workers.max(1).min(selected.len());
            report.dispatch = Dispatch::Pooled { workers };
            self.fetch_pooled(records, &selected, workers, progress).await
        };

        for (index, outcome) in outcomes {
            let record = &mut records[index];
            let Some(outcome) = outcome else {
                report.failed += 1;
                clear_if_forced(record, options);
                continue;
            };

            report.requests += outcome.requests;
            if outcome.fell_back {
                report.fallback_attempts += 1;
            }

            match outcome.result {
                Ok(metadata) if !metadata.is_empty() => {
                    record.metadata = Some(metadata);
                    report.enriched += 1;
                }
                Ok(_) => {
                    debug!(url = record.url(), "page carried no usable metadata");
                    report.empty += 1;
                    clear_if_forced(record, options);
                }
                Err(e) => {
                    warn!(url = record.url(), error = %e, "metadata fetch failed");
                    report.failed += 1;
                    clear_if_forced(record, options);
                }
            }
        }

        info!(
            selected = report.selected,
            enriched = report.enriched,
            empty = report.empty,
            failed = report.failed,
            fallbacks = report.fallback_attempts,
            "enrichment pass complete"
        );
        report
    }

    async fn fetch_sequential(
        &self,
        records: &[BookmarkRecord],
        selected: &[usize],
        progress: &dyn ProgressReporter,
    ) -> Vec<(usize, Option<FetchOutcome>)> {
        let mut outcomes = Vec::with_capacity(selected.len());
        for (done, &index) in selected.iter().enumerate() {
            let url = records[index].url();
            let outcome = fetch_with_fallback(self.fetcher.as_ref(), url).await;
            progress.item(done + 1, selected.len(), url);
            outcomes.push((index, Some(outcome)));
        }
        outcomes
    }

    async fn fetch_pooled(
        &self,
        records: &[BookmarkRecord],
        selected: &[usize],
        workers: usize,
        progress: &dyn ProgressReporter,
    ) -> Vec<(usize, Option<FetchOutcome>)> {
        debug!(workers, jobs = selected.len(), "dispatching to worker pool");
        let mut pool = WorkerPool::new(workers);
        for &index in selected {
            let fetcher = Arc::clone(&self.fetcher);
            let url = records[index].url().to_string();
            pool.submit(index, async move {
                fetch_with_fallback(fetcher.as_ref(), &url).await
            });
        }

        let mut slots = pool
            .collect(records.len(), |done, total| {
                progress.item(done, total, "fetching page metadata")
            })
            .await;

        selected
            .iter()
            .map(|&index| (index, slots[index].take()))
            .collect()
    }
}

/// Positions of the records a pass works on, in collection order.
pub fn working_set(records: &[BookmarkRecord], options: EnrichOptions) -> Vec<usize> {
    let everything = options.force_refresh || options.mode == EnrichMode::All;
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| everything || record.metadata.is_none())
        .map(|(index, _)| index)
        .collect()
}

/// Fetch `url`, retrying once against the domain root on access denial.
pub async fn fetch_with_fallback<F: PageFetcher>(fetcher: &F, url: &str) -> FetchOutcome {
    match fetcher.fetch(url).await {
        Err(err) if err.is_access_denied() => match domain_root(url) {
            Some(root) => {
                debug!(%url, %root, status = ?err.status(), "access denied, trying domain root");
                FetchOutcome {
                    result: fetcher.fetch(&root).await,
                    requests: 2,
                    fell_back: true,
                }
            }
            None => FetchOutcome {
                result: Err(err),
                requests: 1,
                fell_back: false,
            },
        },
        result => FetchOutcome {
            result,
            requests: 1,
            fell_back: false,
        },
    }
}

/// `scheme://host[:port]/` of `url`, or `None` when `url` already is that
/// root or has no host.
pub fn domain_root(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;

    let mut root = parsed.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    // Only fails for cannot-be-a-base URLs, which have no host.
    let _ = root.set_username("");
    let _ = root.set_password(None);

    (root != parsed).then(|| root.to_string())
}

fn clear_if_forced(record: &mut BookmarkRecord, options: EnrichOptions) {
    if options.force_refresh {
        record.metadata = None;
    }
}
