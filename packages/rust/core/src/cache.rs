//! Metadata reuse from a previous run's record collection.

use std::collections::HashMap;

use bookmark_reorg_shared::{BookmarkRecord, PageMetadata};
use tracing::debug;

/// Copy metadata from `cached` onto records that have none, matching by URL.
///
/// When a URL appears several times in the cache, the first occurrence with
/// metadata wins. Returns the number of records filled.
pub fn reuse_metadata(records: &mut [BookmarkRecord], cached: &[BookmarkRecord]) -> usize {
    let mut by_url: HashMap<&str, &PageMetadata> = HashMap::new();
    for record in cached {
        if let Some(metadata) = &record.metadata {
            by_url.entry(record.url()).or_insert(metadata);
        }
    }

    let mut reused = 0;
    for record in records.iter_mut().filter(|r| r.metadata.is_none()) {
        if let Some(metadata) = by_url.get(record.url()) {
            record.metadata = Some((*metadata).clone());
            reused += 1;
        }
    }

    debug!(reused, cached = by_url.len(), "reused cached metadata");
    reused
}
