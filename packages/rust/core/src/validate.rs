//! Cross-stage validation of a reorganized collection against the original.
//!
//! The validator only reads; a non-empty report is advisory unless the
//! caller decides otherwise.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bookmark_reorg_shared::BookmarkRecord;
use tracing::{debug, instrument};

/// The independent checks a report can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Check {
    /// Same URLs with the same multiplicities.
    UrlMultiset,
    /// Every record has a non-empty proposed location.
    Location,
    /// Each folder lists its bookmarks in original order and no record is
    /// lost or repeated.
    Grouping,
    /// No location is deeper than the configured maximum.
    Depth,
    /// The saved collection and its rendered file hold the same bookmarks.
    Collection,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UrlMultiset => "url-multiset",
            Self::Location => "location",
            Self::Grouping => "grouping",
            Self::Depth => "depth",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub check: Check,
    /// Position in the reorganized collection, when one record is at fault.
    pub index: Option<usize>,
    pub url: Option<String>,
    pub detail: String,
}

impl Violation {
    fn new(check: Check, detail: impl Into<String>) -> Self {
        Self {
            check,
            index: None,
            url: None,
            detail: detail.into(),
        }
    }

    fn at(mut self, index: usize, record: &BookmarkRecord) -> Self {
        self.index = Some(index);
        self.url = Some(record.url().to_string());
        self
    }

    fn for_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.check)?;
        if let Some(index) = self.index {
            write!(f, " #{index}")?;
        }
        if let Some(url) = &self.url {
            write!(f, " {url}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Outcome of one validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Records in the reorganized collection.
    pub checked: usize,
    /// Checks that were run.
    pub checks: Vec<Check>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations_of(&self, check: Check) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.check == check)
    }
}

/// Validates reorganized collections against their source.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_folder_depth: usize,
}

impl Validator {
    pub fn new(max_folder_depth: usize) -> Self {
        Self {
            max_folder_depth: max_folder_depth.max(1),
        }
    }

    pub fn max_folder_depth(&self) -> usize {
        self.max_folder_depth
    }

    /// Run every check. `require_locations` enables [`Check::Location`].
    #[instrument(skip_all, fields(original = original.len(), reorganized = reorganized.len()))]
    pub fn validate(
        &self,
        original: &[BookmarkRecord],
        reorganized: &[BookmarkRecord],
        require_locations: bool,
    ) -> ValidationReport {
        let mut report = ValidationReport {
            checked: reorganized.len(),
            ..ValidationReport::default()
        };

        report.checks.push(Check::UrlMultiset);
        check_url_multiset(Check::UrlMultiset, original, reorganized, &mut report.violations);

        if require_locations {
            report.checks.push(Check::Location);
            for (index, record) in reorganized.iter().enumerate() {
                if !record.has_location() {
                    report.violations.push(
                        Violation::new(Check::Location, "no location_after").at(index, record),
                    );
                }
            }
        }

        report.checks.push(Check::Grouping);
        check_grouping(original, reorganized, &mut report.violations);

        report.checks.push(Check::Depth);
        for (index, record) in reorganized.iter().enumerate() {
            if let Some(location) = record
                .location()
                .filter(|location| location.len() > self.max_folder_depth)
            {
                report.violations.push(
                    Violation::new(
                        Check::Depth,
                        format!(
                            "location '{}' is {} levels deep (max {})",
                            location.join("/"),
                            location.len(),
                            self.max_folder_depth
                        ),
                    )
                    .at(index, record),
                );
            }
        }

        debug!(violations = report.violations.len(), "validation finished");
        report
    }

    /// Compare the saved collection with the records read back from its
    /// rendered file: same count, same URLs with the same multiplicities.
    #[instrument(skip_all, fields(collection = collection.len(), rendered = rendered.len()))]
    pub fn cross_check(
        &self,
        collection: &[BookmarkRecord],
        rendered: &[BookmarkRecord],
        report: &mut ValidationReport,
    ) {
        report.checks.push(Check::Collection);
        if collection.len() != rendered.len() {
            report.violations.push(Violation::new(
                Check::Collection,
                format!(
                    "saved collection has {} records, rendered file has {}",
                    collection.len(),
                    rendered.len()
                ),
            ));
        }
        check_url_multiset(Check::Collection, collection, rendered, &mut report.violations);
    }
}

/// Every folder of `reorganized` must list its bookmarks as a subsequence of
/// the original order, and together the folders must hold every record.
fn check_grouping(
    original: &[BookmarkRecord],
    reorganized: &[BookmarkRecord],
    violations: &mut Vec<Violation>,
) {
    if original.len() != reorganized.len() {
        violations.push(Violation::new(
            Check::Grouping,
            format!(
                "folders hold {} records, original has {}",
                reorganized.len(),
                original.len()
            ),
        ));
    }

    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (position, record) in original.iter().enumerate() {
        positions.entry(record.url()).or_default().push(position);
    }

    let mut folders: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, record) in reorganized.iter().enumerate() {
        let path = record.location().unwrap_or(record.folder_path_before());
        folders.entry(path.join("/")).or_default().push(index);
    }

    for (folder, members) in &folders {
        let mut next = 0;
        for &index in members {
            let record = &reorganized[index];
            let matched = positions.get(record.url()).and_then(|candidates| {
                let at = candidates.partition_point(|&p| p < next);
                candidates.get(at).copied()
            });
            match matched {
                Some(position) => next = position + 1,
                None => violations.push(
                    Violation::new(
                        Check::Grouping,
                        format!("folder '{folder}' lists this bookmark out of original order"),
                    )
                    .at(index, record),
                ),
            }
        }
    }
}

fn check_url_multiset(
    check: Check,
    original: &[BookmarkRecord],
    reorganized: &[BookmarkRecord],
    violations: &mut Vec<Violation>,
) {
    let expected = url_counts(original);
    let actual = url_counts(reorganized);

    for (url, &want) in &expected {
        let have = actual.get(url).copied().unwrap_or(0);
        if have < want {
            violations.push(
                Violation::new(check, format!("missing {} of {want} occurrence(s)", want - have))
                    .for_url(url),
            );
        }
    }
    for (url, &have) in &actual {
        let want = expected.get(url).copied().unwrap_or(0);
        if have > want {
            violations.push(
                Violation::new(
                    check,
                    format!("{} extra occurrence(s), expected {want}", have - want),
                )
                .for_url(url),
            );
        }
    }
}

fn url_counts(records: &[BookmarkRecord]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.url()).or_insert(0) += 1;
    }
    counts
}
