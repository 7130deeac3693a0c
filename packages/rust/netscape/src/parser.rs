//! Netscape bookmark export parser.
//!
//! Browsers export bookmarks as loosely structured HTML:
//! - folders are `<DT><H3>Name</H3>` followed by a nested `<DL>`
//! - bookmarks are `<DT><A HREF="...">Title</A>`
//!
//! The HTML5 tree builder nests each folder's `<DL>` inside its `<DT>`, so a
//! bookmark's folder path is the `<H3>` of every enclosing `<DT>`.

use std::path::Path;
use std::sync::LazyLock;

use bookmark_reorg_shared::{BookmarkRecord, ReorgError, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Selectors (compiled once)
// ---------------------------------------------------------------------------

static DL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dl").expect("dl selector"));

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a bookmark export into records, in document order.
///
/// Anchors with a blank `href` are skipped. A document without any `<DL>` is
/// not a bookmark export.
pub fn parse_bookmark_html(html: &str) -> Result<Vec<BookmarkRecord>> {
    let document = Html::parse_document(html);

    let root = document
        .select(&DL)
        .next()
        .ok_or_else(|| ReorgError::parse("bookmark export has no <DL> root element"))?;

    let mut records = Vec::new();
    for anchor in root.select(&ANCHOR) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            debug!("skipping anchor with empty href");
            continue;
        }

        let title = normalize(&anchor.text().collect::<String>());
        records.push(BookmarkRecord::new(href, title, folder_path(anchor)));
    }

    info!(records = records.len(), "parsed bookmark export");
    Ok(records)
}

/// Read and parse a bookmark export file.
pub fn parse_bookmark_file(path: &Path) -> Result<Vec<BookmarkRecord>> {
    debug!(path = %path.display(), "reading bookmark export");
    let html = std::fs::read_to_string(path).map_err(|e| ReorgError::io(path, e))?;
    parse_bookmark_html(&html)
}

/// Folder names enclosing `anchor`, outermost first.
fn folder_path(anchor: ElementRef<'_>) -> Vec<String> {
    let mut path: Vec<String> = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "dt")
        .filter_map(|dt| {
            dt.children()
                .filter_map(ElementRef::wrap)
                .find(|child| child.value().name() == "h3")
        })
        .map(|h3| normalize(&h3.text().collect::<String>()))
        .filter(|name| !name.is_empty())
        .collect();
    path.reverse();
    path
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
