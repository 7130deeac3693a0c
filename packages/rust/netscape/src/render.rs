//! Netscape bookmark HTML renderer.
//!
//! Records are grouped into a folder tree by their proposed location. Folders
//! are emitted before bookmarks and sorted case-insensitively; bookmarks keep
//! collection order inside their folder.

use std::path::Path;

use bookmark_reorg_shared::{BookmarkRecord, ReorgError, Result};
use html_escape::{encode_double_quoted_attribute, encode_text};
use tracing::info;

const HEADER: &str = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<!-- This is an automatically generated file.
     It will be read and overwritten.
     DO NOT EDIT! -->
<META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=UTF-8">
<TITLE>Bookmarks</TITLE>
<H1>Bookmarks</H1>"#;

/// Folder used for records that have no folder at all.
pub const UNSORTED_FOLDER: &str = "Unsorted";

// ---------------------------------------------------------------------------
// Folder tree
// ---------------------------------------------------------------------------

/// One folder of the rendered hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderNode {
    pub name: String,
    /// Subfolders, sorted case-insensitively.
    pub children: Vec<FolderNode>,
    /// Positions of the bookmarks filed here, in collection order.
    pub bookmarks: Vec<usize>,
}

impl FolderNode {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn child_mut(&mut self, name: &str) -> &mut FolderNode {
        let position = match self.children.iter().position(|c| c.name == name) {
            Some(position) => position,
            None => {
                self.children.push(FolderNode::named(name));
                self.children.len() - 1
            }
        };
        &mut self.children[position]
    }

    fn sort(&mut self) {
        self.children.sort_by(|a, b| {
            (a.name.to_lowercase(), &a.name).cmp(&(b.name.to_lowercase(), &b.name))
        });
        for child in &mut self.children {
            child.sort();
        }
    }

    /// Every folder below this one with its path, depth first in render order.
    pub fn folders(&self) -> Vec<(Vec<String>, &FolderNode)> {
        let mut out = Vec::new();
        self.collect_folders(&mut Vec::new(), &mut out);
        out
    }

    fn collect_folders<'a>(
        &'a self,
        path: &mut Vec<String>,
        out: &mut Vec<(Vec<String>, &'a FolderNode)>,
    ) {
        for child in &self.children {
            path.push(child.name.clone());
            out.push((path.clone(), child));
            child.collect_folders(path, out);
            path.pop();
        }
    }

    /// Bookmark positions in render order.
    pub fn render_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        self.collect_order(&mut order);
        order
    }

    fn collect_order(&self, order: &mut Vec<usize>) {
        for child in &self.children {
            child.collect_order(order);
        }
        order.extend(&self.bookmarks);
    }

    /// Deepest folder nesting below this node.
    pub fn depth(&self) -> usize {
        self.children.iter().map(|c| c.depth() + 1).max().unwrap_or(0)
    }
}

/// The folder path a record is filed under: its proposed location, else its
/// original folders, else [`UNSORTED_FOLDER`]; trimmed to `max_depth`.
pub fn folder_for(record: &BookmarkRecord, max_depth: usize) -> Vec<String> {
    let mut path = record.location().map(clean_path).unwrap_or_default();
    if path.is_empty() {
        path = clean_path(record.folder_path_before());
    }
    if path.is_empty() {
        path = vec![UNSORTED_FOLDER.to_string()];
    }
    path.truncate(max_depth.max(1));
    path
}

fn clean_path(path: &[String]) -> Vec<String> {
    path.iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Group records into the folder tree the renderer emits.
pub fn build_tree(records: &[BookmarkRecord], max_depth: usize) -> FolderNode {
    let mut root = FolderNode::named("Bookmarks");
    for (index, record) in records.iter().enumerate() {
        let mut node = &mut root;
        for segment in folder_for(record, max_depth) {
            node = node.child_mut(&segment);
        }
        node.bookmarks.push(index);
    }
    root.sort();
    root
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the reorganized bookmark file.
///
/// Every record must carry a proposed location; otherwise nothing is rendered
/// and a precondition error is returned. `add_date` is stamped on every entry
/// (unix seconds).
pub fn render_html(records: &[BookmarkRecord], max_depth: usize, add_date: i64) -> Result<String> {
    let unplaced = records.iter().filter(|r| !r.has_location()).count();
    if unplaced > 0 {
        return Err(ReorgError::precondition(format!(
            "{unplaced} of {} records have no location_after; run the llm stage first",
            records.len()
        )));
    }

    let tree = build_tree(records, max_depth);
    let mut lines = vec![HEADER.to_string(), "<DL><p>".to_string()];
    render_node(&tree, records, add_date, 1, &mut lines);
    lines.push("</DL><p>".to_string());

    let mut html = lines.join("\n");
    html.push('\n');
    Ok(html)
}

fn render_node(
    node: &FolderNode,
    records: &[BookmarkRecord],
    add_date: i64,
    depth: usize,
    lines: &mut Vec<String>,
) {
    let indent = "    ".repeat(depth);

    for folder in &node.children {
        lines.push(format!(
            r#"{indent}<DT><H3 ADD_DATE="{add_date}">{}</H3>"#,
            encode_text(&folder.name)
        ));
        lines.push(format!("{indent}<DL><p>"));
        render_node(folder, records, add_date, depth + 1, lines);
        lines.push(format!("{indent}</DL><p>"));
    }

    for &index in &node.bookmarks {
        let record = &records[index];
        let tags = record
            .tags_after
            .as_deref()
            .filter(|tags| !tags.is_empty())
            .map(|tags| format!(r#" TAGS="{}""#, encode_double_quoted_attribute(&tags.join(","))))
            .unwrap_or_default();

        lines.push(format!(
            r#"{indent}<DT><A HREF="{}" ADD_DATE="{add_date}"{tags}>{}</A>"#,
            encode_double_quoted_attribute(record.url()),
            encode_text(record.display_title())
        ));
    }
}

/// Render and write the reorganized bookmark file, stamped with the current time.
///
/// Nothing is written when rendering fails.
pub fn write_html(records: &[BookmarkRecord], path: &Path, max_depth: usize) -> Result<()> {
    let html = render_html(records, max_depth, chrono::Utc::now().timestamp())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ReorgError::io(parent, e))?;
    }
    std::fs::write(path, html).map_err(|e| ReorgError::io(path, e))?;

    info!(records = records.len(), path = %path.display(), "wrote reorganized bookmarks");
    Ok(())
}
