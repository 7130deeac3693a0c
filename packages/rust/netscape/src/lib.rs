//! Netscape bookmark file format: export parsing and reorganized rendering.

pub mod parser;
pub mod render;

pub use parser::{parse_bookmark_file, parse_bookmark_html};
pub use render::{FolderNode, UNSORTED_FOLDER, build_tree, folder_for, render_html, write_html};
