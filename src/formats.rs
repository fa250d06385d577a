//! Plain-text output for the crawler pipeline.

use crate::model::Book;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output format of the crawler subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Epub,
    Txt,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write the book's plain-text projection ([`Book::text`]) to `path`.
pub fn write_text(book: &Book, path: &Path) -> Result<(), FormatError> {
    let io_err = |e: std::io::Error| FormatError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    std::fs::write(path, book.text()).map_err(io_err)
}
