//! Source documents
//!
//! A [`Document`] is one eligible file from the corpus directory, held only
//! for the duration of an ingestion run. Paged formats keep their page
//! boundaries so chunks can point back at the page they came from.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// One text unit of a document: a PDF page, or the whole of a text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number, `None` for unpaged formats
    pub number: Option<usize>,
    pub text: String,
}

/// A loaded source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identifier, the file name
    pub source_id: String,
    pub path: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Total characters across all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// List eligible files in `dir`, sorted by file name.
///
/// Only regular files directly inside `dir` whose extension matches one of
/// `extensions` (case-insensitive) are returned.
pub fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = files.len(), "discovered documents");
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Load a document, picking the reader from the file extension.
///
/// Every failure is reported as [`Error::DocumentLoad`] naming the file.
pub fn load(path: &Path) -> Result<Document> {
    let source_id = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| load_error(path, "path has no file name"))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let pages = match extension.as_str() {
        "pdf" => load_pdf(path)?,
        _ => {
            let text = std::fs::read_to_string(path).map_err(|e| load_error(path, e))?;
            vec![Page { number: None, text }]
        }
    };

    Ok(Document {
        source_id,
        path: path.to_path_buf(),
        pages,
    })
}

fn load_pdf(path: &Path) -> Result<Vec<Page>> {
    // the PDF parser can panic on malformed input; contain it to this file
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        .map_err(|_| load_error(path, "pdf parser panicked"))?
        .map_err(|e| load_error(path, e))?;

    Ok(extracted
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: Some(i + 1),
            text,
        })
        .collect())
}

fn load_error(path: &Path, reason: impl ToString) -> Error {
    Error::DocumentLoad {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
