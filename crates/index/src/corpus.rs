//! Corpus loader - walks the documentation directory

use crate::{IndexError, Result};
use docchat_core::DocumentRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

const DEFAULT_EXTENSION: &str = "md";

/// Reads every file with an accepted extension under a root directory
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl CorpusLoader {
    /// Create a loader accepting Markdown files only
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
        }
    }

    /// Replace the accepted extensions. Leading dots and case are ignored.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Load all matching documents, recursing into subdirectories.
    ///
    /// Files are returned in discovery order (sorted by name within each
    /// directory). Hidden entries and whitespace-only files are skipped.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn load(&self) -> Result<Vec<DocumentRecord>> {
        if !self.root.is_dir() {
            return Err(IndexError::CorpusNotFound(self.root.clone()));
        }

        let mut documents = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = entry.map_err(|e| IndexError::Io {
                path: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| self.root.display().to_string()),
                message: e.to_string(),
            })?;

            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let path = entry.path();
            let bytes = std::fs::read(path).map_err(|e| IndexError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();

            let document =
                DocumentRecord::new(path, relative, String::from_utf8_lossy(&bytes).into_owned());
            if !document.has_text() {
                debug!("Skipping empty document {}", document.relative_path);
                continue;
            }
            documents.push(document);
        }

        if documents.is_empty() {
            return Err(IndexError::EmptyCorpus {
                root: self.root.clone(),
                extensions: self.extensions.join(", "),
            });
        }

        info!("Loaded {} documents", documents.len());
        Ok(documents)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .map(|ext| self.extensions.iter().any(|accepted| *accepted == ext))
            .unwrap_or(false)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
