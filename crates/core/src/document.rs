//! Document records - the raw corpus files handed to the index builder

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single corpus file as read from disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Full path of the file
    pub path: String,

    /// Path relative to the corpus root, used as the display title
    pub relative_path: String,

    /// Raw file contents
    pub text: String,

    /// Lowercased extension without the leading dot (e.g. `md`)
    pub extension: String,
}

impl DocumentRecord {
    /// Create a record, deriving the extension from `path`
    pub fn new(
        path: impl AsRef<Path>,
        relative_path: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            path: path.to_string_lossy().into_owned(),
            relative_path: relative_path.into(),
            text: text.into(),
            extension,
        }
    }

    /// Check if the document has any non-whitespace text
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        let doc = DocumentRecord::new("/docs/usage/Install.MD", "usage/Install.MD", "# Install");

        assert_eq!(doc.extension, "md");
        assert_eq!(doc.relative_path, "usage/Install.MD");
        assert!(doc.has_text());
    }

    #[test]
    fn test_missing_extension() {
        let doc = DocumentRecord::new("/docs/LICENSE", "LICENSE", "  \n");

        assert_eq!(doc.extension, "");
        assert!(!doc.has_text());
    }
}
