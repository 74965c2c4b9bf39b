//! File-based archive of fetched HTML pages.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;

use crate::models::DataType;

/// Sink for raw pages, called before every parse
pub trait HtmlArchive {
    /// Store a page and return where it went
    fn save(&self, category: DataType, code: &str, html: &str) -> Result<Option<PathBuf>>;
}

/// Archive that drops every page
pub struct NoArchive;

impl HtmlArchive for NoArchive {
    fn save(&self, _category: DataType, _code: &str, _html: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Archive writing `<root>/<category>/<code>[_<timestamp>].html`
pub struct FileArchive {
    base_dir: PathBuf,
}

impl FileArchive {
    /// Create an archive rooted at the given directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn category_dir(&self, category: DataType) -> PathBuf {
        self.base_dir.join(category.as_str())
    }

    /// Codes such as `pw01dud102020104001/A1` contain path separators
    fn file_stem(code: &str) -> String {
        let stem: String = code
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        if stem.is_empty() {
            "unknown".to_string()
        } else {
            stem
        }
    }

    fn archive_path(&self, category: DataType, code: &str, keep_history: bool) -> PathBuf {
        let stem = Self::file_stem(code);
        let name = if keep_history {
            format!("{}_{}.html", stem, Local::now().format("%Y%m%d_%H%M%S"))
        } else {
            format!("{}.html", stem)
        };
        self.category_dir(category).join(name)
    }

    /// Save with an explicit history policy
    pub fn save_with(
        &self,
        category: DataType,
        code: &str,
        html: &str,
        keep_history: bool,
    ) -> Result<PathBuf> {
        let dir = self.category_dir(category);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create archive dir {}", dir.display()))?;

        let path = self.archive_path(category, code, keep_history);
        std::fs::write(&path, html)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

impl HtmlArchive for FileArchive {
    fn save(&self, category: DataType, code: &str, html: &str) -> Result<Option<PathBuf>> {
        self.save_with(category, code, html, category.keeps_history())
            .map(Some)
    }
}
