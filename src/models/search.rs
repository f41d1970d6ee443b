use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::file_entry::DirectoryEntry;

/// What a search should match. Only files match unless
/// `include_directories` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub name_substring: Option<String>,
    /// With or without the leading dot; compared case-insensitively.
    pub extension: Option<String>,
    /// Also match directories by name. Ignored when an extension is given.
    #[serde(default)]
    pub include_directories: bool,
}

impl SearchQuery {
    pub fn name(substring: impl Into<String>) -> Self {
        Self {
            name_substring: Some(substring.into()),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn with_directories(mut self) -> Self {
        self.include_directories = true;
        self
    }

    pub(crate) fn matcher(&self) -> QueryMatcher {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        };
        QueryMatcher {
            needle: non_empty(&self.name_substring),
            suffix: non_empty(&self.extension)
                .map(|ext| format!(".{}", ext.trim_start_matches('.'))),
            include_directories: self.include_directories,
        }
    }
}

/// Lowercased form of a query, built once per walk.
#[derive(Debug, Clone)]
pub(crate) struct QueryMatcher {
    needle: Option<String>,
    suffix: Option<String>,
    include_directories: bool,
}

impl QueryMatcher {
    pub fn matches(&self, name: &str, is_dir: bool) -> bool {
        if is_dir && (!self.include_directories || self.suffix.is_some()) {
            return false;
        }
        let lower = name.to_lowercase();
        if let Some(needle) = &self.needle {
            if !lower.contains(needle.as_str()) {
                return false;
            }
        }
        match &self.suffix {
            Some(suffix) => lower.ends_with(suffix.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPath {
    pub path: Option<PathBuf>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchReport {
    pub entries: Vec<DirectoryEntry>,
    pub skipped: Vec<SkippedPath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_matches_every_file() {
        let m = SearchQuery::default().matcher();
        assert!(m.matches("anything.txt", false));
        assert!(!m.matches("dir", true));
        let m = SearchQuery::default().with_directories().matcher();
        assert!(m.matches("dir", true));
    }

    #[test]
    fn name_match_is_case_insensitive() {
        let m = SearchQuery::name("Report").matcher();
        assert!(m.matches("q3_REPORT.pdf", false));
        assert!(!m.matches("reports", true));
        assert!(!m.matches("summary.pdf", false));

        let m = SearchQuery::name("Report").with_directories().matcher();
        assert!(m.matches("reports", true));
    }

    #[test]
    fn extension_accepts_leading_dot_and_multi_part() {
        let m = SearchQuery::default().with_extension(".TXT").matcher();
        assert!(m.matches("a.txt", false));
        assert!(!m.matches("atxt", false));

        let m = SearchQuery::default().with_extension("tar.gz").matcher();
        assert!(m.matches("backup.TAR.GZ", false));
        assert!(!m.matches("backup.gz", false));
    }

    #[test]
    fn extension_filter_excludes_directories() {
        let m = SearchQuery::default()
            .with_extension("d")
            .with_directories()
            .matcher();
        assert!(!m.matches("conf.d", true));
        assert!(m.matches("conf.d", false));
    }

    #[test]
    fn blank_fields_are_ignored() {
        let q = SearchQuery {
            name_substring: Some("  ".to_string()),
            extension: Some(String::new()),
            include_directories: true,
        };
        assert!(q.matcher().matches("x", true));
    }

    #[test]
    fn missing_directory_flag_deserializes_as_files_only() {
        let q: SearchQuery =
            serde_json::from_str(r#"{"name_substring":"a","extension":null}"#).unwrap();
        assert!(!q.include_directories);
    }
}
