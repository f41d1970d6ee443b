use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Result;
use crate::models::file_entry::DirectoryEntry;
use crate::models::search::{QueryMatcher, SearchQuery, SearchReport, SkippedPath};
use crate::services::navigator::PathNavigator;

/// Recursive name/extension search over a directory subtree.
#[derive(Debug, Clone)]
pub struct FileSearchEngine {
    max_depth: Option<usize>,
    follow_symlinks: bool,
    show_hidden: bool,
}

impl Default for FileSearchEngine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl FileSearchEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            max_depth: config.search.max_depth,
            follow_symlinks: config.search.follow_symlinks,
            show_hidden: config.show_hidden,
        }
    }

    /// Start a lazy walk of `root`. The root itself is validated up front;
    /// failures below it are recorded on the returned iterator instead.
    pub fn search(&self, root: impl AsRef<Path>, query: &SearchQuery) -> Result<Search> {
        let root = PathNavigator::default().resolve_directory(root)?;

        let mut walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(self.follow_symlinks);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut visited = HashSet::new();
        if self.follow_symlinks {
            if let Ok(real) = fs::canonicalize(&root) {
                visited.insert(real);
            }
        }

        tracing::debug!(root = %root.display(), ?query, "starting search");

        Ok(Search {
            walker: walker.into_iter(),
            matcher: query.matcher(),
            visited,
            skipped: Vec::new(),
            follow_symlinks: self.follow_symlinks,
            show_hidden: self.show_hidden,
        })
    }

    pub fn search_all(&self, root: impl AsRef<Path>, query: &SearchQuery) -> Result<SearchReport> {
        Ok(self.search(root, query)?.into_report())
    }
}

/// Iterator over matches. Each `search` call builds a fresh one; nothing is
/// cached between walks.
pub struct Search {
    walker: walkdir::IntoIter,
    matcher: QueryMatcher,
    /// Real paths of directories already descended into.
    visited: HashSet<PathBuf>,
    skipped: Vec<SkippedPath>,
    follow_symlinks: bool,
    show_hidden: bool,
}

impl Search {
    /// Subtrees that could not be read so far.
    pub fn skipped(&self) -> &[SkippedPath] {
        &self.skipped
    }

    pub fn into_report(mut self) -> SearchReport {
        let entries = self.by_ref().collect();
        SearchReport {
            entries,
            skipped: self.skipped,
        }
    }

    fn skip(&mut self, path: Option<PathBuf>, message: String) {
        tracing::debug!(path = ?path, %message, "skipping unreadable path");
        self.skipped.push(SkippedPath { path, message });
    }

    /// Returns false when this directory's real path was already walked.
    fn first_visit(&mut self, path: &Path) -> bool {
        if !self.follow_symlinks {
            return true;
        }
        match fs::canonicalize(path) {
            Ok(real) => self.visited.insert(real),
            Err(e) => {
                self.skip(Some(path.to_path_buf()), e.to_string());
                false
            }
        }
    }

    /// Build the entry for a walked path if it passes the filters.
    fn matching(
        &self,
        path: PathBuf,
        metadata: &fs::Metadata,
        is_symlink: bool,
    ) -> Option<DirectoryEntry> {
        let entry = DirectoryEntry::from_metadata(path, metadata, is_symlink);
        if !self.show_hidden && entry.name.starts_with('.') {
            return None;
        }
        self.matcher
            .matches(&entry.name, entry.is_directory())
            .then_some(entry)
    }
}

impl Iterator for Search {
    type Item = DirectoryEntry;

    fn next(&mut self) -> Option<DirectoryEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(ancestor) = err.loop_ancestor() {
                        tracing::debug!(ancestor = %ancestor.display(), "symlink cycle skipped");
                    } else if let Some((path, metadata)) = broken_link(&err) {
                        if let Some(found) = self.matching(path, &metadata, true) {
                            return Some(found);
                        }
                    } else {
                        let path = err.path().map(Path::to_path_buf);
                        self.skip(path, err.to_string());
                    }
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            // Whether the walker will descend, not what the entry resolves to.
            let descends = entry.file_type().is_dir();

            if !self.show_hidden && name.starts_with('.') {
                if descends {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if descends && !self.first_visit(entry.path()) {
                self.walker.skip_current_dir();
                continue;
            }

            let is_symlink = entry.path_is_symlink();
            // Unfollowed links still report the kind of their target.
            let metadata: std::io::Result<fs::Metadata> = if is_symlink && !self.follow_symlinks {
                fs::metadata(entry.path()).or_else(|_| entry.metadata().map_err(Into::into))
            } else {
                entry.metadata().map_err(Into::into)
            };
            match metadata {
                Ok(metadata) => {
                    if let Some(found) = self.matching(entry.into_path(), &metadata, is_symlink) {
                        return Some(found);
                    }
                }
                Err(e) => self.skip(Some(entry.into_path()), e.to_string()),
            }
        }
    }
}

/// A followed link whose target is missing. It is reported with the link's
/// own metadata, as a file, the same way a listing shows it.
fn broken_link(err: &walkdir::Error) -> Option<(PathBuf, fs::Metadata)> {
    let path = err.path()?;
    let link = fs::symlink_metadata(path).ok()?;
    if !link.file_type().is_symlink() || fs::metadata(path).is_ok() {
        return None;
    }
    Some((path.to_path_buf(), link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn build_tree(dir: &Path) {
        fs::create_dir_all(dir.join("docs/reports")).unwrap();
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::create_dir_all(dir.join(".cache")).unwrap();
        fs::write(dir.join("docs/Report-2024.TXT"), "r").unwrap();
        fs::write(dir.join("docs/reports/q1.txt"), "q1").unwrap();
        fs::write(dir.join("docs/reports/q1.md"), "q1").unwrap();
        fs::write(dir.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.join(".cache/report.txt"), "c").unwrap();
    }

    fn sorted_names(entries: &[DirectoryEntry]) -> Vec<String> {
        let mut names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_search_by_name_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());

        let results: Vec<_> = FileSearchEngine::default()
            .search(temp.path(), &SearchQuery::name("report"))
            .unwrap()
            .collect();

        assert_eq!(sorted_names(&results), vec!["Report-2024.TXT", "report.txt"]);
        assert!(results
            .iter()
            .all(|e| e.name.to_lowercase().contains("report")));
    }

    #[test]
    fn test_search_can_include_directories() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());

        let results: Vec<_> = FileSearchEngine::default()
            .search(temp.path(), &SearchQuery::name("report").with_directories())
            .unwrap()
            .collect();

        assert_eq!(
            sorted_names(&results),
            vec!["Report-2024.TXT", "report.txt", "reports"]
        );
        let reports = results.iter().find(|e| e.name == "reports").unwrap();
        assert!(reports.is_directory());
    }

    #[test]
    fn test_search_by_extension_only_matches_files() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());

        let report = FileSearchEngine::default()
            .search_all(temp.path(), &SearchQuery::default().with_extension("txt"))
            .unwrap();

        assert_eq!(
            sorted_names(&report.entries),
            vec!["Report-2024.TXT", "q1.txt", "report.txt"]
        );
        assert!(report.entries.iter().all(|e| !e.is_directory()));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_search_combines_name_and_extension() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());

        let query = SearchQuery::name("q1").with_extension("md");
        let results: Vec<_> = FileSearchEngine::default()
            .search(temp.path(), &query)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, temp.path().join("docs/reports/q1.md"));
        assert_eq!(results[0].size_bytes, Some(2));
    }

    #[test]
    fn test_search_respects_hidden_and_depth_config() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());

        let config = Config {
            show_hidden: false,
            search: crate::config::SearchConfig {
                max_depth: Some(2),
                follow_symlinks: true,
            },
            ..Config::default()
        };
        let results: Vec<_> = FileSearchEngine::new(&config)
            .search(temp.path(), &SearchQuery::default().with_extension("txt"))
            .unwrap()
            .collect();

        assert_eq!(sorted_names(&results), vec!["Report-2024.TXT"]);
    }

    #[test]
    fn test_search_is_restartable() {
        let temp = TempDir::new().unwrap();
        build_tree(temp.path());
        let engine = FileSearchEngine::default();
        let query = SearchQuery::name("q1");

        let first = engine.search(temp.path(), &query).unwrap().count();
        fs::write(temp.path().join("src/q1_notes.txt"), "n").unwrap();
        let second = engine.search(temp.path(), &query).unwrap().count();

        assert_eq!(first, 2);
        assert_eq!(second, 3);
    }

    #[test]
    fn test_search_root_errors() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file.txt"), "x").unwrap();
        let engine = FileSearchEngine::default();

        let err = engine
            .search(temp.path().join("missing"), &SearchQuery::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = engine
            .search(temp.path().join("file.txt"), &SearchQuery::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_terminates_on_symlink_cycle() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        fs::create_dir_all(a.join("inner")).unwrap();
        fs::write(a.join("inner/x.txt"), "x").unwrap();
        symlink(&a, a.join("back_to_a")).unwrap();
        symlink(&a, a.join("inner/also_a")).unwrap();

        let report = FileSearchEngine::default()
            .search_all(&a, &SearchQuery::default().with_directories())
            .unwrap();

        assert_eq!(sorted_names(&report.entries), vec!["inner", "x.txt"]);
        assert!(report.skipped.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_search_visits_aliased_directory_once() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/target.txt"), "t").unwrap();
        symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let results: Vec<_> = FileSearchEngine::default()
            .search(temp.path(), &SearchQuery::name("target"))
            .unwrap()
            .collect();

        assert_eq!(results.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_without_following_links() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("far.txt"), "f").unwrap();
        symlink(outside.path(), temp.path().join("portal")).unwrap();

        let config = Config {
            search: crate::config::SearchConfig {
                max_depth: None,
                follow_symlinks: false,
            },
            ..Config::default()
        };
        let results: Vec<_> = FileSearchEngine::new(&config)
            .search(temp.path(), &SearchQuery::default().with_directories())
            .unwrap()
            .collect();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "portal");
        assert!(results[0].is_symlink);
        assert!(results[0].is_directory());
    }

    #[cfg(unix)]
    #[test]
    fn test_unfollowed_directory_link_is_not_a_file_match() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        symlink(outside.path(), temp.path().join("photos.d")).unwrap();
        fs::write(temp.path().join("notes.d"), "n").unwrap();

        let config = Config {
            search: crate::config::SearchConfig {
                max_depth: None,
                follow_symlinks: false,
            },
            ..Config::default()
        };
        let query = SearchQuery::default().with_extension("d").with_directories();
        let results: Vec<_> = FileSearchEngine::new(&config)
            .search(temp.path(), &query)
            .unwrap()
            .collect();

        assert_eq!(sorted_names(&results), vec!["notes.d"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_finds_dangling_links_as_files() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        symlink(temp.path().join("gone"), temp.path().join("report.txt")).unwrap();
        fs::write(temp.path().join("report-final.txt"), "r").unwrap();

        let report = FileSearchEngine::default()
            .search_all(temp.path(), &SearchQuery::name("report"))
            .unwrap();

        assert_eq!(
            sorted_names(&report.entries),
            vec!["report-final.txt", "report.txt"]
        );
        let link = report.entries.iter().find(|e| e.name == "report.txt").unwrap();
        assert!(link.is_symlink);
        assert!(!link.is_directory());
        assert!(report.skipped.is_empty());

        let listed = PathNavigator::default().list(temp.path()).unwrap();
        assert!(listed.iter().any(|e| e.name == "report.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_records_unreadable_subtree_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("locked")).unwrap();
        fs::create_dir_all(temp.path().join("open")).unwrap();
        fs::write(temp.path().join("locked/secret.txt"), "s").unwrap();
        fs::write(temp.path().join("open/notes.txt"), "n").unwrap();
        fs::write(temp.path().join("top.txt"), "t").unwrap();

        let locked = temp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running as root: permissions are not enforced.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = FileSearchEngine::default()
            .search_all(temp.path(), &SearchQuery::default().with_extension("txt"))
            .unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(sorted_names(&report.entries), vec!["notes.txt", "top.txt"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path.as_deref(), Some(locked.as_path()));
    }
}
