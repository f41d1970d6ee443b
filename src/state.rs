use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{FsError, Result};
use crate::models::file_entry::{Breadcrumb, DirectoryEntry};
use crate::services::navigator::PathNavigator;

/// Per-caller browsing state: the current directory and the navigator that
/// validates every move of it.
///
/// The current directory is always a readable directory; a rejected
/// navigation leaves it unchanged.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    navigator: PathNavigator,
    current_dir: PathBuf,
}

impl BrowserSession {
    pub fn new(config: &Config, start: impl AsRef<Path>) -> Result<Self> {
        let navigator = PathNavigator::new(config);
        let current_dir = navigator.resolve_directory(start)?;
        Ok(Self {
            navigator,
            current_dir,
        })
    }

    /// Start in the process working directory.
    pub fn from_current_dir(config: &Config) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| FsError::from_io(e, "."))?;
        Self::new(config, cwd)
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn navigator(&self) -> &PathNavigator {
        &self.navigator
    }

    pub fn listing(&self) -> Result<Vec<DirectoryEntry>> {
        self.navigator.list(&self.current_dir)
    }

    pub fn breadcrumbs(&self) -> Result<Vec<Breadcrumb>> {
        self.navigator.breadcrumbs(&self.current_dir)
    }

    /// Jump to `path`; relative paths resolve against the current directory.
    pub fn change_dir(&mut self, path: impl AsRef<Path>) -> Result<&Path> {
        let target = self.current_dir.join(path);
        self.current_dir = self.navigator.resolve_directory(target)?;
        tracing::debug!(dir = %self.current_dir.display(), "changed directory");
        Ok(&self.current_dir)
    }

    /// Descend into the child directory called `name`.
    pub fn enter(&mut self, name: &str) -> Result<&Path> {
        crate::scope_path::validate_name(name)?;
        self.change_dir(name)
    }

    pub fn ascend(&mut self) -> Result<&Path> {
        let parent = self.navigator.ascend(&self.current_dir)?;
        self.change_dir(parent)
    }

    /// Jump to the ancestor shown at `index` in [`breadcrumbs`](Self::breadcrumbs).
    pub fn jump_to_breadcrumb(&mut self, index: usize) -> Result<&Path> {
        let crumbs = self.breadcrumbs()?;
        let crumb = crumbs.get(index).ok_or_else(|| FsError::InvalidTarget {
            path: self.current_dir.clone(),
            reason: format!("no breadcrumb at index {index}"),
        })?;
        let path = crumb.path.clone();
        self.change_dir(path)
    }
}
