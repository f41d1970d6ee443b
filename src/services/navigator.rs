use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{FsError, IoResultExt, Result};
use crate::models::file_entry::{to_utc, Breadcrumb, DirectoryEntry, FileInfo, Preview};
use crate::scope_path;

/// Read-only view of the directory tree.
#[derive(Debug, Clone)]
pub struct PathNavigator {
    show_hidden: bool,
    preview_max_bytes: u64,
}

impl Default for PathNavigator {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl PathNavigator {
    pub fn new(config: &Config) -> Self {
        Self {
            show_hidden: config.show_hidden,
            preview_max_bytes: config.preview_max_bytes,
        }
    }

    /// Immediate children of `path`, directories first, then by name
    /// ignoring case.
    pub fn list(&self, path: impl AsRef<Path>) -> Result<Vec<DirectoryEntry>> {
        let dir = self.resolve_directory(path)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).at(&dir)? {
            let entry = entry.at(&dir)?;
            let name = entry.file_name();
            if !self.show_hidden && name.to_string_lossy().starts_with('.') {
                continue;
            }
            if let Some(item) = entry_for(entry.path())? {
                entries.push(item);
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Lexical parent of `path`. Symlinked directories ascend to the
    /// directory they were listed in, not to their target's parent.
    pub fn ascend(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let normalized = scope_path::normalize(path.as_ref())?;
        match normalized.parent() {
            Some(parent) => Ok(parent.to_path_buf()),
            None => Err(FsError::Boundary(normalized)),
        }
    }

    /// Absolute form of `path` once it is known to be a readable directory.
    pub fn resolve_directory(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = scope_path::normalize(path.as_ref())?;
        let metadata = fs::metadata(&path).at(&path)?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory(path));
        }
        // Probe readability; metadata succeeds on directories we cannot list.
        fs::read_dir(&path).at(&path)?;
        Ok(path)
    }

    pub fn breadcrumbs(&self, path: impl AsRef<Path>) -> Result<Vec<Breadcrumb>> {
        let normalized = scope_path::normalize(path.as_ref())?;

        let mut crumbs = Vec::new();
        let mut current = PathBuf::new();
        for component in normalized.components() {
            current.push(component.as_os_str());
            let label = match component {
                Component::Normal(name) => name.to_string_lossy().to_string(),
                // Root and drive prefixes are labelled by their accumulated form.
                _ => current.to_string_lossy().to_string(),
            };
            if matches!(component, Component::RootDir) && !crumbs.is_empty() {
                // `C:` followed by `\` collapses into a single `C:\` crumb.
                crumbs.pop();
            }
            crumbs.push(Breadcrumb {
                label,
                path: current.clone(),
            });
        }
        Ok(crumbs)
    }

    pub fn info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = scope_path::normalize(path.as_ref())?;
        let link_meta = fs::symlink_metadata(&path).at(&path)?;
        let is_symlink = link_meta.file_type().is_symlink();
        let metadata = if is_symlink {
            fs::metadata(&path).unwrap_or(link_meta)
        } else {
            link_meta
        };

        Ok(FileInfo {
            accessed_at: metadata.accessed().ok().map(to_utc),
            readonly: metadata.permissions().readonly(),
            entry: DirectoryEntry::from_metadata(path, &metadata, is_symlink),
        })
    }

    /// Read up to the configured byte limit. Content that is not UTF-8 is
    /// reported as binary rather than lossily decoded.
    pub fn preview(&self, path: impl AsRef<Path>) -> Result<Preview> {
        let path = scope_path::normalize(path.as_ref())?;
        let metadata = fs::metadata(&path).at(&path)?;
        if metadata.is_dir() {
            return Err(FsError::InvalidTarget {
                path,
                reason: "cannot preview a directory".to_string(),
            });
        }

        let mut buf = Vec::new();
        File::open(&path)
            .at(&path)?
            .take(self.preview_max_bytes)
            .read_to_end(&mut buf)
            .at(&path)?;
        let truncated = metadata.len() > buf.len() as u64;

        Ok(decode_preview(buf, truncated, metadata.len()))
    }
}

fn decode_preview(mut buf: Vec<u8>, truncated: bool, size_bytes: u64) -> Preview {
    if buf.contains(&0) {
        return Preview::Binary { size_bytes };
    }
    let valid_up_to = match std::str::from_utf8(&buf) {
        Ok(_) => buf.len(),
        // A multi-byte character split by the read limit is not binary.
        Err(e) if truncated && e.error_len().is_none() => e.valid_up_to(),
        Err(_) => return Preview::Binary { size_bytes },
    };
    buf.truncate(valid_up_to);
    match String::from_utf8(buf) {
        Ok(content) => Preview::Text { content, truncated },
        Err(_) => Preview::Binary { size_bytes },
    }
}

/// Stat a child found by `read_dir`. `None` when it vanished in between.
fn entry_for(path: PathBuf) -> Result<Option<DirectoryEntry>> {
    let link_meta = match fs::symlink_metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "entry vanished during listing");
            return Ok(None);
        }
        Err(e) => return Err(FsError::from_io(e, &path)),
    };

    let is_symlink = link_meta.file_type().is_symlink();
    let metadata = if is_symlink {
        // Broken links keep the link's own metadata and list as files.
        fs::metadata(&path).unwrap_or(link_meta)
    } else {
        link_meta
    };

    Ok(Some(DirectoryEntry::from_metadata(path, &metadata, is_symlink)))
}

fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}
