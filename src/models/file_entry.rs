use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub extension: Option<String>,
    /// `None` for directories.
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub is_symlink: bool,
}

impl DirectoryEntry {
    /// Build an entry from metadata already fetched for `path`.
    ///
    /// `metadata` should follow symlinks so the kind reflects the target;
    /// `is_symlink` records whether `path` itself is a link.
    pub fn from_metadata(path: PathBuf, metadata: &Metadata, is_symlink: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let extension = match kind {
            EntryKind::File => Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().to_string()),
            EntryKind::Directory => None,
        };

        Self {
            name,
            path,
            kind,
            extension,
            size_bytes: (kind == EntryKind::File).then(|| metadata.len()),
            modified_at: metadata.modified().ok().map(to_utc),
            created_at: metadata.created().ok().map(to_utc),
            is_symlink,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn display_size(&self) -> String {
        human_readable_size(self.size_bytes.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub entry: DirectoryEntry,
    pub accessed_at: Option<DateTime<Utc>>,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Preview {
    Text { content: String, truncated: bool },
    Binary { size_bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub label: String,
    pub path: PathBuf,
}

pub(crate) fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
