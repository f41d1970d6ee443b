use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FsError, IoResultExt, Result};
use crate::models::operation::{OperationResult, OperationType};
use crate::scope_path::{self, is_within_scope, normalize, validate_name};

/// Encoding the caller declares for text content. UTF-16 is written
/// without a byte order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl Charset {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Latin1 => "iso-8859-1",
        }
    }

    fn encode(self, text: &str) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Self::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(c).map_err(|_| FsError::InvalidContent {
                        charset: self.label(),
                        reason: format!("character {c:?} has no latin-1 form"),
                    })
                })
                .collect::<Result<Vec<u8>>>()?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FileContent<'a> {
    Bytes(&'a [u8]),
    Text { text: &'a str, charset: Charset },
}

impl FileContent<'_> {
    fn encode(&self) -> Result<Cow<'_, [u8]>> {
        match *self {
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Text {
                text,
                charset: Charset::Utf8,
            } => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Text { text, charset } => charset.encode(text).map(Cow::Owned),
        }
    }
}

impl<'a> From<&'a str> for FileContent<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text {
            text,
            charset: Charset::Utf8,
        }
    }
}

impl<'a> From<&'a [u8]> for FileContent<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

/// Mutating filesystem actions. Every method reports through an
/// [`OperationResult`]; no error escapes.
#[derive(Debug, Clone, Default)]
pub struct FileOpsExecutor;

impl FileOpsExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn create_directory(&self, parent: impl AsRef<Path>, name: &str) -> OperationResult {
        let target = parent.as_ref().join(name);
        let result = child_path(parent.as_ref(), name)
            .and_then(|path| fs::create_dir(&path).at(&path));
        finish(OperationType::CreateDir, vec![target], result)
    }

    pub fn create_file<'a>(
        &self,
        parent: impl AsRef<Path>,
        name: &str,
        content: impl Into<FileContent<'a>>,
    ) -> OperationResult {
        let target = parent.as_ref().join(name);
        let content = content.into();
        let result =
            child_path(parent.as_ref(), name).and_then(|path| write_new_file(&path, &content));
        finish(OperationType::CreateFile, vec![target], result)
    }

    /// Copy a file or directory tree to `dest` (the full target path).
    pub fn copy(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        overwrite: bool,
    ) -> OperationResult {
        let (source, dest) = (source.as_ref(), dest.as_ref());
        let result = try_copy(source, dest, overwrite);
        finish(
            OperationType::Copy,
            vec![source.to_path_buf(), dest.to_path_buf()],
            result,
        )
    }

    /// Move `source` to `dest`, renaming when possible and copying then
    /// deleting across devices.
    pub fn move_path(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        overwrite: bool,
    ) -> OperationResult {
        let (source, dest) = (source.as_ref(), dest.as_ref());
        finish_move(source, dest, try_move(source, dest, overwrite))
    }

    /// Rename within the same parent directory.
    pub fn rename(&self, path: impl AsRef<Path>, new_name: &str) -> OperationResult {
        let path = path.as_ref();
        let dest = path.with_file_name(new_name);
        let result = try_rename(path, new_name);
        finish(
            OperationType::Rename,
            vec![path.to_path_buf(), dest],
            result,
        )
    }

    /// Remove a file, symlink, or whole directory tree. Irreversible.
    pub fn delete(&self, path: impl AsRef<Path>) -> OperationResult {
        self.delete_with(path, true)
    }

    /// Like [`delete`](Self::delete), but a non-recursive call only removes
    /// empty directories.
    pub fn delete_with(&self, path: impl AsRef<Path>, recursive: bool) -> OperationResult {
        let path = path.as_ref();
        let result = try_delete(path, recursive);
        finish(OperationType::Delete, vec![path.to_path_buf()], result)
    }

    /// Copy each source to `dest_dir/<its file name>`.
    pub fn copy_into(
        &self,
        sources: &[PathBuf],
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
    ) -> Vec<OperationResult> {
        sources
            .iter()
            .map(|src| match target_in(src, dest_dir.as_ref()) {
                Ok(dest) => self.copy(src, dest, overwrite),
                Err(err) => OperationResult::failure(OperationType::Copy, vec![src.clone()], &err),
            })
            .collect()
    }

    /// Move each source to `dest_dir/<its file name>`.
    pub fn move_into(
        &self,
        sources: &[PathBuf],
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
    ) -> Vec<OperationResult> {
        sources
            .iter()
            .map(|src| match target_in(src, dest_dir.as_ref()) {
                Ok(dest) => self.move_path(src, dest, overwrite),
                Err(err) => OperationResult::failure(OperationType::Move, vec![src.clone()], &err),
            })
            .collect()
    }
}

fn finish(op: OperationType, affected: Vec<PathBuf>, result: Result<()>) -> OperationResult {
    match result {
        Ok(()) => {
            tracing::info!(operation = %op, paths = ?affected, "operation succeeded");
            OperationResult::success(op, affected)
        }
        Err(err) => {
            let outcome = OperationResult::failure(op, affected, &err);
            if outcome.is_benign() {
                tracing::info!(operation = %op, error = %err, "target already gone");
            } else {
                tracing::warn!(operation = %op, error = %err, "operation failed");
            }
            outcome
        }
    }
}

fn finish_move(source: &Path, dest: &Path, result: Result<Option<FsError>>) -> OperationResult {
    let affected = vec![source.to_path_buf(), dest.to_path_buf()];
    match result {
        Ok(Some(warning)) => {
            tracing::warn!(error = %warning, "move left the source behind");
            OperationResult::success(OperationType::Move, affected).with_warning(&warning)
        }
        Ok(None) => finish(OperationType::Move, affected, Ok(())),
        Err(err) => finish(OperationType::Move, affected, Err(err)),
    }
}

/// Resolve `parent/name` for a new entry, checking the name and that the
/// parent is an existing directory.
fn child_path(parent: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let parent = normalize(parent)?;
    if !fs::metadata(&parent).at(&parent)?.is_dir() {
        return Err(FsError::NotADirectory(parent));
    }
    Ok(parent.join(name))
}

fn target_in(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let normalized = normalize(source)?;
    let name = normalized.file_name().ok_or_else(|| FsError::InvalidTarget {
        path: source.to_path_buf(),
        reason: "path has no file name".to_string(),
    })?;
    Ok(dest_dir.join(name))
}

fn write_new_file(path: &Path, content: &FileContent<'_>) -> Result<()> {
    let bytes = content.encode()?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .at(path)?;
    let written = file.write_all(&bytes).and_then(|()| file.sync_all());
    if let Err(e) = written {
        drop(file);
        remove_quietly(path);
        return Err(FsError::from_io(e, path));
    }
    Ok(())
}

/// Checks shared by copy and move. Returns normalized `(source, dest)`.
///
/// `follow_source` is set when the operation reads through a top-level
/// source link (copy) rather than relocating the link itself (move).
fn check_transfer(
    source: &Path,
    dest: &Path,
    overwrite: bool,
    follow_source: bool,
) -> Result<(PathBuf, PathBuf)> {
    let source = normalize(source)?;
    let dest = normalize(dest)?;
    fs::symlink_metadata(&source).at(&source)?;

    let invalid = |reason: &str| {
        Err(FsError::InvalidTarget {
            path: dest.clone(),
            reason: reason.to_string(),
        })
    };

    if let Some(reason) = overlap(&source, &dest, overwrite) {
        return invalid(reason);
    }
    if !overwrite && exists(&dest)? {
        return Err(FsError::AlreadyExists(dest.clone()));
    }

    let parent = match dest.parent() {
        Some(parent) => parent.to_path_buf(),
        None => return invalid("destination has no parent directory"),
    };
    if !fs::metadata(&parent).at(&parent)?.is_dir() {
        return Err(FsError::NotADirectory(parent));
    }

    // Links in either path can hide an overlap the lexical check misses.
    if let (Some(real_source), Some(real_dest)) =
        (real_path(&source, follow_source), real_path(&dest, false))
    {
        if let Some(reason) = overlap(&real_source, &real_dest, overwrite) {
            return invalid(reason);
        }
    }
    Ok((source, dest))
}

/// Why `source` cannot be transferred to `dest`, if the two overlap.
fn overlap(source: &Path, dest: &Path, overwrite: bool) -> Option<&'static str> {
    if source == dest {
        Some("source and destination are the same")
    } else if is_within_scope(dest, source) {
        Some("destination is inside the source")
    } else if overwrite && is_within_scope(source, dest) {
        Some("overwriting the destination would remove the source")
    } else {
        None
    }
}

/// Resolve links in the parent of `path`, and in `path` itself when
/// `follow` is set. `None` when the parent cannot be resolved.
fn real_path(path: &Path, follow: bool) -> Option<PathBuf> {
    if follow {
        if let Ok(real) = fs::canonicalize(path) {
            return Some(real);
        }
    }
    let parent = fs::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

fn try_copy(source: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let (source, dest) = check_transfer(source, dest, overwrite, true)?;
    // Top-level links are followed, like `cp` without `-P`.
    let file_type = fs::metadata(&source).at(&source)?.file_type();

    let staging = staging_path(&dest, "partial");
    if let Err(err) = copy_entry(&source, &staging, file_type) {
        remove_quietly(&staging);
        return Err(err);
    }
    if let Err(err) = place(&staging, &dest, overwrite) {
        remove_quietly(&staging);
        return Err(err);
    }
    Ok(())
}

fn try_move(source: &Path, dest: &Path, overwrite: bool) -> Result<Option<FsError>> {
    let (source, dest) = check_transfer(source, dest, overwrite, false)?;

    let aside = set_aside(&dest, overwrite)?;
    let outcome = match fs::rename(&source, &dest) {
        Ok(()) => Ok(None),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                source = %source.display(),
                dest = %dest.display(),
                "cross-device move, copying"
            );
            move_across_devices(&source, &dest, remove_entry)
        }
        Err(e) => Err(FsError::from_io(e, &source)),
    };

    match &outcome {
        Ok(_) => discard(aside),
        Err(_) => restore(aside, &dest),
    }
    outcome
}

/// Copy `source` beside `dest`, rename it into place, then delete the
/// source with `remove`. A failed delete is returned as a warning.
fn move_across_devices(
    source: &Path,
    dest: &Path,
    remove: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<Option<FsError>> {
    let file_type = fs::symlink_metadata(source).at(source)?.file_type();

    let staging = staging_path(dest, "partial");
    if let Err(err) = copy_entry(source, &staging, file_type) {
        remove_quietly(&staging);
        return Err(err);
    }
    if let Err(e) = fs::rename(&staging, dest) {
        remove_quietly(&staging);
        return Err(FsError::from_io(e, dest));
    }

    match remove(source) {
        Ok(()) => Ok(None),
        Err(cause) => Ok(Some(FsError::PartialMove {
            source_path: source.to_path_buf(),
            dest: dest.to_path_buf(),
            cause,
        })),
    }
}

fn try_rename(path: &Path, new_name: &str) -> Result<()> {
    validate_name(new_name)?;
    let path = normalize(path)?;
    let parent = path
        .parent()
        .ok_or_else(|| FsError::Boundary(path.clone()))?;
    let dest = parent.join(new_name);

    fs::symlink_metadata(&path).at(&path)?;
    if dest != path && exists(&dest)? {
        return Err(FsError::AlreadyExists(dest));
    }
    fs::rename(&path, &dest).at(&path)
}

fn try_delete(path: &Path, recursive: bool) -> Result<()> {
    let path = normalize(path)?;
    if scope_path::is_root(&path) {
        return Err(FsError::Boundary(path));
    }

    let metadata = fs::symlink_metadata(&path).at(&path)?;
    if !metadata.is_dir() {
        return remove_non_dir(&path, metadata.file_type()).at(&path);
    }
    if recursive {
        fs::remove_dir_all(&path).at(&path)
    } else {
        fs::remove_dir(&path).at(&path)
    }
}

fn copy_entry(src: &Path, dest: &Path, file_type: fs::FileType) -> Result<()> {
    if file_type.is_symlink() {
        copy_symlink(src, dest)
    } else if file_type.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        fs::copy(src, dest).at(src)?;
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir(dest).at(dest)?;
    for entry in fs::read_dir(src).at(src)? {
        let entry = entry.at(src)?;
        let src_child = entry.path();
        let file_type = entry.file_type().at(&src_child)?;
        copy_entry(&src_child, &dest.join(entry.file_name()), file_type)?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src).at(src)?;
    std::os::unix::fs::symlink(target, dest).at(dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let file_type = fs::metadata(src).at(src)?.file_type();
    copy_entry(src, dest, file_type)
}

/// Rename `staged` onto `dest`, displacing an existing entry when allowed.
fn place(staged: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let aside = set_aside(dest, overwrite)?;
    match fs::rename(staged, dest) {
        Ok(()) => {
            discard(aside);
            Ok(())
        }
        Err(e) => {
            restore(aside, dest);
            Err(FsError::from_io(e, dest))
        }
    }
}

/// Move an existing `dest` to a sibling name so it can be restored if the
/// replacement fails. `None` when nothing is there.
fn set_aside(dest: &Path, overwrite: bool) -> Result<Option<PathBuf>> {
    if !exists(dest)? {
        return Ok(None);
    }
    if !overwrite {
        return Err(FsError::AlreadyExists(dest.to_path_buf()));
    }
    let aside = staging_path(dest, "replaced");
    fs::rename(dest, &aside).at(dest)?;
    Ok(Some(aside))
}

fn discard(aside: Option<PathBuf>) {
    if let Some(aside) = aside {
        remove_quietly(&aside);
    }
}

fn restore(aside: Option<PathBuf>, dest: &Path) {
    if let Some(aside) = aside {
        if let Err(e) = fs::rename(&aside, dest) {
            tracing::warn!(
                aside = %aside.display(),
                dest = %dest.display(),
                error = %e,
                "failed to restore displaced destination"
            );
        }
    }
}

fn staging_path(dest: &Path, purpose: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let id = uuid::Uuid::new_v4().simple();
    dest.with_file_name(format!(".{name}.{id}.{purpose}"))
}

fn exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FsError::from_io(e, path)),
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        remove_non_dir(path, metadata.file_type())
    }
}

/// Remove a file or a link. Directory links on Windows are removed as
/// directories.
#[cfg(windows)]
fn remove_non_dir(path: &Path, file_type: fs::FileType) -> io::Result<()> {
    use std::os::windows::fs::FileTypeExt;

    if file_type.is_symlink_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(not(windows))]
fn remove_non_dir(path: &Path, _file_type: fs::FileType) -> io::Result<()> {
    fs::remove_file(path)
}

fn remove_quietly(path: &Path) {
    match remove_entry(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to clean up");
        }
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}
