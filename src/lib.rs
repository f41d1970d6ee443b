//! Core of a file browser: directory listing and breadcrumb navigation,
//! recursive name/extension search, and file operations that report their
//! outcome as values instead of raising.
//!
//! The presentation layer owns a [`BrowserSession`] (or just a path) and
//! calls into [`PathNavigator`], [`FileSearchEngine`] and
//! [`FileOpsExecutor`], re-listing after every mutation.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod scope_path;
pub mod services;
pub mod state;

pub use config::{Config, SearchConfig};
pub use error::{ErrorKind, FsError, Result};
pub use models::file_entry::{
    human_readable_size, Breadcrumb, DirectoryEntry, EntryKind, FileInfo, Preview,
};
pub use models::operation::{OperationFailure, OperationResult, OperationType};
pub use models::search::{SearchQuery, SearchReport, SkippedPath};
pub use services::file_service::{Charset, FileContent, FileOpsExecutor};
pub use services::navigator::PathNavigator;
pub use services::search_service::{FileSearchEngine, Search};
pub use state::BrowserSession;
