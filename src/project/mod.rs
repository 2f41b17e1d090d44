//! Project state: caches for source files, their top-level declarations and
//! imported package archives, plus import path resolution.

pub mod archive;
pub mod decl_cache;
pub mod file_cache;
pub mod lookup;
pub mod package_cache;

pub use archive::{parse_archive, ArchiveError, ExportData, ExportRecord, PackageRef};
pub use decl_cache::{DeclCache, FileDecls, PackageImport};
pub use file_cache::{file_mtime, FileCache, FileEntry};
pub use lookup::{LookupContext, LookupError, UNSAFE_PACKAGE};
pub use package_cache::{PackageCache, PackageEntry, IMMORTAL};
