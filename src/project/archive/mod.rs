//! Package archive export-section readers.
//!
//! An archive carries its exported declarations in one of two encodings:
//! a textual section between `$$` markers, or a compact varint-encoded
//! binary stream introduced by `$$B`. Both readers produce the same
//! [`ExportData`]: a flat list of `(owning package, declaration)` records
//! plus the cross-package references the installer must bind into the
//! archive's scope.

pub mod bin;
pub mod text;

use thiserror::Error;

use crate::syntax::ast::Decl;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("missing export section")]
    MissingExportSection,
    #[error("unsupported export data version {0}")]
    UnsupportedVersion(u64),
    #[error("truncated export data")]
    Truncated,
    #[error("malformed export data: {0}")]
    Malformed(String),
}

/// One exported declaration. An empty `package` key means the archive's own
/// package; anything else is a transitively referenced one.
#[derive(Debug, Clone)]
pub struct ExportRecord {
    pub package: String,
    pub decl: Decl,
}

/// A package mentioned by the export data. `key` matches
/// [`ExportRecord::package`]; `alias` is the identifier type expressions use
/// to refer to it, which the installer binds in the archive scope.
#[derive(Debug, Clone)]
pub struct PackageRef {
    pub key: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExportData {
    /// Package name from the export clause; the alias an importer gets when
    /// it does not rename the import.
    pub default_alias: String,
    pub packages: Vec<PackageRef>,
    pub records: Vec<ExportRecord>,
}

/// Parses a whole archive file, picking the encoding from the section
/// marker. `archive_name` qualifies the archive's own package in
/// binary-format cross references.
pub fn parse_archive(data: &[u8], archive_name: &str) -> Result<ExportData, ArchiveError> {
    let i = find(data, b"\n$$").ok_or(ArchiveError::MissingExportSection)?;
    let rest = &data[i + 3..];
    if let Some(stripped) = rest.strip_prefix(b"B\n") {
        // Binary export data; an `i` byte marks the indexed layout.
        let payload = stripped.strip_prefix(b"i").unwrap_or(stripped);
        return bin::parse(payload, archive_name);
    }
    let j = find(rest, b"package").ok_or(ArchiveError::MissingExportSection)?;
    let section = &rest[j..];
    let end = find(section, b"\n$$").unwrap_or(section.len());
    let src = std::str::from_utf8(&section[..end])
        .map_err(|_| ArchiveError::Malformed("export section is not valid UTF-8".into()))?;
    text::parse(src)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_marker_is_rejected() {
        let err = parse_archive(b"!<arch>\nnothing here", "x.a").unwrap_err();
        assert!(matches!(err, ArchiveError::MissingExportSection));
    }

    #[test]
    fn textual_section_is_detected() {
        let data = b"\nimport\n$$\npackage tiny\n\tvar @\"\".X int\n\n$$\n";
        let export = parse_archive(data, "tiny.a").unwrap();
        assert_eq!(export.default_alias, "tiny");
        assert_eq!(export.records.len(), 1);
    }
}
