//! Import path → archive file resolution.
//!
//! The search order for a package path `p`: the built-in `unsafe` sentinel,
//! an absolute path taken as-is, a relative `./x` path against the importing
//! file's directory, the module manifest, each `lib-path` segment (directly
//! and under its `pkg/<platform>` subdirectory), and finally the install
//! root's `pkg/<platform>` directory. Archive filenames are tried with the
//! `.a` suffix first and the historical `.6`/`.8`/`.5` suffixes as
//! fallbacks.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

/// Sentinel archive path for the synthetic built-in package.
pub const UNSAFE_PACKAGE: &str = "unsafe";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("cannot read module manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module manifest line {line} is malformed: {text:?}")]
    ManifestSyntax { line: usize, text: String },
}

/// Immutable per-request view of where package archives live.
#[derive(Debug, Clone)]
pub struct LookupContext {
    lib_path: Vec<PathBuf>,
    install_root: Option<PathBuf>,
    /// `<os>_<arch>` directory name used under `pkg/`.
    platform: String,
    /// Import path → directory holding the package's archive.
    manifest: FxHashMap<String, PathBuf>,
}

impl Default for LookupContext {
    fn default() -> Self {
        LookupContext::new()
    }
}

impl LookupContext {
    pub fn new() -> LookupContext {
        LookupContext {
            lib_path: Vec::new(),
            install_root: None,
            platform: host_platform(),
            manifest: FxHashMap::default(),
        }
    }

    /// Replaces the extra search segments from a colon-separated string.
    pub fn set_lib_path(&mut self, lib_path: &str) {
        self.lib_path = lib_path
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
    }

    pub fn set_install_root(&mut self, root: impl Into<PathBuf>) {
        self.install_root = Some(root.into());
    }

    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = platform.into();
    }

    pub fn add_manifest_entry(&mut self, import_path: impl Into<String>, dir: impl Into<PathBuf>) {
        self.manifest.insert(import_path.into(), dir.into());
    }

    /// Loads a module manifest: one `import/path directory` pair per line,
    /// separated by whitespace; `#` starts a comment.
    pub fn load_manifest(&mut self, path: &Path) -> Result<(), LookupError> {
        let text = fs::read_to_string(path).map_err(|source| LookupError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(key), Some(dir)) = (parts.next(), parts.next()) else {
                return Err(LookupError::ManifestSyntax {
                    line: i + 1,
                    text: line.to_string(),
                });
            };
            self.manifest.insert(key.to_string(), PathBuf::from(dir));
        }
        Ok(())
    }

    /// Resolves a package path against the directory of the importing file.
    /// The result names an archive file that may still fail to load; `None`
    /// means no plausible location exists.
    pub fn resolve(&self, importer_dir: &Path, pkg: &str) -> Option<PathBuf> {
        if pkg.is_empty() {
            return None;
        }
        if pkg == UNSAFE_PACKAGE {
            return Some(PathBuf::from(UNSAFE_PACKAGE));
        }
        if pkg.starts_with('.') {
            // Relative imports resolve unconditionally; a missing archive is
            // the loader's problem.
            let candidate = archive_name(&importer_dir.join(pkg));
            return Some(find_archive(&candidate).unwrap_or(candidate));
        }
        if Path::new(pkg).is_absolute() {
            let candidate = archive_name(Path::new(pkg));
            return Some(find_archive(&candidate).unwrap_or(candidate));
        }
        if let Some(dir) = self.manifest.get(pkg) {
            let base = pkg.rsplit('/').next().unwrap_or(pkg);
            let candidate = dir.join(format!("{base}.a"));
            return Some(find_archive(&candidate).unwrap_or(candidate));
        }
        for seg in &self.lib_path {
            if let Some(found) = find_archive(&seg.join(format!("{pkg}.a"))) {
                return Some(found);
            }
            let nested = seg.join("pkg").join(&self.platform).join(format!("{pkg}.a"));
            if let Some(found) = find_archive(&nested) {
                return Some(found);
            }
        }
        if let Some(root) = &self.install_root {
            let candidate = root.join("pkg").join(&self.platform).join(format!("{pkg}.a"));
            if let Some(found) = find_archive(&candidate) {
                return Some(found);
            }
        }
        debug!(pkg, "no archive found");
        None
    }
}

fn archive_name(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    p.set_file_name(format!("{name}.a"));
    p
}

/// Probes an `.a` path and its historical suffix variants for existence.
fn find_archive(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    for suffix in ["6", "8", "5"] {
        let alt = candidate.with_extension(suffix);
        if alt.is_file() {
            return Some(alt);
        }
    }
    None
}

/// `<os>_<arch>` in the toolchain's spelling.
fn host_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}_{}", std::env::consts::OS, arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_resolves_to_sentinel() {
        let ctx = LookupContext::new();
        assert_eq!(
            ctx.resolve(Path::new("/src"), "unsafe"),
            Some(PathBuf::from("unsafe"))
        );
    }

    #[test]
    fn relative_import_resolves_against_importer_dir() {
        let ctx = LookupContext::new();
        let got = ctx.resolve(Path::new("/src/app"), "./util").unwrap();
        assert_eq!(got, PathBuf::from("/src/app/./util.a"));
    }

    #[test]
    fn lib_path_finds_archive_with_suffix_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bytes.a"), b"").unwrap();
        std::fs::write(dir.path().join("old.6"), b"").unwrap();

        let mut ctx = LookupContext::new();
        ctx.set_lib_path(&dir.path().display().to_string());
        assert_eq!(
            ctx.resolve(Path::new("/x"), "bytes"),
            Some(dir.path().join("bytes.a"))
        );
        assert_eq!(
            ctx.resolve(Path::new("/x"), "old"),
            Some(dir.path().join("old.6"))
        );
        assert_eq!(ctx.resolve(Path::new("/x"), "missing"), None);
    }

    #[test]
    fn manifest_maps_import_path_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("modules");
        std::fs::write(
            &manifest,
            "# deps\nexample.com/lib /opt/pkgs/lib\n\nexample.com/other\t/opt/pkgs/other\n",
        )
        .unwrap();

        let mut ctx = LookupContext::new();
        ctx.load_manifest(&manifest).unwrap();
        assert_eq!(
            ctx.resolve(Path::new("/x"), "example.com/lib"),
            Some(PathBuf::from("/opt/pkgs/lib/lib.a"))
        );
    }

    #[test]
    fn malformed_manifest_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("modules");
        std::fs::write(&manifest, "just-one-field\n").unwrap();
        let mut ctx = LookupContext::new();
        let err = ctx.load_manifest(&manifest).unwrap_err();
        assert!(matches!(err, LookupError::ManifestSyntax { line: 1, .. }));
    }

    #[test]
    fn install_root_uses_platform_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let pkgdir = dir.path().join("pkg").join("linux_amd64");
        std::fs::create_dir_all(&pkgdir).unwrap();
        std::fs::write(pkgdir.join("fmt.a"), b"").unwrap();

        let mut ctx = LookupContext::new();
        ctx.set_platform("linux_amd64");
        ctx.set_install_root(dir.path());
        assert_eq!(
            ctx.resolve(Path::new("/x"), "fmt"),
            Some(pkgdir.join("fmt.a"))
        );
    }
}
