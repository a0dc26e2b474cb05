//! Guarded file access
//!
//! [`Storage`] is the only way the rest of the workspace touches stored
//! files on behalf of a caller. Every operation runs the same sequence:
//!
//! 1. resolve the candidate to an absolute path,
//! 2. test it against the [`AllowList`] and fail with
//!    [`AccessError::Denied`] if it is outside every root,
//! 3. stat it and fail with [`AccessError::NotFound`] if it is absent,
//! 4. only then read or walk it.
//!
//! Denial is checked before existence everywhere, so a caller can never
//! probe for files outside the roots by watching for not-found results.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::error::{AccessError, Result};
use crate::extract::{self, ExtractLimits};
use crate::graph::IfcGraph;
use crate::guard::AllowList;

/// File access confined to an allow-list
#[derive(Debug, Clone)]
pub struct Storage {
    allow: AllowList,
}

impl Storage {
    pub fn new(allow: AllowList) -> Self {
        Self { allow }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Check and stat a candidate, returning its resolved path
    fn admit(&self, candidate: &Path) -> Result<(PathBuf, Metadata)> {
        let resolved = self.allow.check(candidate)?;
        match std::fs::metadata(&resolved) {
            Ok(meta) => Ok((resolved, meta)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AccessError::NotFound(resolved)),
            Err(err) => Err(AccessError::io(resolved, err)),
        }
    }

    /// Stat a permitted path
    pub fn metadata(&self, candidate: impl AsRef<Path>) -> Result<(PathBuf, Metadata)> {
        self.admit(candidate.as_ref())
    }

    /// Read the full contents of a permitted file
    pub fn read_bytes(&self, candidate: impl AsRef<Path>) -> Result<Vec<u8>> {
        let (resolved, meta) = self.admit(candidate.as_ref())?;
        if meta.is_dir() {
            return Err(AccessError::io(resolved, std::io::Error::other("is a directory")));
        }

        let bytes = std::fs::read(&resolved).map_err(|err| AccessError::io(&resolved, err))?;
        tracing::debug!(path = %resolved.display(), bytes = bytes.len(), "read stored file");
        Ok(bytes)
    }

    /// Read a permitted file as UTF-8 text
    pub fn read_text(&self, candidate: impl AsRef<Path>) -> Result<String> {
        let candidate = candidate.as_ref();
        let bytes = self.read_bytes(candidate)?;
        String::from_utf8(bytes).map_err(|_| AccessError::Decode(self.allow.resolve(candidate)))
    }

    /// Extract the entity graph of a permitted IFC file
    pub fn graph_for(
        &self,
        candidate: impl AsRef<Path>,
        limits: ExtractLimits,
    ) -> Result<IfcGraph> {
        let text = self.read_text(candidate)?;
        Ok(extract::extract_graph(&text, limits))
    }

    /// List files under a permitted directory
    ///
    /// # Arguments
    /// * `candidate` - Directory to walk
    /// * `patterns` - Glob patterns relative to that directory (e.g.
    ///   `&["**/*.glb"]`); an empty slice matches every file
    ///
    /// # Returns
    /// Sorted absolute paths of every regular file, hidden files and files
    /// named in `.ignore`/`.gitignore` included.
    pub fn list_dir(&self, candidate: impl AsRef<Path>, patterns: &[&str]) -> Result<Vec<PathBuf>> {
        let (root, meta) = self.admit(candidate.as_ref())?;
        if !meta.is_dir() {
            return Err(AccessError::NotADirectory(root));
        }

        let matcher = build_glob_matcher(patterns)?;
        let mut files = Vec::new();

        for result in build_walker(&root) {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                        continue;
                    }
                    let Ok(rel_path) = entry.path().strip_prefix(&root) else {
                        continue;
                    };
                    if !patterns.is_empty() && !matcher.is_match(rel_path) {
                        continue;
                    }
                    if self.allow.is_allowed(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(err) => {
                    // Keep walking; one unreadable entry should not hide the rest
                    tracing::warn!(error = %err, "error walking storage directory");
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Build a glob matcher from the provided patterns
fn build_glob_matcher(patterns: &[&str]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

/// Walk every entry under `root`
///
/// Stored files are never filtered by hidden-file or ignore-file rules;
/// links are not followed.
fn build_walker(root: &Path) -> ignore::Walk {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .parents(false)
        .follow_links(false);
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        base: PathBuf,
        storage: Storage,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_path_buf();
        fs::create_dir_all(base.join("processed/unit-1")).unwrap();
        fs::create_dir_all(base.join("private")).unwrap();

        let mut ifc = File::create(base.join("processed/unit-1/model.ifc")).unwrap();
        ifc.write_all(b"#1 = IFCWALL($);\n#2 = IFCDOOR(#1);\n").unwrap();
        fs::write(base.join("processed/unit-1/model.glb"), b"glTF").unwrap();
        fs::write(base.join("private/secret.txt"), b"nope").unwrap();

        let allow = AllowList::with_base(&base, ["processed"]);
        Fixture {
            _dir: dir,
            base,
            storage: Storage::new(allow),
        }
    }

    #[test]
    fn test_read_inside_root() {
        let fx = fixture();
        let bytes = fx.storage.read_bytes(fx.base.join("processed/unit-1/model.glb")).unwrap();
        assert_eq!(bytes, b"glTF");
    }

    #[test]
    fn test_read_outside_root_denied() {
        let fx = fixture();
        let err = fx.storage.read_bytes(fx.base.join("private/secret.txt")).unwrap_err();
        assert!(matches!(err, AccessError::Denied(_)));
        assert!(err.to_string().starts_with("access not allowed"));
    }

    #[test]
    fn test_traversal_denied() {
        let fx = fixture();
        let err = fx.storage.read_text("processed/../private/secret.txt").unwrap_err();
        assert!(matches!(err, AccessError::Denied(_)));
    }

    #[test]
    fn test_denied_takes_precedence_over_missing() {
        let fx = fixture();
        let err = fx.storage.read_bytes(fx.base.join("private/missing.txt")).unwrap_err();
        assert!(matches!(err, AccessError::Denied(_)));
    }

    #[test]
    fn test_missing_inside_root_not_found() {
        let fx = fixture();
        let err = fx.storage.read_bytes("processed/unit-2/model.glb").unwrap_err();
        match err {
            AccessError::NotFound(path) => assert!(path.ends_with("processed/unit-2/model.glb")),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_text_rejects_invalid_utf8() {
        let fx = fixture();
        fs::write(fx.base.join("processed/bad.ifc"), [0xff, 0xfe, 0xfd]).unwrap();
        let err = fx.storage.read_text("processed/bad.ifc").unwrap_err();
        assert!(matches!(err, AccessError::Decode(_)));
    }

    #[test]
    fn test_read_directory_is_io_error() {
        let fx = fixture();
        let err = fx.storage.read_bytes("processed/unit-1").unwrap_err();
        assert!(matches!(err, AccessError::Io { .. }));
    }

    #[test]
    fn test_graph_for_permitted_file() {
        let fx = fixture();
        let graph = fx
            .storage
            .graph_for("processed/unit-1/model.ifc", ExtractLimits::default())
            .unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_graph_for_outside_root_denied() {
        let fx = fixture();
        let err = fx
            .storage
            .graph_for("private/secret.txt", ExtractLimits::default())
            .unwrap_err();
        assert!(matches!(err, AccessError::Denied(_)));
    }

    #[test]
    fn test_list_dir_all_files() {
        let fx = fixture();
        let files = fx.storage.list_dir("processed", &[]).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.is_absolute()));
        assert!(files[0].ends_with("model.glb"));
        assert!(files[1].ends_with("model.ifc"));
    }

    #[test]
    fn test_list_dir_with_pattern() {
        let fx = fixture();
        let files = fx.storage.list_dir("processed", &["**/*.glb"]).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("unit-1/model.glb"));
    }

    #[test]
    fn test_list_dir_includes_hidden_and_ignored_files() {
        let fx = fixture();
        fs::write(fx.base.join("processed/unit-1/.thumb.png"), b"png").unwrap();
        fs::write(fx.base.join("processed/.ignore"), b"*.glb\n").unwrap();
        fs::write(fx.base.join("processed/.gitignore"), b"unit-1/\n").unwrap();

        let files = fx.storage.list_dir("processed", &[]).unwrap();
        let names: Vec<&str> = files
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();

        assert_eq!(
            names,
            vec![".gitignore", ".ignore", ".thumb.png", "model.glb", "model.ifc"]
        );
    }

    #[test]
    fn test_list_dir_outside_root_denied() {
        let fx = fixture();
        let err = fx.storage.list_dir("private", &[]).unwrap_err();
        assert!(matches!(err, AccessError::Denied(_)));
    }

    #[test]
    fn test_list_dir_on_file() {
        let fx = fixture();
        let err = fx.storage.list_dir("processed/unit-1/model.glb", &[]).unwrap_err();
        assert!(matches!(err, AccessError::NotADirectory(_)));
    }

    #[test]
    fn test_list_dir_invalid_pattern() {
        let fx = fixture();
        let err = fx.storage.list_dir("processed", &["a[b"]).unwrap_err();
        assert!(matches!(err, AccessError::InvalidPattern(_)));
    }

    #[test]
    fn test_metadata_reports_size() {
        let fx = fixture();
        let (path, meta) = fx.storage.metadata("processed/unit-1/model.glb").unwrap();
        assert!(path.is_absolute());
        assert_eq!(meta.len(), 4);
    }
}
