//! Allow-list guard for file paths
//!
//! Every path served or read on behalf of a client must resolve inside one
//! of a fixed set of storage roots. [`AllowList`] is an explicit, immutable
//! value built once from configuration and passed to whoever needs it.
//!
//! Resolution is purely lexical: relative paths are joined onto a base
//! directory and `.`/`..` components are folded, without touching the
//! filesystem. Symbolic links are not followed, so a link placed inside a
//! root that points elsewhere is still admitted.

use std::path::{Component, Path, PathBuf};

use crate::error::{AccessError, Result};

/// A fixed set of directories under which file access is permitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    /// Directory that relative candidates are resolved against
    base: PathBuf,
    /// Absolute, normalized roots
    roots: Vec<PathBuf>,
}

impl AllowList {
    /// Build an allow-list resolving relative paths against the current
    /// working directory
    pub fn new<I, P>(roots: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let base = std::env::current_dir()?;
        Ok(Self::with_base(base, roots))
    }

    /// Build an allow-list resolving relative paths against `base`
    ///
    /// `base` is expected to be absolute; it is normalized but not joined
    /// onto the working directory.
    pub fn with_base<I, P>(base: impl AsRef<Path>, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let base = normalize(base.as_ref());
        let mut resolved: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = resolve_against(&base, root.as_ref());
            if !resolved.contains(&root) {
                resolved.push(root);
            }
        }
        Self {
            base,
            roots: resolved,
        }
    }

    /// The permitted roots in configuration order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Directory relative candidates are resolved against
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Lexical absolute form of a candidate path
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> PathBuf {
        resolve_against(&self.base, candidate.as_ref())
    }

    /// Whether the candidate resolves to a root or a descendant of one
    pub fn is_allowed(&self, candidate: impl AsRef<Path>) -> bool {
        let resolved = self.resolve(candidate);
        self.contains_resolved(&resolved)
    }

    /// Resolve a candidate and return its absolute form if permitted
    ///
    /// # Errors
    /// [`AccessError::Denied`] when the resolved path is outside all roots.
    pub fn check(&self, candidate: impl AsRef<Path>) -> Result<PathBuf> {
        let resolved = self.resolve(candidate);
        if self.contains_resolved(&resolved) {
            Ok(resolved)
        } else {
            tracing::warn!(path = %resolved.display(), "path outside allowed roots");
            Err(AccessError::Denied(resolved))
        }
    }

    /// Root that admits an already-resolved path, if any
    pub fn root_for(&self, resolved: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .find(|root| resolved.starts_with(root))
            .map(PathBuf::as_path)
    }

    // `Path::starts_with` compares whole components, so `/data/processed2`
    // is not under `/data/processed`.
    fn contains_resolved(&self, resolved: &Path) -> bool {
        self.root_for(resolved).is_some()
    }
}

fn resolve_against(base: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&base.join(candidate))
    }
}

/// Fold `.` and `..` components without consulting the filesystem
///
/// `..` at the root stays at the root, as with `path.resolve` semantics.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
