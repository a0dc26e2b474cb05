//! Storage directory layout and stored-asset helpers
//!
//! All stored files live below one base directory:
//!
//! ```text
//! file_storage/
//! ├── uploads/     raw files as received
//! ├── processed/   IFC output of the CAD service
//! ├── models/      GLB output of the CAD service
//! ├── status/      per-job status files
//! └── workspace/   scratch space, never served
//! ```
//!
//! Only the first four are handed to the [`AllowList`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AccessError, Result};
use crate::guard::AllowList;
use crate::storage::Storage;

/// Extensions accepted by [`StorageLayout::save_upload`]
pub const SUPPORTED_UPLOADS: &[&str] = &[
    "ifc", "glb", "gltf", "obj", "fbx", "usd", "usdz", "skp", "blend",
];

/// Directory layout under a single storage base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub base: PathBuf,
    pub uploads: PathBuf,
    pub processed: PathBuf,
    pub models: PathBuf,
    pub status: PathBuf,
    pub workspace: PathBuf,
}

impl StorageLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            uploads: base.join("uploads"),
            processed: base.join("processed"),
            models: base.join("models"),
            status: base.join("status"),
            workspace: base.join("workspace"),
            base,
        }
    }

    /// Create every directory of the layout
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.uploads, &self.processed, &self.models, &self.status, &self.workspace] {
            std::fs::create_dir_all(dir).map_err(|err| AccessError::io(dir, err))?;
            tracing::debug!(dir = %dir.display(), "ensured storage directory");
        }
        Ok(())
    }

    /// The directories files may be served from
    pub fn served_roots(&self) -> [&Path; 4] {
        [
            self.uploads.as_path(),
            self.processed.as_path(),
            self.models.as_path(),
            self.status.as_path(),
        ]
    }

    /// Allow-list over the served roots plus any extra roots
    pub fn allow_list<P: AsRef<Path>>(
        &self,
        base: impl AsRef<Path>,
        extra_roots: &[P],
    ) -> AllowList {
        let roots = self
            .served_roots()
            .into_iter()
            .map(Path::to_path_buf)
            .chain(extra_roots.iter().map(|p| p.as_ref().to_path_buf()));
        AllowList::with_base(base, roots)
    }

    /// Store uploaded bytes under `uploads/` with a unique name
    ///
    /// The stored name is `<timestamp>_<uuid>_<sanitized original>`. The
    /// destination is checked against `allow` before anything is written.
    ///
    /// # Errors
    /// - [`AccessError::Unsupported`] for extensions outside
    ///   [`SUPPORTED_UPLOADS`]
    /// - [`AccessError::Denied`] if the uploads directory is not permitted
    pub fn save_upload(
        &self,
        allow: &AllowList,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredFile> {
        if !is_supported_upload(original_name) {
            return Err(AccessError::Unsupported(original_name.to_string()));
        }

        let file_id = Uuid::new_v4();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let stored_name = format!("{}_{}_{}", timestamp, file_id, sanitize_filename(original_name));

        let path = allow.check(self.uploads.join(stored_name))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| AccessError::io(parent, err))?;
        }
        std::fs::write(&path, bytes).map_err(|err| AccessError::io(&path, err))?;

        tracing::info!(
            file_id = %file_id,
            original = original_name,
            path = %path.display(),
            bytes = bytes.len(),
            "stored upload"
        );

        Ok(StoredFile {
            file_id,
            original_name: original_name.to_string(),
            path,
            kind: FileKind::from_name(original_name),
            size: bytes.len() as u64,
        })
    }
}

/// Record of a stored upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    pub file_id: Uuid,
    pub original_name: String,
    pub path: PathBuf,
    pub kind: FileKind,
    pub size: u64,
}

/// Coarse file classification by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dxf,
    Dwg,
    Ifc,
    Glb,
    Gltf,
    Obj,
    Skp,
    Pdf,
    Image,
    Unknown,
}

impl FileKind {
    pub fn from_name(name: impl AsRef<Path>) -> Self {
        let ext = extension_lowercase(name.as_ref());
        match ext.as_deref() {
            Some("dxf") => Self::Dxf,
            Some("dwg") => Self::Dwg,
            Some("ifc") => Self::Ifc,
            Some("glb") => Self::Glb,
            Some("gltf") => Self::Gltf,
            Some("obj") => Self::Obj,
            Some("skp") => Self::Skp,
            Some("pdf") => Self::Pdf,
            Some("jpg" | "jpeg" | "png") => Self::Image,
            _ => Self::Unknown,
        }
    }
}

fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether a file name carries an extension accepted for upload
pub fn is_supported_upload(name: &str) -> bool {
    extension_lowercase(Path::new(name))
        .is_some_and(|ext| SUPPORTED_UPLOADS.contains(&ext.as_str()))
}

/// Replace characters that are unsafe in stored file names with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// Count and size of stored files of one kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KindStats {
    pub count: usize,
    pub size_bytes: u64,
}

/// Totals across every permitted root
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub by_kind: BTreeMap<FileKind, KindStats>,
}

/// Walk every root of the storage allow-list and total file sizes
///
/// Roots that do not exist yet are skipped. A root nested inside another
/// is only counted once.
pub fn storage_stats(storage: &Storage) -> Result<StorageStats> {
    let mut stats = StorageStats::default();
    let mut seen = std::collections::HashSet::new();

    for root in storage.allow_list().roots() {
        let files = match storage.list_dir(root, &[]) {
            Ok(files) => files,
            Err(AccessError::NotFound(_)) | Err(AccessError::NotADirectory(_)) => {
                tracing::debug!(root = %root.display(), "skipping missing storage root");
                continue;
            }
            Err(err) => return Err(err),
        };

        for file in files {
            if !seen.insert(file.clone()) {
                continue;
            }
            let (_, meta) = storage.metadata(&file)?;
            let entry = stats.by_kind.entry(FileKind::from_name(&file)).or_default();
            entry.count += 1;
            entry.size_bytes += meta.len();
            stats.total_files += 1;
            stats.total_size_bytes += meta.len();
        }
    }

    let size_mb = stats.total_size_bytes as f64 / (1024.0 * 1024.0);
    stats.total_size_mb = (size_mb * 100.0).round() / 100.0;
    Ok(stats)
}
