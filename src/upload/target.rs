//! Mapping from local artifact paths to remote object paths.

use std::path::{Component, Path, PathBuf};

use crate::catalog::CatalogFile;

/// Where a file lands in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Parent folder, `/` for the store root.
    pub folder: String,
    /// Object name inside `folder`.
    pub name: String,
}

impl RemoteTarget {
    /// Full object path.
    #[must_use]
    pub fn path(&self) -> String {
        if self.folder == "/" {
            format!("/{}", self.name)
        } else {
            format!("{}/{}", self.folder, self.name)
        }
    }
}

/// Mirrors the tree under `local_root` beneath `remote_root`.
///
/// Files stored outside `local_root` go to `remote_root/<collection>/<name>`.
#[derive(Debug, Clone)]
pub struct TargetMapper {
    local_root: PathBuf,
    /// Normalized: leading `/`, no trailing `/`, empty for the store root.
    remote_root: String,
}

impl TargetMapper {
    #[must_use]
    pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
        let trimmed = remote_root.trim_matches('/');
        let remote_root = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self {
            local_root: local_root.into(),
            remote_root,
        }
    }

    #[must_use]
    pub fn target_for(&self, file: &CatalogFile) -> RemoteTarget {
        let segments = relative_segments(Path::new(&file.path), &self.local_root)
            .unwrap_or_else(|| vec![file.collection_name.clone(), file.name.clone()]);
        self.join(segments)
    }

    fn join(&self, mut segments: Vec<String>) -> RemoteTarget {
        let name = segments.pop().unwrap_or_default();
        let mut folder = self.remote_root.clone();
        for segment in segments {
            folder.push('/');
            folder.push_str(&segment);
        }
        if folder.is_empty() {
            folder.push('/');
        }
        RemoteTarget { folder, name }
    }
}

/// `path` relative to `root` as plain name segments, or `None` if `path` is
/// not strictly inside `root`.
fn relative_segments(path: &Path, root: &Path) -> Option<Vec<String>> {
    let relative = path.strip_prefix(root).ok()?;
    let segments = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}
