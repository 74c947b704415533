//! Filesystem gallery store: one directory of reference images per identity.
//!
//! Layout under the gallery root:
//!
//! ```text
//! <root>/identity_<uuid>/face_<timestamp>-<suffix>.<ext>
//! ```
//!
//! Listing order is sorted by file name, which sorts by enrollment timestamp;
//! identity enumeration is sorted by directory name. Both orders are fixed for
//! a given snapshot, which is what makes enrollment scans and match results
//! reproducible.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

const IDENTITY_DIR_PREFIX: &str = "identity_";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GalleryError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GalleryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Handle to the gallery root. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    root: PathBuf,
}

impl GalleryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identity_dir(&self, identity_id: Uuid) -> PathBuf {
        self.root
            .join(format!("{IDENTITY_DIR_PREFIX}{identity_id}"))
    }

    /// Create the identity's gallery directory if absent. Idempotent.
    pub fn ensure_identity_dir(&self, identity_id: Uuid) -> Result<PathBuf, GalleryError> {
        let dir = self.identity_dir(identity_id);
        std::fs::create_dir_all(&dir).map_err(|e| GalleryError::io(&dir, e))?;
        Ok(dir)
    }

    /// Reference images for one identity, in storage-listing (sorted) order.
    /// An absent directory reads as an empty gallery.
    pub fn list(&self, identity_id: Uuid) -> Result<Vec<PathBuf>, GalleryError> {
        let dir = self.identity_dir(identity_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        list_files_sorted(&dir)
    }

    /// All identities with a non-empty gallery, in sorted directory order.
    ///
    /// Directories that do not parse as `identity_<uuid>` are skipped with a
    /// warning rather than failing the whole enumeration.
    pub fn enumerate(&self) -> Result<Vec<(Uuid, Vec<PathBuf>)>, GalleryError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut dirs: Vec<(Uuid, PathBuf)> = Vec::new();
        let entries =
            std::fs::read_dir(&self.root).map_err(|e| GalleryError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| GalleryError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(raw_id) = name.strip_prefix(IDENTITY_DIR_PREFIX) else {
                tracing::warn!(dir = %path.display(), "foreign directory in gallery root, skipping");
                continue;
            };
            match Uuid::parse_str(raw_id) {
                Ok(id) => dirs.push((id, path)),
                Err(_) => {
                    tracing::warn!(dir = %path.display(), "unparseable identity directory, skipping");
                }
            }
        }
        dirs.sort_by(|a, b| a.1.cmp(&b.1));

        let mut galleries = Vec::with_capacity(dirs.len());
        for (id, dir) in dirs {
            let images = list_files_sorted(&dir)?;
            if !images.is_empty() {
                galleries.push((id, images));
            }
        }
        Ok(galleries)
    }

    /// Persist an accepted reference image under a fresh, collision-free name
    /// and return its path. Exactly one file is written.
    pub fn save(&self, identity_id: Uuid, source: &Path) -> Result<PathBuf, GalleryError> {
        let dir = self.ensure_identity_dir(identity_id)?;

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        let dest = dir.join(format!("face_{stamp}-{}.{ext}", &suffix[..8]));

        std::fs::copy(source, &dest).map_err(|e| GalleryError::io(&dest, e))?;
        tracing::debug!(identity = %identity_id, path = %dest.display(), "reference image stored");
        Ok(dest)
    }
}

fn list_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| GalleryError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| GalleryError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_png;

    #[test]
    fn absent_gallery_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path());
        assert!(store.list(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn save_and_list_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path());
        let id = Uuid::new_v4();

        let img = write_png(dir.path(), "input.png", 10);
        let a = store.save(id, &img).unwrap();
        let b = store.save(id, &img).unwrap();
        assert_ne!(a, b, "generated names must not collide");

        let listed = store.list(id).unwrap();
        assert_eq!(listed.len(), 2);
        let mut sorted = listed.clone();
        sorted.sort();
        assert_eq!(listed, sorted);
    }

    #[test]
    fn enumerate_skips_empty_and_foreign_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path());

        let populated = Uuid::new_v4();
        let img = write_png(dir.path(), "input.png", 20);
        store.save(populated, &img).unwrap();

        // Empty identity dir and a foreign dir: both invisible to matching.
        store.ensure_identity_dir(Uuid::new_v4()).unwrap();
        std::fs::create_dir(dir.path().join("lost+found")).unwrap();

        let galleries = store.enumerate().unwrap();
        assert_eq!(galleries.len(), 1);
        assert_eq!(galleries[0].0, populated);
        assert_eq!(galleries[0].1.len(), 1);
    }

    #[test]
    fn enumerate_is_sorted_by_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path());
        let img = write_png(dir.path(), "input.png", 30);

        let mut ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.save(*id, &img).unwrap();
        }
        ids.sort_by_key(|id| store.identity_dir(*id));

        let enumerated: Vec<Uuid> =
            store.enumerate().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(enumerated, ids);
    }
}
