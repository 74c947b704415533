//! Probe intake: bytes-or-path input resolved into a validated on-disk image.
//!
//! Front ends hand the core either a raw byte buffer (camera capture, HTTP
//! upload) or a path to an already-stored file. Both are resolved exactly once
//! at the boundary: the image must decode, and byte buffers are spilled to a
//! temp file so every downstream consumer sees a plain path. Spilled files are
//! deleted when the [`ResolvedImage`] is dropped, on every exit path.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("invalid image: {0}")]
    Invalid(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Tagged image input as received from a front end.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// In-memory encoded image (JPEG, PNG, ...).
    Bytes(Vec<u8>),
    /// Path to an encoded image on storage.
    Path(PathBuf),
}

impl ImageSource {
    /// Validate the input and pin it to a filesystem path.
    ///
    /// Fails with [`ImageError::Invalid`] before any comparison work if the
    /// input does not decode as a raster image.
    pub fn resolve(self) -> Result<ResolvedImage, ImageError> {
        match self {
            ImageSource::Bytes(bytes) => {
                let format = image::guess_format(&bytes)?;
                image::load_from_memory_with_format(&bytes, format)?;
                // The spill carries the real extension: gallery files saved
                // from it keep a name format-sensitive verifiers accept.
                let ext = format.extensions_str().first().copied().unwrap_or("img");
                let mut file = tempfile::Builder::new()
                    .prefix("rollcall-probe-")
                    .suffix(&format!(".{ext}"))
                    .tempfile()?;
                file.write_all(&bytes)?;
                file.flush()?;
                Ok(ResolvedImage {
                    path: ImagePath::Spilled(file.into_temp_path()),
                })
            }
            ImageSource::Path(path) => {
                image::open(&path)?;
                Ok(ResolvedImage {
                    path: ImagePath::OnDisk(path),
                })
            }
        }
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

enum ImagePath {
    /// Byte buffer spilled to a temp file; removed on drop.
    Spilled(TempPath),
    /// Caller-owned file; never removed by the core.
    OnDisk(PathBuf),
}

/// A decode-validated image pinned to a filesystem path for the duration of
/// one enroll or match call.
pub struct ResolvedImage {
    path: ImagePath,
}

impl ResolvedImage {
    pub fn path(&self) -> &Path {
        match &self.path {
            ImagePath::Spilled(tmp) => tmp,
            ImagePath::OnDisk(path) => path,
        }
    }
}

impl std::fmt::Debug for ResolvedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedImage")
            .field("path", &self.path())
            .finish()
    }
}
