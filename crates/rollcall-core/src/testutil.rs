//! Shared test fixtures: tiny generated images and deterministic stub oracles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::oracle::{OracleError, SimilarityOracle, Verdict};

/// Encode an 8x8 solid-gray PNG. Same shade, same bytes.
pub fn encode_png(shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([shade, shade, shade]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encode");
    bytes.into_inner()
}

pub fn write_png(dir: &Path, name: &str, shade: u8) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, encode_png(shade)).expect("write test image");
    path
}

/// Oracle that treats byte-identical files as the same face.
pub struct ByteEqOracle;

#[async_trait]
impl SimilarityOracle for ByteEqOracle {
    async fn verify(&self, probe: &Path, reference: &Path) -> Result<Verdict, OracleError> {
        let a = std::fs::read(probe)?;
        let b = std::fs::read(reference)?;
        let verified = a == b;
        Ok(Verdict {
            verified,
            distance: if verified { 0.0 } else { 1.0 },
        })
    }
}

/// Oracle that fails every comparison.
pub struct AlwaysFailingOracle;

#[async_trait]
impl SimilarityOracle for AlwaysFailingOracle {
    async fn verify(&self, _probe: &Path, _reference: &Path) -> Result<Verdict, OracleError> {
        Err(OracleError::Io(std::io::Error::other("verifier down")))
    }
}

/// Byte-equality oracle that fails on specific reference paths.
pub struct FailOnOracle {
    poisoned: Vec<PathBuf>,
}

impl FailOnOracle {
    pub fn new(poisoned: Vec<PathBuf>) -> Self {
        Self { poisoned }
    }
}

#[async_trait]
impl SimilarityOracle for FailOnOracle {
    async fn verify(&self, probe: &Path, reference: &Path) -> Result<Verdict, OracleError> {
        if self.poisoned.iter().any(|p| p == reference) {
            return Err(OracleError::Io(std::io::Error::other("poisoned pair")));
        }
        ByteEqOracle.verify(probe, reference).await
    }
}
