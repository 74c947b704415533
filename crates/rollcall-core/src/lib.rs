//! rollcall-core — face-verification core for the attendance system.
//!
//! Three pieces carry the real logic: the enrollment guard (no identity may
//! hold two reference images of the same face), the face matcher (bounded
//! per-identity fan-out over all enrolled galleries), and the probe intake
//! (bytes-or-path input resolved once into a validated image).
//!
//! Face similarity itself is an external capability behind the
//! [`SimilarityOracle`] trait; the core only decides what gets compared, in
//! what order, and how verdicts are aggregated.

pub mod enroll;
pub mod gallery;
pub mod matcher;
pub mod oracle;
pub mod source;

pub use enroll::{EnrollError, EnrollOutcome, EnrollmentGuard};
pub use gallery::{GalleryError, GalleryStore};
pub use matcher::{FaceMatcher, MatchError, MatchReport, MatchResult};
pub use oracle::{CommandOracle, OracleError, SimilarityOracle, Verdict};
pub use source::{ImageError, ImageSource, ResolvedImage};

#[cfg(test)]
pub(crate) mod testutil;
