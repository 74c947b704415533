//! The similarity oracle: the external face-verification capability.
//!
//! The core never inspects pixels itself. Every pairwise comparison goes
//! through [`SimilarityOracle::verify`], which answers with a boolean verdict
//! plus a distance score. The shipped implementation, [`CommandOracle`], runs
//! an external verifier process per comparison and parses a JSON verdict from
//! its stdout; the comparison is the only slow operation in the system, so
//! every call is timeout-bounded.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one pairwise comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Verdict {
    pub verified: bool,
    pub distance: f32,
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("verifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("verifier exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("malformed verdict: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Pairwise face verification between two images on storage.
///
/// Implementations must be safe to call concurrently; the matcher fans out
/// one gallery scan per identity and each scan calls `verify` in sequence.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn verify(&self, probe: &Path, reference: &Path) -> Result<Verdict, OracleError>;
}

/// Oracle backed by an external verifier process.
///
/// Invoked as `program [args..] <probe> <reference>`; expected to print a
/// single JSON object `{"verified": bool, "distance": float}` on stdout and
/// exit zero. The child is killed if the caller abandons the comparison.
pub struct CommandOracle {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SimilarityOracle for CommandOracle {
    async fn verify(&self, probe: &Path, reference: &Path) -> Result<Verdict, OracleError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(probe)
            .arg(reference)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(OracleError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let verdict: Verdict = serde_json::from_slice(&output.stdout)?;
        tracing::trace!(
            probe = %probe.display(),
            reference = %reference.display(),
            verified = verdict.verified,
            distance = verdict.distance,
            "verifier verdict"
        );
        Ok(verdict)
    }
}
