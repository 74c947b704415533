use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Base data directory (default: $XDG_DATA_HOME/rollcall).
    pub data_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root of the per-identity gallery directories.
    pub gallery_dir: PathBuf,
    /// External face verifier program.
    pub verifier_cmd: String,
    /// Extra arguments passed before the two image paths.
    pub verifier_args: Vec<String>,
    /// Timeout for a single pairwise verification.
    pub verify_timeout_secs: u64,
    /// Matcher pool size; defaults to available cores when unset.
    pub matcher_workers: Option<usize>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.db"));

        let gallery_dir = std::env::var("ROLLCALL_GALLERY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces"));

        let verifier_args = std::env::var("ROLLCALL_VERIFIER_ARGS")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            data_dir,
            db_path,
            gallery_dir,
            verifier_cmd: std::env::var("ROLLCALL_VERIFIER_CMD")
                .unwrap_or_else(|_| "rollcall-verify".to_string()),
            verifier_args,
            verify_timeout_secs: env_u64("ROLLCALL_VERIFY_TIMEOUT_SECS", 10),
            matcher_workers: env_opt_usize("ROLLCALL_MATCHER_WORKERS"),
        }
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
