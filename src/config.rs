use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transform::IDENTITY_TOLERANCE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "nearest"),
            Interpolation::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Which engine resamples frames that need a non-identity correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResamplerBackend {
    /// Warp in this process with the `image` codecs.
    InProcess,
    /// Run an external program. `args` may contain `{input}`, `{output}`
    /// and `{matrix}` placeholders.
    Command { program: String, args: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker threads for the apply stage, 0 picks a size from the machine.
    pub worker_threads: usize,
    pub interpolation: Interpolation,
    /// Largest absolute matrix deviation still treated as identity.
    pub identity_tolerance: f64,
    /// Where resampled frames are written before normalization.
    /// Falls back to the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Stop starting new frames after the first failure.
    pub fail_fast: bool,
    pub resampler: ResamplerBackend,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            interpolation: Interpolation::Bilinear,
            identity_tolerance: IDENTITY_TOLERANCE,
            temp_dir: None,
            fail_fast: false,
            resampler: ResamplerBackend::InProcess,
        }
    }
}

impl ProcessingConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
