use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before or between pipeline stages.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("input and output directories are the same: {0}")]
    SameDirectories(PathBuf),

    #[error("cannot create output directory {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read input directory {path}: {source}")]
    ReadInputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame list is empty")]
    NoFrames,

    #[error("frame name {name:?} is not a plain file name")]
    InvalidFrameName { name: String },

    #[error("{transforms} pairwise transforms supplied for {frames} frames")]
    TransformCountMismatch { frames: usize, transforms: usize },

    #[error("non-propagating frame index {index} is outside 1..={frames}")]
    FrameIndexOutOfRange { index: usize, frames: usize },

    #[error(
        "declared non-propagating frame {frame}, but frame {successor} already has a non-identity transform"
    )]
    Consistency { frame: usize, successor: usize },

    #[error("non-propagating frame {frame} has a singular transform that cannot be cancelled")]
    SingularTransform { frame: usize },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Batch(#[from] BatchFailure),
}

/// Failure of a single frame during the apply stage.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{path}: unsupported color type {color}, expected grayscale or truecolor")]
    UnsupportedColor { path: PathBuf, color: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error("skipped after an earlier frame failed")]
    Skipped,
}

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{path}: cannot resample color type {color}")]
    UnsupportedColor { path: PathBuf, color: String },

    #[error("transform is not invertible")]
    Singular,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} reported success but did not write {output}")]
    MissingOutput { program: String, output: PathBuf },
}

#[derive(Debug)]
pub struct FrameFailure {
    /// 1-based frame index.
    pub index: usize,
    pub name: String,
    pub error: FrameError,
}

/// Every frame that failed in one apply pass.
#[derive(Error, Debug)]
#[error("{} of {total} frames failed", .failures.len())]
pub struct BatchFailure {
    pub total: usize,
    pub failures: Vec<FrameFailure>,
}

impl BatchFailure {
    /// Failures that were not just skipped because of an earlier one.
    pub fn root_causes(&self) -> impl Iterator<Item = &FrameFailure> {
        self.failures
            .iter()
            .filter(|f| !matches!(f.error, FrameError::Skipped))
    }
}

pub type Result<T, E = AlignError> = std::result::Result<T, E>;
