//! Applies the finished accumulated transforms to every frame in parallel.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ProcessingConfig;
use crate::error::{AlignError, BatchFailure, FrameError, FrameFailure};
use crate::image_io::{copy_as_grayscale, probe_color, write_grayscale};
use crate::resample::Resampler;
use crate::system_info;
use crate::transform::AffineTransform;

/// Progress callback: (message, percentage)
pub type ProgressCallback = Arc<Mutex<dyn FnMut(String, f32) + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Identity transform, source copied with grayscale normalization.
    Copied,
    /// Resampled through the configured engine, then normalized.
    Resampled,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub index: usize,
    pub name: String,
    pub action: FrameAction,
}

#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    pub outcomes: Vec<FrameOutcome>,
    pub elapsed: std::time::Duration,
}

impl ApplySummary {
    pub fn count(&self, action: FrameAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }
}

pub struct FrameApplicator<'a> {
    input_dir: &'a Path,
    output_dir: &'a Path,
    resampler: &'a dyn Resampler,
    config: &'a ProcessingConfig,
    progress_cb: Option<ProgressCallback>,
}

impl<'a> FrameApplicator<'a> {
    pub fn new(
        input_dir: &'a Path,
        output_dir: &'a Path,
        resampler: &'a dyn Resampler,
        config: &'a ProcessingConfig,
    ) -> Self {
        Self {
            input_dir,
            output_dir,
            resampler,
            config,
            progress_cb: None,
        }
    }

    pub fn with_progress(mut self, progress_cb: ProgressCallback) -> Self {
        self.progress_cb = Some(progress_cb);
        self
    }

    /// Apply `accumulated[i]` to `frames[i]` for every frame.
    ///
    /// Frames are independent, so a failing frame does not stop the others
    /// unless `fail_fast` is set. All failures come back together as one
    /// [`BatchFailure`].
    pub fn apply(
        &self,
        frames: &[String],
        accumulated: &[AffineTransform],
    ) -> Result<ApplySummary, AlignError> {
        if frames.len() != accumulated.len() {
            return Err(AlignError::TransformCountMismatch {
                frames: frames.len(),
                transforms: accumulated.len(),
            });
        }
        if frames.is_empty() {
            return Err(AlignError::NoFrames);
        }

        let start = std::time::Instant::now();
        let workers = self.worker_count(&frames[0]);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("frame-worker-{}", i))
            .build()?;

        log::info!(
            "Applying transforms to {} frames with {} workers ({} resampler)",
            frames.len(),
            workers,
            self.resampler.name()
        );
        self.report_progress("Applying transforms...", 0.0);

        let total = frames.len();
        let done = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);

        let results: Vec<(usize, Result<FrameAction, FrameError>)> = pool.install(|| {
            (0..total)
                .into_par_iter()
                .map(|i| {
                    let result = if stop.load(Ordering::Relaxed) {
                        Err(FrameError::Skipped)
                    } else {
                        self.apply_frame(i + 1, &frames[i], &accumulated[i])
                    };

                    if result.is_err() && self.config.fail_fast {
                        stop.store(true, Ordering::Relaxed);
                    }

                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.report_progress(
                        &format!("Frame {}/{}", finished, total),
                        finished as f32 / total as f32 * 100.0,
                    );
                    (i, result)
                })
                .collect()
        });

        let mut outcomes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (i, result) in results {
            match result {
                Ok(action) => outcomes.push(FrameOutcome {
                    index: i + 1,
                    name: frames[i].clone(),
                    action,
                }),
                Err(error) => {
                    if !matches!(error, FrameError::Skipped) {
                        log::error!("Frame {} ({}) failed: {}", i + 1, frames[i], error);
                    }
                    failures.push(FrameFailure {
                        index: i + 1,
                        name: frames[i].clone(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(BatchFailure { total, failures }.into());
        }

        let summary = ApplySummary {
            outcomes,
            elapsed: start.elapsed(),
        };
        log::info!(
            "Applied {} frames in {:?} ({} copied, {} resampled)",
            total,
            summary.elapsed,
            summary.count(FrameAction::Copied),
            summary.count(FrameAction::Resampled)
        );
        self.report_progress("Done", 100.0);
        Ok(summary)
    }

    fn apply_frame(
        &self,
        index: usize,
        name: &str,
        transform: &AffineTransform,
    ) -> Result<FrameAction, FrameError> {
        let source = self.input_dir.join(name);
        let destination = destination_for(self.output_dir, name);

        if transform.is_identity_within(self.config.identity_tolerance) {
            copy_as_grayscale(&source, &destination)?;
            log::info!("Frame {} ({}): identity, copied", index, name);
            return Ok(FrameAction::Copied);
        }

        // rejects unsupported encodings before the resampler runs
        probe_color(&source)?;

        let temp_dir = self.config.temp_dir();
        let stem = Path::new(name)
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        // deleted on drop, whichever step below fails
        let resampled = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", stem, index))
            .suffix(".png")
            .tempfile_in(&temp_dir)
            .map_err(|source| FrameError::Io {
                path: temp_dir.clone(),
                source,
            })?;

        self.resampler
            .resample(&source, transform, resampled.path())?;

        let temp_path = resampled.path().to_path_buf();
        let written = write_grayscale(&temp_path, &destination);
        let removed = resampled.close().map_err(|source| FrameError::Io {
            path: temp_path,
            source,
        });
        written?;
        removed?;

        log::info!("Frame {} ({}): resampled with {}", index, name, transform);
        Ok(FrameAction::Resampled)
    }

    fn worker_count(&self, first_frame: &str) -> usize {
        if self.config.worker_threads > 0 {
            return self.config.worker_threads;
        }

        let footprint = image::image_dimensions(self.input_dir.join(first_frame))
            .map(|(w, h)| system_info::estimate_frame_footprint_mb(w, h, 6))
            .unwrap_or(0.0);
        system_info::optimal_worker_count(system_info::get_available_memory_gb(), footprint)
    }

    fn report_progress(&self, msg: &str, pct: f32) {
        if let Some(ref cb) = self.progress_cb {
            if let Ok(mut cb_lock) = cb.lock() {
                cb_lock(msg.to_string(), pct);
            }
        }
    }
}

/// Destination path of a frame: same file name under the output directory.
pub fn destination_for(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(name)
}
