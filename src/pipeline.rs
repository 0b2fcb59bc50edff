//! The three-stage run: cancel, accumulate, apply.

use std::path::{Component, Path, PathBuf};

use crate::apply::{ApplySummary, FrameApplicator, ProgressCallback};
use crate::config::ProcessingConfig;
use crate::correction::{accumulate, cancel_non_propagating};
use crate::error::{AlignError, Result};
use crate::manifest::{check_frame_name, FrameStack};
use crate::resample::Resampler;
use crate::transform::AffineTransform;

#[derive(Debug)]
pub struct RunReport {
    pub accumulated: Vec<AffineTransform>,
    pub summary: ApplySummary,
}

/// Drop `.` components and fold `..` into the preceding component without
/// touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normal.components().next_back() {
                Some(Component::Normal(_)) => {
                    normal.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normal.push(component),
            },
            other => normal.push(other),
        }
    }
    normal
}

/// Best-effort absolute form of `path`, also for paths that do not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended to it, after `..` and `.` have been folded away.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let normal = normalize_lexically(&absolute);

    let mut base = normal.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = base.canonicalize() {
            return tail.iter().rev().fold(canonical, |p, name| p.join(name));
        }
        match (base.parent(), base.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                base = parent;
            }
            _ => return normal,
        }
    }
}

/// Input and output must be different directories.
pub fn validate_directories(input_dir: &Path, output_dir: &Path) -> Result<()> {
    let input = resolve(input_dir);
    if input == resolve(output_dir) {
        return Err(AlignError::SameDirectories(input));
    }
    Ok(())
}

pub fn prepare_output_dir(output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir).map_err(|source| AlignError::CreateOutputDir {
        path: output_dir.to_path_buf(),
        source,
    })
}

/// Cancellation followed by accumulation; touches no files.
pub fn plan(stack: &FrameStack, config: &ProcessingConfig) -> Result<Vec<AffineTransform>> {
    for name in &stack.names {
        check_frame_name(name)?;
    }
    if stack.pairwise.len() != stack.names.len() {
        return Err(AlignError::TransformCountMismatch {
            frames: stack.names.len(),
            transforms: stack.pairwise.len(),
        });
    }
    let corrected = cancel_non_propagating(
        &stack.pairwise,
        &stack.non_propagating,
        config.identity_tolerance,
    )?;
    Ok(accumulate(&corrected))
}

pub fn run(
    input_dir: &Path,
    output_dir: &Path,
    stack: &FrameStack,
    config: &ProcessingConfig,
    resampler: &dyn Resampler,
    progress_cb: Option<ProgressCallback>,
) -> Result<RunReport> {
    validate_directories(input_dir, output_dir)?;

    log::info!(
        "Planning {} frames ({} non-propagating)",
        stack.len(),
        stack.non_propagating.len()
    );
    let accumulated = plan(stack, config)?;
    for (i, transform) in accumulated.iter().enumerate() {
        log::debug!("Frame {} ({}): {}", i + 1, stack.names[i], transform);
    }

    prepare_output_dir(output_dir)?;
    // both exist now, so this compares fully canonical paths (symlinks included)
    validate_directories(input_dir, output_dir)?;

    let mut applicator = FrameApplicator::new(input_dir, output_dir, resampler, config);
    if let Some(cb) = progress_cb {
        applicator = applicator.with_progress(cb);
    }
    let summary = applicator.apply(&stack.names, &accumulated)?;

    Ok(RunReport {
        accumulated,
        summary,
    })
}
