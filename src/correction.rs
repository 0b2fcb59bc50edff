//! Sequential transform passes: propagation cancellation and accumulation.
//!
//! Both passes take the previous stage's transforms by reference and return
//! a new vector, so the apply stage only ever sees a finished, read-only
//! list. Frame indices in this module's public API are 1-based, matching
//! the order frames were sectioned in.

use std::collections::BTreeSet;

use crate::error::{AlignError, Result};
use crate::transform::AffineTransform;

/// Cancel the correction of every non-propagating frame in the frame after it.
///
/// For frame `i` in `non_propagating` the successor's pairwise transform is
/// replaced with `inverse(pairwise[i])`, so the accumulated transform of
/// `i + 1` equals that of `i - 1`. Checks and inverses always read the
/// untouched input, so adjacent non-propagating frames do not influence one
/// another and the order of the set is irrelevant.
///
/// The pairwise transform of frame 1 has no predecessor and is treated as
/// identity.
pub fn cancel_non_propagating(
    pairwise: &[AffineTransform],
    non_propagating: &BTreeSet<usize>,
    tolerance: f64,
) -> Result<Vec<AffineTransform>> {
    let frames = pairwise.len();
    if frames == 0 {
        return Err(AlignError::NoFrames);
    }

    let mut original = pairwise.to_vec();
    if !original[0].is_identity_within(tolerance) {
        log::warn!(
            "Ignoring pairwise transform of frame 1 ({}): the first frame is the reference",
            original[0]
        );
    }
    original[0] = AffineTransform::identity();

    let mut corrected = original.clone();

    for &frame in non_propagating {
        if frame == 0 || frame > frames {
            return Err(AlignError::FrameIndexOutOfRange {
                index: frame,
                frames,
            });
        }
        if frame == frames {
            log::debug!("Frame {} is the last frame, nothing to cancel", frame);
            continue;
        }

        let successor = frame + 1;
        let successor_step = &original[successor - 1];
        if !successor_step.is_identity_within(tolerance) {
            return Err(AlignError::Consistency { frame, successor });
        }

        let local = &original[frame - 1];
        let undo = local
            .inverse()
            .ok_or(AlignError::SingularTransform { frame })?;
        corrected[successor - 1] = undo.compose(successor_step);

        log::info!(
            "Frame {} is non-propagating: frame {} now undoes {}",
            frame,
            successor,
            local
        );
    }

    Ok(corrected)
}

/// Compose pairwise transforms into one transform per frame relative to frame 1.
///
/// `acc[1]` is identity and `acc[i] = acc[i - 1] * pairwise[i]`. Identity
/// steps are composed like any other.
pub fn accumulate(pairwise: &[AffineTransform]) -> Vec<AffineTransform> {
    let mut accumulated = Vec::with_capacity(pairwise.len());
    let mut current = AffineTransform::identity();

    for (i, step) in pairwise.iter().enumerate() {
        if i > 0 {
            current = current.compose(step);
        }
        accumulated.push(current);
    }

    accumulated
}
