//! Corrects frame-to-frame shifts in serial blockface image stacks.
//!
//! Pairwise registrations (frame i onto frame i-1) come in precomputed. The
//! run cancels the corrections of frames flagged as non-propagating,
//! accumulates the rest into one transform per frame relative to the first
//! frame, and writes every frame resampled (or copied, for identity) as a
//! grayscale image into an output directory.

pub mod apply;
pub mod config;
pub mod correction;
pub mod error;
pub mod image_io;
pub mod logger;
pub mod manifest;
pub mod pipeline;
pub mod resample;
pub mod settings;
pub mod system_info;
pub mod transform;
pub mod warp;

pub use error::{AlignError, BatchFailure, FrameError};
pub use transform::AffineTransform;
