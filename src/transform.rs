//! 2D affine transforms used to register blockface frames.
//!
//! A transform is stored as a 3x3 homogeneous matrix with the last row fixed
//! to `[0 0 1]`. Registration tools usually hand out either the four
//! similarity parameters `[scale, rotation, tx, ty]` or a 2x3 matrix, so
//! both forms convert losslessly into [`AffineTransform`].

use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

/// Default absolute tolerance used when deciding whether a transform is identity.
pub const IDENTITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Build from the similarity parameters `[scale, rotation, tx, ty]`.
    /// Rotation is in radians, counter-clockwise.
    pub fn from_params(params: [f64; 4]) -> Self {
        let [scale, rotation, tx, ty] = params;
        let (sin_r, cos_r) = rotation.sin_cos();
        Self {
            matrix: Matrix3::new(
                scale * cos_r,
                -scale * sin_r,
                tx,
                scale * sin_r,
                scale * cos_r,
                ty,
                0.0,
                0.0,
                1.0,
            ),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_params([1.0, 0.0, tx, ty])
    }

    /// Build from a row-major 2x3 matrix `[[a, b, tx], [c, d, ty]]`.
    pub fn from_rows(rows: [[f64; 3]; 2]) -> Self {
        Self {
            matrix: Matrix3::new(
                rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], 0.0, 0.0,
                1.0,
            ),
        }
    }

    /// Similarity parameters `[scale, rotation, tx, ty]`.
    ///
    /// Exact for similarity transforms. For a general affine matrix the
    /// scale and rotation are taken from the first column only.
    pub fn to_params(&self) -> [f64; 4] {
        let m = &self.matrix;
        let scale = m[(0, 0)].hypot(m[(1, 0)]);
        let rotation = m[(1, 0)].atan2(m[(0, 0)]);
        [scale, rotation, m[(0, 2)], m[(1, 2)]]
    }

    pub fn to_rows(&self) -> [[f64; 3]; 2] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        ]
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// `self * step`: `step` is applied first, then `self`.
    ///
    /// With pairwise transforms mapping frame i into frame i-1, this is the
    /// order that carries frame i all the way back into the reference frame.
    pub fn compose(&self, step: &AffineTransform) -> AffineTransform {
        AffineTransform {
            matrix: self.matrix * step.matrix,
        }
    }

    /// Algebraic inverse, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        self.matrix
            .try_inverse()
            .map(|matrix| AffineTransform { matrix })
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity_within(IDENTITY_TOLERANCE)
    }

    pub fn is_identity_within(&self, tolerance: f64) -> bool {
        (self.matrix - Matrix3::identity()).amax() <= tolerance
    }

    pub fn apply(&self, point: Point2<f64>) -> Point2<f64> {
        let m = &self.matrix;
        Point2::new(
            m[(0, 0)] * point.x + m[(0, 1)] * point.y + m[(0, 2)],
            m[(1, 0)] * point.x + m[(1, 1)] * point.y + m[(1, 2)],
        )
    }

    /// Three whitespace separated rows, the format external resampling
    /// tools read as an affine matrix file.
    pub fn to_matrix_text(&self) -> String {
        let m = &self.matrix;
        (0..3)
            .map(|r| format!("{} {} {}", m[(r, 0)], m[(r, 1)], m[(r, 2)]))
            .collect::<Vec<_>>()
            .join("\n")
            + "\n"
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [scale, rotation, tx, ty] = self.to_params();
        write!(
            f,
            "scale={:.6} rot={:.6}rad tx={:.3} ty={:.3}",
            scale, rotation, tx, ty
        )
    }
}

/// Serialized form of a transform in run manifests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSpec {
    /// `[scale, rotation, tx, ty]`
    Params([f64; 4]),
    /// `[[a, b, tx], [c, d, ty]]`
    Matrix([[f64; 3]; 2]),
}

impl From<TransformSpec> for AffineTransform {
    fn from(spec: TransformSpec) -> Self {
        match spec {
            TransformSpec::Params(p) => AffineTransform::from_params(p),
            TransformSpec::Matrix(rows) => AffineTransform::from_rows(rows),
        }
    }
}
