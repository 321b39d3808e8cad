use glam::{DMat3, DVec2, DVec3};

use crate::DcnError;

/// Real parts with a smaller norm than this can not be normalized.
pub const NORM_EPSILON: f64 = 1e-12;

/// Complex product of two 2-vectors.
#[inline]
fn cmul(a: DVec2, b: DVec2) -> DVec2 {
    DVec2::new(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x)
}

/// Complex conjugate of a 2-vector.
#[inline]
fn cconj(a: DVec2) -> DVec2 {
    DVec2::new(a.x, -a.y)
}

/// An anti-commutative dual complex number `real + dual·ε`.
///
/// Unit values represent 2D rigid transformations. The vertex encoding
/// `(1, 0) + p·ε` (see [`DualComplex::from_point`]) represents the point `p`, and
/// [`DualComplex::acted_by`] applies a transformation to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DualComplex {
    /// The real part, a complex number stored as `[re, im]`.
    pub real: DVec2,
    /// The dual part, a complex number stored as `[re, im]`.
    pub dual: DVec2,
}

impl DualComplex {
    /// The zero element, used as the starting point of blend accumulations.
    pub const ZERO: Self = Self {
        real: DVec2::ZERO,
        dual: DVec2::ZERO,
    };

    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        real: DVec2::X,
        dual: DVec2::ZERO,
    };

    /// Create a dual complex number from its real and dual parts.
    pub fn new(real: DVec2, dual: DVec2) -> Self {
        Self { real, dual }
    }

    /// Create a dual complex number from its four coordinates.
    pub fn from_parts(real0: f64, real1: f64, dual0: f64, dual1: f64) -> Self {
        Self {
            real: DVec2::new(real0, real1),
            dual: DVec2::new(dual0, dual1),
        }
    }

    /// Pure translation by `t`.
    pub fn from_translation(t: DVec2) -> Self {
        Self {
            real: DVec2::X,
            dual: 0.5 * t,
        }
    }

    /// Rotation by `theta` radians (counter-clockwise) around `center`.
    ///
    /// Built as `translate(center) * rotate(theta) * translate(-center)`.
    pub fn from_rotation(center: DVec2, theta: f64) -> Self {
        let half = 0.5 * theta;
        let rotation = Self::new(DVec2::new(half.cos(), half.sin()), DVec2::ZERO);
        Self::from_translation(center) * rotation * Self::from_translation(-center)
    }

    /// Rotation by `theta` around the origin followed by a translation by `t`.
    pub fn from_rotation_translation(theta: f64, t: DVec2) -> Self {
        let half = 0.5 * theta;
        let real = DVec2::new(half.cos(), half.sin());
        Self {
            real,
            dual: 0.5 * cmul(cconj(real), t),
        }
    }

    /// Vertex encoding of the point `p`: identity real part, `p` as dual part.
    pub fn from_point(p: DVec2) -> Self {
        Self {
            real: DVec2::X,
            dual: p,
        }
    }

    /// Conjugation: negates the imaginary component of the real part.
    pub fn conjugate(&self) -> Self {
        Self {
            real: cconj(self.real),
            dual: self.dual,
        }
    }

    /// Euclidean norm of the real part.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.real.length()
    }

    /// Divide both parts by the norm of the real part.
    ///
    /// Returns `None` when the real part vanishes.
    pub fn try_normalize(&self) -> Option<Self> {
        let norm = self.norm();
        if !norm.is_finite() || norm < NORM_EPSILON {
            return None;
        }
        Some(Self {
            real: self.real / norm,
            dual: self.dual / norm,
        })
    }

    /// Divide both parts by the norm of the real part.
    ///
    /// A degenerate value normalizes to the identity.
    pub fn normalize(&self) -> Self {
        self.try_normalize().unwrap_or(Self::IDENTITY)
    }

    /// Multiply both parts by a scalar.
    pub fn scale(&self, s: f64) -> Self {
        Self {
            real: self.real * s,
            dual: self.dual * s,
        }
    }

    /// Apply the transformation `dcn` to the dual part of `self`.
    ///
    /// The real part of the result is reset to the identity. `dcn` is expected to be
    /// a unit value, otherwise the result is scaled by `|dcn.real|²`.
    pub fn acted_by(&self, dcn: &DualComplex) -> Self {
        Self {
            real: DVec2::X,
            dual: cmul(cmul(dcn.real, dcn.real), self.dual) + 2.0 * cmul(dcn.real, dcn.dual),
        }
    }

    /// Apply the transformation to a point.
    pub fn transform_point(&self, p: DVec2) -> DVec2 {
        Self::from_point(p).acted_by(self).dual
    }

    /// Rotation angle in radians of a unit value.
    pub fn angle(&self) -> f64 {
        2.0 * self.real.y.atan2(self.real.x)
    }

    /// Translation of a unit value, applied after the rotation.
    pub fn translation(&self) -> DVec2 {
        2.0 * cmul(self.real, self.dual)
    }

    /// Inverse transformation of a unit value.
    pub fn inverse(&self) -> Self {
        let theta = self.angle();
        let t = self.translation();
        let (s, c) = (-theta).sin_cos();
        let rotated = DVec2::new(c * t.x - s * t.y, s * t.x + c * t.y);
        Self::from_rotation_translation(-theta, -rotated)
    }

    /// 3x3 homogeneous matrix of a unit value.
    pub fn to_matrix(&self) -> DMat3 {
        let (s, c) = self.angle().sin_cos();
        let t = self.translation();
        DMat3::from_cols(
            DVec3::new(c, s, 0.0),
            DVec3::new(-s, c, 0.0),
            DVec3::new(t.x, t.y, 1.0),
        )
    }

    /// Dual-complex linear blending (DLB).
    ///
    /// Computes the weighted sum of `dcns` and normalizes it.
    ///
    /// # Arguments
    ///
    /// * `dcns` - The dual complex numbers to blend.
    /// * `weights` - The weight of each dual complex number.
    ///
    /// # Returns
    ///
    /// The blended unit dual complex number.
    pub fn blend(dcns: &[DualComplex], weights: &[f64]) -> Result<Self, DcnError> {
        if dcns.len() != weights.len() {
            return Err(DcnError::LengthMismatch(dcns.len(), weights.len()));
        }
        Self::blend_weighted(dcns.iter().copied().zip(weights.iter().copied()))
            .ok_or(DcnError::DegenerateBlend)
    }

    /// Dual-complex linear blending over `(dcn, weight)` pairs.
    ///
    /// Returns `None` when the accumulation can not be normalized, e.g. when every
    /// weight is zero.
    pub fn blend_weighted<I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (DualComplex, f64)>,
    {
        let mut acc = Self::ZERO;
        for (dcn, weight) in pairs {
            acc += dcn * weight;
        }
        acc.try_normalize()
    }
}

impl std::ops::Mul<DualComplex> for DualComplex {
    type Output = DualComplex;

    /// Composition: `a * b` applies `b` first, then `a`.
    fn mul(self, other: DualComplex) -> DualComplex {
        DualComplex {
            real: cmul(self.real, other.real),
            dual: cmul(self.real, other.dual) + cmul(self.dual, cconj(other.real)),
        }
    }
}

impl std::ops::Mul<f64> for DualComplex {
    type Output = DualComplex;

    fn mul(self, scale: f64) -> DualComplex {
        self.scale(scale)
    }
}

impl std::ops::MulAssign<f64> for DualComplex {
    fn mul_assign(&mut self, scale: f64) {
        self.real *= scale;
        self.dual *= scale;
    }
}

impl std::ops::Add<DualComplex> for DualComplex {
    type Output = DualComplex;

    fn add(self, other: DualComplex) -> DualComplex {
        DualComplex {
            real: self.real + other.real,
            dual: self.dual + other.dual,
        }
    }
}

impl std::ops::AddAssign<DualComplex> for DualComplex {
    fn add_assign(&mut self, other: DualComplex) {
        self.real += other.real;
        self.dual += other.dual;
    }
}

impl std::fmt::Display for DualComplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}+{}i + ({}+{}i)e",
            self.real.x, self.real.y, self.dual.x, self.dual.y
        )
    }
}
