#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Dual complex numbers
//!
//! A dual complex number `real + dual·ε` packs a 2D rigid transformation into two
//! 2-vectors. Unit values (`|real| = 1`) represent a rotation by `2·arg(real)` followed
//! by the translation `2·real·dual`. Linear combinations of unit values followed by a
//! normalization (DLB) interpolate rigid motions without going through angles.
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec2;
//! use probedeform_dcn::DualComplex;
//!
//! // rotate by 90 degrees around (1, 1)
//! let dcn = DualComplex::from_rotation(DVec2::new(1.0, 1.0), std::f64::consts::FRAC_PI_2);
//! let p = dcn.transform_point(DVec2::new(2.0, 1.0));
//! assert!((p - DVec2::new(1.0, 2.0)).length() < 1e-12);
//! ```

mod dual_complex;
pub use dual_complex::*;

/// Error types for the dual complex algebra.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DcnError {
    /// The number of dual complex numbers and weights differ.
    #[error("Number of dual complex numbers ({0}) does not match number of weights ({1})")]
    LengthMismatch(usize, usize),

    /// The weighted sum has a vanishing real part and can not be normalized.
    #[error("Blend of dual complex numbers is degenerate")]
    DegenerateBlend,
}
