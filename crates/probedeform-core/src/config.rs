use serde::{Deserialize, Serialize};

use crate::error::DeformError;

/// Policy used to compute the influence of each probe on each vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightMode {
    /// Linear falloff with the distance to the probe anchor.
    Euclidean,
    /// Solution of the Laplace equation with Dirichlet conditions at the probes.
    #[default]
    Harmonic,
    /// Solution of the bi-Laplace equation with Dirichlet conditions at the probes.
    Biharmonic,
}

/// Strategy used to combine probe transforms into vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeformMode {
    /// Dual-complex linear blending of the probe transforms.
    #[default]
    Dlb,
    /// Weighted average of the positions transformed by each probe.
    LinearBlend,
    /// Moving least squares with a rigid transform per vertex.
    MlsRigid,
    /// Moving least squares with a similarity transform per vertex.
    MlsSimilarity,
}

/// Mesh construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformerConfig {
    /// Number of grid cells along the vertical axis.
    pub vertical_divisions: u32,
    /// Number of grid cells along the horizontal axis.
    pub horizontal_divisions: u32,
    /// Weighting policy.
    pub weight_mode: WeightMode,
    /// Deformation strategy.
    pub deform_mode: DeformMode,
    /// Penalty weight of the seed constraints. `None` enforces them exactly.
    pub constraint_weight: Option<f64>,
    /// Influence radius given to new probes, and to every probe with `fix_radius`.
    pub probe_radius: f64,
    /// Create a mirrored twin across the vertical axis for every new probe.
    pub symmetric: bool,
    /// Use `probe_radius` for every probe instead of its own scaled radius.
    pub fix_radius: bool,
    /// Fix the weights of the mesh border to zero in the Laplacian solves.
    pub pin_boundary: bool,
    /// Radius of the seed region of a probe in the Laplacian solves.
    pub seed_radius: f64,
}

impl Default for DeformerConfig {
    fn default() -> Self {
        Self {
            vertical_divisions: 10,
            horizontal_divisions: 10,
            weight_mode: WeightMode::default(),
            deform_mode: DeformMode::default(),
            constraint_weight: None,
            probe_radius: 0.5,
            symmetric: false,
            fix_radius: false,
            pin_boundary: false,
            seed_radius: 0.0,
        }
    }
}

impl DeformerConfig {
    /// Check the configuration before a mesh is built from it.
    pub fn validate(&self) -> Result<(), DeformError> {
        if self.vertical_divisions == 0 || self.horizontal_divisions == 0 {
            return Err(DeformError::InvalidDivisions(
                self.vertical_divisions,
                self.horizontal_divisions,
            ));
        }
        if !self.probe_radius.is_finite() || self.probe_radius <= 0.0 {
            return Err(DeformError::InvalidRadius(self.probe_radius));
        }
        if let Some(weight) = self.constraint_weight {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(DeformError::InvalidConfig(format!(
                    "constraint_weight must be positive, got {weight}"
                )));
            }
        }
        if !self.seed_radius.is_finite() || self.seed_radius < 0.0 {
            return Err(DeformError::InvalidConfig(format!(
                "seed_radius must be non-negative, got {}",
                self.seed_radius
            )));
        }
        Ok(())
    }
}
