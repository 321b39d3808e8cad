use glam::DVec2;
use probedeform_dcn::DualComplex;
use serde::{Deserialize, Serialize};

use crate::{error::DeformError, weights::WeightField};

/// Stable handle of a probe within a [`crate::ProbeMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeId(pub u32);

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flat record of a probe, used for import/export and undo snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Initial x coordinate.
    pub ix: f64,
    /// Initial y coordinate.
    pub iy: f64,
    /// Initial angle in radians.
    pub itheta: f64,
    /// Current x coordinate.
    pub x: f64,
    /// Current y coordinate.
    pub y: f64,
    /// Current angle in radians.
    pub theta: f64,
    /// Influence radius.
    pub radius: f64,
    /// Size multiplier of the probe.
    pub scale_multiplier: f64,
}

impl ProbeRecord {
    /// Record of a probe at rest at `(x, y)`.
    pub fn at_rest(x: f64, y: f64, radius: f64) -> Self {
        Self {
            ix: x,
            iy: y,
            itheta: 0.0,
            x,
            y,
            theta: 0.0,
            radius,
            scale_multiplier: 1.0,
        }
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), DeformError> {
        let values = [
            self.ix,
            self.iy,
            self.itheta,
            self.x,
            self.y,
            self.theta,
            self.scale_multiplier,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DeformError::InvalidPose(format!("{self:?}")));
        }
        if self.scale_multiplier <= 0.0 {
            return Err(DeformError::InvalidPose(format!(
                "scale multiplier must be positive, got {}",
                self.scale_multiplier
            )));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(DeformError::InvalidRadius(self.radius));
        }
        Ok(())
    }
}

/// The part of a probe the weights depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeAnchor {
    /// Initial position of the probe.
    pub position: DVec2,
    /// Effective influence radius.
    pub radius: f64,
}

/// A control handle carrying a rigid transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    id: ProbeId,
    // initial pose
    ix: f64,
    iy: f64,
    itheta: f64,
    // current pose
    x: f64,
    y: f64,
    theta: f64,
    radius: f64,
    scale_multiplier: f64,
    // transformation from the initial to the current pose
    dcn: DualComplex,
    // mirrored probe receiving mirrored pose deltas
    twin: Option<ProbeId>,
}

impl Probe {
    /// Create a probe at rest at `(x, y)`.
    pub fn new(id: ProbeId, x: f64, y: f64, radius: f64) -> Result<Self, DeformError> {
        Self::from_record(id, &ProbeRecord::at_rest(x, y, radius))
    }

    /// Create a probe from a flat record.
    pub fn from_record(id: ProbeId, record: &ProbeRecord) -> Result<Self, DeformError> {
        record.validate()?;
        let mut probe = Self {
            id,
            ix: record.ix,
            iy: record.iy,
            itheta: record.itheta,
            x: record.x,
            y: record.y,
            theta: record.theta,
            radius: record.radius,
            scale_multiplier: record.scale_multiplier,
            dcn: DualComplex::IDENTITY,
            twin: None,
        };
        probe.update_transform();
        Ok(probe)
    }

    /// Flat record of the probe.
    pub fn to_record(&self) -> ProbeRecord {
        ProbeRecord {
            ix: self.ix,
            iy: self.iy,
            itheta: self.itheta,
            x: self.x,
            y: self.y,
            theta: self.theta,
            radius: self.radius,
            scale_multiplier: self.scale_multiplier,
        }
    }

    /// Handle of the probe.
    pub fn id(&self) -> ProbeId {
        self.id
    }

    /// Mirrored twin of the probe, if any.
    pub fn twin(&self) -> Option<ProbeId> {
        self.twin
    }

    pub(crate) fn set_twin(&mut self, twin: Option<ProbeId>) {
        self.twin = twin;
    }

    /// Initial position.
    pub fn initial_position(&self) -> DVec2 {
        DVec2::new(self.ix, self.iy)
    }

    /// Initial angle in radians.
    pub fn initial_angle(&self) -> f64 {
        self.itheta
    }

    /// Current position.
    pub fn position(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    /// Current angle in radians.
    pub fn angle(&self) -> f64 {
        self.theta
    }

    /// Influence radius.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Size multiplier.
    pub fn scale_multiplier(&self) -> f64 {
        self.scale_multiplier
    }

    pub(crate) fn set_radius(&mut self, radius: f64) -> Result<(), DeformError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(DeformError::InvalidRadius(radius));
        }
        self.radius = radius;
        Ok(())
    }

    /// Transformation from the initial to the current pose.
    pub fn transform(&self) -> DualComplex {
        self.dcn
    }

    /// Set the current pose.
    pub fn set_pose(&mut self, x: f64, y: f64, theta: f64) {
        self.x = x;
        self.y = y;
        self.theta = theta;
        self.update_transform();
    }

    /// Move the current pose by a delta.
    pub fn set_pose_delta(&mut self, dx: f64, dy: f64, dtheta: f64) {
        self.set_pose(self.x + dx, self.y + dy, self.theta + dtheta);
    }

    /// Make the current pose the initial pose.
    pub fn freeze(&mut self) {
        self.ix = self.x;
        self.iy = self.y;
        self.itheta = self.theta;
        self.update_transform();
    }

    /// Squared distance from the initial position to `(px, py)`.
    pub fn distance_squared(&self, px: f64, py: f64) -> f64 {
        self.initial_position().distance_squared(DVec2::new(px, py))
    }

    /// Initial position and effective radius.
    ///
    /// With `fix_radius` every probe uses `probe_radius`, otherwise its own radius
    /// scaled by its size multiplier.
    pub fn anchor(&self, fix_radius: bool, probe_radius: f64) -> ProbeAnchor {
        ProbeAnchor {
            position: self.initial_position(),
            radius: if fix_radius {
                probe_radius
            } else {
                self.radius * self.scale_multiplier
            },
        }
    }

    /// Corners of the probe square at the initial pose.
    pub fn initial_corners(&self) -> [DVec2; 4] {
        self.corners_at(self.initial_position(), self.itheta)
    }

    /// Corners of the probe square at the current pose.
    pub fn corners(&self) -> [DVec2; 4] {
        self.corners_at(self.position(), self.theta)
    }

    fn corners_at(&self, center: DVec2, theta: f64) -> [DVec2; 4] {
        let half = 0.5 * self.radius * self.scale_multiplier;
        let axis = DVec2::from_angle(theta) * half;
        let perp = axis.perp();
        [
            center - axis - perp,
            center + axis - perp,
            center + axis + perp,
            center - axis + perp,
        ]
    }

    // translate(x - ix, y - iy) * rotate_about(ix, iy; theta - itheta)
    fn update_transform(&mut self) {
        let rotation =
            DualComplex::from_rotation(self.initial_position(), self.theta - self.itheta);
        let translation =
            DualComplex::from_translation(self.position() - self.initial_position());
        let dcn = translation * rotation;
        // q and -q are the same motion, blending needs real.x >= 0 for every probe
        self.dcn = if dcn.real.x < 0.0 { dcn.scale(-1.0) } else { dcn };
    }
}

/// Dual-complex linear blending of the probe transforms at a vertex.
///
/// Returns `None` when every probe has zero weight at the vertex.
pub fn dlb(probes: &[Probe], weights: &WeightField, vertex: usize) -> Option<DualComplex> {
    DualComplex::blend_weighted(
        probes
            .iter()
            .enumerate()
            .map(|(index, probe)| (probe.transform(), weights.weight(index, vertex))),
    )
}
