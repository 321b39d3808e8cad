use glam::DVec2;

use crate::{
    config::DeformMode,
    error::DeformError,
    mesh::GridMesh,
    probe::{dlb, Probe},
    weights::WeightField,
};

/// Vertices with a smaller total weight keep their rest position.
pub const MIN_TOTAL_WEIGHT: f64 = 1e-12;

/// Combines probe transforms and weights into vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshDeformer {
    mode: DeformMode,
}

impl MeshDeformer {
    /// Create a deformer using the given strategy.
    pub fn new(mode: DeformMode) -> Self {
        Self { mode }
    }

    /// The deformation strategy.
    pub fn mode(&self) -> DeformMode {
        self.mode
    }

    /// Compute the deformed position of every vertex.
    ///
    /// # Arguments
    ///
    /// * `mesh` - The rest mesh.
    /// * `probes` - The probes, in the order of the weight field.
    /// * `weights` - Influence of each probe on each vertex.
    /// * `positions` - Output buffer with one position per vertex.
    pub fn deform(
        &self,
        mesh: &GridMesh,
        probes: &[Probe],
        weights: &WeightField,
        positions: &mut [DVec2],
    ) -> Result<(), DeformError> {
        if weights.num_probes() != probes.len() || weights.num_vertices() != mesh.num_vertices() {
            return Err(DeformError::WeightLengthMismatch {
                expected: probes.len() * mesh.num_vertices(),
                actual: weights.num_probes() * weights.num_vertices(),
            });
        }
        if positions.len() != mesh.num_vertices() {
            return Err(DeformError::VertexCountMismatch {
                expected: mesh.num_vertices(),
                actual: positions.len(),
            });
        }

        match self.mode {
            DeformMode::Dlb => deform_dlb(mesh, probes, weights, positions),
            DeformMode::LinearBlend => deform_linear(mesh, probes, weights, positions),
            DeformMode::MlsRigid => deform_mls(mesh, probes, weights, positions, false),
            DeformMode::MlsSimilarity => deform_mls(mesh, probes, weights, positions, true),
        }

        Ok(())
    }
}

fn deform_dlb(mesh: &GridMesh, probes: &[Probe], weights: &WeightField, positions: &mut [DVec2]) {
    for (v, (position, vertex)) in positions.iter_mut().zip(mesh.rest_vertices()).enumerate() {
        *position = match dlb(probes, weights, v) {
            Some(dcn) => vertex.acted_by(&dcn).dual,
            None => vertex.dual,
        };
    }
}

fn deform_linear(
    mesh: &GridMesh,
    probes: &[Probe],
    weights: &WeightField,
    positions: &mut [DVec2],
) {
    for (v, position) in positions.iter_mut().enumerate() {
        let rest = mesh.rest_position(v);
        let mut total = 0.0;
        let mut acc = DVec2::ZERO;
        for (probe, w) in probes.iter().zip(weights.vertex_weights(v)) {
            if w > 0.0 {
                total += w;
                acc += w * probe.transform().transform_point(rest);
            }
        }
        *position = if total > MIN_TOTAL_WEIGHT {
            acc / total
        } else {
            rest
        };
    }
}

fn deform_mls(
    mesh: &GridMesh,
    probes: &[Probe],
    weights: &WeightField,
    positions: &mut [DVec2],
    similarity: bool,
) {
    // control point pairs: the corners of each probe at the initial and current pose
    let controls = probes
        .iter()
        .map(|probe| (probe.initial_corners(), probe.corners()))
        .collect::<Vec<_>>();

    for (v, position) in positions.iter_mut().enumerate() {
        let rest = mesh.rest_position(v);
        *position = mls_point(rest, &controls, weights.vertex_weights(v), similarity)
            .unwrap_or(rest);
    }
}

// Closed-form moving least squares fit at one point.
fn mls_point(
    point: DVec2,
    controls: &[([DVec2; 4], [DVec2; 4])],
    weights: impl Iterator<Item = f64> + Clone,
    similarity: bool,
) -> Option<DVec2> {
    let mut total = 0.0;
    let mut p_star = DVec2::ZERO;
    let mut q_star = DVec2::ZERO;
    for ((initial, current), w) in controls.iter().zip(weights.clone()) {
        if w <= 0.0 {
            continue;
        }
        for (p, q) in initial.iter().zip(current) {
            total += w;
            p_star += w * *p;
            q_star += w * *q;
        }
    }
    if total <= MIN_TOTAL_WEIGHT {
        return None;
    }
    p_star /= total;
    q_star /= total;

    // weighted cross-covariance and spread of the centered control points
    let (mut a, mut b, mut spread) = (0.0, 0.0, 0.0);
    for ((initial, current), w) in controls.iter().zip(weights) {
        if w <= 0.0 {
            continue;
        }
        for (p, q) in initial.iter().zip(current) {
            let p_hat = *p - p_star;
            let q_hat = *q - q_star;
            a += w * p_hat.dot(q_hat);
            b += w * p_hat.perp_dot(q_hat);
            spread += w * p_hat.length_squared();
        }
    }

    let d = point - p_star;
    let norm = a.hypot(b);
    if norm <= MIN_TOTAL_WEIGHT || spread <= MIN_TOTAL_WEIGHT {
        return Some(q_star + d);
    }

    let rotation = DVec2::new(a / norm, b / norm);
    let scale = if similarity { norm / spread } else { 1.0 };
    Some(q_star + scale * rotation.rotate(d))
}
