use faer::prelude::SpSolver;
use glam::DVec2;

use crate::{
    config::{DeformerConfig, WeightMode},
    error::DeformError,
    laplacian::SparseOperator,
    mesh::GridMesh,
    probe::ProbeAnchor,
};

/// Parameters of the weight computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightOptions {
    /// Weighting policy.
    pub mode: WeightMode,
    /// Penalty weight of the seed constraints, `None` enforces them exactly.
    pub constraint_weight: Option<f64>,
    /// Fix the weights of unowned border vertices to zero.
    pub pin_boundary: bool,
    /// Radius of the seed region of each probe.
    pub seed_radius: f64,
}

impl WeightOptions {
    /// Extract the weighting parameters of a mesh configuration.
    pub fn from_config(config: &DeformerConfig) -> Self {
        Self {
            mode: config.weight_mode,
            constraint_weight: config.constraint_weight,
            pin_boundary: config.pin_boundary,
            seed_radius: config.seed_radius,
        }
    }
}

impl Default for WeightOptions {
    fn default() -> Self {
        Self::from_config(&DeformerConfig::default())
    }
}

/// Influence of every probe on every vertex.
///
/// The weights live in one contiguous arena indexed by `(probe, vertex)`. A field is
/// stamped with the generation of the probe set it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightField {
    num_probes: usize,
    num_vertices: usize,
    data: Vec<f64>,
    mode: WeightMode,
    generation: u64,
    fallback_probes: Vec<usize>,
}

impl WeightField {
    /// Create a field from raw weights laid out probe after probe.
    pub fn from_raw(
        num_probes: usize,
        num_vertices: usize,
        data: Vec<f64>,
        mode: WeightMode,
        generation: u64,
    ) -> Result<Self, DeformError> {
        if data.len() != num_probes * num_vertices {
            return Err(DeformError::WeightLengthMismatch {
                expected: num_probes * num_vertices,
                actual: data.len(),
            });
        }
        Ok(Self {
            num_probes,
            num_vertices,
            data,
            mode,
            generation,
            fallback_probes: Vec::new(),
        })
    }

    /// Compute the weights of `anchors` on `mesh`.
    ///
    /// Laplacian solves that fail degrade to Euclidean weights, see
    /// [`WeightField::fallback_probes`].
    ///
    /// # Arguments
    ///
    /// * `mesh` - The rest mesh.
    /// * `laplacian` - Graph Laplacian of the mesh.
    /// * `anchors` - Initial position and radius of each probe.
    /// * `options` - Weighting parameters.
    /// * `generation` - Generation of the probe set.
    pub fn compute(
        mesh: &GridMesh,
        laplacian: &SparseOperator,
        anchors: &[ProbeAnchor],
        options: &WeightOptions,
        generation: u64,
    ) -> Self {
        let now = std::time::Instant::now();

        let mut field = Self::euclidean(mesh, anchors, generation);
        if anchors.is_empty() || options.mode == WeightMode::Euclidean {
            return field;
        }
        field.mode = options.mode;

        let owner = assign_seeds(mesh, anchors, options.seed_radius);
        let mut seeded = vec![false; anchors.len()];
        for p in owner.iter().flatten() {
            seeded[*p] = true;
        }
        let pinned = (0..mesh.num_vertices())
            .map(|v| options.pin_boundary && owner[v].is_none() && mesh.is_boundary(v))
            .collect::<Vec<_>>();

        field.fallback_probes = (0..anchors.len()).filter(|p| !seeded[*p]).collect();
        for p in &field.fallback_probes {
            log::warn!("probe {p} has no seed vertex, falling back to euclidean weights");
        }
        if field.fallback_probes.len() == anchors.len() {
            field.mode = WeightMode::Euclidean;
            return field;
        }

        let operator = match options.mode {
            WeightMode::Biharmonic => laplacian.squared(),
            _ => laplacian.clone(),
        };

        let solved = match options.constraint_weight {
            None => solve_dirichlet(&operator, &owner, &pinned, anchors.len()),
            Some(weight) => solve_penalty(&operator, &owner, &pinned, anchors.len(), weight),
        };

        match solved {
            Ok(columns) => {
                for (p, column) in columns.into_iter().enumerate() {
                    if seeded[p] {
                        field.probe_weights_mut(p).copy_from_slice(&column);
                    }
                }
            }
            Err(e) => {
                log::warn!("weight solve failed ({e}), falling back to euclidean weights");
                field.mode = WeightMode::Euclidean;
                field.fallback_probes = (0..anchors.len()).collect();
            }
        }

        log::debug!(
            "computed {:?} weights for {} probes on {} vertices in {:?}",
            field.mode,
            anchors.len(),
            mesh.num_vertices(),
            now.elapsed()
        );

        field
    }

    /// Euclidean weights of `anchors` on `mesh`.
    pub fn euclidean(mesh: &GridMesh, anchors: &[ProbeAnchor], generation: u64) -> Self {
        let num_vertices = mesh.num_vertices();
        let mut data = Vec::with_capacity(anchors.len() * num_vertices);
        for anchor in anchors {
            data.extend((0..num_vertices).map(|v| {
                euclidean_weight(mesh.rest_position(v), anchor.position, anchor.radius)
            }));
        }
        Self {
            num_probes: anchors.len(),
            num_vertices,
            data,
            mode: WeightMode::Euclidean,
            generation,
            fallback_probes: Vec::new(),
        }
    }

    /// Number of probes.
    pub fn num_probes(&self) -> usize {
        self.num_probes
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Policy the weights were computed with.
    pub fn mode(&self) -> WeightMode {
        self.mode
    }

    /// Generation of the probe set the weights belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Probes whose Laplacian weights could not be computed and use Euclidean weights.
    pub fn fallback_probes(&self) -> &[usize] {
        &self.fallback_probes
    }

    /// Weight of probe `probe` at vertex `vertex`.
    #[inline]
    pub fn weight(&self, probe: usize, vertex: usize) -> f64 {
        self.data[probe * self.num_vertices + vertex]
    }

    /// Weights of one probe over all vertices.
    pub fn probe_weights(&self, probe: usize) -> &[f64] {
        &self.data[probe * self.num_vertices..(probe + 1) * self.num_vertices]
    }

    fn probe_weights_mut(&mut self, probe: usize) -> &mut [f64] {
        &mut self.data[probe * self.num_vertices..(probe + 1) * self.num_vertices]
    }

    /// Weights of all probes at one vertex.
    pub fn vertex_weights(&self, vertex: usize) -> impl Iterator<Item = f64> + Clone + '_ {
        (0..self.num_probes).map(move |p| self.weight(p, vertex))
    }

    /// Sum of the weights at one vertex.
    pub fn total_weight(&self, vertex: usize) -> f64 {
        self.vertex_weights(vertex).sum()
    }
}

/// Linear falloff `max(0, 1 - d / radius)`.
pub fn euclidean_weight(point: DVec2, anchor: DVec2, radius: f64) -> f64 {
    (1.0 - point.distance(anchor) / radius).max(0.0)
}

/// Assign seed vertices to probes.
///
/// A probe claims every vertex within `seed_radius` of its anchor and its closest
/// vertex. A vertex claimed by several probes goes to the nearest one, ties to the
/// lowest index.
pub fn assign_seeds(
    mesh: &GridMesh,
    anchors: &[ProbeAnchor],
    seed_radius: f64,
) -> Vec<Option<usize>> {
    let mut owner: Vec<Option<usize>> = vec![None; mesh.num_vertices()];
    let mut owner_distance = vec![f64::INFINITY; mesh.num_vertices()];

    let mut claim = |v: usize, p: usize, distance: f64| {
        if distance < owner_distance[v] {
            owner[v] = Some(p);
            owner_distance[v] = distance;
        }
    };

    let seed_radius_squared = seed_radius * seed_radius;
    for (p, anchor) in anchors.iter().enumerate() {
        let closest = mesh.closest_vertex(anchor.position);
        let distance = mesh.rest_position(closest).distance_squared(anchor.position);
        claim(closest, p, distance);
        if seed_radius > 0.0 {
            for v in 0..mesh.num_vertices() {
                let distance = mesh.rest_position(v).distance_squared(anchor.position);
                if distance <= seed_radius_squared {
                    claim(v, p, distance);
                }
            }
        }
    }

    owner
}

// Exact Dirichlet conditions: the constrained vertices are eliminated and the reduced
// system A_ff x = -A_fc b is solved for every probe with a shared factorization.
fn solve_dirichlet(
    operator: &SparseOperator,
    owner: &[Option<usize>],
    pinned: &[bool],
    num_probes: usize,
) -> Result<Vec<Vec<f64>>, DeformError> {
    let n = operator.size();

    let mut reindex = vec![None; n];
    let mut num_free = 0;
    for v in 0..n {
        if owner[v].is_none() && !pinned[v] {
            reindex[v] = Some(num_free);
            num_free += 1;
        }
    }

    let mut columns = vec![vec![0.0; n]; num_probes];
    for (v, p) in owner.iter().enumerate() {
        if let Some(p) = p {
            columns[*p][v] = 1.0;
        }
    }
    if num_free == 0 {
        return Ok(columns);
    }

    let a_ff = operator.to_faer(&reindex, num_free, None)?;
    let llt = a_ff
        .as_ref()
        .sp_cholesky(faer::Side::Lower)
        .map_err(|e| DeformError::Solver(format!("{e:?}")))?;

    let mut rhs = faer::Mat::<f64>::zeros(num_free, num_probes);
    for v in 0..n {
        let Some(row) = reindex[v] else {
            continue;
        };
        for &(u, value) in operator.row(v) {
            if let Some(p) = owner[u] {
                rhs.write(row, p, rhs.read(row, p) - value);
            }
        }
    }

    let solution = llt.solve(&rhs);
    for v in 0..n {
        if let Some(row) = reindex[v] {
            for (p, column) in columns.iter_mut().enumerate() {
                column[v] = clamp_weight(solution.read(row, p))?;
            }
        }
    }

    Ok(columns)
}

// Soft conditions: (A + c S) x = c S b over all vertices.
fn solve_penalty(
    operator: &SparseOperator,
    owner: &[Option<usize>],
    pinned: &[bool],
    num_probes: usize,
    constraint_weight: f64,
) -> Result<Vec<Vec<f64>>, DeformError> {
    let n = operator.size();
    let reindex = (0..n).map(Some).collect::<Vec<_>>();
    let diagonal = (0..n)
        .map(|v| {
            if owner[v].is_some() || pinned[v] {
                constraint_weight
            } else {
                0.0
            }
        })
        .collect::<Vec<_>>();

    let a = operator.to_faer(&reindex, n, Some(&diagonal))?;
    let llt = a
        .as_ref()
        .sp_cholesky(faer::Side::Lower)
        .map_err(|e| DeformError::Solver(format!("{e:?}")))?;

    let mut rhs = faer::Mat::<f64>::zeros(n, num_probes);
    for (v, p) in owner.iter().enumerate() {
        if let Some(p) = p {
            rhs.write(v, *p, constraint_weight);
        }
    }

    let solution = llt.solve(&rhs);
    (0..num_probes)
        .map(|p| {
            (0..n)
                .map(|v| clamp_weight(solution.read(v, p)))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

// Harmonic weights are within [0, 1] up to round-off, biharmonic and penalized ones
// may over- and undershoot.
fn clamp_weight(value: f64) -> Result<f64, DeformError> {
    if !value.is_finite() {
        return Err(DeformError::Solver(format!("non-finite weight {value}")));
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_mesh(divisions: u32) -> Result<(GridMesh, SparseOperator), DeformError> {
        let mesh = GridMesh::new(divisions, divisions, 1.0, 1.0)?;
        let laplacian = SparseOperator::grid_laplacian(&mesh);
        Ok((mesh, laplacian))
    }

    fn anchor(x: f64, y: f64, radius: f64) -> ProbeAnchor {
        ProbeAnchor {
            position: DVec2::new(x, y),
            radius,
        }
    }

    fn options(mode: WeightMode) -> WeightOptions {
        WeightOptions {
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_euclidean_weight_falloff() {
        let anchor = DVec2::ZERO;
        let mut previous = f64::INFINITY;
        for i in 0..20 {
            let w = euclidean_weight(DVec2::new(i as f64 * 0.1, 0.0), anchor, 1.0);
            assert!(w <= previous);
            assert!(w >= 0.0);
            previous = w;
        }
        assert_eq!(euclidean_weight(DVec2::ZERO, anchor, 1.0), 1.0);
        assert_eq!(euclidean_weight(DVec2::new(1.0, 0.0), anchor, 1.0), 0.0);
        assert_eq!(euclidean_weight(DVec2::new(0.0, 3.0), anchor, 1.0), 0.0);
    }

    #[test]
    fn test_euclidean_field() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(4)?;
        let anchors = [anchor(0.0, 0.0, 0.6)];
        let field = WeightField::compute(
            &mesh,
            &laplacian,
            &anchors,
            &options(WeightMode::Euclidean),
            7,
        );
        assert_eq!(field.num_probes(), 1);
        assert_eq!(field.generation(), 7);
        assert_eq!(field.mode(), WeightMode::Euclidean);
        assert_eq!(field.weight(0, mesh.vertex_index(2, 2)), 1.0);
        assert_eq!(field.weight(0, 0), 0.0);
        assert_relative_eq!(field.weight(0, mesh.vertex_index(2, 3)), 1.0 - 0.5 / 0.6);
        Ok(())
    }

    #[test]
    fn test_harmonic_boundary_conditions() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(6)?;
        let anchors = [anchor(-0.5, 0.0, 1.0), anchor(0.5, 0.0, 1.0)];
        for mode in [WeightMode::Harmonic, WeightMode::Biharmonic] {
            let field = WeightField::compute(&mesh, &laplacian, &anchors, &options(mode), 0);
            assert_eq!(field.mode(), mode);
            assert!(field.fallback_probes().is_empty());

            for (p, a) in anchors.iter().enumerate() {
                let seed = mesh.closest_vertex(a.position);
                assert_eq!(field.weight(p, seed), 1.0);
                assert_eq!(field.weight(1 - p, seed), 0.0);
            }
            for v in 0..mesh.num_vertices() {
                for p in 0..2 {
                    let w = field.weight(p, v);
                    assert!((0.0..=1.0).contains(&w));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_harmonic_partition_of_unity() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(5)?;
        let anchors = [
            anchor(-0.6, 0.6, 1.0),
            anchor(0.6, 0.2, 1.0),
            anchor(0.0, -0.6, 1.0),
        ];
        let field = WeightField::compute(
            &mesh,
            &laplacian,
            &anchors,
            &options(WeightMode::Harmonic),
            0,
        );
        for v in 0..mesh.num_vertices() {
            assert_relative_eq!(field.total_weight(v), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_harmonic_satisfies_laplace_equation() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(5)?;
        let anchors = [anchor(-0.6, 0.6, 1.0), anchor(0.6, -0.2, 1.0)];
        let field = WeightField::compute(
            &mesh,
            &laplacian,
            &anchors,
            &options(WeightMode::Harmonic),
            0,
        );
        let owner = assign_seeds(&mesh, &anchors, 0.0);
        let residual = laplacian.apply(field.probe_weights(0));
        for v in 0..mesh.num_vertices() {
            if owner[v].is_none() {
                assert!(residual[v].abs() < 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_single_probe_is_constant() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(4)?;
        let anchors = [anchor(0.1, 0.1, 1.0)];
        let field = WeightField::compute(
            &mesh,
            &laplacian,
            &anchors,
            &options(WeightMode::Harmonic),
            0,
        );
        for v in 0..mesh.num_vertices() {
            assert_relative_eq!(field.weight(0, v), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_pin_boundary() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(6)?;
        let anchors = [anchor(0.0, 0.0, 1.0)];
        let options = WeightOptions {
            mode: WeightMode::Harmonic,
            pin_boundary: true,
            ..Default::default()
        };
        let field = WeightField::compute(&mesh, &laplacian, &anchors, &options, 0);
        for v in 0..mesh.num_vertices() {
            if mesh.is_boundary(v) {
                assert_eq!(field.weight(0, v), 0.0);
            }
        }
        let center = mesh.vertex_index(3, 3);
        let between = mesh.vertex_index(3, 4);
        assert_eq!(field.weight(0, center), 1.0);
        assert!(field.weight(0, between) > 0.0 && field.weight(0, between) < 1.0);
        Ok(())
    }

    #[test]
    fn test_overlapping_seeds() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(4)?;
        // both probes are closest to the center vertex, the second one is nearer
        let anchors = [anchor(0.1, 0.0, 0.8), anchor(0.05, 0.0, 0.8)];
        let owner = assign_seeds(&mesh, &anchors, 0.0);
        let center = mesh.vertex_index(2, 2);
        assert_eq!(owner[center], Some(1));
        assert_eq!(owner.iter().flatten().count(), 1);

        let field = WeightField::compute(
            &mesh,
            &laplacian,
            &anchors,
            &options(WeightMode::Harmonic),
            0,
        );
        assert_eq!(field.fallback_probes(), &[0]);
        assert_eq!(field.weight(1, center), 1.0);
        // the probe without seed uses euclidean weights
        assert_relative_eq!(
            field.weight(0, center),
            euclidean_weight(mesh.rest_position(center), anchors[0].position, 0.8)
        );
        Ok(())
    }

    #[test]
    fn test_overlapping_seed_regions_tie() -> Result<(), DeformError> {
        let (mesh, _) = make_mesh(4)?;
        let anchors = [anchor(-0.25, 0.0, 1.0), anchor(0.25, 0.0, 1.0)];
        let owner = assign_seeds(&mesh, &anchors, 0.3);
        // equidistant vertex goes to the lowest index
        assert_eq!(owner[mesh.vertex_index(2, 2)], Some(0));
        assert_eq!(owner[mesh.vertex_index(2, 1)], Some(0));
        assert_eq!(owner[mesh.vertex_index(2, 3)], Some(1));
        Ok(())
    }

    #[test]
    fn test_penalty_constraints() -> Result<(), DeformError> {
        let (mesh, laplacian) = make_mesh(4)?;
        let anchors = [anchor(-0.5, 0.0, 1.0), anchor(0.5, 0.0, 1.0)];
        let options = WeightOptions {
            mode: WeightMode::Harmonic,
            constraint_weight: Some(1e6),
            ..Default::default()
        };
        let field = WeightField::compute(&mesh, &laplacian, &anchors, &options, 0);
        let seed = mesh.closest_vertex(anchors[0].position);
        assert_relative_eq!(field.weight(0, seed), 1.0, epsilon = 1e-4);
        assert_relative_eq!(field.weight(1, seed), 0.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_from_raw() {
        let field = WeightField::from_raw(2, 3, vec![0.0; 6], WeightMode::Euclidean, 1);
        assert!(field.is_ok());
        let field = WeightField::from_raw(2, 3, vec![0.0; 5], WeightMode::Euclidean, 1);
        assert_eq!(
            field.err(),
            Some(DeformError::WeightLengthMismatch {
                expected: 6,
                actual: 5
            })
        );
    }
}
