use std::{sync::Arc, time::Duration};

use glam::DVec2;

use crate::{
    config::{DeformMode, DeformerConfig, WeightMode},
    deformer::MeshDeformer,
    error::DeformError,
    laplacian::SparseOperator,
    mesh::GridMesh,
    probe::{Probe, ProbeAnchor, ProbeId, ProbeRecord},
    weights::{WeightField, WeightOptions},
    worker::{WeightJob, WeightWorker},
};

// probes closer than this to the vertical axis get no mirrored twin
const SYMMETRY_EPSILON: f64 = 1e-9;

// loaded probes whose initial poses mirror within this tolerance become twins
const TWIN_TOLERANCE: f64 = 1e-9;

/// Immutable snapshot of the deformed vertex positions.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    version: u64,
    positions: Arc<[[f32; 2]]>,
}

impl VertexBuffer {
    fn from_positions(version: u64, positions: &[DVec2]) -> Self {
        Self {
            version,
            positions: positions.iter().map(|p| p.as_vec2().to_array()).collect(),
        }
    }

    /// Incremented every time a new buffer is published.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// One position per mesh vertex.
    pub fn positions(&self) -> &Arc<[[f32; 2]]> {
        &self.positions
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the buffer has no vertices.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Deformable image mesh together with its probes.
///
/// Every change to the probe set or to a probe's anchor or radius bumps the
/// generation and marks the weights stale. Pose changes only affect the next
/// [`ProbeMesh::deform`].
///
/// Weights are computed on the calling thread by default. Once they are handed to a
/// [`WeightWorker`] with [`ProbeMesh::request_weights`], the session never solves the
/// same generation itself: [`ProbeMesh::deform`] keeps returning the previous buffer
/// until the result is installed with [`ProbeMesh::poll_weights`] or
/// [`ProbeMesh::wait_weights`].
///
/// # Example
///
/// ```
/// use probedeform_core::{DeformerConfig, ProbeMesh};
///
/// let mut session = ProbeMesh::new(DeformerConfig::default(), 640.0, 480.0)?;
/// let id = session.add_probe(0.0, 0.0)?;
/// session.set_pose_delta(id, 0.1, 0.0, 0.0)?;
/// let buffer = session.deform()?;
/// assert_eq!(buffer.len(), 121);
/// # Ok::<(), probedeform_core::DeformError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProbeMesh {
    config: DeformerConfig,
    image_size: (f64, f64),
    pristine: Arc<GridMesh>,
    mesh: Arc<GridMesh>,
    laplacian: Arc<SparseOperator>,
    probes: Vec<Probe>,
    next_id: u32,
    generation: u64,
    weights: Option<Arc<WeightField>>,
    // generation handed to a worker and not installed yet
    pending: Option<u64>,
    deformer: MeshDeformer,
    positions: Vec<DVec2>,
    buffer: VertexBuffer,
}

impl ProbeMesh {
    /// Build the mesh of an image.
    ///
    /// # Arguments
    ///
    /// * `config` - Mesh construction parameters.
    /// * `image_width` - Width of the image in pixels.
    /// * `image_height` - Height of the image in pixels.
    pub fn new(
        config: DeformerConfig,
        image_width: f64,
        image_height: f64,
    ) -> Result<Self, DeformError> {
        config.validate()?;
        let mesh = GridMesh::new(
            config.vertical_divisions,
            config.horizontal_divisions,
            image_width,
            image_height,
        )?;
        let laplacian = SparseOperator::grid_laplacian(&mesh);
        let positions = (0..mesh.num_vertices())
            .map(|v| mesh.rest_position(v))
            .collect::<Vec<_>>();

        log::debug!(
            "created {}x{} mesh with {} vertices for a {image_width}x{image_height} image",
            config.vertical_divisions,
            config.horizontal_divisions,
            mesh.num_vertices()
        );

        let mesh = Arc::new(mesh);
        Ok(Self {
            deformer: MeshDeformer::new(config.deform_mode),
            buffer: VertexBuffer::from_positions(0, &positions),
            config,
            image_size: (image_width, image_height),
            pristine: mesh.clone(),
            mesh,
            laplacian: Arc::new(laplacian),
            probes: Vec::new(),
            next_id: 0,
            generation: 0,
            weights: None,
            pending: None,
            positions,
        })
    }

    /// The mesh configuration.
    pub fn config(&self) -> &DeformerConfig {
        &self.config
    }

    /// Width and height of the image.
    pub fn image_size(&self) -> (f64, f64) {
        self.image_size
    }

    /// The rest mesh.
    pub fn mesh(&self) -> &GridMesh {
        &self.mesh
    }

    /// The probes, in weight field order.
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Look up a probe.
    pub fn probe(&self, id: ProbeId) -> Option<&Probe> {
        self.probes.iter().find(|probe| probe.id() == id)
    }

    /// Generation of the current probe set.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The installed weight field, if it matches the current probe set.
    pub fn weights(&self) -> Option<&Arc<WeightField>> {
        self.weights
            .as_ref()
            .filter(|field| field.generation() == self.generation)
    }

    /// Whether the weights must be recomputed before the next deformation.
    pub fn weights_stale(&self) -> bool {
        self.weights().is_none()
    }

    /// Change the deformation strategy. Weights stay valid.
    pub fn set_deform_mode(&mut self, mode: DeformMode) {
        self.config.deform_mode = mode;
        self.deformer = MeshDeformer::new(mode);
    }

    /// Change the weighting policy.
    pub fn set_weight_mode(&mut self, mode: WeightMode) {
        if self.config.weight_mode != mode {
            self.config.weight_mode = mode;
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.generation += 1;
    }

    fn index_of(&self, id: ProbeId) -> Result<usize, DeformError> {
        self.probes
            .iter()
            .position(|probe| probe.id() == id)
            .ok_or(DeformError::ProbeNotFound(id))
    }

    fn next_probe_id(&mut self) -> ProbeId {
        let id = ProbeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a probe at rest at `(x, y)`, in mesh coordinates.
    ///
    /// With a symmetric configuration a twin mirrored across `x = 0` is added as well,
    /// unless the probe sits on the axis.
    pub fn add_probe(&mut self, x: f64, y: f64) -> Result<ProbeId, DeformError> {
        let id = self.next_probe_id();
        let mut probe = Probe::new(id, x, y, self.config.probe_radius)?;

        if self.config.symmetric && x.abs() > SYMMETRY_EPSILON {
            let twin_id = self.next_probe_id();
            let mut twin = Probe::new(twin_id, -x, y, self.config.probe_radius)?;
            twin.set_twin(Some(id));
            probe.set_twin(Some(twin_id));
            self.probes.push(probe);
            self.probes.push(twin);
        } else {
            self.probes.push(probe);
        }

        self.invalidate();
        log::debug!("added probe {id} at ({x}, {y})");
        Ok(id)
    }

    /// Remove a probe. Its twin, if any, stays and is unlinked.
    pub fn remove_probe(&mut self, id: ProbeId) -> Result<Probe, DeformError> {
        let index = self.index_of(id)?;
        let probe = self.probes.remove(index);
        if let Some(twin) = probe.twin() {
            if let Ok(twin_index) = self.index_of(twin) {
                self.probes[twin_index].set_twin(None);
            }
        }
        self.invalidate();
        Ok(probe)
    }

    /// Remove every probe.
    pub fn clear_probes(&mut self) {
        self.probes.clear();
        self.invalidate();
    }

    /// Remove every probe and restore the original rest mesh.
    pub fn reset(&mut self) {
        self.probes.clear();
        self.mesh = self.pristine.clone();
        self.weights = None;
        self.invalidate();
        self.positions = (0..self.mesh.num_vertices())
            .map(|v| self.mesh.rest_position(v))
            .collect();
        self.publish();
    }

    /// Set the current pose of a probe. The twin receives the mirrored pose.
    pub fn set_pose(&mut self, id: ProbeId, x: f64, y: f64, theta: f64) -> Result<(), DeformError> {
        check_finite(&[x, y, theta])?;
        let index = self.index_of(id)?;
        self.probes[index].set_pose(x, y, theta);
        if let Some(twin) = self.probes[index].twin() {
            let twin_index = self.index_of(twin)?;
            self.probes[twin_index].set_pose(-x, y, -theta);
        }
        Ok(())
    }

    /// Move a probe by a pose delta. The twin receives `(-dx, dy, -dtheta)`.
    pub fn set_pose_delta(
        &mut self,
        id: ProbeId,
        dx: f64,
        dy: f64,
        dtheta: f64,
    ) -> Result<(), DeformError> {
        check_finite(&[dx, dy, dtheta])?;
        let index = self.index_of(id)?;
        self.probes[index].set_pose_delta(dx, dy, dtheta);
        if let Some(twin) = self.probes[index].twin() {
            let twin_index = self.index_of(twin)?;
            self.probes[twin_index].set_pose_delta(-dx, dy, -dtheta);
        }
        Ok(())
    }

    /// Change the influence radius of a probe and of its twin.
    pub fn set_radius(&mut self, id: ProbeId, radius: f64) -> Result<(), DeformError> {
        let index = self.index_of(id)?;
        self.probes[index].set_radius(radius)?;
        if let Some(twin) = self.probes[index].twin() {
            let twin_index = self.index_of(twin)?;
            self.probes[twin_index].set_radius(radius)?;
        }
        if !self.config.fix_radius {
            self.invalidate();
        }
        Ok(())
    }

    /// Bake the current deformation into the rest mesh and freeze every probe.
    ///
    /// The weights and the generation are kept, so the output does not change until a
    /// probe moves again. Fails with [`DeformError::WeightsPending`] while a worker
    /// computes the weights.
    pub fn freeze_probes(&mut self) -> Result<(), DeformError> {
        self.deform_now()?;
        Arc::make_mut(&mut self.mesh).set_rest_positions(&self.positions)?;
        for probe in self.probes.iter_mut() {
            probe.freeze();
        }
        log::debug!("froze {} probes", self.probes.len());
        Ok(())
    }

    /// Snapshot of a probe, for undo.
    pub fn pose(&self, id: ProbeId) -> Result<ProbeRecord, DeformError> {
        Ok(self.probes[self.index_of(id)?].to_record())
    }

    /// Restore a probe from a snapshot taken with [`ProbeMesh::pose`].
    ///
    /// The twin, if any, is restored to the mirrored snapshot.
    pub fn restore_pose(&mut self, id: ProbeId, record: &ProbeRecord) -> Result<(), DeformError> {
        record.validate()?;
        let index = self.index_of(id)?;
        let twin = self.probes[index].twin();

        let mut anchor_changed = self.replace_probe(index, record)?;
        if let Some(twin) = twin {
            let twin_index = self.index_of(twin)?;
            anchor_changed |= self.replace_probe(twin_index, &mirrored(record))?;
        }
        if anchor_changed {
            self.invalidate();
        }
        Ok(())
    }

    // returns whether the weights depend on the change
    fn replace_probe(&mut self, index: usize, record: &ProbeRecord) -> Result<bool, DeformError> {
        let current = &self.probes[index];
        let mut probe = Probe::from_record(current.id(), record)?;
        probe.set_twin(current.twin());
        let previous = current.to_record();
        self.probes[index] = probe;

        let anchor_changed = previous.ix != record.ix
            || previous.iy != record.iy
            || previous.radius != record.radius
            || previous.scale_multiplier != record.scale_multiplier;
        Ok(anchor_changed)
    }

    /// Replace every probe with the given records.
    ///
    /// With a symmetric configuration, probes whose initial poses mirror each other
    /// across `x = 0` become twins again. Nothing changes if any record is invalid.
    pub fn load_probes(&mut self, records: &[ProbeRecord]) -> Result<Vec<ProbeId>, DeformError> {
        let first = self.next_id;
        let mut probes = records
            .iter()
            .zip(first..)
            .map(|(record, id)| Probe::from_record(ProbeId(id), record))
            .collect::<Result<Vec<_>, _>>()?;
        if self.config.symmetric {
            pair_twins(&mut probes);
        }

        self.next_id = first + probes.len() as u32;
        self.probes = probes;
        self.invalidate();
        log::debug!("loaded {} probes", self.probes.len());
        Ok(self.probes.iter().map(Probe::id).collect())
    }

    /// Records of every probe, in weight field order.
    pub fn export_probes(&self) -> Vec<ProbeRecord> {
        self.probes.iter().map(Probe::to_record).collect()
    }

    /// The probe whose anchor is closest to `(x, y)`, within `max_distance`.
    pub fn nearest_probe(&self, x: f64, y: f64, max_distance: f64) -> Option<ProbeId> {
        let max_squared = max_distance * max_distance;
        self.probes
            .iter()
            .map(|probe| (probe.id(), probe.distance_squared(x, y)))
            .filter(|(_, d2)| *d2 <= max_squared)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Initial position and effective radius of every probe.
    pub fn anchors(&self) -> Vec<ProbeAnchor> {
        self.probes
            .iter()
            .map(|probe| probe.anchor(self.config.fix_radius, self.config.probe_radius))
            .collect()
    }

    /// Snapshot of the inputs of the weight computation for the current generation.
    pub fn weight_job(&self) -> WeightJob {
        WeightJob {
            generation: self.generation,
            mesh: self.mesh.clone(),
            laplacian: self.laplacian.clone(),
            anchors: self.anchors(),
            options: WeightOptions::from_config(&self.config),
        }
    }

    /// Install a weight field computed elsewhere.
    ///
    /// Fields computed for another generation are rejected.
    pub fn install_weights(&mut self, field: Arc<WeightField>) -> Result<(), DeformError> {
        if field.generation() != self.generation {
            return Err(DeformError::StaleWeights {
                expected: self.generation,
                actual: field.generation(),
            });
        }
        if field.num_probes() != self.probes.len()
            || field.num_vertices() != self.mesh.num_vertices()
        {
            return Err(DeformError::WeightLengthMismatch {
                expected: self.probes.len() * self.mesh.num_vertices(),
                actual: field.num_probes() * field.num_vertices(),
            });
        }
        self.weights = Some(field);
        if self.pending == Some(self.generation) {
            self.pending = None;
        }
        Ok(())
    }

    /// Hand the weights of the current generation to a background worker.
    ///
    /// Does nothing if the weights are current or already requested.
    pub fn request_weights(&mut self, worker: &WeightWorker) {
        if !self.weights_stale() || self.pending == Some(self.generation) {
            return;
        }
        worker.request(self.weight_job());
        self.pending = Some(self.generation);
    }

    /// Whether the current generation is being computed by a worker.
    pub fn weights_pending(&self) -> bool {
        self.weights_stale() && self.pending == Some(self.generation)
    }

    /// Install the worker result if it is ready.
    ///
    /// Returns whether the weights are current afterwards.
    pub fn poll_weights(&mut self, worker: &WeightWorker) -> Result<bool, DeformError> {
        if let Some(field) = worker.try_take() {
            self.accept_worker_weights(field)?;
        }
        Ok(!self.weights_stale())
    }

    /// Wait up to `timeout` for the requested weights and install them.
    ///
    /// Returns whether the weights are current afterwards.
    pub fn wait_weights(
        &mut self,
        worker: &WeightWorker,
        timeout: Duration,
    ) -> Result<bool, DeformError> {
        if self.weights_pending() {
            if let Some(field) = worker.wait(timeout) {
                self.accept_worker_weights(field)?;
            }
        }
        Ok(!self.weights_stale())
    }

    fn accept_worker_weights(&mut self, field: Arc<WeightField>) -> Result<(), DeformError> {
        match self.install_weights(field) {
            Err(DeformError::StaleWeights { actual, .. }) => {
                log::debug!("dropping worker weights of outdated generation {actual}");
                Ok(())
            }
            result => result,
        }
    }

    /// Recompute the weights now if they are stale.
    ///
    /// Fails with [`DeformError::WeightsPending`] while a worker computes them.
    pub fn refresh_weights(&mut self) -> Result<Arc<WeightField>, DeformError> {
        if let Some(field) = self.weights() {
            return Ok(field.clone());
        }
        if self.weights_pending() {
            return Err(DeformError::WeightsPending(self.generation));
        }
        let field = Arc::new(self.weight_job().run());
        self.install_weights(field.clone())?;
        Ok(field)
    }

    /// Deform the mesh with the current probe poses and publish a new vertex buffer.
    ///
    /// While a worker computes the weights of the current generation, the previous
    /// buffer is returned unchanged.
    pub fn deform(&mut self) -> Result<VertexBuffer, DeformError> {
        if self.weights_pending() {
            log::debug!(
                "weights of generation {} are pending, keeping vertex buffer {}",
                self.generation,
                self.buffer.version
            );
            return Ok(self.buffer.clone());
        }
        self.deform_now()
    }

    fn deform_now(&mut self) -> Result<VertexBuffer, DeformError> {
        let weights = self.refresh_weights()?;
        self.deformer
            .deform(&self.mesh, &self.probes, &weights, &mut self.positions)?;
        self.publish();
        Ok(self.buffer.clone())
    }

    fn publish(&mut self) {
        self.buffer = VertexBuffer::from_positions(self.buffer.version + 1, &self.positions);
    }

    /// The last published vertex buffer.
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.buffer
    }

    /// Deformed positions of the last [`ProbeMesh::deform`], in double precision.
    pub fn positions(&self) -> &[DVec2] {
        &self.positions
    }

    /// Texture coordinates of the vertices.
    pub fn texture_coords(&self) -> &[[f32; 2]] {
        self.mesh.tex_coords()
    }

    /// Triangle indices, two counter-clockwise triangles per cell.
    pub fn indices(&self) -> &[u32] {
        self.mesh.indices()
    }
}

fn mirrored(record: &ProbeRecord) -> ProbeRecord {
    ProbeRecord {
        ix: -record.ix,
        itheta: -record.itheta,
        x: -record.x,
        theta: -record.theta,
        ..*record
    }
}

// link probes whose initial poses are mirror images across x = 0
fn pair_twins(probes: &mut [Probe]) {
    for i in 0..probes.len() {
        let a = probes[i].to_record();
        if probes[i].twin().is_some() || a.ix.abs() <= SYMMETRY_EPSILON {
            continue;
        }
        let partner = (i + 1..probes.len()).find(|&j| {
            let b = probes[j].to_record();
            probes[j].twin().is_none()
                && (a.ix + b.ix).abs() <= TWIN_TOLERANCE
                && (a.iy - b.iy).abs() <= TWIN_TOLERANCE
                && (a.itheta + b.itheta).abs() <= TWIN_TOLERANCE
        });
        if let Some(j) = partner {
            let (id_a, id_b) = (probes[i].id(), probes[j].id());
            probes[i].set_twin(Some(id_b));
            probes[j].set_twin(Some(id_a));
        }
    }
}

fn check_finite(values: &[f64]) -> Result<(), DeformError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DeformError::InvalidPose(format!("{values:?}")))
    }
}
