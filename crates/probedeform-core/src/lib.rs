#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! An image is covered by a regular grid of vertices. Probes placed on the image carry
//! a rigid transformation from their initial to their current pose; each vertex
//! follows a weighted blend of those transformations.

/// Mesh configuration and mode enums.
pub mod config;

/// Vertex deformation strategies.
pub mod deformer;

/// Error types for the deformation core.
pub mod error;

/// Sparse graph operators of the grid.
pub mod laplacian;

/// Regular grid meshes.
pub mod mesh;

/// Probes and dual-complex blending.
pub mod probe;

/// Deformation session owning a mesh and its probes.
pub mod session;

/// Probe weight fields.
pub mod weights;

/// Background weight computation.
pub mod worker;

pub use config::{DeformMode, DeformerConfig, WeightMode};
pub use deformer::MeshDeformer;
pub use error::DeformError;
pub use laplacian::SparseOperator;
pub use mesh::GridMesh;
pub use probe::{dlb, Probe, ProbeAnchor, ProbeId, ProbeRecord};
pub use session::{ProbeMesh, VertexBuffer};
pub use weights::{WeightField, WeightOptions};
pub use worker::{WeightJob, WeightWorker};
