use crate::probe::ProbeId;

/// Error types for the deformation core.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DeformError {
    /// The mesh needs at least one division in each direction.
    #[error("Invalid mesh divisions: {0}x{1}")]
    InvalidDivisions(u32, u32),

    /// The image size must be strictly positive.
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(f64, f64),

    /// A probe radius must be finite and strictly positive.
    #[error("Invalid probe radius: {0}")]
    InvalidRadius(f64),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A probe record or pose contains a non-finite value.
    #[error("Invalid probe pose: {0}")]
    InvalidPose(String),

    /// No probe with the given handle exists.
    #[error("Probe {0} not found")]
    ProbeNotFound(ProbeId),

    /// The weight field does not match the mesh or the probe set.
    #[error("Weight field has {actual} entries, expected {expected}")]
    WeightLengthMismatch {
        /// Expected number of weights (probes x vertices).
        expected: usize,
        /// Number of weights in the field.
        actual: usize,
    },

    /// A vertex buffer does not match the number of mesh vertices.
    #[error("Got {actual} vertex positions, the mesh has {expected} vertices")]
    VertexCountMismatch {
        /// Number of mesh vertices.
        expected: usize,
        /// Number of positions given.
        actual: usize,
    },

    /// The weight field was computed for an older probe set.
    #[error("Weight field generation {actual} is stale, current generation is {expected}")]
    StaleWeights {
        /// Generation of the current probe set.
        expected: u64,
        /// Generation the weight field was computed for.
        actual: u64,
    },

    /// The weights of this generation are being computed by a background worker.
    #[error("Weights of generation {0} are still being computed")]
    WeightsPending(u64),

    /// The sparse linear system could not be assembled or factorized.
    #[error("Sparse solver error: {0}")]
    Solver(String),
}
