use glam::DVec2;
use probedeform_dcn::DualComplex;

use crate::error::DeformError;

/// A regular grid mesh covering an image.
///
/// The grid has `(vertical_divisions + 1) x (horizontal_divisions + 1)` vertices stored
/// row-major, row 0 at the top of the image. It is centered at the origin, the longer
/// side of the image spans `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct GridMesh {
    vertical_divisions: u32,
    horizontal_divisions: u32,
    // half size of the rest grid
    extent: DVec2,
    // rest position of each vertex encoded as a dual complex number
    rest: Vec<DualComplex>,
    tex_coords: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

impl GridMesh {
    /// Create a grid for an image of the given size.
    ///
    /// # Arguments
    ///
    /// * `vertical_divisions` - Number of cells along the vertical axis.
    /// * `horizontal_divisions` - Number of cells along the horizontal axis.
    /// * `image_width` - Width of the image in pixels.
    /// * `image_height` - Height of the image in pixels.
    pub fn new(
        vertical_divisions: u32,
        horizontal_divisions: u32,
        image_width: f64,
        image_height: f64,
    ) -> Result<Self, DeformError> {
        if vertical_divisions == 0 || horizontal_divisions == 0 {
            return Err(DeformError::InvalidDivisions(
                vertical_divisions,
                horizontal_divisions,
            ));
        }
        if !(image_width.is_finite() && image_height.is_finite())
            || image_width <= 0.0
            || image_height <= 0.0
        {
            return Err(DeformError::InvalidImageSize(image_width, image_height));
        }

        let longest = image_width.max(image_height);
        let extent = DVec2::new(image_width / longest, image_height / longest);

        let rows = vertical_divisions as usize + 1;
        let cols = horizontal_divisions as usize + 1;

        let mut rest = Vec::with_capacity(rows * cols);
        let mut tex_coords = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            let v = row as f64 / vertical_divisions as f64;
            for col in 0..cols {
                let u = col as f64 / horizontal_divisions as f64;
                let position = DVec2::new(
                    extent.x * (2.0 * u - 1.0),
                    extent.y * (1.0 - 2.0 * v),
                );
                rest.push(DualComplex::from_point(position));
                tex_coords.push([u as f32, v as f32]);
            }
        }

        // two counter-clockwise triangles per cell
        let mut indices = Vec::with_capacity(6 * (rows - 1) * (cols - 1));
        for row in 0..rows - 1 {
            for col in 0..cols - 1 {
                let top_left = (row * cols + col) as u32;
                let top_right = top_left + 1;
                let bottom_left = top_left + cols as u32;
                let bottom_right = bottom_left + 1;
                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    top_right,
                    bottom_left,
                    bottom_right,
                ]);
            }
        }

        Ok(Self {
            vertical_divisions,
            horizontal_divisions,
            extent,
            rest,
            tex_coords,
            indices,
        })
    }

    /// Number of cells along the vertical axis.
    pub fn vertical_divisions(&self) -> u32 {
        self.vertical_divisions
    }

    /// Number of cells along the horizontal axis.
    pub fn horizontal_divisions(&self) -> u32 {
        self.horizontal_divisions
    }

    /// Number of vertex rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.vertical_divisions as usize + 1
    }

    /// Number of vertex columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.horizontal_divisions as usize + 1
    }

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.rest.len()
    }

    /// Half size of the undeformed grid.
    pub fn extent(&self) -> DVec2 {
        self.extent
    }

    /// Index of the vertex at `(row, col)`.
    #[inline]
    pub fn vertex_index(&self, row: usize, col: usize) -> usize {
        row * self.cols() + col
    }

    /// Row and column of a vertex.
    #[inline]
    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.cols(), index % self.cols())
    }

    /// Rest vertices encoded as dual complex numbers.
    pub fn rest_vertices(&self) -> &[DualComplex] {
        &self.rest
    }

    /// Rest position of a vertex.
    #[inline]
    pub fn rest_position(&self, index: usize) -> DVec2 {
        self.rest[index].dual
    }

    /// Replace the rest positions, e.g. to make the current deformation the new rest state.
    pub fn set_rest_positions(&mut self, positions: &[DVec2]) -> Result<(), DeformError> {
        if positions.len() != self.rest.len() {
            return Err(DeformError::VertexCountMismatch {
                expected: self.rest.len(),
                actual: positions.len(),
            });
        }
        for (vertex, position) in self.rest.iter_mut().zip(positions) {
            *vertex = DualComplex::from_point(*position);
        }
        Ok(())
    }

    /// Texture coordinate of each vertex.
    pub fn tex_coords(&self) -> &[[f32; 2]] {
        &self.tex_coords
    }

    /// Triangle vertex indices, three per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Whether a vertex lies on the border of the grid.
    pub fn is_boundary(&self, index: usize) -> bool {
        let (row, col) = self.row_col(index);
        row == 0 || col == 0 || row + 1 == self.rows() || col + 1 == self.cols()
    }

    /// The 4-neighborhood of a vertex.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let (row, col) = self.row_col(index);
        let (rows, cols) = (self.rows(), self.cols());
        [
            (row > 0).then(|| index - cols),
            (row + 1 < rows).then(|| index + cols),
            (col > 0).then(|| index - 1),
            (col + 1 < cols).then(|| index + 1),
        ]
        .into_iter()
        .flatten()
    }

    /// Index of the rest vertex closest to `point`.
    pub fn closest_vertex(&self, point: DVec2) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (index, vertex) in self.rest.iter().enumerate() {
            let distance = vertex.dual.distance_squared(point);
            if distance < best_distance {
                best = index;
                best_distance = distance;
            }
        }
        best
    }
}
