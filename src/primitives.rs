//! Procedurally generated default geometry.

use crate::mesh::{MeshData, Vertex};

/// Builds the shared unit cube: 24 vertices (4 per face, so each face keeps
/// its own flat normal and UVs) and 36 indices across 6 quads.
pub fn unit_cube() -> MeshData {
    let mut vertices = Vec::with_capacity(24);
    let mut push = |px: f32, py: f32, pz: f32, nx: f32, ny: f32, nz: f32, u: f32, v: f32| {
        vertices.push(Vertex::new([px, py, pz], [nx, ny, nz], [u, v]));
    };

    // +Z
    push(-0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0);
    push(0.5, -0.5, 0.5, 0.0, 0.0, 1.0, 1.0, 0.0);
    push(0.5, 0.5, 0.5, 0.0, 0.0, 1.0, 1.0, 1.0);
    push(-0.5, 0.5, 0.5, 0.0, 0.0, 1.0, 0.0, 1.0);
    // -Z
    push(0.5, -0.5, -0.5, 0.0, 0.0, -1.0, 0.0, 0.0);
    push(-0.5, -0.5, -0.5, 0.0, 0.0, -1.0, 1.0, 0.0);
    push(-0.5, 0.5, -0.5, 0.0, 0.0, -1.0, 1.0, 1.0);
    push(0.5, 0.5, -0.5, 0.0, 0.0, -1.0, 0.0, 1.0);
    // -X
    push(-0.5, -0.5, -0.5, -1.0, 0.0, 0.0, 0.0, 0.0);
    push(-0.5, -0.5, 0.5, -1.0, 0.0, 0.0, 1.0, 0.0);
    push(-0.5, 0.5, 0.5, -1.0, 0.0, 0.0, 1.0, 1.0);
    push(-0.5, 0.5, -0.5, -1.0, 0.0, 0.0, 0.0, 1.0);
    // +X
    push(0.5, -0.5, 0.5, 1.0, 0.0, 0.0, 0.0, 0.0);
    push(0.5, -0.5, -0.5, 1.0, 0.0, 0.0, 1.0, 0.0);
    push(0.5, 0.5, -0.5, 1.0, 0.0, 0.0, 1.0, 1.0);
    push(0.5, 0.5, 0.5, 1.0, 0.0, 0.0, 0.0, 1.0);
    // +Y
    push(-0.5, 0.5, 0.5, 0.0, 1.0, 0.0, 0.0, 0.0);
    push(0.5, 0.5, 0.5, 0.0, 1.0, 0.0, 1.0, 0.0);
    push(0.5, 0.5, -0.5, 0.0, 1.0, 0.0, 1.0, 1.0);
    push(-0.5, 0.5, -0.5, 0.0, 1.0, 0.0, 0.0, 1.0);
    // -Y
    push(-0.5, -0.5, -0.5, 0.0, -1.0, 0.0, 0.0, 0.0);
    push(0.5, -0.5, -0.5, 0.0, -1.0, 0.0, 1.0, 0.0);
    push(0.5, -0.5, 0.5, 0.0, -1.0, 0.0, 1.0, 1.0);
    push(-0.5, -0.5, 0.5, 0.0, -1.0, 0.0, 0.0, 1.0);

    let indices = vec![
        0, 1, 2, 2, 3, 0, //
        4, 5, 6, 6, 7, 4, //
        8, 9, 10, 10, 11, 8, //
        12, 13, 14, 14, 15, 12, //
        16, 17, 18, 18, 19, 16, //
        20, 21, 22, 22, 23, 20,
    ];

    MeshData::new(vertices, indices)
}
