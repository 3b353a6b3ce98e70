//! CPU-side mesh representation produced by the loaders.

use std::path::PathBuf;

/// Vertex with position/normal/uv/tangent. Values are in object space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [0.0; 3],
        }
    }
}

/// Where a material texture comes from.
///
/// File references are handed to the external image collaborator untouched;
/// `Decoded` carries pixels that were already decoded in-memory (GLB-embedded
/// images have no path to refer back to).
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File(PathBuf),
    Decoded {
        width: u32,
        height: u32,
        rgba8: Vec<u8>,
    },
}

/// Material properties for one submesh, resolved from an MTL sidecar or a
/// glTF material definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub alpha: f32,
    pub diffuse_texture: Option<TextureSource>,
    pub specular_texture: Option<TextureSource>,
    pub normal_texture: Option<TextureSource>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: [0.8, 0.8, 0.9],
            specular: [0.2, 0.2, 0.2],
            shininess: 16.0,
            alpha: 1.0,
            diffuse_texture: None,
            specular_texture: None,
            normal_texture: None,
        }
    }
}

/// Indexed geometry group sharing one material within a larger mesh.
///
/// `indices` are relative to `base_vertex`: the absolute vertex index into
/// the parent [`MeshData::vertices`] is `base_vertex + index`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    pub indices: Vec<u32>,
    pub base_vertex: u32,
    pub material: Material,
}

/// A loaded mesh: one shared vertex buffer plus either a flat index list
/// (single-material "legacy" meshes) or a list of submeshes (multi-material
/// meshes). The two index representations are never both populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let mut mesh = Self {
            vertices,
            indices,
            ..Default::default()
        };
        mesh.compute_bounds();
        mesh
    }

    pub fn with_submeshes(vertices: Vec<Vertex>, submeshes: Vec<SubMesh>) -> Self {
        let mut mesh = Self {
            vertices,
            submeshes,
            ..Default::default()
        };
        mesh.compute_bounds();
        mesh
    }

    /// Returns `true` if the mesh carries any drawable geometry.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && (!self.indices.is_empty() || !self.submeshes.is_empty())
    }

    /// Total index count across the flat list or all submeshes.
    pub fn index_count(&self) -> usize {
        if self.submeshes.is_empty() {
            self.indices.len()
        } else {
            self.submeshes.iter().map(|s| s.indices.len()).sum()
        }
    }

    /// Triangle count; index lists always describe triangles.
    pub fn triangle_count(&self) -> usize {
        self.index_count() / 3
    }

    /// Recomputes the axis-aligned bounding box from the vertex positions.
    pub fn compute_bounds(&mut self) {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v.position[axis]);
                max[axis] = max[axis].max(v.position[axis]);
            }
        }
        if self.vertices.is_empty() {
            min = [0.0; 3];
            max = [0.0; 3];
        }
        self.bounds_min = min;
        self.bounds_max = max;
    }

    /// Rough CPU-side memory footprint in bytes.
    pub fn cpu_memory_usage(&self) -> usize {
        let mut total = self.vertices.len() * std::mem::size_of::<Vertex>()
            + self.indices.len() * std::mem::size_of::<u32>();
        for sub in &self.submeshes {
            total += sub.indices.len() * std::mem::size_of::<u32>();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_data_validity() {
        let mesh = MeshData::new(vec![Vertex::default()], vec![0]);
        assert!(mesh.is_valid());
        assert!(!MeshData::default().is_valid());
    }

    #[test]
    fn bounds_cover_all_positions() {
        let mesh = MeshData::new(
            vec![
                Vertex::new([-1.0, 2.0, 0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([3.0, -4.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            ],
            vec![0, 1, 0],
        );
        assert_eq!(mesh.bounds_min, [-1.0, -4.0, 0.0]);
        assert_eq!(mesh.bounds_max, [3.0, 2.0, 0.5]);
    }

    #[test]
    fn index_count_sums_submeshes() {
        let sub = |n: usize| SubMesh {
            indices: vec![0; n],
            base_vertex: 0,
            material: Material::default(),
        };
        let mesh = MeshData::with_submeshes(vec![Vertex::default()], vec![sub(6), sub(9)]);
        assert_eq!(mesh.index_count(), 15);
        assert_eq!(mesh.triangle_count(), 5);
    }

    #[test]
    fn memory_usage_counts_submesh_indices() {
        let mesh = MeshData::with_submeshes(
            vec![Vertex::default(); 4],
            vec![SubMesh {
                indices: vec![0, 1, 2],
                base_vertex: 0,
                material: Material::default(),
            }],
        );
        let expected = 4 * std::mem::size_of::<Vertex>() + 3 * std::mem::size_of::<u32>();
        assert_eq!(mesh.cpu_memory_usage(), expected);
    }
}
