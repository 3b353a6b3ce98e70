//! glTF / GLB parser. Every primitive of every mesh in the document becomes
//! one submesh; attribute buffers are decoded through the `gltf` reader and
//! indices are widened to 32 bits regardless of source width.

use std::path::{Path, PathBuf};

use log::warn;

use crate::error::MeshLoadError;
use crate::mesh::{Material, MeshData, SubMesh, TextureSource, Vertex};
use crate::obj::{synthesize_normals, synthesize_tangents};

/// Load a `.gltf` or `.glb` document from a file path. External buffers and
/// images are resolved relative to the document's directory.
pub fn load_gltf_from_path(path: impl AsRef<Path>) -> Result<MeshData, MeshLoadError> {
    let path = path.as_ref();
    let document = gltf::Gltf::open(path)
        .map_err(|e| MeshLoadError::parse(path, format!("glTF open error: {}", e)))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let blob = document.blob.clone();
    let mut raw_buffers: Vec<Vec<u8>> = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    return Err(MeshLoadError::parse(path, "data URI buffers not supported"));
                }
                let buffer_path = resolve_relative(base_dir, uri);
                std::fs::read(&buffer_path).map_err(|e| MeshLoadError::io(buffer_path, e))?
            }
            gltf::buffer::Source::Bin => blob
                .clone()
                .ok_or_else(|| MeshLoadError::parse(path, "GLB binary chunk missing"))?,
        };
        raw_buffers.push(data);
    }

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut submeshes: Vec<SubMesh> = Vec::new();

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader = primitive
                .reader(|buffer| raw_buffers.get(buffer.index()).map(|v| v.as_slice()));

            let positions: Vec<[f32; 3]> = match reader.read_positions() {
                Some(iter) => iter.collect(),
                None => {
                    warn!(
                        "{}: primitive in mesh {:?} has no POSITION attribute, skipping",
                        path.display(),
                        mesh.index()
                    );
                    continue;
                }
            };

            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|it| it.collect());
            let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(|it| it.collect());
            let uvs: Option<Vec<[f32; 2]>> =
                reader.read_tex_coords(0).map(|it| it.into_f32().collect());

            // Normalize indices to 32-bit; unindexed primitives get the
            // sequential list so consumers always see indexed geometry.
            let indices: Vec<u32> = match reader.read_indices() {
                Some(idx) => idx.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let base_vertex = vertices.len() as u32;
            for (i, position) in positions.iter().enumerate() {
                let normal = normals.as_ref().and_then(|n| n.get(i)).copied();
                let uv = uvs.as_ref().and_then(|u| u.get(i)).copied();
                let tangent = tangents.as_ref().and_then(|t| t.get(i)).copied();
                let mut vertex = Vertex::new(
                    *position,
                    normal.unwrap_or([0.0; 3]),
                    uv.unwrap_or([0.0; 2]),
                );
                if let Some([x, y, z, _w]) = tangent {
                    vertex.tangent = [x, y, z];
                }
                vertices.push(vertex);
            }

            let local = &mut vertices[base_vertex as usize..];
            if normals.is_none() {
                synthesize_normals(local, &indices);
            }
            if uvs.is_some() && tangents.is_none() {
                synthesize_tangents(local, &indices);
            }

            let material = resolve_material(&primitive.material(), base_dir, &raw_buffers);

            submeshes.push(SubMesh {
                indices,
                base_vertex,
                material,
            });
        }
    }

    if submeshes.is_empty() {
        return Err(MeshLoadError::parse(path, "document contains no geometry"));
    }

    Ok(MeshData::with_submeshes(vertices, submeshes))
}

/// Diffuse resolution order: base color factor/texture, then the emissive
/// texture with diffuse reset to white, then flat mid-gray.
fn resolve_material(
    material: &gltf::Material,
    base_dir: &Path,
    raw_buffers: &[Vec<u8>],
) -> Material {
    let mut resolved = Material {
        name: material.name().unwrap_or("").to_string(),
        ..Default::default()
    };

    let pbr = material.pbr_metallic_roughness();
    let factor = pbr.base_color_factor();
    resolved.alpha = factor[3];

    if let Some(info) = pbr.base_color_texture() {
        resolved.diffuse = [factor[0], factor[1], factor[2]];
        resolved.diffuse_texture = texture_source(&info.texture(), base_dir, raw_buffers);
    } else if factor[..3] != [1.0, 1.0, 1.0] {
        resolved.diffuse = [factor[0], factor[1], factor[2]];
    } else if let Some(info) = material.emissive_texture() {
        resolved.diffuse = [1.0, 1.0, 1.0];
        resolved.diffuse_texture = texture_source(&info.texture(), base_dir, raw_buffers);
    } else {
        resolved.diffuse = [0.5, 0.5, 0.5];
    }

    if let Some(info) = material.normal_texture() {
        resolved.normal_texture = texture_source(&info.texture(), base_dir, raw_buffers);
    }

    resolved
}

/// Maps a glTF texture to a [`TextureSource`]. Externally referenced images
/// stay as paths (decoding is the image collaborator's job); GLB-embedded
/// images are decoded in-memory right away. A failed embedded decode is
/// non-fatal and degrades to "no texture".
fn texture_source(
    texture: &gltf::Texture,
    base_dir: &Path,
    raw_buffers: &[Vec<u8>],
) -> Option<TextureSource> {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } => {
            if uri.starts_with("data:") {
                warn!("data URI images not supported, dropping texture");
                None
            } else {
                Some(TextureSource::File(resolve_relative(base_dir, uri)))
            }
        }
        gltf::image::Source::View { view, .. } => {
            let buffer = raw_buffers.get(view.buffer().index())?;
            let start = view.offset();
            let end = start + view.length();
            let bytes = buffer.get(start..end)?;
            match image::load_from_memory(bytes) {
                Ok(decoded) => {
                    let rgba = decoded.to_rgba8();
                    let (width, height) = rgba.dimensions();
                    Some(TextureSource::Decoded {
                        width,
                        height,
                        rgba8: rgba.into_raw(),
                    })
                }
                Err(e) => {
                    warn!("failed to decode embedded image: {}", e);
                    None
                }
            }
        }
    }
}

fn resolve_relative(base_dir: &Path, reference: &str) -> PathBuf {
    let candidate = Path::new(reference);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a binary GLB container around the given JSON and BIN payloads.
    fn build_glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json_bytes = json.as_bytes().to_vec();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        let mut bin_bytes = bin.to_vec();
        while bin_bytes.len() % 4 != 0 {
            bin_bytes.push(0);
        }

        let total = 12 + 8 + json_bytes.len() + 8 + bin_bytes.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
        glb.extend_from_slice(&json_bytes);
        glb.extend_from_slice(&(bin_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN\0"
        glb.extend_from_slice(&bin_bytes);
        glb
    }

    /// One triangle: 3 vec3 positions followed by 3 u16 indices.
    fn triangle_bin() -> Vec<u8> {
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mut bin = Vec::new();
        for f in positions {
            bin.extend_from_slice(&f.to_le_bytes());
        }
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        bin
    }

    fn triangle_json(materials: &str, primitive_material: &str) -> String {
        format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "buffers": [{{ "byteLength": 44 }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]{materials},
  "meshes": [{{ "primitives": [
    {{ "attributes": {{ "POSITION": 0 }}, "indices": 1{primitive_material} }}
  ] }}]
}}"#
        )
    }

    #[test]
    fn glb_triangle_widens_indices_and_synthesizes_normals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let glb_path = dir.path().join("tri.glb");
        let glb = build_glb(&triangle_json("", ""), &triangle_bin());
        std::fs::write(&glb_path, glb).expect("write glb");

        let mesh = load_gltf_from_path(&glb_path).expect("parse glb");
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.submeshes.len(), 1);
        assert_eq!(mesh.submeshes[0].indices, vec![0u32, 1, 2]);
        assert_eq!(mesh.submeshes[0].base_vertex, 0);
        for v in &mesh.vertices {
            let [x, y, z] = v.normal;
            let len = (x * x + y * y + z * z).sqrt();
            assert!((len - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn absent_material_falls_back_to_mid_gray() {
        let dir = tempfile::tempdir().expect("tempdir");
        let glb_path = dir.path().join("gray.glb");
        std::fs::write(&glb_path, build_glb(&triangle_json("", ""), &triangle_bin()))
            .expect("write glb");

        let mesh = load_gltf_from_path(&glb_path).expect("parse glb");
        let material = &mesh.submeshes[0].material;
        assert_eq!(material.diffuse, [0.5, 0.5, 0.5]);
        assert!(material.diffuse_texture.is_none());
    }

    #[test]
    fn base_color_factor_becomes_diffuse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let glb_path = dir.path().join("red.glb");
        let materials = r#",
  "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 0.5] } }]"#;
        let json = triangle_json(materials, r#", "material": 0"#);
        std::fs::write(&glb_path, build_glb(&json, &triangle_bin())).expect("write glb");

        let mesh = load_gltf_from_path(&glb_path).expect("parse glb");
        let material = &mesh.submeshes[0].material;
        assert_eq!(material.diffuse, [1.0, 0.0, 0.0]);
        assert_eq!(material.alpha, 0.5);
    }

    #[test]
    fn emissive_texture_fallback_resets_diffuse_to_white() {
        let dir = tempfile::tempdir().expect("tempdir");
        let glb_path = dir.path().join("glow.glb");
        let materials = r#",
  "materials": [{ "emissiveTexture": { "index": 0 } }],
  "textures": [{ "source": 0 }],
  "images": [{ "uri": "glow.png" }]"#;
        let json = triangle_json(materials, r#", "material": 0"#);
        std::fs::write(&glb_path, build_glb(&json, &triangle_bin())).expect("write glb");

        let mesh = load_gltf_from_path(&glb_path).expect("parse glb");
        let material = &mesh.submeshes[0].material;
        assert_eq!(material.diffuse, [1.0, 1.0, 1.0]);
        assert_eq!(
            material.diffuse_texture,
            Some(TextureSource::File(dir.path().join("glow.png")))
        );
    }

    #[test]
    fn external_buffer_resolves_relative_to_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("tri.bin"), triangle_bin()).expect("write bin");

        let json = triangle_json("", "").replacen(
            r#""buffers": [{ "byteLength": 44 }]"#,
            r#""buffers": [{ "byteLength": 44, "uri": "tri.bin" }]"#,
            1,
        );
        let gltf_path = dir.path().join("tri.gltf");
        std::fs::write(&gltf_path, json).expect("write gltf");

        let mesh = load_gltf_from_path(&gltf_path).expect("parse gltf");
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.submeshes[0].indices.len(), 3);
    }

    #[test]
    fn garbage_file_is_a_clean_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("bad.glb");
        std::fs::write(&bad, b"not a gltf document").expect("write");
        assert!(matches!(
            load_gltf_from_path(&bad),
            Err(MeshLoadError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_clean_failure() {
        assert!(load_gltf_from_path("/definitely/not/here.glb").is_err());
    }
}
