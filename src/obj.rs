//! OBJ parser supporting positions, normals, texture coordinates and
//! multi-material grouping via `usemtl`/`mtllib`, with MTL sidecar
//! resolution and normal/tangent synthesis for incomplete sources.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use cgmath::{InnerSpace, Vector3};
use log::warn;

use crate::error::MeshLoadError;
use crate::mesh::{Material, MeshData, SubMesh, TextureSource, Vertex};

/// Load an OBJ mesh from a file path. Material libraries and texture paths
/// referenced by the file are resolved relative to the OBJ's directory.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<MeshData, MeshLoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| MeshLoadError::io(path, e))?;
    parse_obj(BufReader::new(file), path, path.parent())
}

/// Parse OBJ source text directly. `mtllib` directives are ignored since
/// there is no directory to resolve them against.
pub fn load_obj_from_str(contents: &str) -> Result<MeshData, MeshLoadError> {
    parse_obj(io::Cursor::new(contents), Path::new("<memory>"), None)
}

/// Deduplication key: the exact `(position, texcoord, normal)` index triple.
/// Merging on position alone would weld vertices across UV seams.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct Key(usize, Option<usize>, Option<usize>);

fn parse_obj<R: BufRead>(
    reader: R,
    path: &Path,
    base_dir: Option<&Path>,
) -> Result<MeshData, MeshLoadError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();

    let mut unique: HashMap<Key, u32> = HashMap::new();
    let mut vertices: Vec<Vertex> = Vec::new();

    // Index lists per material, in first-use order. `groups[0]` is the
    // anonymous group used before (or without) any `usemtl`.
    let mut groups: Vec<(Option<String>, Vec<u32>)> = vec![(None, Vec::new())];
    let mut current_group = 0usize;
    let mut saw_usemtl = false;

    let mut materials: HashMap<String, Material> = HashMap::new();

    let mut any_face_uvs = false;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MeshLoadError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = match parts.next() {
            Some(tag) => tag,
            None => continue,
        };

        match tag {
            "v" => {
                let x = parse_f32(path, parts.next(), line_no, "x coordinate")?;
                let y = parse_f32(path, parts.next(), line_no, "y coordinate")?;
                let z = parse_f32(path, parts.next(), line_no, "z coordinate")?;
                positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_f32(path, parts.next(), line_no, "u coordinate")?;
                let v = parse_f32(path, parts.next(), line_no, "v coordinate")?;
                texcoords.push([u, v]);
            }
            "vn" => {
                let nx = parse_f32(path, parts.next(), line_no, "nx coordinate")?;
                let ny = parse_f32(path, parts.next(), line_no, "ny coordinate")?;
                let nz = parse_f32(path, parts.next(), line_no, "nz coordinate")?;
                normals.push([nx, ny, nz]);
            }
            "f" => {
                let mut face_indices: Vec<u32> = Vec::new();
                for part in parts {
                    let (vi, vti, vni) = parse_face_vertex(
                        path,
                        part,
                        positions.len(),
                        texcoords.len(),
                        normals.len(),
                        line_no,
                    )?;
                    any_face_uvs |= vti.is_some();

                    let key = Key(vi, vti, vni);
                    let index = match unique.get(&key) {
                        Some(&idx) => idx,
                        None => {
                            let position = positions[vi];
                            let uv = vti.map(|i| texcoords[i]).unwrap_or([0.0, 0.0]);
                            let normal = vni.map(|i| normals[i]).unwrap_or([0.0, 0.0, 0.0]);

                            let idx = u32::try_from(vertices.len()).map_err(|_| {
                                MeshLoadError::parse(path, "too many vertices for 32-bit indices")
                            })?;
                            vertices.push(Vertex::new(position, normal, uv));
                            unique.insert(key, idx);
                            idx
                        }
                    };
                    face_indices.push(index);
                }

                if face_indices.len() < 3 {
                    continue;
                }
                // Triangulate as a fan from the first listed vertex.
                let indices = &mut groups[current_group].1;
                for tri in 1..(face_indices.len() - 1) {
                    indices.push(face_indices[0]);
                    indices.push(face_indices[tri]);
                    indices.push(face_indices[tri + 1]);
                }
            }
            "usemtl" => {
                saw_usemtl = true;
                let name = parts.next().unwrap_or("").to_string();
                current_group = match groups
                    .iter()
                    .position(|(m, _)| m.as_deref() == Some(name.as_str()))
                {
                    Some(i) => i,
                    None => {
                        groups.push((Some(name), Vec::new()));
                        groups.len() - 1
                    }
                };
            }
            "mtllib" => {
                let Some(base_dir) = base_dir else { continue };
                for lib in parts {
                    let lib_path = resolve_relative(base_dir, lib);
                    match parse_mtl(&lib_path, base_dir) {
                        Ok(parsed) => materials.extend(parsed),
                        Err(e) => {
                            // A missing sidecar degrades to default materials.
                            warn!("ignoring material library {}: {}", lib_path.display(), e);
                        }
                    }
                }
            }
            _ => {
                // Ignore other directives (o/g/s/etc.)
            }
        }
    }

    let total_indices: usize = groups.iter().map(|(_, i)| i.len()).sum();
    if vertices.is_empty() || total_indices == 0 {
        return Err(MeshLoadError::parse(path, "OBJ contained no triangles"));
    }

    // Per-vertex, not per-file: a source mixing faces with and without
    // normal references still gets every vertex normaled.
    let needs_normals = vertices.iter().any(|v| v.normal == [0.0; 3]);
    if needs_normals || any_face_uvs {
        let all_indices: Vec<u32> = groups.iter().flat_map(|(_, i)| i.iter().copied()).collect();
        if needs_normals {
            synthesize_normals(&mut vertices, &all_indices);
        }
        if any_face_uvs {
            synthesize_tangents(&mut vertices, &all_indices);
        }
    }

    if !saw_usemtl {
        // Legacy single-material mesh: one flat index list, no submeshes.
        let indices = groups.into_iter().next().map(|(_, i)| i).unwrap_or_default();
        return Ok(MeshData::new(vertices, indices));
    }

    let submeshes = groups
        .into_iter()
        .filter(|(_, indices)| !indices.is_empty())
        .map(|(name, indices)| {
            let material = match &name {
                Some(name) => materials.get(name).cloned().unwrap_or_else(|| Material {
                    name: name.clone(),
                    ..Default::default()
                }),
                None => Material::default(),
            };
            SubMesh {
                indices,
                base_vertex: 0,
                material,
            }
        })
        .collect();

    Ok(MeshData::with_submeshes(vertices, submeshes))
}

/// Fills in normals for vertices that have none (zero vector) by
/// accumulating face normals (cross product of two edges) at every
/// referenced vertex and normalizing. Vertices that already carry a normal
/// are left untouched, so sources mixing faces with and without normal
/// references come out fully normaled. A zero-length accumulation defaults
/// to `(0,1,0)`.
pub(crate) fn synthesize_normals(vertices: &mut [Vertex], indices: &[u32]) {
    let missing: Vec<bool> = vertices.iter().map(|v| v.normal == [0.0; 3]).collect();
    if !missing.iter().any(|&m| m) {
        return;
    }

    let mut accum = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let p0 = Vector3::from(vertices[i0].position);
        let p1 = Vector3::from(vertices[i1].position);
        let p2 = Vector3::from(vertices[i2].position);
        let face = (p1 - p0).cross(p2 - p0);
        accum[i0] += face;
        accum[i1] += face;
        accum[i2] += face;
    }
    for ((vertex, sum), missing) in vertices.iter_mut().zip(accum).zip(missing) {
        if !missing {
            continue;
        }
        let len = sum.magnitude();
        vertex.normal = if len > 1e-8 {
            (sum / len).into()
        } else {
            [0.0, 1.0, 0.0]
        };
    }
}

/// Derives per-vertex tangents from the UV-space derivative of the triangle
/// edge vectors. Triangles with a degenerate (zero-determinant) UV
/// parameterization contribute nothing.
pub(crate) fn synthesize_tangents(vertices: &mut [Vertex], indices: &[u32]) {
    let mut accum = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let p0 = Vector3::from(vertices[i0].position);
        let p1 = Vector3::from(vertices[i1].position);
        let p2 = Vector3::from(vertices[i2].position);
        let e1 = p1 - p0;
        let e2 = p2 - p0;

        let [u0, v0] = vertices[i0].uv;
        let [u1, v1] = vertices[i1].uv;
        let [u2, v2] = vertices[i2].uv;
        let du1 = u1 - u0;
        let dv1 = v1 - v0;
        let du2 = u2 - u0;
        let dv2 = v2 - v0;

        let det = du1 * dv2 - du2 * dv1;
        if det.abs() < 1e-8 {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * dv2 - e2 * dv1) * r;
        accum[i0] += tangent;
        accum[i1] += tangent;
        accum[i2] += tangent;
    }
    for (vertex, sum) in vertices.iter_mut().zip(accum) {
        let len = sum.magnitude();
        if len > 1e-8 {
            vertex.tangent = (sum / len).into();
        }
    }
}

fn parse_mtl(path: &Path, base_dir: &Path) -> Result<HashMap<String, Material>, MeshLoadError> {
    let file = File::open(path).map_err(|e| MeshLoadError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut materials: HashMap<String, Material> = HashMap::new();
    let mut current: Option<String> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MeshLoadError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let tag = match parts.next() {
            Some(tag) => tag,
            None => continue,
        };

        if tag == "newmtl" {
            let name = parts.next().unwrap_or("").to_string();
            materials.insert(
                name.clone(),
                Material {
                    name: name.clone(),
                    ..Default::default()
                },
            );
            current = Some(name);
            continue;
        }

        let Some(name) = &current else { continue };
        let material = materials
            .get_mut(name)
            .expect("current material always present in map");

        match tag {
            "Kd" => material.diffuse = parse_color(path, &mut parts, line_no)?,
            "Ks" => material.specular = parse_color(path, &mut parts, line_no)?,
            "Ns" => material.shininess = parse_f32(path, parts.next(), line_no, "shininess")?,
            "d" => material.alpha = parse_f32(path, parts.next(), line_no, "alpha")?,
            "Tr" => {
                material.alpha = 1.0 - parse_f32(path, parts.next(), line_no, "transparency")?;
            }
            "map_Kd" => {
                material.diffuse_texture = texture_ref(base_dir, parts.next());
            }
            "map_Ks" => {
                material.specular_texture = texture_ref(base_dir, parts.next());
            }
            "map_Bump" | "map_bump" | "bump" | "norm" => {
                material.normal_texture = texture_ref(base_dir, parts.next());
            }
            _ => {}
        }
    }

    Ok(materials)
}

fn texture_ref(base_dir: &Path, token: Option<&str>) -> Option<TextureSource> {
    token.map(|t| TextureSource::File(resolve_relative(base_dir, t)))
}

fn resolve_relative(base_dir: &Path, reference: &str) -> PathBuf {
    let candidate = Path::new(reference);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

fn parse_color<'a>(
    path: &Path,
    parts: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<[f32; 3], MeshLoadError> {
    let r = parse_f32(path, parts.next(), line_no, "red component")?;
    let g = parse_f32(path, parts.next(), line_no, "green component")?;
    let b = parse_f32(path, parts.next(), line_no, "blue component")?;
    Ok([r, g, b])
}

fn parse_f32(
    path: &Path,
    value: Option<&str>,
    line_no: usize,
    what: &str,
) -> Result<f32, MeshLoadError> {
    let token = value.ok_or_else(|| {
        MeshLoadError::parse(path, format!("missing {} on line {}", what, line_no + 1))
    })?;
    token.parse::<f32>().map_err(|_| {
        MeshLoadError::parse(
            path,
            format!("invalid {} '{}' on line {}", what, token, line_no + 1),
        )
    })
}

fn parse_face_vertex(
    path: &Path,
    token: &str,
    pos_count: usize,
    tex_count: usize,
    norm_count: usize,
    line_no: usize,
) -> Result<(usize, Option<usize>, Option<usize>), MeshLoadError> {
    let mut split = token.split('/');
    let pos = split.next().ok_or_else(|| {
        MeshLoadError::parse(
            path,
            format!("malformed face element '{}' on line {}", token, line_no + 1),
        )
    })?;
    let pos_idx = resolve_index(path, pos, pos_count, line_no)?;

    let tex_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(path, value, tex_count, line_no)?),
        _ => None,
    };

    let norm_idx = match split.next() {
        Some(value) if !value.is_empty() => Some(resolve_index(path, value, norm_count, line_no)?),
        _ => None,
    };

    Ok((pos_idx, tex_idx, norm_idx))
}

/// OBJ indices are 1-based; negative values count back from the end of the
/// list declared so far.
fn resolve_index(
    path: &Path,
    token: &str,
    len: usize,
    line_no: usize,
) -> Result<usize, MeshLoadError> {
    let raw = token.parse::<i64>().map_err(|_| {
        MeshLoadError::parse(
            path,
            format!("invalid index '{}' on line {}", token, line_no + 1),
        )
    })?;
    if raw == 0 {
        return Err(MeshLoadError::parse(
            path,
            format!("OBJ indices are 1-based; found 0 on line {}", line_no + 1),
        ));
    }

    let idx = if raw > 0 {
        raw - 1
    } else {
        len as i64 + raw
    };

    if idx < 0 || idx as usize >= len {
        return Err(MeshLoadError::parse(
            path,
            format!(
                "index {} out of bounds (have {}) on line {}",
                raw,
                len,
                line_no + 1
            ),
        ));
    }

    Ok(idx as usize)
}
