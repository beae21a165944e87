//! Default assembler: OBJ geometry + MTL material + encoded image bytes.
//!
//! Parses the geometry part as Wavefront OBJ with `tobj`, resolves material
//! library references against the material part instead of the filesystem,
//! and decodes the image part with the `image` crate. Obj files don't come
//! with tangents or bitangents, so they are computed here for normal maps to
//! work correctly.

use std::io::{BufReader, Cursor};

use cgmath::{Vector2, Vector3};

use crate::assemble::Assembler;
use crate::error::AssemblyError;
use crate::model::{MaterialInfo, Mesh, Model, ModelVertex};

/// Assembles a [`Model`] from OBJ/MTL/image bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjAssembler;

impl Assembler for ObjAssembler {
    type Artifact = Model;

    fn assemble(
        &self,
        geometry: &[u8],
        material: &[u8],
        image: Option<&[u8]>,
    ) -> Result<Model, AssemblyError> {
        let mut obj_reader = BufReader::new(Cursor::new(geometry));

        // Every `mtllib` statement resolves to the material part; an OBJ
        // referencing several libraries gets the same buffer for each.
        let (models, materials) = tobj::load_obj_buf(
            &mut obj_reader,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |_path| tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(material))),
        )
        .map_err(|e| AssemblyError(format!("obj parse: {e}")))?;

        let materials = materials
            .map_err(|e| AssemblyError(format!("mtl parse: {e}")))?
            .into_iter()
            .map(|m| MaterialInfo {
                name: m.name,
                diffuse_texture: m.diffuse_texture,
                normal_texture: m.normal_texture,
            })
            .collect();

        let meshes = models.iter().map(build_mesh).collect();

        let image = match image {
            Some(bytes) => Some(
                image::load_from_memory(bytes)
                    .map_err(|e| AssemblyError(format!("image decode: {e}")))?,
            ),
            None => None,
        };

        Ok(Model {
            meshes,
            materials,
            image,
        })
    }
}

fn build_mesh(m: &tobj::Model) -> Mesh {
    let mesh = &m.mesh;
    let mut vertices = (0..mesh.positions.len() / 3)
        .map(|i| ModelVertex {
            position: [
                mesh.positions[i * 3],
                mesh.positions[i * 3 + 1],
                mesh.positions[i * 3 + 2],
            ],
            // The v axis is flipped to match the usual top-left image origin.
            tex_coords: [
                mesh.texcoords.get(i * 2).map_or(0.0, |f| *f),
                1.0 - mesh.texcoords.get(i * 2 + 1).map_or(0.0, |f| *f),
            ],
            normal: [
                mesh.normals.get(i * 3).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 1).map_or(0.0, |f| *f),
                mesh.normals.get(i * 3 + 2).map_or(0.0, |f| *f),
            ],
            // Accumulated per triangle below, then averaged
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        })
        .collect::<Vec<_>>();

    // Walk the triangles and solve
    //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
    //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
    // for the tangent T and bitangent B, accumulating per vertex.
    let mut triangles_included = vec![0u32; vertices.len()];
    for c in mesh.indices.chunks(3) {
        if c.len() < 3 {
            continue;
        }
        let v0 = vertices[c[0] as usize];
        let v1 = vertices[c[1] as usize];
        let v2 = vertices[c[2] as usize];

        let pos0: Vector3<_> = v0.position.into();
        let pos1: Vector3<_> = v1.position.into();
        let pos2: Vector3<_> = v2.position.into();

        let uv0: Vector2<_> = v0.tex_coords.into();
        let uv1: Vector2<_> = v1.tex_coords.into();
        let uv2: Vector2<_> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() <= f32::EPSILON {
            // Degenerate UVs contribute nothing
            continue;
        }
        let r = 1.0 / det;

        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // The bitangent is flipped for right-handed normal maps with a
        // top-left texture coordinate origin.
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for &index in c {
            let v = &mut vertices[index as usize];
            v.tangent = (tangent + Vector3::from(v.tangent)).into();
            v.bitangent = (bitangent + Vector3::from(v.bitangent)).into();
            triangles_included[index as usize] += 1;
        }
    }

    // Average the accumulated tangents/bitangents
    for (i, n) in triangles_included.into_iter().enumerate() {
        if n == 0 {
            continue;
        }
        let denom = 1.0 / n as f32;
        let v = &mut vertices[i];
        v.tangent = (Vector3::from(v.tangent) * denom).into();
        v.bitangent = (Vector3::from(v.bitangent) * denom).into();
    }

    let indices = mesh.indices.clone();
    Mesh {
        name: m.name.clone(),
        vertices,
        indices,
        material_id: mesh.material_id,
    }
}
