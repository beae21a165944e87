//! CPU-side model data produced by the default OBJ assembler.
//!
//! These types carry everything a renderer needs to upload a model: vertex
//! attributes including tangent frames for normal mapping, index lists, the
//! material definitions referenced by each mesh, and the decoded image.

/// Single vertex with the attributes needed for normal-mapped rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

/// One triangulated mesh with a single index buffer.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Index into [`Model::materials`], when the mesh references one.
    pub material_id: Option<usize>,
}

/// Material definition parsed from the MTL part.
#[derive(Debug, Clone)]
pub struct MaterialInfo {
    pub name: String,
    pub diffuse_texture: Option<String>,
    pub normal_texture: Option<String>,
}

/// Assembled composite artifact: meshes, materials and the decoded image.
///
/// `image` is `None` when the image part permanently failed to fetch and the
/// request was degraded.
#[derive(Debug, Clone)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialInfo>,
    pub image: Option<image::DynamicImage>,
}
