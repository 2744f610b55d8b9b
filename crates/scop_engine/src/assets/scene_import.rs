//! Scene description and node tree import
//!
//! An [`ImportedScene`] is the flat form produced by a scene import step: a node tree
//! whose nodes name meshes by index, a mesh array, a material array and the images
//! embedded in the scene file. Scenes are usually read from RON with
//! [`ImportedScene::load_ron`].
//!
//! [`import_node_tree`] turns the node tree plus one uploaded [`SubMesh`] template per
//! scene mesh into a [`Mesh`]:
//!
//! - the root node's meshes become top-level submeshes with an identity transform;
//!   the root's own transform is discarded
//! - a node without meshes is transparent: its children are imported with the
//!   node's accumulated transform and land in the node's parent list
//! - a node with meshes gives each one the accumulated transform; its children are
//!   imported from identity and attached under its first submesh only

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::texture_resolver::EmbeddedTexture;
use super::{AssetError, AssetResult};
use crate::foundation::math::Mat4;
use crate::render::mesh::{Mesh, SubMesh, SubMeshKey, Vertex};

/// One node of a scene hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneNode {
    /// Node name
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Child nodes, in order
    pub children: Vec<SceneNode>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::identity(),
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Geometry of one scene mesh. Optional attribute arrays are either empty or
/// as long as `positions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedMesh {
    /// Mesh name
    pub name: String,
    /// Vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals
    pub normals: Vec<[f32; 3]>,
    /// Per-vertex texture coordinates
    pub tex_coords: Vec<[f32; 2]>,
    /// Per-vertex tangents
    pub tangents: Vec<[f32; 3]>,
    /// Triangle list
    pub indices: Vec<u32>,
    /// Index into [`ImportedScene::materials`]
    pub material: usize,
}

impl ImportedMesh {
    /// Check attribute lengths and index bounds
    pub fn validate(&self) -> AssetResult<()> {
        let count = self.positions.len();
        let attributes = [
            ("normals", self.normals.len()),
            ("tex_coords", self.tex_coords.len()),
            ("tangents", self.tangents.len()),
        ];
        for (attribute, len) in attributes {
            if len != 0 && len != count {
                return Err(AssetError::Format(format!(
                    "mesh '{}': {} {} for {} positions",
                    self.name, len, attribute, count
                )));
            }
        }
        if self.indices.len() % 3 != 0 {
            return Err(AssetError::Format(format!(
                "mesh '{}': {} indices is not a triangle list",
                self.name,
                self.indices.len()
            )));
        }
        if let Some(&index) = self.indices.iter().find(|&&index| index as usize >= count) {
            return Err(AssetError::Format(format!(
                "mesh '{}': index {} out of range for {} positions",
                self.name, index, count
            )));
        }
        Ok(())
    }

    /// Interleave into GPU vertices, zero-filling missing attributes
    pub fn to_vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Vertex {
                position,
                tex_coord: self.tex_coords.get(i).copied().unwrap_or_default(),
                normal: self.normals.get(i).copied().unwrap_or_default(),
                tangent: self.tangents.get(i).copied().unwrap_or_default(),
            })
            .collect()
    }
}

/// Surface description of one scene material
///
/// Texture references are paths relative to the scene file, or `*N` for
/// embedded texture `N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescriptor {
    /// Material name
    pub name: String,
    /// RGBA diffuse color
    pub diffuse_color: [f32; 4],
    /// Specular color
    pub specular_color: [f32; 3],
    /// Emissive color
    pub emissive_color: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
    /// Diffuse map
    pub diffuse_texture: Option<String>,
    /// Tangent-space normal map
    pub normal_texture: Option<String>,
    /// Emissive map
    pub emissive_texture: Option<String>,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_color: [1.0, 1.0, 1.0, 1.0],
            specular_color: [0.5, 0.5, 0.5],
            emissive_color: [0.0, 0.0, 0.0],
            shininess: 32.0,
            diffuse_texture: None,
            normal_texture: None,
            emissive_texture: None,
        }
    }
}

/// A complete scene ready to be uploaded
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedScene {
    /// Scene name, used as the mesh name
    pub name: String,
    /// Root of the node hierarchy
    pub root: SceneNode,
    /// Mesh array indexed by nodes
    pub meshes: Vec<ImportedMesh>,
    /// Material array indexed by meshes
    pub materials: Vec<MaterialDescriptor>,
    /// Images stored in the scene file
    pub embedded_textures: Vec<EmbeddedTexture>,
}

impl ImportedScene {
    /// Read a scene from a RON file
    pub fn load_ron<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AssetError::io(path, e))?;
        let scene = Self::from_ron_str(&contents)
            .map_err(|e| AssetError::Config(format!("{}: {}", path.display(), e)))?;
        log::info!(
            "Read scene '{}' from {:?}: {} meshes, {} materials",
            scene.name,
            path,
            scene.meshes.len(),
            scene.materials.len()
        );
        Ok(scene)
    }

    /// Parse a scene from RON text
    pub fn from_ron_str(contents: &str) -> AssetResult<Self> {
        ron::from_str(contents).map_err(|e| AssetError::Config(e.to_string()))
    }
}

/// Build a submesh tree from a node hierarchy. `templates[i]` is the uploaded
/// submesh of scene mesh `i`; nodes referencing a missing template are a format error.
pub fn import_node_tree(name: &str, root: &SceneNode, templates: &[SubMesh]) -> AssetResult<Mesh> {
    let mut mesh = Mesh::new(name);

    for &index in &root.meshes {
        mesh.add_root(template(templates, index)?.with_transform(Mat4::identity()));
    }
    for child in &root.children {
        let keys = import_node(&mut mesh, child, &Mat4::identity(), templates)?;
        mesh.extend_roots(keys);
    }

    log::debug!(
        "Imported node tree '{}': {} submeshes, {} top-level",
        name,
        mesh.len(),
        mesh.roots().len()
    );
    Ok(mesh)
}

fn import_node(
    mesh: &mut Mesh,
    node: &SceneNode,
    inherited: &Mat4,
    templates: &[SubMesh],
) -> AssetResult<Vec<SubMeshKey>> {
    let transform = inherited * node.transform;

    let mut own = Vec::with_capacity(node.meshes.len());
    for &index in &node.meshes {
        own.push(mesh.insert(template(templates, index)?.with_transform(transform)));
    }

    let Some(&first) = own.first() else {
        let mut flattened = Vec::new();
        for child in &node.children {
            flattened.extend(import_node(mesh, child, &transform, templates)?);
        }
        return Ok(flattened);
    };

    for child in &node.children {
        let subtree = import_node(mesh, child, &Mat4::identity(), templates)?;
        mesh.attach_children(first, subtree);
    }
    Ok(own)
}

fn template(templates: &[SubMesh], index: usize) -> AssetResult<SubMesh> {
    templates.get(index).cloned().ok_or_else(|| {
        AssetError::Format(format!(
            "node references mesh {} but the scene has {} meshes",
            index,
            templates.len()
        ))
    })
}
