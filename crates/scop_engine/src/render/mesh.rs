//! GPU mesh representation
//!
//! A [`Mesh`] is a named tree of [`SubMesh`]es. The tree lives in an arena owned by the
//! mesh and nodes refer to their children by [`SubMeshKey`]; each submesh's transform
//! is local to its parent.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use slotmap::{new_key_type, SlotMap};

use super::gpu::BufferHandle;
use super::material::Material;
use crate::foundation::math::Mat4;

/// Vertex layout uploaded to vertex buffers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
    /// Normal, zero when the source has none
    pub normal: [f32; 3],
    /// Tangent
    pub tangent: [f32; 3],
}

impl Vertex {
    /// Byte offset of `position`
    pub const POSITION_OFFSET: usize = 0;
    /// Byte offset of `tex_coord`
    pub const TEX_COORD_OFFSET: usize = 12;
    /// Byte offset of `normal`
    pub const NORMAL_OFFSET: usize = 20;
    /// Byte offset of `tangent`
    pub const TANGENT_OFFSET: usize = 32;

    /// Vertex with position and normal only
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            ..Self::default()
        }
    }
}

new_key_type! {
    /// Key of a submesh inside its mesh's arena
    pub struct SubMeshKey;
}

/// One drawable unit: geometry, material and a parent-relative transform
#[derive(Debug, Clone)]
pub struct SubMesh {
    /// Name, for logs
    pub name: String,
    /// Transform relative to the parent submesh (or the mesh for roots)
    pub transform: Mat4,
    /// Vertex buffer of [`Vertex`]
    pub vertex_buffer: BufferHandle,
    /// `u32` index buffer
    pub index_buffer: BufferHandle,
    /// Shared material
    pub material: Arc<Material>,
    children: Vec<SubMeshKey>,
}

impl SubMesh {
    /// Childless submesh with an identity transform
    pub fn new(
        name: impl Into<String>,
        vertex_buffer: BufferHandle,
        index_buffer: BufferHandle,
        material: Arc<Material>,
    ) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::identity(),
            vertex_buffer,
            index_buffer,
            material,
            children: Vec::new(),
        }
    }

    /// Replace the transform
    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Keys of the direct children, in order
    pub fn children(&self) -> &[SubMeshKey] {
        &self.children
    }
}

/// Named submesh tree
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Name, for logs
    pub name: String,
    nodes: SlotMap<SubMeshKey, SubMesh>,
    roots: Vec<SubMeshKey>,
}

impl Mesh {
    /// Empty mesh
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Store a submesh without attaching it anywhere
    pub fn insert(&mut self, submesh: SubMesh) -> SubMeshKey {
        self.nodes.insert(submesh)
    }

    /// Store a submesh as a new top-level entry
    pub fn add_root(&mut self, submesh: SubMesh) -> SubMeshKey {
        let key = self.nodes.insert(submesh);
        self.roots.push(key);
        key
    }

    /// Append already stored submeshes to the top level
    pub fn extend_roots(&mut self, keys: impl IntoIterator<Item = SubMeshKey>) {
        self.roots.extend(keys);
    }

    /// Append already stored submeshes to `parent`'s children.
    /// Returns `false` if `parent` is not in this mesh.
    pub fn attach_children(
        &mut self,
        parent: SubMeshKey,
        children: impl IntoIterator<Item = SubMeshKey>,
    ) -> bool {
        match self.nodes.get_mut(parent) {
            Some(node) => {
                node.children.extend(children);
                true
            }
            None => false,
        }
    }

    /// Top-level submeshes, in order
    pub fn roots(&self) -> &[SubMeshKey] {
        &self.roots
    }

    /// Look up a submesh
    pub fn get(&self, key: SubMeshKey) -> Option<&SubMesh> {
        self.nodes.get(key)
    }

    /// Look up a submesh mutably
    pub fn get_mut(&mut self, key: SubMeshKey) -> Option<&mut SubMesh> {
        self.nodes.get_mut(key)
    }

    /// Total number of submeshes stored
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the mesh stores no submesh
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visit every reachable submesh depth first, children before their parent,
    /// with the model matrix `parent_model * submesh.transform` starting from `world`.
    pub fn visit_post_order(&self, world: &Mat4, mut visit: impl FnMut(&SubMesh, Mat4)) {
        fn walk(mesh: &Mesh, key: SubMeshKey, inherited: &Mat4, visit: &mut dyn FnMut(&SubMesh, Mat4)) {
            let Some(node) = mesh.nodes.get(key) else {
                return;
            };
            let model = inherited * node.transform;
            for &child in &node.children {
                walk(mesh, child, &model, visit);
            }
            visit(node, model);
        }

        for &root in &self.roots {
            walk(self, root, world, &mut visit);
        }
    }
}
