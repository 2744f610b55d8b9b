//! Upload of meshes to the GPU
//!
//! [`MeshLoader`] stages vertex and index data through host-visible buffers and copies
//! it into device-local buffers, then wraps the result in [`Mesh`]es. It also owns the
//! [`TextureResolver`] used while building scene materials, so texture caching spans
//! every scene loaded through the same loader.

use std::path::Path;
use std::sync::Arc;

use super::obj_parser::{parse_obj_file, ParsedMesh};
use super::scene_import::{import_node_tree, ImportedScene, MaterialDescriptor};
use super::texture_resolver::{TextureResolver, TextureSource};
use super::{AssetError, AssetResult};
use crate::foundation::math::{Vec3, Vec4};
use crate::render::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, CommandBuffer, GraphicsDevice, StorageMode, TextureHandle,
};
use crate::render::material::{FlatColorData, Material, PipelineRegistry, TexturedData, TexturedMaps};
use crate::render::mesh::{Mesh, SubMesh, Vertex};

/// Fallback emissive map: no emission
const NO_EMISSION: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Fallback normal map: the unperturbed tangent-space normal
const FLAT_NORMAL: [f32; 4] = [0.5, 0.5, 1.0, 1.0];

const CUBE_VERTICES: [([f32; 3], [f32; 2], [f32; 3]); 24] = [
    // Front (+Z)
    ([-0.5, -0.5, 0.5], [0.0, 1.0], [0.0, 0.0, 1.0]),
    ([0.5, -0.5, 0.5], [1.0, 1.0], [0.0, 0.0, 1.0]),
    ([0.5, 0.5, 0.5], [1.0, 0.0], [0.0, 0.0, 1.0]),
    ([-0.5, 0.5, 0.5], [0.0, 0.0], [0.0, 0.0, 1.0]),
    // Back (-Z)
    ([0.5, -0.5, -0.5], [0.0, 1.0], [0.0, 0.0, -1.0]),
    ([-0.5, -0.5, -0.5], [1.0, 1.0], [0.0, 0.0, -1.0]),
    ([-0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.5, 0.5, -0.5], [0.0, 0.0], [0.0, 0.0, -1.0]),
    // Left (-X)
    ([-0.5, -0.5, -0.5], [0.0, 1.0], [-1.0, 0.0, 0.0]),
    ([-0.5, -0.5, 0.5], [1.0, 1.0], [-1.0, 0.0, 0.0]),
    ([-0.5, 0.5, 0.5], [1.0, 0.0], [-1.0, 0.0, 0.0]),
    ([-0.5, 0.5, -0.5], [0.0, 0.0], [-1.0, 0.0, 0.0]),
    // Right (+X)
    ([0.5, -0.5, 0.5], [0.0, 1.0], [1.0, 0.0, 0.0]),
    ([0.5, -0.5, -0.5], [1.0, 1.0], [1.0, 0.0, 0.0]),
    ([0.5, 0.5, -0.5], [1.0, 0.0], [1.0, 0.0, 0.0]),
    ([0.5, 0.5, 0.5], [0.0, 0.0], [1.0, 0.0, 0.0]),
    // Top (+Y)
    ([-0.5, 0.5, 0.5], [0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.5, 0.5, 0.5], [1.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 1.0, 0.0]),
    ([-0.5, 0.5, -0.5], [0.0, 0.0], [0.0, 1.0, 0.0]),
    // Bottom (-Y)
    ([-0.5, -0.5, -0.5], [0.0, 1.0], [0.0, -1.0, 0.0]),
    ([0.5, -0.5, -0.5], [1.0, 1.0], [0.0, -1.0, 0.0]),
    ([0.5, -0.5, 0.5], [1.0, 0.0], [0.0, -1.0, 0.0]),
    ([-0.5, -0.5, 0.5], [0.0, 0.0], [0.0, -1.0, 0.0]),
];

/// Uploads geometry and builds meshes against one device
pub struct MeshLoader<'a> {
    device: &'a dyn GraphicsDevice,
    registry: &'a PipelineRegistry,
    resolver: TextureResolver,
}

impl<'a> MeshLoader<'a> {
    /// Loader for `device`. Materials are built against `registry`'s pipelines.
    pub fn new(device: &'a dyn GraphicsDevice, registry: &'a PipelineRegistry) -> Self {
        Self {
            device,
            registry,
            resolver: TextureResolver::new(),
        }
    }

    /// Texture cache shared by every scene loaded so far
    pub fn resolver(&self) -> &TextureResolver {
        &self.resolver
    }

    /// Mutable access to the texture cache, e.g. to load cube textures
    pub fn resolver_mut(&mut self) -> &mut TextureResolver {
        &mut self.resolver
    }

    /// Unit cube centered on the origin with per-face normals and uvs
    pub fn builtin_cube(&mut self, material: Arc<Material>) -> AssetResult<Mesh> {
        let vertices: Vec<Vertex> = CUBE_VERTICES
            .iter()
            .map(|&(position, tex_coord, normal)| Vertex {
                position,
                tex_coord,
                normal,
                tangent: [0.0; 3],
            })
            .collect();
        let indices: Vec<u32> = (0..6u32)
            .flat_map(|face| [0, 1, 2, 0, 2, 3].map(|corner| face * 4 + corner))
            .collect();

        let (vertex_buffer, index_buffer) = self.upload_geometry(&vertices, &indices)?;
        let mut mesh = Mesh::new("cube_mesh");
        mesh.add_root(SubMesh::new("cube_submesh", vertex_buffer, index_buffer, material));
        Ok(mesh)
    }

    /// Parse an OBJ file and upload it as a single-submesh mesh
    pub fn load_obj<P: AsRef<Path>>(&mut self, path: P, material: Arc<Material>) -> AssetResult<Mesh> {
        let path = path.as_ref();
        let parsed = parse_obj_file(path)?;
        let name = path
            .file_stem()
            .map_or_else(|| "obj_mesh".to_string(), |stem| stem.to_string_lossy().into_owned());
        self.mesh_from_parsed(&name, &parsed, material)
    }

    /// Upload already parsed geometry as a single-submesh mesh
    pub fn mesh_from_parsed(&mut self, name: &str, parsed: &ParsedMesh, material: Arc<Material>) -> AssetResult<Mesh> {
        let vertices: Vec<Vertex> = match &parsed.normals {
            Some(normals) => parsed
                .positions
                .iter()
                .zip(normals)
                .map(|(position, normal)| Vertex::new((*position).into(), (*normal).into()))
                .collect(),
            None => parsed
                .positions
                .iter()
                .map(|position| Vertex::new((*position).into(), [0.0; 3]))
                .collect(),
        };

        let (vertex_buffer, index_buffer) = self.upload_geometry(&vertices, &parsed.indices)?;
        let mut mesh = Mesh::new(name);
        mesh.add_root(SubMesh::new(name, vertex_buffer, index_buffer, material));
        Ok(mesh)
    }

    /// Read a RON scene and load it, resolving texture paths next to the file
    pub fn load_scene_file<P: AsRef<Path>>(&mut self, path: P) -> AssetResult<Mesh> {
        let path = path.as_ref();
        let scene = ImportedScene::load_ron(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.load_scene(&scene, base_dir)
    }

    /// Upload every scene mesh, build every material and import the node tree.
    /// Texture paths are relative to `base_dir`.
    pub fn load_scene(&mut self, scene: &ImportedScene, base_dir: &Path) -> AssetResult<Mesh> {
        let materials = scene
            .materials
            .iter()
            .map(|descriptor| self.build_material(descriptor, scene, base_dir))
            .collect::<AssetResult<Vec<_>>>()?;

        let mut templates = Vec::with_capacity(scene.meshes.len());
        for imported in &scene.meshes {
            imported.validate()?;
            let material = materials.get(imported.material).ok_or_else(|| {
                AssetError::Format(format!(
                    "mesh '{}' references material {} but the scene has {}",
                    imported.name,
                    imported.material,
                    materials.len()
                ))
            })?;
            let (vertex_buffer, index_buffer) = self.upload_geometry(&imported.to_vertices(), &imported.indices)?;
            templates.push(SubMesh::new(
                imported.name.clone(),
                vertex_buffer,
                index_buffer,
                Arc::clone(material),
            ));
        }

        let mesh = import_node_tree(&scene.name, &scene.root, &templates)?;
        log::info!(
            "Loaded scene '{}': {} submeshes, {} materials, {} cached textures",
            scene.name,
            mesh.len(),
            materials.len(),
            self.resolver.cached_count()
        );
        Ok(mesh)
    }

    fn build_material(
        &mut self,
        descriptor: &MaterialDescriptor,
        scene: &ImportedScene,
        base_dir: &Path,
    ) -> AssetResult<Arc<Material>> {
        let Some(diffuse_reference) = &descriptor.diffuse_texture else {
            let data = FlatColorData {
                diffuse_color: descriptor.diffuse_color,
                specular_color: descriptor.specular_color,
                shininess: descriptor.shininess,
            };
            return Ok(Material::flat_color(self.device, self.registry, data)?);
        };

        let diffuse = self.texture(diffuse_reference, scene, base_dir)?;
        let emissive = match &descriptor.emissive_texture {
            Some(reference) => self.texture(reference, scene, base_dir)?,
            None => self.resolver.solid_color_texture(self.device, NO_EMISSION)?,
        };
        let normal = match &descriptor.normal_texture {
            Some(reference) => self.texture(reference, scene, base_dir)?,
            None => self.resolver.solid_color_texture(self.device, FLAT_NORMAL)?,
        };
        let maps = TexturedMaps {
            diffuse,
            emissive,
            normal,
            sampler: self.resolver.sampler(self.device)?,
        };
        let data = TexturedData::new(
            Vec4::from(descriptor.diffuse_color),
            Vec3::from(descriptor.specular_color),
            Vec3::from(descriptor.emissive_color),
            descriptor.shininess,
        );
        Ok(Material::textured(self.device, self.registry, data, maps)?)
    }

    fn texture(
        &mut self,
        reference: &str,
        scene: &ImportedScene,
        base_dir: &Path,
    ) -> AssetResult<TextureHandle> {
        let source = TextureSource::from_reference(reference, base_dir);
        self.resolver
            .resolve_texture(self.device, &source, &scene.embedded_textures)
    }

    /// Stage both arrays, copy them into device-local buffers in one transfer pass and
    /// submit. Later submissions on the device observe the copies.
    fn upload_geometry(&self, vertices: &[Vertex], indices: &[u32]) -> AssetResult<(BufferHandle, BufferHandle)> {
        let mut commands = self.device.new_command_buffer();
        commands.begin_transfer_pass();
        let vertex_buffer = self.stage(bytemuck::cast_slice(vertices), BufferUsage::VERTEX, &mut *commands)?;
        let index_buffer = self.stage(bytemuck::cast_slice(indices), BufferUsage::INDEX, &mut *commands)?;
        commands.end_transfer_pass();
        let token = self.device.submit(commands)?;

        log::trace!(
            "Uploaded {} vertices and {} indices in submission {:?}",
            vertices.len(),
            indices.len(),
            token
        );
        Ok((vertex_buffer, index_buffer))
    }

    fn stage(
        &self,
        bytes: &[u8],
        usage: BufferUsage,
        commands: &mut dyn CommandBuffer,
    ) -> AssetResult<BufferHandle> {
        let buffer = self.device.new_buffer(&BufferDescriptor {
            size: bytes.len(),
            usage: usage | BufferUsage::COPY_DESTINATION,
            storage: StorageMode::DeviceLocal,
        })?;
        let staging = self.device.new_buffer(&BufferDescriptor {
            size: bytes.len(),
            usage: BufferUsage::COPY_SOURCE,
            storage: StorageMode::HostVisible,
        })?;
        self.device.write_buffer(staging, 0, bytes)?;
        commands.copy_buffer_to_buffer(staging, buffer, bytes.len());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::scene_import::{ImportedMesh, SceneNode};
    use crate::assets::texture_resolver::EmbeddedTexture;
    use crate::foundation::math::Mat4;
    use crate::render::headless::HeadlessDevice;
    use crate::render::material::{MaterialKind, MaterialParams};

    fn registry(device: &HeadlessDevice) -> PipelineRegistry {
        let mut registry = PipelineRegistry::new();
        registry.create_all(device).unwrap();
        registry
    }

    fn triangle(material: usize) -> ImportedMesh {
        ImportedMesh {
            name: format!("tri{material}"),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: vec![0, 1, 2],
            material,
            ..ImportedMesh::default()
        }
    }

    #[test]
    fn test_builtin_cube_uploads_geometry() {
        let device = HeadlessDevice::new();
        let registry = registry(&device);
        let material = Material::flat_color(&device, &registry, FlatColorData::default()).unwrap();
        let mut loader = MeshLoader::new(&device, &registry);

        let mesh = loader.builtin_cube(material).unwrap();
        assert_eq!(mesh.name, "cube_mesh");
        let sub = mesh.get(mesh.roots()[0]).unwrap();
        assert_eq!(sub.name, "cube_submesh");

        let vertex_bytes = device.buffer_contents(sub.vertex_buffer).unwrap();
        let index_bytes = device.buffer_contents(sub.index_buffer).unwrap();
        assert_eq!(vertex_bytes.len(), 24 * std::mem::size_of::<Vertex>());
        assert_eq!(index_bytes.len(), 36 * 4);
        let last: u32 = bytemuck::pod_read_unaligned(&index_bytes[35 * 4..]);
        assert_eq!(last, 23);
        assert!(device
            .buffer_descriptor(sub.vertex_buffer)
            .unwrap()
            .usage
            .contains(BufferUsage::VERTEX));
    }

    #[test]
    fn test_parsed_mesh_without_normals_gets_zero_normals() {
        let device = HeadlessDevice::new();
        let registry = registry(&device);
        let material = Material::flat_color(&device, &registry, FlatColorData::default()).unwrap();
        let mut loader = MeshLoader::new(&device, &registry);
        let parsed = ParsedMesh {
            positions: vec![Vec3::new(1.0, 2.0, 3.0)],
            indices: vec![],
            normals: None,
        };

        let mesh = loader.mesh_from_parsed("point", &parsed, material).unwrap();
        let sub = mesh.get(mesh.roots()[0]).unwrap();
        let bytes = device.buffer_contents(sub.vertex_buffer).unwrap();
        let vertex: Vertex = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(vertex.position, [1.0, 2.0, 3.0]);
        assert_eq!(vertex.normal, [0.0; 3]);
    }

    #[test]
    fn test_scene_materials_and_shared_textures() {
        let device = HeadlessDevice::new();
        let registry = registry(&device);
        let mut loader = MeshLoader::new(&device, &registry);
        let texel = EmbeddedTexture {
            width: 1,
            height: 1,
            data: vec![9, 9, 9, 255],
        };
        let scene = ImportedScene {
            name: "scene".to_string(),
            root: SceneNode {
                meshes: vec![0, 1, 2],
                ..SceneNode::default()
            },
            meshes: vec![triangle(0), triangle(1), triangle(2)],
            materials: vec![
                MaterialDescriptor::default(),
                MaterialDescriptor {
                    diffuse_texture: Some("*0".to_string()),
                    ..MaterialDescriptor::default()
                },
                MaterialDescriptor {
                    diffuse_texture: Some("*0".to_string()),
                    ..MaterialDescriptor::default()
                },
            ],
            embedded_textures: vec![texel],
        };

        let mesh = loader.load_scene(&scene, Path::new(".")).unwrap();
        let materials: Vec<_> = mesh
            .roots()
            .iter()
            .map(|&key| Arc::clone(&mesh.get(key).unwrap().material))
            .collect();
        assert_eq!(materials[0].kind(), MaterialKind::FlatColor);
        assert_eq!(materials[1].kind(), MaterialKind::Textured);

        let maps = |material: &Material| match material.params() {
            MaterialParams::Textured { maps, .. } => *maps,
            other => panic!("expected textured material, got {other:?}"),
        };
        assert_eq!(maps(&materials[1]).diffuse, maps(&materials[2]).diffuse);
        assert_eq!(maps(&materials[1]).normal, maps(&materials[2]).normal);
        assert_ne!(materials[1].id(), materials[2].id());
        assert_eq!(loader.resolver().cached_count(), 1);
        assert_eq!(loader.resolver().solid_color_count(), 2);
        assert_eq!(device.texture_layer(maps(&materials[1]).normal, 0), Some(vec![128, 128, 255, 255]));
    }

    #[test]
    fn test_scene_with_bad_material_index() {
        let device = HeadlessDevice::new();
        let registry = registry(&device);
        let mut loader = MeshLoader::new(&device, &registry);
        let scene = ImportedScene {
            root: SceneNode {
                meshes: vec![0],
                transform: Mat4::identity(),
                ..SceneNode::default()
            },
            meshes: vec![triangle(4)],
            materials: vec![MaterialDescriptor::default()],
            ..ImportedScene::default()
        };
        assert!(matches!(
            loader.load_scene(&scene, Path::new(".")),
            Err(AssetError::Format(_))
        ));
    }

    #[test]
    fn test_missing_pipelines_fail_material_creation() {
        let device = HeadlessDevice::new();
        let registry = PipelineRegistry::new();
        let mut loader = MeshLoader::new(&device, &registry);
        let scene = ImportedScene {
            materials: vec![MaterialDescriptor::default()],
            ..ImportedScene::default()
        };
        assert!(matches!(
            loader.load_scene(&scene, Path::new(".")),
            Err(AssetError::Material(_))
        ));
    }
}
