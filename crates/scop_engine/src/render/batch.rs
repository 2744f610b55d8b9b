//! # Draw Batches
//!
//! Per-frame grouping of draw instances by GPU state. Every submitted submesh lands
//! in a bucket keyed by pipeline, then material, then (vertex buffer, index buffer);
//! the bucket collects one model matrix per instance. Replay walks the grouping and
//! binds each pipeline, material and vertex buffer exactly once.
//!
//! ## Ordering
//!
//! All three levels are `BTreeMap`s over handle ids, so replay order is a total order
//! on identities and does not depend on hashing. Matrices inside a bucket keep the
//! order in which they were submitted.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::gpu::{BufferHandle, CommandBuffer, ParameterBlock, ParameterBlockPool, PipelineHandle};
use super::material::{Material, MaterialId};
use super::mesh::Mesh;
use crate::foundation::math::Mat4;

/// Set index of the view-projection block
pub const VIEW_PROJECTION_SET: u32 = 0;

/// Set index of the scene data block
pub const SCENE_DATA_SET: u32 = 2;

/// Set index of the material block
pub const MATERIAL_SET: u32 = 3;

/// Vertex buffer and index buffer drawn together
pub type GeometryKey = (BufferHandle, BufferHandle);

/// Counters collected while replaying one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Pipelines bound
    pub pipeline_binds: usize,
    /// Material parameter blocks bound
    pub material_binds: usize,
    /// Vertex buffers bound
    pub vertex_buffer_binds: usize,
    /// Indexed draws issued
    pub draw_calls: usize,
}

/// Instances drawn with one material
#[derive(Debug)]
pub struct MaterialBatch {
    material: Arc<Material>,
    geometries: BTreeMap<GeometryKey, Vec<Mat4>>,
}

impl MaterialBatch {
    /// Material shared by the batch
    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    /// Model matrices per geometry
    pub fn geometries(&self) -> &BTreeMap<GeometryKey, Vec<Mat4>> {
        &self.geometries
    }
}

/// Per-frame draw grouping
#[derive(Debug, Default)]
pub struct DrawBatches {
    pipelines: BTreeMap<PipelineHandle, BTreeMap<MaterialId, MaterialBatch>>,
}

impl DrawBatches {
    /// Empty grouping
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every group. Called at the start of each frame; groups are never merged
    /// across frames.
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    /// Add every submesh of `mesh`, placed at `world`
    pub fn add_mesh(&mut self, mesh: &Mesh, world: &Mat4) {
        mesh.visit_post_order(world, |submesh, model| {
            let material = &submesh.material;
            self.pipelines
                .entry(material.pipeline())
                .or_default()
                .entry(material.id())
                .or_insert_with(|| MaterialBatch {
                    material: Arc::clone(material),
                    geometries: BTreeMap::new(),
                })
                .geometries
                .entry((submesh.vertex_buffer, submesh.index_buffer))
                .or_default()
                .push(model);
        });
    }

    /// Model matrices collected for one bucket
    pub fn instances(
        &self,
        pipeline: PipelineHandle,
        material: MaterialId,
        geometry: GeometryKey,
    ) -> Option<&[Mat4]> {
        self.pipelines
            .get(&pipeline)?
            .get(&material)?
            .geometries
            .get(&geometry)
            .map(Vec::as_slice)
    }

    /// Material batches grouped under each pipeline
    pub fn pipelines(&self) -> impl Iterator<Item = (PipelineHandle, &BTreeMap<MaterialId, MaterialBatch>)> {
        self.pipelines.iter().map(|(pipeline, materials)| (*pipeline, materials))
    }

    /// Whether nothing was submitted
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Total number of instances across every bucket
    pub fn instance_count(&self) -> usize {
        self.pipelines
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|batch| batch.geometries.values())
            .map(Vec::len)
            .sum()
    }

    /// Record the grouping into `commands`. The render pass must already be open.
    ///
    /// Per pipeline the two frame-global blocks are bound; per material a block is
    /// allocated from `pool`; per instance the model matrix is pushed before its draw.
    pub fn replay(
        &self,
        commands: &mut dyn CommandBuffer,
        pool: &mut ParameterBlockPool,
        view_projection: &ParameterBlock,
        scene_data: &ParameterBlock,
    ) -> BatchStats {
        let mut stats = BatchStats::default();

        for (pipeline, materials) in &self.pipelines {
            commands.use_pipeline(*pipeline);
            commands.set_parameter_block(view_projection, VIEW_PROJECTION_SET);
            commands.set_parameter_block(scene_data, SCENE_DATA_SET);
            stats.pipeline_binds += 1;

            for batch in materials.values() {
                let block = batch.material.make_parameter_block(pool);
                commands.set_parameter_block(&block, MATERIAL_SET);
                stats.material_binds += 1;

                for ((vertex_buffer, index_buffer), models) in &batch.geometries {
                    commands.use_vertex_buffer(*vertex_buffer);
                    stats.vertex_buffer_binds += 1;

                    for model in models {
                        commands.push_constants(model);
                        commands.draw_indexed(*index_buffer);
                        stats.draw_calls += 1;
                    }
                    log::trace!(
                        "Drew {} instance(s) of vertex buffer {:?}",
                        models.len(),
                        vertex_buffer
                    );
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::gpu::GraphicsDevice;
    use crate::render::headless::{HeadlessCommandBuffer, HeadlessDevice, RecordedCommand};
    use crate::render::material::{FlatColorData, PipelineRegistry, VIEW_PROJECTION_LAYOUT};
    use crate::render::mesh::SubMesh;

    struct Fixture {
        device: HeadlessDevice,
        registry: PipelineRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let device = HeadlessDevice::new();
            let mut registry = PipelineRegistry::new();
            registry.create_all(&device).unwrap();
            Self { device, registry }
        }

        fn material(&self) -> Arc<Material> {
            Material::flat_color(&self.device, &self.registry, FlatColorData::default()).unwrap()
        }
    }

    fn single(material: Arc<Material>, vertex: u64, index: u64) -> Mesh {
        let mut mesh = Mesh::new("single");
        mesh.add_root(SubMesh::new("part", BufferHandle(vertex), BufferHandle(index), material));
        mesh
    }

    fn replay(batches: &DrawBatches) -> (Vec<RecordedCommand>, BatchStats) {
        let mut pool = ParameterBlockPool::new();
        let vp = pool.get(VIEW_PROJECTION_LAYOUT);
        let scene = pool.get(VIEW_PROJECTION_LAYOUT);
        let mut commands = HeadlessCommandBuffer::default();
        let stats = batches.replay(&mut commands, &mut pool, &vp, &scene);
        (commands.commands().to_vec(), stats)
    }

    #[test]
    fn test_two_instances_share_one_bucket_in_call_order() {
        let fixture = Fixture::new();
        let material = fixture.material();
        let mesh = single(material.clone(), 10, 11);
        let first = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));
        let second = Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0));

        let mut batches = DrawBatches::new();
        batches.add_mesh(&mesh, &first);
        batches.add_mesh(&mesh, &second);

        let instances = batches
            .instances(material.pipeline(), material.id(), (BufferHandle(10), BufferHandle(11)))
            .unwrap();
        assert_eq!(instances, &[first, second]);
    }

    #[test]
    fn test_replay_binds_each_level_once() {
        let fixture = Fixture::new();
        let material = fixture.material();
        let mesh = single(material, 10, 11);

        let mut batches = DrawBatches::new();
        batches.add_mesh(&mesh, &Mat4::identity());
        batches.add_mesh(&mesh, &Mat4::identity());

        let (commands, stats) = replay(&batches);
        assert_eq!(
            stats,
            BatchStats {
                pipeline_binds: 1,
                material_binds: 1,
                vertex_buffer_binds: 1,
                draw_calls: 2,
            }
        );
        let kinds: Vec<&str> = commands
            .iter()
            .map(|command| match command {
                RecordedCommand::UsePipeline(_) => "pipeline",
                RecordedCommand::SetParameterBlock { index, .. } => match *index {
                    VIEW_PROJECTION_SET => "vp",
                    SCENE_DATA_SET => "scene",
                    _ => "material",
                },
                RecordedCommand::UseVertexBuffer(_) => "vertex",
                RecordedCommand::PushConstants(_) => "push",
                RecordedCommand::DrawIndexed(_) => "draw",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            ["pipeline", "vp", "scene", "material", "vertex", "push", "draw", "push", "draw"]
        );
    }

    #[test]
    fn test_distinct_materials_and_geometry_split_buckets() {
        let fixture = Fixture::new();
        let red = fixture.material();
        let blue = fixture.material();

        let mut batches = DrawBatches::new();
        batches.add_mesh(&single(red, 1, 2), &Mat4::identity());
        batches.add_mesh(&single(blue.clone(), 1, 2), &Mat4::identity());
        batches.add_mesh(&single(blue, 3, 4), &Mat4::identity());

        let (_, stats) = replay(&batches);
        assert_eq!(stats.pipeline_binds, 1);
        assert_eq!(stats.material_binds, 2);
        assert_eq!(stats.vertex_buffer_binds, 3);
        assert_eq!(batches.instance_count(), 3);
    }

    #[test]
    fn test_children_inserted_before_parent() {
        let fixture = Fixture::new();
        let material = fixture.material();
        let mut mesh = Mesh::new("tree");
        let parent = mesh.add_root(SubMesh::new("parent", BufferHandle(1), BufferHandle(2), material.clone()));
        let child = mesh.insert(
            SubMesh::new("child", BufferHandle(1), BufferHandle(2), material.clone())
                .with_transform(Mat4::new_scaling(2.0)),
        );
        mesh.attach_children(parent, [child]);

        let mut batches = DrawBatches::new();
        batches.add_mesh(&mesh, &Mat4::identity());
        let instances = batches
            .instances(material.pipeline(), material.id(), (BufferHandle(1), BufferHandle(2)))
            .unwrap();
        assert_eq!(instances, &[Mat4::new_scaling(2.0), Mat4::identity()]);
    }

    #[test]
    fn test_clear_discards_previous_groups() {
        let fixture = Fixture::new();
        let mut batches = DrawBatches::new();
        batches.add_mesh(&single(fixture.material(), 1, 2), &Mat4::identity());
        batches.clear();
        assert!(batches.is_empty());
        let (commands, stats) = replay(&batches);
        assert!(commands.is_empty());
        assert_eq!(stats, BatchStats::default());
    }

    #[test]
    fn test_material_block_comes_from_pool() {
        let fixture = Fixture::new();
        let mut batches = DrawBatches::new();
        batches.add_mesh(&single(fixture.material(), 1, 2), &Mat4::identity());
        let mut pool = ParameterBlockPool::new();
        let vp = pool.get(VIEW_PROJECTION_LAYOUT);
        let scene = pool.get(VIEW_PROJECTION_LAYOUT);
        let mut commands = fixture.device.new_command_buffer();
        batches.replay(commands.as_mut(), &mut pool, &vp, &scene);
        assert_eq!(pool.allocated(), 3);
    }
}
