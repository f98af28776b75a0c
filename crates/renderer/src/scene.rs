//! What gets drawn inside the render pass.
//!
//! - [`SceneKind::Clear`]: nothing, the pass clear is the whole frame
//! - [`SceneKind::Quad`]: an indexed quad sampling one texture
//! - [`SceneKind::Mesh`]: one glTF mesh transformed by a push-constant MVP

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use tracing::info;

use harness_core::{HarnessConfig, SceneKind};
use harness_resources::{MeshData, TextureData};
use harness_rhi::RhiResult;
use harness_rhi::buffer::{Buffer, BufferUsage};
use harness_rhi::command::CommandBuffer;
use harness_rhi::descriptor::{self, DescriptorPool, DescriptorSetLayout};
use harness_rhi::device::Device;
use harness_rhi::image::Image;
use harness_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use harness_rhi::render_pass::RenderPass;
use harness_rhi::sampler::Sampler;
use harness_rhi::shader::{Shader, ShaderStage};
use harness_rhi::vertex::{MeshVertex, QuadVertex};

use crate::error::SetupContext;

/// Quad corners: position, color, texture coordinate.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex::new(Vec2::new(0.5, -0.5), Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
    QuadVertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(1.0, 1.0)),
    QuadVertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 1.0)),
    QuadVertex::new(Vec2::new(-0.5, -0.5), Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
];

/// Two triangles sharing the 0-2 diagonal.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 3, 0, 2];

/// Side of the generated fallback texture, in texels.
const CHECKERBOARD_SIZE: u32 = 4;
/// Fallback checkerboard colors; texel (0, 0) is light.
pub const CHECKER_LIGHT: [u8; 4] = [235, 235, 235, 255];
pub const CHECKER_DARK: [u8; 4] = [40, 40, 48, 255];

/// Vertical field of view of the mesh camera.
const MESH_FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
const MESH_NEAR: f32 = 0.1;
/// Camera distance from the origin, in units of the normalized mesh size.
const MESH_CAMERA_DISTANCE: f32 = 3.0;

/// Push constants of the mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub mvp: Mat4,
}

/// Clear color for a frame: magenta with the green channel set to `pulse`.
pub fn clear_color(pulse: f32) -> [f32; 4] {
    [1.0, pulse.clamp(0.0, 1.0), 1.0, 1.0]
}

/// Model-view-projection for a mesh with bounds `(min, max)`.
///
/// The mesh is centered, scaled to unit size and spun about Y by `time`
/// radians. Projection is reversed-Z with an infinite far plane, flipped
/// for Vulkan's downward Y.
pub fn mesh_mvp(bounds: (Vec3, Vec3), aspect: f32, time: f32) -> Mat4 {
    let (min, max) = bounds;
    let center = (min + max) * 0.5;
    let size = (max - min).max_element().max(f32::EPSILON);

    let model = Mat4::from_rotation_y(time)
        * Mat4::from_scale(Vec3::splat(1.0 / size))
        * Mat4::from_translation(-center);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, MESH_CAMERA_DISTANCE), Vec3::ZERO, Vec3::Y);
    let mut projection = Mat4::perspective_infinite_reverse_rh(MESH_FOV_Y, aspect, MESH_NEAR);
    projection.y_axis.y *= -1.0;

    projection * view * model
}

struct QuadScene {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    /// Referenced by `descriptor_set`.
    _texture: Image,
    _descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    pipeline: Pipeline,
    layout: PipelineLayout,
    _set_layout: DescriptorSetLayout,
    _sampler: Sampler,
}

struct MeshScene {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    bounds: (Vec3, Vec3),
    pipeline: Pipeline,
    layout: PipelineLayout,
}

enum SceneDraw {
    Clear,
    Quad(Box<QuadScene>),
    Mesh(Box<MeshScene>),
}

/// GPU resources and draw commands for the configured scene.
///
/// Field order inside each scene drops buffers and images first, then
/// descriptors, the pipeline and finally the sampler.
pub struct Scene {
    draw: SceneDraw,
}

impl Scene {
    /// Loads assets, uploads them and builds the pipeline for `render_pass`.
    pub fn new(
        device: &Arc<Device>,
        config: &HarnessConfig,
        render_pass: &RenderPass,
    ) -> harness_core::Result<Self> {
        let draw = match config.render.scene {
            SceneKind::Clear => SceneDraw::Clear,
            SceneKind::Quad => SceneDraw::Quad(Box::new(QuadScene::new(device, config, render_pass)?)),
            SceneKind::Mesh => SceneDraw::Mesh(Box::new(MeshScene::new(device, config, render_pass)?)),
        };
        info!("Scene '{:?}' ready", config.render.scene);
        Ok(Self { draw })
    }

    /// Records the draw. Must be called inside the render pass.
    pub fn record(&self, cmd: &CommandBuffer, extent: vk::Extent2D, time: f32) {
        match &self.draw {
            SceneDraw::Clear => {}
            SceneDraw::Quad(quad) => quad.record(cmd, extent),
            SceneDraw::Mesh(mesh) => mesh.record(cmd, extent, time),
        }
    }
}

impl QuadScene {
    fn new(
        device: &Arc<Device>,
        config: &HarnessConfig,
        render_pass: &RenderPass,
    ) -> harness_core::Result<Self> {
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )
        .setup("quad vertex buffer")?;
        let index_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
        )
        .setup("quad index buffer")?;

        let pixels = match &config.assets.texture {
            Some(path) => TextureData::load_rgba8(path).setup("quad texture")?,
            None => TextureData::checkerboard(CHECKERBOARD_SIZE, 1, CHECKER_LIGHT, CHECKER_DARK),
        };
        let texture = upload_texture(device, &pixels).setup("quad texture upload")?;
        let sampler = Sampler::nearest_clamp(device.clone()).setup("sampler")?;

        let set_layout = DescriptorSetLayout::new(device.clone(), &[descriptor::texture_binding(0)])
            .setup("descriptor set layout")?;
        let descriptor_pool =
            DescriptorPool::new(device.clone(), 1, &descriptor::texture_pool_sizes(1))
                .setup("descriptor pool")?;
        let descriptor_set = descriptor_pool
            .allocate_one(&set_layout)
            .setup("descriptor set")?;
        descriptor::write_combined_image_sampler(
            device,
            descriptor_set,
            0,
            sampler.handle(),
            texture.view(),
        );

        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], None)
            .setup("quad pipeline layout")?;
        let pipeline = build_pipeline(
            device,
            &config.assets.shader_dir,
            "texture",
            PipelineInputs {
                binding: QuadVertex::binding_description(),
                attributes: &QuadVertex::attribute_descriptions(),
            },
            &layout,
            render_pass,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            _texture: texture,
            _descriptor_pool: descriptor_pool,
            descriptor_set,
            pipeline,
            layout,
            _set_layout: set_layout,
            _sampler: sampler,
        })
    }

    fn record(&self, cmd: &CommandBuffer, extent: vk::Extent2D) {
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.set_full_viewport(extent);
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.bind_descriptor_sets(
            self.pipeline.bind_point(),
            self.layout.handle(),
            0,
            &[self.descriptor_set],
        );
        cmd.draw_indexed(QUAD_INDICES.len() as u32, 1, 0, 0, 0);
    }
}

impl MeshScene {
    fn new(
        device: &Arc<Device>,
        config: &HarnessConfig,
        render_pass: &RenderPass,
    ) -> harness_core::Result<Self> {
        let path = config.assets.model.as_deref().ok_or_else(|| {
            harness_core::Error::Config("scene \"mesh\" requires assets.model".to_string())
        })?;
        let mesh = MeshData::load(path).setup("mesh")?;
        if mesh.indices.is_empty() {
            return Err(harness_core::Error::Resource(format!(
                "{}: mesh has no indices",
                path.display()
            )));
        }

        let vertex_buffer =
            Buffer::new_with_data(device.clone(), BufferUsage::Vertex, &mesh.vertex_bytes())
                .setup("mesh vertex buffer")?;
        let index_buffer =
            Buffer::new_with_data(device.clone(), BufferUsage::Index, mesh.index_bytes())
                .setup("mesh index buffer")?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<MeshPushConstants>() as u32);
        let layout =
            PipelineLayout::new(device.clone(), &[], Some(push_range)).setup("mesh pipeline layout")?;
        let pipeline = build_pipeline(
            device,
            &config.assets.shader_dir,
            "mesh",
            PipelineInputs {
                binding: MeshVertex::binding_description(),
                attributes: &MeshVertex::attribute_descriptions(),
            },
            &layout,
            render_pass,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            bounds: mesh.bounds(),
            pipeline,
            layout,
        })
    }

    fn record(&self, cmd: &CommandBuffer, extent: vk::Extent2D, time: f32) {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let constants = MeshPushConstants {
            mvp: mesh_mvp(self.bounds, aspect, time),
        };

        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.set_full_viewport(extent);
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT16);
        cmd.push_constants(self.layout.handle(), vk::ShaderStageFlags::VERTEX, 0, &constants);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

fn upload_texture(device: &Arc<Device>, data: &TextureData) -> RhiResult<Image> {
    let image = Image::new(
        device.clone(),
        data.width,
        data.height,
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED,
    )?;
    image.upload(
        &data.pixels,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::SHADER_READ,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
    )?;
    Ok(image)
}

struct PipelineInputs<'a> {
    binding: vk::VertexInputBindingDescription,
    attributes: &'a [vk::VertexInputAttributeDescription],
}

/// Builds a pipeline from `<name>.vert.spv` and `<name>.frag.spv` in
/// `shader_dir`. The shader modules are destroyed on return.
fn build_pipeline(
    device: &Arc<Device>,
    shader_dir: &Path,
    name: &str,
    inputs: PipelineInputs<'_>,
    layout: &PipelineLayout,
    render_pass: &RenderPass,
) -> harness_core::Result<Pipeline> {
    let vertex_path = shader_dir.join(format!("{name}.vert.spv"));
    let fragment_path = shader_dir.join(format!("{name}.frag.spv"));

    let vertex_shader = Shader::from_spirv_file(device.clone(), &vertex_path, ShaderStage::Vertex)
        .setup("vertex shader")?;
    let fragment_shader =
        Shader::from_spirv_file(device.clone(), &fragment_path, ShaderStage::Fragment)
            .setup("fragment shader")?;

    let desc = render_pass.desc();
    let pipeline = GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex_shader)
        .fragment_shader(&fragment_shader)
        .vertex_binding(inputs.binding)
        .vertex_attributes(inputs.attributes)
        .rasterization_samples(desc.samples)
        .depth(desc.depth_format.is_some())
        .build(device.clone(), layout, render_pass.handle(), 0)
        .setup(&format!("{name} pipeline"))?;

    info!("Pipeline '{}' created", name);
    Ok(pipeline)
}
