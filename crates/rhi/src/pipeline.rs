//! Graphics pipeline and pipeline layout construction.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout: descriptor set layouts plus
//!   an optional push constant range
//! - [`Pipeline`] wraps an immutable graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] collects the fixed-function state and builds
//!   a pipeline for one subpass of a render pass
//!
//! Viewport and scissor are always dynamic state; the frame loop sets them to
//! the swapchain extent every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use harness_rhi::device::Device;
//! use harness_rhi::shader::{Shader, ShaderStage};
//! use harness_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use harness_rhi::vertex::QuadVertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), harness_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], None)?;
//!
//! let pipeline = {
//!     let vertex_shader = Shader::from_spirv_file(
//!         device.clone(),
//!         Path::new("shaders/texture.vert.spv"),
//!         ShaderStage::Vertex,
//!     )?;
//!     let fragment_shader = Shader::from_spirv_file(
//!         device.clone(),
//!         Path::new("shaders/texture.frag.spv"),
//!         ShaderStage::Fragment,
//!     )?;
//!     GraphicsPipelineBuilder::new()
//!         .vertex_shader(&vertex_shader)
//!         .fragment_shader(&fragment_shader)
//!         .vertex_binding(QuadVertex::binding_description())
//!         .vertex_attributes(&QuadVertex::attribute_descriptions())
//!         .build(device.clone(), &layout, render_pass, 0)?
//!     // Shader modules are destroyed here
//! };
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout from descriptor set layouts and at most one
    /// push constant range.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_range: Option<vk::PushConstantRange>,
    ) -> RhiResult<Self> {
        let push_constant_ranges: Vec<vk::PushConstantRange> =
            push_constant_range.into_iter().collect();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Vulkan graphics pipeline wrapper.
///
/// Immutable after creation.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Reversed-Z depth test: near is 1.0, far is 0.0.
pub const DEPTH_COMPARE_OP: vk::CompareOp = vk::CompareOp::GREATER;

/// `src * src_alpha + dst * (1 - src_alpha)` for color, source alpha passed
/// through.
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }
}

/// Builder for graphics pipelines.
///
/// Fixed state:
/// - Triangle list, fill, no culling, counter-clockwise front face
/// - One dynamic viewport and one dynamic scissor
/// - Alpha blending on the single color attachment
/// - Depth test and write with [`DEPTH_COMPARE_OP`], bounds 0..1 (only
///   applied when [`depth`](Self::depth) is enabled)
///
/// Single sample unless [`rasterization_samples`](Self::rasterization_samples)
/// says otherwise.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    rasterization_samples: vk::SampleCountFlags,
    depth_enabled: bool,
    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            depth_enabled: false,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex input attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    /// Must match the sample count of the subpass attachments.
    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    /// Enables depth test and write; the subpass must have a depth attachment.
    pub fn depth(mut self, enabled: bool) -> Self {
        self.depth_enabled = enabled;
        self
    }

    fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_enabled)
            .depth_write_enable(self.depth_enabled)
            .depth_compare_op(DEPTH_COMPARE_OP)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
    }

    fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
    }

    /// Builds the pipeline for `subpass` of `render_pass`.
    ///
    /// The shaders are only borrowed for the duration of this call and can
    /// be dropped as soon as it returns.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader stage is missing or pipeline creation
    /// fails.
    pub fn build(
        self,
        device: Arc<Device>,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
        subpass: u32,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Dynamic, so only the counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = Self::rasterization_state();

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = self.depth_stencil_state();

        let color_blend_attachments = [alpha_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(subpass);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created ({} vertex attribute(s), depth {}, {:?})",
            self.vertex_attributes.len(),
            if self.depth_enabled { "on" } else { "off" },
            self.rasterization_samples
        );

        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert!(!builder.depth_enabled);
        assert_eq!(
            builder.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_alpha_blend_factors() {
        let state = alpha_blend_attachment();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(state.alpha_blend_op, vk::BlendOp::ADD);
    }

    #[test]
    fn test_depth_state_reversed_z() {
        let state = GraphicsPipelineBuilder::new().depth(true).depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::GREATER);
        assert_eq!(state.min_depth_bounds, 0.0);
        assert_eq!(state.max_depth_bounds, 1.0);

        let off = GraphicsPipelineBuilder::new().depth_stencil_state();
        assert_eq!(off.depth_test_enable, vk::FALSE);
    }

    #[test]
    fn test_rasterization_state() {
        let state = GraphicsPipelineBuilder::rasterization_state();
        assert_eq!(state.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(state.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.line_width, 1.0);
    }
}
