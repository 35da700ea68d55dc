//! Graphics pipeline construction
//!
//! [`PipelineConfig`] is a plain owned description of the fixed-function
//! state. Systems start from [`PipelineConfig::default`], adjust it with the
//! `with_*` variants, fill in the render pass and layout, and hand it to
//! [`GraphicsPipeline::new`] together with the SPIR-V paths.

use ash::{vk, Device};
use bytemuck::Pod;
use std::path::Path;

use super::shader::{ShaderModule, ENTRY_POINT};
use super::{VulkanError, VulkanResult};
use crate::render::model::Vertex;

/// Specialization constants for the fragment stage
#[derive(Debug, Clone, Default)]
pub struct SpecializationConstants {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl SpecializationConstants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a 32-bit constant (`uint` / `bool` in GLSL)
    pub fn with_u32(mut self, constant_id: u32, value: u32) -> Self {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&value.to_ne_bytes());
        self.entries.push(vk::SpecializationMapEntry {
            constant_id,
            offset,
            size: std::mem::size_of::<u32>(),
        });
        self
    }

    pub fn entries(&self) -> &[vk::SpecializationMapEntry] {
        &self.entries
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-function state of a graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,
    pub rasterization_samples: vk::SampleCountFlags,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub color_attachment_count: u32,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub pipeline_layout: vk::PipelineLayout,
    pub fragment_specialization: Option<SpecializationConstants>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            binding_descriptions: Vertex::binding_descriptions(),
            attribute_descriptions: Vertex::attribute_descriptions(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_bias_enable: false,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            color_blend_attachment: vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::FALSE,
                src_color_blend_factor: vk::BlendFactor::ONE,
                dst_color_blend_factor: vk::BlendFactor::ZERO,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::ONE,
                dst_alpha_blend_factor: vk::BlendFactor::ZERO,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::RGBA,
            },
            color_attachment_count: 1,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            pipeline_layout: vk::PipelineLayout::null(),
            fragment_specialization: None,
        }
    }
}

impl PipelineConfig {
    /// Standard "over" blending for translucent billboards
    pub fn enable_alpha_blending(mut self) -> Self {
        self.color_blend_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        };
        self
    }

    /// No vertex buffers; geometry comes from `gl_VertexIndex`
    pub fn clear_vertex_input(mut self) -> Self {
        self.binding_descriptions.clear();
        self.attribute_descriptions.clear();
        self
    }

    pub fn with_vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.binding_descriptions = bindings;
        self.attribute_descriptions = attributes;
        self
    }

    /// Enable depth bias with factors supplied at draw time
    pub fn with_depth_bias(mut self) -> Self {
        self.depth_bias_enable = true;
        if !self.dynamic_states.contains(&vk::DynamicState::DEPTH_BIAS) {
            self.dynamic_states.push(vk::DynamicState::DEPTH_BIAS);
        }
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_depth_compare_op(mut self, op: vk::CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// For depth-only passes
    pub fn without_color_attachments(mut self) -> Self {
        self.color_attachment_count = 0;
        self
    }

    pub fn with_specialization(mut self, constants: SpecializationConstants) -> Self {
        self.fragment_specialization = Some(constants);
        self
    }

    pub fn with_render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    pub fn with_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = layout;
        self
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, layout })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Record a push of `data` at offset zero
    pub fn push_constants<T: Pod>(&self, command_buffer: vk::CommandBuffer, stages: vk::ShaderStageFlags, data: &T) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, self.layout, stages, 0, bytemuck::bytes_of(data));
        }
    }

    /// Bind descriptor sets starting at set 0
    pub fn bind_descriptor_sets(&self, command_buffer: vk::CommandBuffer, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                0,
                sets,
                &[],
            );
        }
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
///
/// Does not own its layout; layouts are shared between pipeline variants.
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Build a pipeline from SPIR-V files and `config`
    ///
    /// The fragment stage is optional for depth-only pipelines.
    pub fn new(
        device: &Device,
        vertex_path: &Path,
        fragment_path: Option<&Path>,
        config: &PipelineConfig,
    ) -> VulkanResult<Self> {
        if config.pipeline_layout == vk::PipelineLayout::null() {
            return Err(VulkanError::invalid("Cannot create graphics pipeline: no pipeline layout in config"));
        }
        if config.render_pass == vk::RenderPass::null() {
            return Err(VulkanError::invalid("Cannot create graphics pipeline: no render pass in config"));
        }

        let vertex_module = ShaderModule::from_file(device, vertex_path)?;
        let fragment_module = fragment_path
            .map(|path| ShaderModule::from_file(device, path))
            .transpose()?;

        let specialization_info = config
            .fragment_specialization
            .as_ref()
            .filter(|constants| !constants.is_empty())
            .map(|constants| {
                vk::SpecializationInfo::builder()
                    .map_entries(constants.entries())
                    .data(constants.data())
                    .build()
            });

        let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module.handle())
            .name(ENTRY_POINT)
            .build()];

        if let Some(fragment_module) = &fragment_module {
            let mut stage = vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module.handle())
                .name(ENTRY_POINT);
            if let Some(info) = specialization_info.as_ref() {
                stage = stage.specialization_info(info);
            }
            shader_stages.push(stage.build());
        }

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&config.dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(config.depth_bias_enable);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(config.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(config.depth_test_enable)
            .depth_write_enable(config.depth_write_enable)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = vec![config.color_blend_attachment; config.color_attachment_count as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .base_pipeline_index(-1);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("Driver returned no pipeline"))?;

        log::debug!(
            "[PIPELINE] Created pipeline from {:?} / {:?}",
            vertex_path,
            fragment_path
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
        })
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_forward_pass_expectations() {
        let config = PipelineConfig::default();
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert!(config.depth_test_enable);
        assert!(config.depth_write_enable);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert!(!config.depth_bias_enable);
        assert_eq!(config.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(config.color_attachment_count, 1);
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert_eq!(config.binding_descriptions.len(), 1);
        assert_eq!(config.attribute_descriptions.len(), 4);
        assert_eq!(config.render_pass, vk::RenderPass::null());
        assert!(config.fragment_specialization.is_none());
    }

    #[test]
    fn test_alpha_blending_uses_over_operator() {
        let blend = PipelineConfig::default().enable_alpha_blending().color_blend_attachment;
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }

    #[test]
    fn test_clear_vertex_input() {
        let config = PipelineConfig::default().clear_vertex_input();
        assert!(config.binding_descriptions.is_empty());
        assert!(config.attribute_descriptions.is_empty());
    }

    #[test]
    fn test_depth_bias_adds_dynamic_state_once() {
        let config = PipelineConfig::default().with_depth_bias().with_depth_bias();
        assert!(config.depth_bias_enable);
        let bias_states = config
            .dynamic_states
            .iter()
            .filter(|state| **state == vk::DynamicState::DEPTH_BIAS)
            .count();
        assert_eq!(bias_states, 1);
    }

    #[test]
    fn test_offscreen_variant() {
        let config = PipelineConfig::default()
            .without_color_attachments()
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .with_depth_bias();
        assert_eq!(config.color_attachment_count, 0);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert!(config.dynamic_states.contains(&vk::DynamicState::DEPTH_BIAS));
    }

    #[test]
    fn test_specialization_constants_layout() {
        let constants = SpecializationConstants::new().with_u32(0, 1).with_u32(3, 7);
        assert_eq!(constants.entries().len(), 2);
        assert_eq!(constants.entries()[0].constant_id, 0);
        assert_eq!(constants.entries()[0].offset, 0);
        assert_eq!(constants.entries()[1].constant_id, 3);
        assert_eq!(constants.entries()[1].offset, 4);
        assert_eq!(constants.entries()[1].size, 4);
        assert_eq!(constants.data().len(), 8);
        assert_eq!(&constants.data()[4..], &7u32.to_ne_bytes());
    }
}
