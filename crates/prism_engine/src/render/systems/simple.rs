//! Lit mesh rendering without shadows

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use super::{build_pipeline, draw_meshes, push_range, MESH_PUSH_STAGES};
use crate::config::ShaderConfig;
use crate::foundation::math::Mat4;
use crate::render::frame_info::FrameInfo;
use crate::render::game_object::TransformComponent;
use crate::render::model::Model;
use crate::render::vulkan::{GraphicsPipeline, PipelineConfig, PipelineLayout, VulkanResult};

/// Per-object push constants
///
/// The normal matrix is a 3x3 embedded in a mat4 so both fields keep
/// 16-byte column alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimplePushConstantData {
    pub model_matrix: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
}

impl SimplePushConstantData {
    pub fn from_transform(transform: &TransformComponent) -> Self {
        let mut normal = Mat4::identity();
        normal.fixed_view_mut::<3, 3>(0, 0).copy_from(&transform.normal_matrix());
        Self {
            model_matrix: transform.mat4().into(),
            normal_matrix: normal.into(),
        }
    }
}

/// Draws every object with a mesh using the global descriptor set
pub struct SimpleRenderSystem {
    pipeline: GraphicsPipeline,
    layout: PipelineLayout,
}

impl SimpleRenderSystem {
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderConfig,
    ) -> VulkanResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_set_layout],
            &[push_range::<SimplePushConstantData>(MESH_PUSH_STAGES)],
        )?;

        let config = PipelineConfig::default()
            .with_render_pass(render_pass, 0)
            .with_layout(layout.handle());
        let pipeline = build_pipeline(device, shaders, &config)?;

        log::debug!("[PIPELINE] Simple render system ready");
        Ok(Self { pipeline, layout })
    }

    pub fn render_game_objects(&self, frame_info: &FrameInfo<'_, Model>) {
        let command_buffer = frame_info.command_buffer;
        self.pipeline.bind(command_buffer);
        self.layout
            .bind_descriptor_sets(command_buffer, &[frame_info.global_descriptor_set]);
        draw_meshes(&self.layout, command_buffer, frame_info.game_objects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_push_constant_size_fits_minimum_guarantee() {
        assert_eq!(std::mem::size_of::<SimplePushConstantData>(), 128);
        assert_eq!(push_range::<SimplePushConstantData>(MESH_PUSH_STAGES).size, 128);
    }

    #[test]
    fn test_normal_matrix_is_embedded_in_upper_left() {
        let transform = TransformComponent {
            translation: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::new(2.0, 1.0, 1.0),
            rotation: Vec3::zeros(),
        };
        let data = SimplePushConstantData::from_transform(&transform);

        assert_eq!(data.model_matrix[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(data.normal_matrix[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(data.normal_matrix[1], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(data.normal_matrix[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
