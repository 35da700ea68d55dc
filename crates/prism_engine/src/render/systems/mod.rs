//! Render systems
//!
//! Each system owns its pipeline layout and pipelines and records draw
//! commands for one kind of content into the frame's command buffer.

pub mod point_light;
pub mod shadow;
pub mod simple;

pub use point_light::{back_to_front, update_lights, PointLightPushConstants, PointLightSystem};
pub use shadow::{update_shadow_uniforms, ShadowDescriptorSets, ShadowRenderSystem};
pub use simple::{SimplePushConstantData, SimpleRenderSystem};

use ash::vk;
use std::path::Path;

use crate::config::ShaderConfig;
use crate::render::game_object::GameObjectMap;
use crate::render::model::Model;
use crate::render::vulkan::{GraphicsPipeline, PipelineConfig, PipelineLayout, VulkanResult};

/// Stages that read the mesh push constants
pub(crate) const MESH_PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

pub(crate) fn push_range<T>(stages: vk::ShaderStageFlags) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size: std::mem::size_of::<T>() as u32,
    }
}

pub(crate) fn build_pipeline(
    device: &ash::Device,
    shaders: &ShaderConfig,
    config: &PipelineConfig,
) -> VulkanResult<GraphicsPipeline> {
    GraphicsPipeline::new(
        device,
        Path::new(&shaders.vertex_shader_path),
        shaders.fragment_shader_path.as_deref().map(Path::new),
        config,
    )
}

/// Push model/normal matrices and draw every object that has a mesh
pub(crate) fn draw_meshes(layout: &PipelineLayout, command_buffer: vk::CommandBuffer, objects: &GameObjectMap<Model>) {
    for object in objects.values() {
        let Some(model) = object.model.as_ref() else {
            continue;
        };
        let push = SimplePushConstantData::from_transform(&object.transform);
        layout.push_constants(command_buffer, MESH_PUSH_STAGES, &push);
        model.bind(command_buffer);
        model.draw(command_buffer);
    }
}
