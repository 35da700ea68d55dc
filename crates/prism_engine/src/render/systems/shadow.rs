//! Shadow mapping
//!
//! The offscreen pipeline renders scene depth from the shadow-casting light
//! into the [`ShadowMap`]; the scene pipelines then sample it in the main
//! pass. A debug pipeline can show the raw depth map instead.

use ash::{vk, Device};

use super::{build_pipeline, draw_meshes, push_range, SimplePushConstantData, MESH_PUSH_STAGES};
use crate::config::{ShaderSet, ShadowConfig};
use crate::foundation::math::{utils, Vec3};
use crate::render::camera::Camera;
use crate::render::frame_info::{FrameInfo, GlobalUbo};
use crate::render::game_object::{GameObjectId, GameObjectMap};
use crate::render::model::Model;
use crate::render::shadow_map::ShadowMap;
use crate::render::vulkan::{
    DescriptorPool, DescriptorSetLayout, DescriptorWriter, GraphicsPipeline, PipelineConfig, PipelineLayout,
    SpecializationConstants, VulkanResult,
};

/// Binding of the global uniform buffer in the scene set
pub const UBO_BINDING: u32 = 0;

/// Binding of the shadow map sampler in the scene set
pub const SHADOW_MAP_BINDING: u32 = 1;

/// Fragment specialization constant selecting PCF filtering
const ENABLE_PCF_CONSTANT_ID: u32 = 0;

const LIGHT_UP: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Descriptor sets one frame slot needs for the shadow pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowDescriptorSets {
    /// Uniform buffer only; the shadow map is being written in this pass
    pub offscreen: vk::DescriptorSet,
    pub scene: vk::DescriptorSet,
    pub debug: vk::DescriptorSet,
}

impl ShadowDescriptorSets {
    /// Allocate and write the three sets for one frame slot
    pub fn allocate(
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        ubo_info: vk::DescriptorBufferInfo,
        shadow_map: &ShadowMap,
    ) -> VulkanResult<Self> {
        let image_info = shadow_map.descriptor_image_info();

        let offscreen = DescriptorWriter::new(layout)
            .write_buffer(UBO_BINDING, ubo_info)?
            .build(pool, layout)?;
        let scene = DescriptorWriter::new(layout)
            .write_buffer(UBO_BINDING, ubo_info)?
            .write_image(SHADOW_MAP_BINDING, image_info)?
            .build(pool, layout)?;
        let debug = DescriptorWriter::new(layout)
            .write_buffer(UBO_BINDING, ubo_info)?
            .write_image(SHADOW_MAP_BINDING, shadow_map.debug_image_info())?
            .build(pool, layout)?;

        Ok(Self { offscreen, scene, debug })
    }
}

/// Write the light-space matrix and shadow clip planes into `ubo`
///
/// The lowest-id point light casts the shadow, looking at the world origin.
/// Returns its id, or `None` (leaving `ubo` unchanged) when there is no light.
pub fn update_shadow_uniforms<M>(
    objects: &GameObjectMap<M>,
    ubo: &mut GlobalUbo,
    config: &ShadowConfig,
) -> Option<GameObjectId> {
    let caster = objects
        .values()
        .filter(|object| object.is_light())
        .min_by_key(|object| object.id())?;
    let position = caster.transform.translation;

    let direction = -position;
    if direction.norm_squared() <= f32::EPSILON {
        log::warn!("[SHADOW] Shadow caster sits at the origin, keeping previous light matrix");
        return None;
    }
    // Looking straight along the up vector has no defined basis
    let up = if direction.normalize().cross(&LIGHT_UP).norm_squared() <= 1e-6 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        LIGHT_UP
    };

    let mut light_camera = Camera::new();
    light_camera.set_perspective_projection(
        utils::deg_to_rad(config.light_fov_degrees),
        1.0,
        config.z_near,
        config.z_far,
    );
    light_camera.set_view_target(position, Vec3::zeros(), up);

    ubo.light_space = light_camera.view_projection().into();
    ubo.shadow_params = [config.z_near, config.z_far, 0.0, 0.0];
    Some(caster.id())
}

/// Offscreen depth pass plus the shadow-receiving scene pipelines
pub struct ShadowRenderSystem {
    debug_pipeline: GraphicsPipeline,
    scene_pipeline: GraphicsPipeline,
    scene_pcf_pipeline: GraphicsPipeline,
    offscreen_pipeline: GraphicsPipeline,
    layout: PipelineLayout,
}

impl ShadowRenderSystem {
    /// Build all four pipelines
    ///
    /// `shadow_pass` is the depth-only pass of the shadow map, `render_pass`
    /// the swapchain pass. Both pass families use `scene_set_layout`.
    pub fn new(
        device: &Device,
        shadow_pass: vk::RenderPass,
        render_pass: vk::RenderPass,
        scene_set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderSet,
    ) -> VulkanResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[scene_set_layout],
            &[push_range::<SimplePushConstantData>(MESH_PUSH_STAGES)],
        )?;

        let main_pass = PipelineConfig::default()
            .with_render_pass(render_pass, 0)
            .with_layout(layout.handle());

        let debug_config = main_pass.clone().clear_vertex_input();
        let debug_pipeline = build_pipeline(device, &shaders.debug_quad, &debug_config)?;

        let scene_config = main_pass
            .clone()
            .with_specialization(SpecializationConstants::new().with_u32(ENABLE_PCF_CONSTANT_ID, 0));
        let scene_pipeline = build_pipeline(device, &shaders.scene_shadow, &scene_config)?;

        let pcf_config =
            main_pass.with_specialization(SpecializationConstants::new().with_u32(ENABLE_PCF_CONSTANT_ID, 1));
        let scene_pcf_pipeline = build_pipeline(device, &shaders.scene_shadow, &pcf_config)?;

        let offscreen_config = PipelineConfig::default()
            .without_color_attachments()
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .with_depth_bias()
            .with_render_pass(shadow_pass, 0)
            .with_layout(layout.handle());
        let offscreen_pipeline = build_pipeline(device, &shaders.offscreen, &offscreen_config)?;

        log::debug!("[PIPELINE] Shadow render system ready");
        Ok(Self {
            debug_pipeline,
            scene_pipeline,
            scene_pcf_pipeline,
            offscreen_pipeline,
            layout,
        })
    }

    pub fn update<M>(&self, frame_info: &FrameInfo<'_, M>, ubo: &mut GlobalUbo, config: &ShadowConfig) {
        update_shadow_uniforms(frame_info.game_objects, ubo, config);
    }

    /// Record the depth-only pass; must be called outside any render pass
    pub fn render_shadow_map(
        &self,
        frame_info: &FrameInfo<'_, Model>,
        shadow_map: &ShadowMap,
        sets: &ShadowDescriptorSets,
        config: &ShadowConfig,
    ) {
        let command_buffer = frame_info.command_buffer;
        let extent = shadow_map.extent();
        let device = self.layout.device();

        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(shadow_map.render_pass())
            .framebuffer(shadow_map.framebuffer())
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
            device.cmd_set_depth_bias(command_buffer, config.depth_bias_constant, 0.0, config.depth_bias_slope);
        }

        self.offscreen_pipeline.bind(command_buffer);
        self.layout.bind_descriptor_sets(command_buffer, &[sets.offscreen]);
        draw_meshes(&self.layout, command_buffer, frame_info.game_objects);

        unsafe {
            device.cmd_end_render_pass(command_buffer);
        }
    }

    /// Record the main-pass scene, sampling the shadow map
    ///
    /// With `display_shadow_map` set, draws the depth map full screen instead.
    pub fn render_game_objects(
        &self,
        frame_info: &FrameInfo<'_, Model>,
        sets: &ShadowDescriptorSets,
        config: &ShadowConfig,
    ) {
        let command_buffer = frame_info.command_buffer;

        if config.display_shadow_map {
            self.debug_pipeline.bind(command_buffer);
            self.layout.bind_descriptor_sets(command_buffer, &[sets.debug]);
            unsafe {
                self.layout.device().cmd_draw(command_buffer, 3, 1, 0, 0);
            }
            return;
        }

        if config.filter_pcf {
            self.scene_pcf_pipeline.bind(command_buffer);
        } else {
            self.scene_pipeline.bind(command_buffer);
        }
        self.layout.bind_descriptor_sets(command_buffer, &[sets.scene]);
        draw_meshes(&self.layout, command_buffer, frame_info.game_objects);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec4};
    use crate::render::game_object::World;
    use approx::assert_relative_eq;

    fn project(light_space: &[[f32; 4]; 4], point: Vec3) -> Vec3 {
        let m = Mat4::from(*light_space);
        let clip = m * Vec4::new(point.x, point.y, point.z, 1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn test_lowest_id_light_casts_shadow() {
        let mut world = World::<()>::new();
        let mut first = world.make_default_point_light(1.0);
        first.transform.translation = Vec3::new(-1.0, -2.0, -1.0);
        let first = world.insert(first);
        let mut second = world.make_default_point_light(1.0);
        second.transform.translation = Vec3::new(3.0, -1.0, 0.0);
        world.insert(second);

        let mut ubo = GlobalUbo::default();
        let config = ShadowConfig::default();
        assert_eq!(update_shadow_uniforms(world.objects(), &mut ubo, &config), Some(first));
        assert_eq!(ubo.shadow_params, [1.0, 8.0, 0.0, 0.0]);

        // The origin is in the centre of the light's view
        let origin = project(&ubo.light_space, Vec3::zeros());
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-5);
        assert!(origin.z > 0.0 && origin.z < 1.0);
    }

    #[test]
    fn test_no_light_leaves_ubo_untouched() {
        let mut world = World::<()>::new();
        let mesh = world.create_game_object();
        world.insert(mesh);

        let mut ubo = GlobalUbo::default();
        let before = ubo.light_space;
        assert_eq!(update_shadow_uniforms(world.objects(), &mut ubo, &ShadowConfig::default()), None);
        assert_eq!(ubo.light_space, before);
        assert_eq!(ubo.shadow_params, [0.0; 4]);
    }

    #[test]
    fn test_light_directly_above_gets_fallback_up() {
        let mut world = World::<()>::new();
        let mut light = world.make_default_point_light(1.0);
        light.transform.translation = Vec3::new(0.0, -4.0, 0.0);
        world.insert(light);

        let mut ubo = GlobalUbo::default();
        update_shadow_uniforms(world.objects(), &mut ubo, &ShadowConfig::default());
        assert!(ubo.light_space.iter().flatten().all(|v| v.is_finite()));
    }
}
