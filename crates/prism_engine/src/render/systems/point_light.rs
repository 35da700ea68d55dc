//! Point light animation and billboard rendering

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use super::{build_pipeline, push_range};
use crate::config::ShaderConfig;
use crate::foundation::math::{utils, Vec3};
use crate::render::frame_info::{check_light_count, FrameError, FrameInfo, GlobalUbo, PointLight};
use crate::render::game_object::{GameObjectId, GameObjectMap};
use crate::render::vulkan::{GraphicsPipeline, PipelineConfig, PipelineLayout, VulkanResult};

/// Axis the lights orbit around
const ORBIT_AXIS: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Vertices of one billboard quad, generated in the vertex shader
const BILLBOARD_VERTICES: u32 = 6;

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub radius: f32,
    pub _padding: [f32; 3],
}

/// Orbit every light by `frame_time` radians and copy them into the UBO
///
/// Lights are written in id order. With more than
/// [`MAX_LIGHTS`](crate::render::frame_info::MAX_LIGHTS) lights nothing is
/// moved or written.
pub fn update_lights<M>(frame_time: f32, objects: &mut GameObjectMap<M>, ubo: &mut GlobalUbo) -> Result<(), FrameError> {
    let mut ids: Vec<GameObjectId> = objects
        .values()
        .filter(|object| object.is_light())
        .map(|object| object.id())
        .collect();
    check_light_count(ids.len())?;
    ids.sort_unstable();

    let mut lights = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(object) = objects.get_mut(&id) else {
            continue;
        };
        let Some(light) = object.point_light else {
            continue;
        };
        let position = utils::rotate_about_axis(object.transform.translation, ORBIT_AXIS, frame_time);
        object.transform.translation = position;

        lights.push(PointLight {
            position: [position.x, position.y, position.z, 1.0],
            color: [object.color.x, object.color.y, object.color.z, light.light_intensity],
        });
    }

    ubo.set_point_lights(&lights)
}

/// Light ids ordered farthest-first from `camera_position`
///
/// Ties keep ascending id order.
pub fn back_to_front<M>(objects: &GameObjectMap<M>, camera_position: Vec3) -> Vec<GameObjectId> {
    let mut lights: Vec<(GameObjectId, f32)> = objects
        .values()
        .filter(|object| object.is_light())
        .map(|object| {
            let offset = camera_position - object.transform.translation;
            (object.id(), offset.norm_squared())
        })
        .collect();
    lights.sort_by_key(|(id, _)| *id);
    lights.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    lights.into_iter().map(|(id, _)| id).collect()
}

/// Renders each light as an alpha-blended camera-facing disc
pub struct PointLightSystem {
    pipeline: GraphicsPipeline,
    layout: PipelineLayout,
}

impl PointLightSystem {
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        global_set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderConfig,
    ) -> VulkanResult<Self> {
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_set_layout],
            &[push_range::<PointLightPushConstants>(PUSH_STAGES)],
        )?;

        let config = PipelineConfig::default()
            .enable_alpha_blending()
            .clear_vertex_input()
            .with_render_pass(render_pass, 0)
            .with_layout(layout.handle());
        let pipeline = build_pipeline(device, shaders, &config)?;

        log::debug!("[PIPELINE] Point light system ready");
        Ok(Self { pipeline, layout })
    }

    pub fn update<M>(&self, frame_info: &mut FrameInfo<'_, M>, ubo: &mut GlobalUbo) -> Result<(), FrameError> {
        update_lights(frame_info.frame_time, frame_info.game_objects, ubo)
    }

    pub fn render<M>(&self, frame_info: &FrameInfo<'_, M>) {
        let command_buffer = frame_info.command_buffer;
        let order = back_to_front(frame_info.game_objects, frame_info.camera.position());

        self.pipeline.bind(command_buffer);
        self.layout
            .bind_descriptor_sets(command_buffer, &[frame_info.global_descriptor_set]);

        for id in order {
            let Some(object) = frame_info.game_objects.get(&id) else {
                continue;
            };
            let Some(light) = object.point_light else {
                continue;
            };
            let t = object.transform.translation;
            let push = PointLightPushConstants {
                position: [t.x, t.y, t.z, 1.0],
                color: [object.color.x, object.color.y, object.color.z, light.light_intensity],
                radius: object.transform.scale.x,
                _padding: [0.0; 3],
            };
            self.layout.push_constants(command_buffer, PUSH_STAGES, &push);
            unsafe {
                self.layout
                    .device()
                    .cmd_draw(command_buffer, BILLBOARD_VERTICES, 1, 0, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::constants::PI;
    use crate::render::frame_info::MAX_LIGHTS;
    use crate::render::game_object::World;
    use approx::assert_relative_eq;

    fn light_at(world: &mut World<()>, position: Vec3) -> GameObjectId {
        let mut light = world.make_default_point_light(1.0);
        light.transform.translation = position;
        world.insert(light)
    }

    #[test]
    fn test_push_constants_layout() {
        assert_eq!(std::mem::size_of::<PointLightPushConstants>(), 48);
        assert_eq!(std::mem::offset_of!(PointLightPushConstants, radius), 32);
    }

    #[test]
    fn test_back_to_front_orders_farthest_first() {
        let mut world = World::<()>::new();
        let near = light_at(&mut world, Vec3::new(1.0, 0.0, 0.0));
        let far = light_at(&mut world, Vec3::new(5.0, 0.0, 0.0));
        let middle = light_at(&mut world, Vec3::new(3.0, 0.0, 0.0));
        // Meshes without lights are not part of the order
        let mesh = world.create_game_object();
        world.insert(mesh);

        assert_eq!(back_to_front(world.objects(), Vec3::zeros()), vec![far, middle, near]);
    }

    #[test]
    fn test_back_to_front_ties_keep_id_order() {
        let mut world = World::<()>::new();
        let a = light_at(&mut world, Vec3::new(0.0, 2.0, 0.0));
        let b = light_at(&mut world, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(back_to_front(world.objects(), Vec3::zeros()), vec![a, b]);
    }

    #[test]
    fn test_update_lights_rotates_and_writes_ubo() {
        let mut world = World::<()>::new();
        let mut light = world.make_point_light(0.2, 0.1, Vec3::new(1.0, 0.1, 0.1));
        light.transform.translation = Vec3::new(1.0, 0.0, 0.0);
        let id = world.insert(light);

        let mut ubo = GlobalUbo::default();
        update_lights(PI / 2.0, world.objects_mut(), &mut ubo).expect("one light fits");

        let moved = world.get(id).expect("light exists").transform.translation;
        assert_relative_eq!(moved, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
        assert_eq!(ubo.num_lights, 1);
        assert_relative_eq!(ubo.point_lights[0].position[2], 1.0, epsilon = 1e-6);
        assert_eq!(ubo.point_lights[0].position[3], 1.0);
        assert_eq!(ubo.point_lights[0].color, [1.0, 0.1, 0.1, 0.2]);
    }

    #[test]
    fn test_update_lights_rejects_overflow_without_moving() {
        let mut world = World::<()>::new();
        for i in 0..=MAX_LIGHTS {
            light_at(&mut world, Vec3::new(i as f32 + 1.0, 0.0, 0.0));
        }
        let before: Vec<Vec3> = {
            let mut ids: Vec<_> = world.objects().keys().copied().collect();
            ids.sort_unstable();
            ids.iter().filter_map(|id| world.get(*id)).map(|o| o.transform.translation).collect()
        };

        let mut ubo = GlobalUbo::default();
        let result = update_lights(0.5, world.objects_mut(), &mut ubo);
        assert_eq!(
            result,
            Err(FrameError::TooManyLights {
                count: MAX_LIGHTS + 1,
                max: MAX_LIGHTS
            })
        );
        assert_eq!(ubo.num_lights, 0);

        let mut ids: Vec<_> = world.objects().keys().copied().collect();
        ids.sort_unstable();
        let after: Vec<Vec3> = ids.iter().filter_map(|id| world.get(*id)).map(|o| o.transform.translation).collect();
        assert_eq!(before, after);
    }
}
