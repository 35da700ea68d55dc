//! Per-frame data shared by the render systems

use ash::vk;
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::foundation::math::Mat4;
use crate::render::camera::Camera;
use crate::render::game_object::GameObjectMap;
use crate::render::model::Model;

/// Capacity of the uniform buffer's light array
pub const MAX_LIGHTS: usize = 10;

/// Errors raised while preparing a frame's uniform data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Too many point lights: {count} exceeds capacity {max}")]
    TooManyLights { count: usize, max: usize },
}

/// Point light as laid out in the uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// xyz world position, w ignored
    pub position: [f32; 4],
    /// rgb colour, w intensity
    pub color: [f32; 4],
}

/// Global uniform block, std140-compatible
///
/// Must match `GlobalUbo` in the shaders field for field.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    /// Light projection * light view for shadow lookups
    pub light_space: [[f32; 4]; 4],
    /// rgb colour, w intensity
    pub ambient_light_color: [f32; 4],
    /// x near plane, y far plane of the shadow projection
    pub shadow_params: [f32; 4],
    pub point_lights: [PointLight; MAX_LIGHTS],
    pub num_lights: i32,
    pub _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        let identity: [[f32; 4]; 4] = Mat4::identity().into();
        Self {
            projection: identity,
            view: identity,
            inverse_view: identity,
            light_space: identity,
            ambient_light_color: [1.0, 1.0, 1.0, 0.02],
            shadow_params: [0.0; 4],
            point_lights: [PointLight::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Copy the camera matrices
    pub fn set_camera(&mut self, camera: &Camera) {
        self.projection = (*camera.projection()).into();
        self.view = (*camera.view()).into();
        self.inverse_view = (*camera.inverse_view()).into();
    }

    /// Replace the light array; more than [`MAX_LIGHTS`] is rejected and
    /// leaves the block untouched
    pub fn set_point_lights(&mut self, lights: &[PointLight]) -> Result<(), FrameError> {
        check_light_count(lights.len())?;
        self.point_lights = [PointLight::default(); MAX_LIGHTS];
        self.point_lights[..lights.len()].copy_from_slice(lights);
        self.num_lights = lights.len() as i32;
        Ok(())
    }

    pub fn active_lights(&self) -> &[PointLight] {
        let count = (self.num_lights.max(0) as usize).min(MAX_LIGHTS);
        &self.point_lights[..count]
    }
}

pub(crate) fn check_light_count(count: usize) -> Result<(), FrameError> {
    if count > MAX_LIGHTS {
        return Err(FrameError::TooManyLights { count, max: MAX_LIGHTS });
    }
    Ok(())
}

/// Everything a system needs to record one frame
pub struct FrameInfo<'a, M = Model> {
    pub frame_index: usize,
    /// Seconds since the previous frame
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: vk::DescriptorSet,
    pub game_objects: &'a mut GameObjectMap<M>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(x: f32) -> PointLight {
        PointLight {
            position: [x, 0.0, 0.0, 1.0],
            color: [1.0, 1.0, 1.0, 0.2],
        }
    }

    #[test]
    fn test_global_ubo_std140_layout() {
        assert_eq!(std::mem::size_of::<PointLight>(), 32);
        assert_eq!(std::mem::offset_of!(GlobalUbo, ambient_light_color), 256);
        assert_eq!(std::mem::offset_of!(GlobalUbo, shadow_params), 272);
        assert_eq!(std::mem::offset_of!(GlobalUbo, point_lights), 288);
        assert_eq!(std::mem::offset_of!(GlobalUbo, num_lights), 288 + 32 * MAX_LIGHTS);
        assert_eq!(std::mem::size_of::<GlobalUbo>() % 16, 0);
    }

    #[test]
    fn test_default_ambient() {
        let ubo = GlobalUbo::default();
        assert_eq!(ubo.ambient_light_color, [1.0, 1.0, 1.0, 0.02]);
        assert_eq!(ubo.num_lights, 0);
        assert!(ubo.active_lights().is_empty());
    }

    #[test]
    fn test_set_point_lights_up_to_capacity() {
        let mut ubo = GlobalUbo::default();
        let lights: Vec<PointLight> = (0..MAX_LIGHTS).map(|i| light(i as f32)).collect();
        assert!(ubo.set_point_lights(&lights).is_ok());
        assert_eq!(ubo.num_lights, MAX_LIGHTS as i32);
        assert_eq!(ubo.active_lights(), lights.as_slice());
    }

    #[test]
    fn test_too_many_lights_is_rejected_without_truncation() {
        let mut ubo = GlobalUbo::default();
        ubo.set_point_lights(&[light(7.0)]).expect("one light fits");

        let lights: Vec<PointLight> = (0..=MAX_LIGHTS).map(|i| light(i as f32)).collect();
        assert_eq!(
            ubo.set_point_lights(&lights),
            Err(FrameError::TooManyLights {
                count: MAX_LIGHTS + 1,
                max: MAX_LIGHTS
            })
        );
        assert_eq!(ubo.num_lights, 1);
        assert_eq!(ubo.point_lights[0], light(7.0));
    }
}
