//! # Prism Engine
//!
//! An explicit-control Vulkan renderer: device and swapchain management,
//! frames in flight, lit meshes, camera-facing point lights and a
//! single-light shadow map.
//!
//! ## Frame flow
//!
//! ```rust,no_run
//! use prism_engine::prelude::*;
//!
//! fn draw(renderer: &mut Renderer, window: &mut Window) -> Result<(), VulkanError> {
//!     if let Some(command_buffer) = renderer.begin_frame(window)? {
//!         renderer.begin_swapchain_render_pass(command_buffer)?;
//!         // render systems record here
//!         renderer.end_swapchain_render_pass(command_buffer)?;
//!         renderer.end_frame(window)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig, ShaderConfig, ShaderSet, ShadowConfig, WindowConfig},
        foundation::math::{Mat3, Mat4, Vec3, Vec4},
        render::{
            vulkan::{VulkanContext, VulkanError, VulkanResult, Window, MAX_FRAMES_IN_FLIGHT},
            Camera, FrameInfo, GameObject, GameObjectId, GlobalUbo, Model, PointLightSystem, Renderer,
            ShadowDescriptorSets, ShadowMap, ShadowRenderSystem, SimpleRenderSystem, World, MAX_LIGHTS,
        },
    };
}
