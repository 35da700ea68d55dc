//! Rendering system
//!
//! Vulkan plumbing lives in [`vulkan`]; everything above it (camera, scene
//! objects, frame orchestration and the render systems) is built on those
//! wrappers.

pub mod camera;
pub mod frame_info;
pub mod game_object;
pub mod model;
pub mod renderer;
pub mod shadow_map;
pub mod systems;
pub mod vulkan;

pub use camera::Camera;
pub use frame_info::{FrameError, FrameInfo, GlobalUbo, PointLight, MAX_LIGHTS};
pub use game_object::{
    GameObject, GameObjectId, GameObjectMap, PointLightComponent, Transform2dComponent, TransformComponent, World,
};
pub use model::{Builder, Model, ModelError, Vertex};
pub use renderer::{FrameCounter, FrameState, Renderer};
pub use shadow_map::ShadowMap;
pub use systems::{PointLightSystem, ShadowDescriptorSets, ShadowRenderSystem, SimpleRenderSystem};
