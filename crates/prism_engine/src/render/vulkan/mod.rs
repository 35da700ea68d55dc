//! Vulkan rendering backend
//!
//! RAII wrappers over the raw ash handles. Every wrapper holds a clone of the
//! `ash::Device` it was created from and destroys its handle on drop, so the
//! owning [`VulkanContext`] must outlive all of them.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptors;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use buffer::{Buffer, UniformBuffer};
pub use commands::CommandPool;
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, SwapchainSupport, VulkanContext, VulkanError, VulkanInstance,
    VulkanResult,
};
pub use descriptors::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
};
pub use framebuffer::Framebuffer;
pub use image::{Image, ImageDesc, Sampler};
pub use pipeline::{GraphicsPipeline, PipelineConfig, PipelineLayout, SpecializationConstants};
pub use render_pass::RenderPass;
pub use shader::ShaderModule;
pub use swapchain::{
    wait_for_nonzero_extent, AcquireStatus, ExtentSource, ImagesInFlight, PresentStatus, SwapchainManager,
    MAX_FRAMES_IN_FLIGHT,
};
pub use sync::{Fence, FrameSync, Semaphore};
pub use window::{Window, WindowError};
