//! Offscreen depth target rendered from the light's point of view

use ash::vk;

use crate::config::ShadowConfig;
use crate::render::vulkan::{Framebuffer, Image, ImageDesc, RenderPass, Sampler, VulkanContext, VulkanResult};

/// Depth format of the shadow map
pub const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Layout the depth image is left in after the shadow pass
pub const SHADOW_MAP_READ_LAYOUT: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;

/// Comparison sampler for the scene pass
///
/// A lookup returns 1.0 where the fragment's light-space depth is less than
/// or equal to the stored depth, filtered across the neighbouring texels.
pub fn shadow_sampler_info() -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo {
        compare_enable: vk::TRUE,
        compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..depth_sampler_info()
    }
}

/// Plain depth reads for the shadow map debug view
pub fn debug_sampler_info() -> vk::SamplerCreateInfo {
    depth_sampler_info()
}

fn depth_sampler_info() -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .mip_lod_bias(0.0)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(1.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .build()
}

/// Square depth image with its own depth-only pass and framebuffer
pub struct ShadowMap {
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    sampler: Sampler,
    debug_sampler: Sampler,
    image: Image,
    extent: vk::Extent2D,
}

impl ShadowMap {
    pub fn new(context: &VulkanContext, config: &ShadowConfig) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: config.resolution,
            height: config.resolution,
        };
        let device = context.device().clone();

        let image = Image::new(context, ImageDesc::sampled_depth(extent, SHADOW_MAP_FORMAT))?;
        let sampler = Sampler::new(device.clone(), &shadow_sampler_info())?;
        let debug_sampler = Sampler::new(device.clone(), &debug_sampler_info())?;
        let render_pass = RenderPass::new_depth_only(device.clone(), SHADOW_MAP_FORMAT)?;
        let framebuffer = Framebuffer::new(device, render_pass.handle(), &[image.view()], extent)?;

        log::info!(
            "[SHADOW] Created {}x{} shadow map ({:?})",
            extent.width,
            extent.height,
            SHADOW_MAP_FORMAT
        );

        Ok(Self {
            framebuffer,
            render_pass,
            sampler,
            debug_sampler,
            image,
            extent,
        })
    }

    /// Binding info for the scene pass's combined image sampler
    pub fn descriptor_image_info(&self) -> vk::DescriptorImageInfo {
        self.image_info(&self.sampler)
    }

    /// Same image behind the non-comparison sampler
    pub fn debug_image_info(&self) -> vk::DescriptorImageInfo {
        self.image_info(&self.debug_sampler)
    }

    fn image_info(&self, sampler: &Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: sampler.handle(),
            image_view: self.image.view(),
            image_layout: SHADOW_MAP_READ_LAYOUT,
        }
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_sampler_compares_less_or_equal() {
        let info = shadow_sampler_info();
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.s_type, vk::StructureType::SAMPLER_CREATE_INFO);
    }

    #[test]
    fn test_debug_sampler_reads_raw_depth() {
        let info = debug_sampler_info();
        assert_eq!(info.compare_enable, vk::FALSE);
        assert_eq!(info.min_filter, shadow_sampler_info().min_filter);
    }
}
