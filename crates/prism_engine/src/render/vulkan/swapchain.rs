//! Swapchain management
//!
//! A [`SwapchainManager`] is one generation of presentable images together
//! with everything sized to them: depth images, the forward render pass,
//! framebuffers, and the per-frame-slot synchronization objects. Resizes
//! replace the whole generation through [`SwapchainManager::recreate`],
//! which consumes the previous one.
//!
//! Stale-surface conditions are reported as [`AcquireStatus`] and
//! [`PresentStatus`] values rather than errors.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::framebuffer::Framebuffer;
use super::image::{Image, ImageDesc};
use super::render_pass::RenderPass;
use super::sync::FrameSync;
use super::{VulkanContext, VulkanError, VulkanResult};

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Outcome of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Ready(u32),
    /// Usable, but the surface no longer matches exactly
    Suboptimal(u32),
    /// The swapchain must be recreated before rendering
    OutOfDate,
}

/// Outcome of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Which frame slot last submitted work rendering to each swapchain image
///
/// Starts empty and is filled as images are first used. Before submitting to
/// an image the previous owner's fence has to be waited on, since the image
/// count and the frame slot count are independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesInFlight {
    owners: Vec<Option<usize>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Record `frame` as the owner of `image`, returning the previous owner
    pub fn claim(&mut self, image: usize, frame: usize) -> Option<usize> {
        self.owners.get_mut(image).and_then(|owner| owner.replace(frame))
    }

    pub fn owner(&self, image: usize) -> Option<usize> {
        self.owners.get(image).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Something that reports a drawable extent and can block for window events
pub trait ExtentSource {
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Block until at least one event is processed
    fn wait_events(&mut self);
}

/// Block until both framebuffer dimensions are positive (e.g. the window is
/// no longer minimized) and return that extent
pub fn wait_for_nonzero_extent<S: ExtentSource + ?Sized>(source: &mut S) -> vk::Extent2D {
    let mut extent = source.framebuffer_extent();
    if extent.width == 0 || extent.height == 0 {
        log::debug!("[SWAPCHAIN] Zero-sized framebuffer, waiting for events");
    }
    while extent.width == 0 || extent.height == 0 {
        source.wait_events();
        extent = source.framebuffer_extent();
    }
    extent
}

/// B8G8R8A8_SRGB with SRGB_NONLINEAR when available, else the first format
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| available.first())
        .copied()
}

/// MAILBOX when available; FIFO is always supported
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-mandated extent, or the window extent clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum, capped by the maximum (zero means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// One swapchain generation and its dependent resources
pub struct SwapchainManager {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<Image>,
    render_pass: RenderPass,
    framebuffers: Vec<Framebuffer>,
    frame_sync: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    image_format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
}

impl SwapchainManager {
    /// Create the first generation for `window_extent`
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        Self::create(context, window_extent, vk::SwapchainKHR::null())
    }

    /// Build a new generation, handing `previous` to the driver as the old
    /// swapchain
    ///
    /// `previous` is destroyed once the new swapchain exists. Pipelines are
    /// compiled against the render pass formats, so a change of colour or
    /// depth format is an error.
    pub fn recreate(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        previous: SwapchainManager,
    ) -> VulkanResult<Self> {
        let next = Self::create(context, window_extent, previous.swapchain)?;
        if !previous.compare_swap_formats(&next) {
            log::error!(
                "[SWAPCHAIN] Format changed on recreation: {:?}/{:?} -> {:?}/{:?}",
                previous.image_format,
                previous.depth_format,
                next.image_format,
                next.depth_format
            );
            return Err(VulkanError::IncompatibleSwapchainFormat);
        }
        drop(previous);
        Ok(next)
    }

    fn create(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();
        let loader = context.swapchain_loader().clone();
        let support = context.swapchain_support()?;

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_extent);
        let min_image_count = choose_image_count(&support.capabilities);

        let physical = context.physical_device();
        let queue_family_indices = [physical.graphics_family, physical.present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if physical.graphics_family != physical.present_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let depth_format = context.find_depth_format()?;
        let render_pass = RenderPass::new_forward(device.clone(), surface_format.format, depth_format)?;

        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };

        // From here on a partially built manager cleans itself up on error
        let mut manager = Self {
            device: device.clone(),
            loader,
            swapchain,
            graphics_queue: context.graphics_queue(),
            present_queue: context.present_queue(),
            images: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            render_pass,
            framebuffers: Vec::new(),
            frame_sync: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            images_in_flight: ImagesInFlight::new(0),
            image_format: surface_format.format,
            depth_format,
            extent,
        };

        manager.images = unsafe {
            manager
                .loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for &image in &manager.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_info, None).map_err(VulkanError::Api)? };
            manager.image_views.push(view);
        }

        for index in 0..manager.images.len() {
            let depth = Image::new(context, ImageDesc::depth_attachment(extent, depth_format))?;
            let attachments = [manager.image_views[index], depth.view()];
            manager.depth_images.push(depth);
            manager.framebuffers.push(Framebuffer::new(
                device.clone(),
                manager.render_pass.handle(),
                &attachments,
                extent,
            )?);
        }

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            manager.frame_sync.push(FrameSync::new(device.clone())?);
        }
        manager.images_in_flight = ImagesInFlight::new(manager.images.len());

        log::info!(
            "[SWAPCHAIN] Created {} image(s) {}x{} format {:?} depth {:?} present {:?}",
            manager.images.len(),
            extent.width,
            extent.height,
            surface_format.format,
            depth_format,
            present_mode
        );

        Ok(manager)
    }

    /// Wait for the slot's previous submission and acquire the next image
    pub fn acquire_next_image(&self, frame: usize) -> VulkanResult<AcquireStatus> {
        let sync = self.frame_sync(frame)?;
        sync.in_flight.wait(u64::MAX)?;

        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(AcquireStatus::Ready(index)),
            Ok((index, true)) => Ok(AcquireStatus::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Submit `command_buffer` for `image_index` from frame slot `frame`, then present
    pub fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        frame: usize,
    ) -> VulkanResult<PresentStatus> {
        let image = image_index as usize;
        if image >= self.images.len() {
            return Err(VulkanError::invalid(format!("Image index {} out of range", image_index)));
        }
        self.frame_sync(frame)?;

        if let Some(previous_frame) = self.images_in_flight.claim(image, frame) {
            self.frame_sync[previous_frame].in_flight.wait(u64::MAX)?;
        }

        let sync = &self.frame_sync[frame];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn frame_sync(&self, frame: usize) -> VulkanResult<&FrameSync> {
        self.frame_sync
            .get(frame)
            .ok_or_else(|| VulkanError::invalid(format!("Frame slot {} out of range", frame)))
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(Framebuffer::handle)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// True when both generations share colour and depth formats
    pub fn compare_swap_formats(&self, other: &SwapchainManager) -> bool {
        self.image_format == other.image_format && self.depth_format == other.depth_format
    }

    pub fn images_in_flight(&self) -> &ImagesInFlight {
        &self.images_in_flight
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.framebuffers.clear();
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
        }
        self.depth_images.clear();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("[SWAPCHAIN] Destroyed generation with {} image(s)", self.images.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedWindow {
        extents: VecDeque<vk::Extent2D>,
        current: vk::Extent2D,
        waits: usize,
    }

    impl ScriptedWindow {
        fn new(sequence: &[(u32, u32)]) -> Self {
            let mut extents: VecDeque<vk::Extent2D> = sequence
                .iter()
                .map(|&(width, height)| vk::Extent2D { width, height })
                .collect();
            let current = extents.pop_front().unwrap_or_default();
            Self {
                extents,
                current,
                waits: 0,
            }
        }
    }

    impl ExtentSource for ScriptedWindow {
        fn framebuffer_extent(&self) -> vk::Extent2D {
            self.current
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if let Some(next) = self.extents.pop_front() {
                self.current = next;
            }
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_extent_blocks_until_both_dimensions_positive() {
        let mut window = ScriptedWindow::new(&[(0, 0), (800, 0), (0, 600), (800, 600)]);
        let extent = wait_for_nonzero_extent(&mut window);
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn test_nonzero_extent_returns_immediately() {
        let mut window = ScriptedWindow::new(&[(1024, 768)]);
        let extent = wait_for_nonzero_extent(&mut window);
        assert_eq!(extent.width, 1024);
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn test_images_in_flight_starts_empty_and_tracks_owner() {
        let mut table = ImagesInFlight::new(3);
        assert_eq!(table.len(), 3);
        assert!((0..3).all(|image| table.owner(image).is_none()));

        assert_eq!(table.claim(0, 0), None);
        assert_eq!(table.claim(1, 1), None);
        assert_eq!(table.claim(0, 1), Some(0));
        assert_eq!(table.owner(0), Some(1));
        assert_eq!(table.claim(5, 0), None);
    }

    #[test]
    fn test_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).map(|f| f.format), Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(
            choose_surface_format(&formats[..1]).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_prefers_mailbox() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_clamped_when_surface_defers_to_window() {
        let caps = capabilities(2, 3);
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 10_000,
                height: 600,
            },
        );
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 600 });

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 640, height: 480 },
            ..caps
        };
        assert_eq!(
            choose_extent(&fixed, vk::Extent2D { width: 1, height: 1 }),
            vk::Extent2D { width: 640, height: 480 }
        );
    }

    #[test]
    fn test_image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
        assert_eq!(choose_image_count(&capabilities(3, 0)), 4);
    }

    #[test]
    fn test_present_status_recreation() {
        assert!(!PresentStatus::Presented.needs_recreation());
        assert!(PresentStatus::Suboptimal.needs_recreation());
        assert!(PresentStatus::OutOfDate.needs_recreation());
    }
}
