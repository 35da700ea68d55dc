//! Demo application: window, GPU objects and the frame loop

use ash::vk;
use std::rc::Rc;
use std::time::Instant;
use thiserror::Error;

use prism_engine::config::{ConfigError, ShadowConfig};
use prism_engine::foundation::math::{utils, Vec3};
use prism_engine::render::vulkan::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
    UniformBuffer, VulkanContext, VulkanError, Window, WindowError, MAX_FRAMES_IN_FLIGHT,
};
use prism_engine::render::{
    Camera, FrameError, FrameInfo, GlobalUbo, Model, ModelError, PointLightSystem, Renderer, ShadowDescriptorSets,
    ShadowMap, ShadowRenderSystem, SimpleRenderSystem, TransformComponent, World,
};

use crate::config::AppConfig;
use crate::scene;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Everything the shadow path needs, present only when shadows are enabled
struct ShadowResources {
    system: ShadowRenderSystem,
    sets: Vec<ShadowDescriptorSets>,
    _layout: DescriptorSetLayout,
    map: ShadowMap,
}

// Fields drop top to bottom; the renderer waits for the device to go idle
// before anything else is destroyed, the window outlives the surface
pub struct VaseApp {
    renderer: Renderer,
    shadow: Option<ShadowResources>,
    point_light_system: PointLightSystem,
    simple_system: SimpleRenderSystem,
    global_sets: Vec<vk::DescriptorSet>,
    _descriptor_pool: DescriptorPool,
    _global_layout: DescriptorSetLayout,
    ubo_buffers: Vec<UniformBuffer<GlobalUbo>>,
    ubo: GlobalUbo,
    world: World<Model>,
    context: Rc<VulkanContext>,
    window: Window,
    camera: Camera,
    viewer: TransformComponent,
    config: AppConfig,
}

impl VaseApp {
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let renderer_config = &config.renderer;

        let mut window = Window::from_config(&renderer_config.window)?;
        let context = Rc::new(VulkanContext::new(
            &mut window,
            &renderer_config.application_name,
            renderer_config.validation_enabled(),
        )?);
        let renderer = Renderer::new(Rc::clone(&context), &mut window)?;
        let device = context.device();

        let descriptor_pool = DescriptorPoolBuilder::new()
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32 * 4)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, MAX_FRAMES_IN_FLIGHT as u32 * 4)
            .add_pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, MAX_FRAMES_IN_FLIGHT as u32 * 2)
            .build(device)?;

        let global_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
            .build(device)?;

        let ubo_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| UniformBuffer::<GlobalUbo>::new(&context))
            .collect::<Result<Vec<_>, _>>()?;

        let global_sets = ubo_buffers
            .iter()
            .map(|buffer| {
                DescriptorWriter::new(&global_layout)
                    .write_buffer(0, buffer.descriptor_info())?
                    .build(&descriptor_pool, &global_layout)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let render_pass = renderer.swapchain_render_pass();
        let shaders = &renderer_config.shaders;
        let simple_system = SimpleRenderSystem::new(device, render_pass, global_layout.handle(), &shaders.simple)?;
        let point_light_system =
            PointLightSystem::new(device, render_pass, global_layout.handle(), &shaders.point_light)?;

        let shadow = if renderer_config.shadow.enabled {
            Some(create_shadow_resources(
                &context,
                &descriptor_pool,
                &ubo_buffers,
                render_pass,
                &config,
            )?)
        } else {
            log::info!("[SHADOW] Shadows disabled");
            None
        };

        let mut world = World::new();
        scene::populate(&mut world, &config.models, |path| Model::from_file(&context, path))?;

        let viewer = TransformComponent {
            translation: Vec3::new(0.0, 0.0, config.camera.start_z),
            ..TransformComponent::default()
        };

        Ok(Self {
            renderer,
            shadow,
            point_light_system,
            simple_system,
            global_sets,
            _descriptor_pool: descriptor_pool,
            _global_layout: global_layout,
            ubo_buffers,
            ubo: GlobalUbo::default(),
            world,
            context,
            window,
            camera: Camera::new(),
            viewer,
            config,
        })
    }

    pub fn run(&mut self) -> Result<(), AppError> {
        log::info!("Starting vase demo");
        let mut last_frame = Instant::now();

        while !self.window.should_close() {
            self.window.poll_events();

            let now = Instant::now();
            let frame_time = now.duration_since(last_frame).as_secs_f32();
            last_frame = now;

            let camera_config = &self.config.camera;
            self.camera.set_view_yxz(self.viewer.translation, self.viewer.rotation);
            self.camera.set_perspective_projection(
                utils::deg_to_rad(camera_config.fov_y_degrees),
                self.renderer.aspect_ratio(),
                camera_config.near,
                camera_config.far,
            );

            let Some(command_buffer) = self.renderer.begin_frame(&mut self.window)? else {
                continue;
            };
            self.record_frame(command_buffer, frame_time)?;
            self.renderer.end_frame(&mut self.window)?;
        }

        self.context.wait_idle()?;
        log::info!("Vase demo finished");
        Ok(())
    }

    fn record_frame(&mut self, command_buffer: vk::CommandBuffer, frame_time: f32) -> Result<(), AppError> {
        let frame_index = self.renderer.frame_index();
        let shadow_config: &ShadowConfig = &self.config.renderer.shadow;

        let mut frame_info = FrameInfo {
            frame_index,
            frame_time,
            command_buffer,
            camera: &self.camera,
            global_descriptor_set: self.global_sets[frame_index],
            game_objects: self.world.objects_mut(),
        };

        self.ubo.set_camera(&self.camera);
        self.point_light_system.update(&mut frame_info, &mut self.ubo)?;
        if let Some(shadow) = &self.shadow {
            shadow.system.update(&frame_info, &mut self.ubo, shadow_config);
        }
        let ubo_buffer = &mut self.ubo_buffers[frame_index];
        ubo_buffer.write(&self.ubo)?;
        ubo_buffer.flush()?;

        if let Some(shadow) = &self.shadow {
            shadow
                .system
                .render_shadow_map(&frame_info, &shadow.map, &shadow.sets[frame_index], shadow_config);
        }

        self.renderer.begin_swapchain_render_pass(command_buffer)?;
        match &self.shadow {
            Some(shadow) => shadow
                .system
                .render_game_objects(&frame_info, &shadow.sets[frame_index], shadow_config),
            None => self.simple_system.render_game_objects(&frame_info),
        }
        self.point_light_system.render(&frame_info);
        self.renderer.end_swapchain_render_pass(command_buffer)?;
        Ok(())
    }
}

fn create_shadow_resources(
    context: &VulkanContext,
    pool: &DescriptorPool,
    ubo_buffers: &[UniformBuffer<GlobalUbo>],
    render_pass: vk::RenderPass,
    config: &AppConfig,
) -> Result<ShadowResources, AppError> {
    let device = context.device();
    let shadow_config = &config.renderer.shadow;

    let map = ShadowMap::new(context, shadow_config)?;
    let layout = DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
        .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
        .build(device)?;

    let sets = ubo_buffers
        .iter()
        .map(|buffer| ShadowDescriptorSets::allocate(pool, &layout, buffer.descriptor_info(), &map))
        .collect::<Result<Vec<_>, _>>()?;

    let system = ShadowRenderSystem::new(
        device,
        map.render_pass(),
        render_pass,
        layout.handle(),
        &config.renderer.shaders,
    )?;

    log::info!(
        "[SHADOW] Shadows enabled (pcf: {}, debug view: {})",
        shadow_config.filter_pcf,
        shadow_config.display_shadow_map
    );
    Ok(ShadowResources {
        system,
        sets,
        _layout: layout,
        map,
    })
}
