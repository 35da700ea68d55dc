//! # Renderer Configuration
//!
//! Window, shader and shadow settings for the Vulkan renderer. Every section
//! carries defaults matching the demo scene, `with_*` builder methods and a
//! `validate()` check that runs before any GPU object is created.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Config;

/// Directories searched, in order, when resolving compiled shader names
const SHADER_DIRS: [&str; 5] = [
    "target/shaders/",
    "shaders/",
    "resources/shaders/",
    "../target/shaders/",
    "./",
];

fn resolve_shader(name: &str) -> String {
    SHADER_DIRS
        .iter()
        .map(|dir| format!("{}{}", dir, name))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("target/shaders/{}", name))
}

/// # Shader Configuration
///
/// Paths of one shader program. The fragment stage is optional so that
/// depth-only programs (the offscreen shadow pass) can be described too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_shader_path: Option<String>,
}

impl ShaderConfig {
    /// Create a new shader configuration from explicit paths
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: Some(fragment_path.into()),
        }
    }

    /// Vertex-only program
    pub fn vertex_only(vertex_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: None,
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the common output locations so the demo runs from either the
    /// workspace root or a crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: Option<&str>) -> Self {
        Self {
            vertex_shader_path: resolve_shader(base_vertex),
            fragment_shader_path: base_fragment.map(resolve_shader),
        }
    }

    /// Validate that shader files exist
    pub fn validate_files(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if let Some(fragment) = &self.fragment_shader_path {
            if !Path::new(fragment).exists() {
                return Err(format!("Fragment shader not found: {}", fragment));
            }
        }
        Ok(())
    }
}

/// Every shader program the render systems load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSet {
    /// Lit mesh program used by the simple render system
    pub simple: ShaderConfig,
    /// Billboard program used by the point light system
    pub point_light: ShaderConfig,
    /// Main-pass program that samples the shadow map
    pub scene_shadow: ShaderConfig,
    /// Depth-only program rendered from the light
    pub offscreen: ShaderConfig,
    /// Full-screen triangle that shows the raw shadow map
    pub debug_quad: ShaderConfig,
}

impl ShaderSet {
    /// Check that every referenced SPIR-V file exists
    pub fn validate_files(&self) -> Result<(), String> {
        self.simple.validate_files()?;
        self.point_light.validate_files()?;
        self.scene_shadow.validate_files()?;
        self.offscreen.validate_files()?;
        self.debug_quad.validate_files()
    }
}

impl Default for ShaderSet {
    fn default() -> Self {
        Self {
            simple: ShaderConfig::with_path_resolution("shader.vert.spv", Some("shader.frag.spv")),
            point_light: ShaderConfig::with_path_resolution(
                "point_light.vert.spv",
                Some("point_light.frag.spv"),
            ),
            scene_shadow: ShaderConfig::with_path_resolution("scene.vert.spv", Some("scene.frag.spv")),
            offscreen: ShaderConfig::with_path_resolution("offscreen.vert.spv", None),
            debug_quad: ShaderConfig::with_path_resolution("quad.vert.spv", Some("quad.frag.spv")),
        }
    }
}

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Prism Engine".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Shadow mapping policy
///
/// Keep `z_near`/`z_far` as tight as the scene allows; the 16-bit depth
/// target has little precision to spare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Whether the offscreen depth pass runs at all
    pub enabled: bool,
    /// Edge length of the square shadow map in texels
    pub resolution: u32,
    /// Near clip plane of the light projection
    pub z_near: f32,
    /// Far clip plane of the light projection
    pub z_far: f32,
    /// Constant depth bias factor, always applied
    pub depth_bias_constant: f32,
    /// Slope-scaled depth bias factor
    pub depth_bias_slope: f32,
    /// Vertical field of view of the light projection, in degrees
    pub light_fov_degrees: f32,
    /// Use the percentage-closer filtering pipeline variant
    pub filter_pcf: bool,
    /// Show the raw depth map instead of the shaded scene
    pub display_shadow_map: bool,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 2048,
            z_near: 1.0,
            z_far: 8.0,
            depth_bias_constant: 1.25,
            depth_bias_slope: 1.75,
            light_fov_degrees: 50.0,
            filter_pcf: true,
            display_shadow_map: false,
        }
    }
}

impl ShadowConfig {
    /// Enable or disable the shadow pass
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the shadow map resolution
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set both depth bias factors
    pub fn with_depth_bias(mut self, constant: f32, slope: f32) -> Self {
        self.depth_bias_constant = constant;
        self.depth_bias_slope = slope;
        self
    }

    /// Toggle the debug view of the depth map
    pub fn with_debug_view(mut self, display: bool) -> Self {
        self.display_shadow_map = display;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution == 0 || !self.resolution.is_power_of_two() {
            return Err(format!("Shadow map resolution must be a power of two, got {}", self.resolution));
        }
        if self.z_near <= 0.0 || self.z_far <= self.z_near {
            return Err(format!(
                "Shadow clip planes must satisfy 0 < near < far, got near={} far={}",
                self.z_near, self.z_far
            ));
        }
        if !(1.0..180.0).contains(&self.light_fov_degrees) {
            return Err(format!("Light field of view out of range: {}", self.light_fov_degrees));
        }
        Ok(())
    }
}

/// # Renderer Configuration
///
/// Top-level settings consumed by the context, window and render systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Default log filter (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_validation: Option<bool>,
    /// Window settings
    pub window: WindowConfig,
    /// Shader programs
    pub shaders: ShaderSet,
    /// Shadow mapping policy
    pub shadow: ShadowConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            log_level: "info".to_string(),
            enable_validation: None,
            window: WindowConfig::default(),
            shaders: ShaderSet::default(),
            shadow: ShadowConfig::default(),
        }
    }

    /// Set the window settings
    pub fn with_window(mut self, title: impl Into<String>, width: u32, height: u32) -> Self {
        self.window = WindowConfig {
            title: title.into(),
            width,
            height,
        };
        self
    }

    /// Set custom shader programs
    pub fn with_shaders(mut self, shaders: ShaderSet) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set the shadow policy
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Effective validation setting
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err("Window dimensions must be non-zero".to_string());
        }
        self.shadow.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Prism Engine Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("prism_engine_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_default_renderer_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shadow_defaults() {
        let shadow = ShadowConfig::default();
        assert_eq!(shadow.resolution, 2048);
        assert_eq!(shadow.z_near, 1.0);
        assert_eq!(shadow.z_far, 8.0);
        assert_eq!(shadow.depth_bias_constant, 1.25);
        assert_eq!(shadow.depth_bias_slope, 1.75);
        assert!(shadow.filter_pcf);
        assert!(!shadow.display_shadow_map);
    }

    #[test]
    fn test_shadow_validation_rejects_bad_planes() {
        let mut shadow = ShadowConfig::default();
        shadow.z_far = 0.5;
        assert!(shadow.validate().is_err());

        let shadow = ShadowConfig::default().with_resolution(1000);
        assert!(shadow.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RendererConfig::default().with_window("x", 0, 600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vertex_only_program_skips_fragment_check() {
        let shader = ShaderConfig::vertex_only("definitely/missing.vert.spv");
        assert!(shader.fragment_shader_path.is_none());
        assert!(shader.validate_files().unwrap_err().contains("Vertex shader not found"));
    }

    #[test]
    fn test_toml_round_trip() {
        let path = temp_path("renderer.toml");
        let path_str = path.to_string_lossy().to_string();
        let config = RendererConfig::new("round trip")
            .with_shadow(ShadowConfig::default().with_debug_view(true))
            .with_validation(false);

        config.save_to_file(&path_str).unwrap();
        let loaded = RendererConfig::load_from_file(&path_str).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let path = temp_path("renderer.ron");
        let path_str = path.to_string_lossy().to_string();
        let config = RendererConfig::new("ron").with_window("ron window", 1024, 768);

        config.save_to_file(&path_str).unwrap();
        let loaded = RendererConfig::load_from_file(&path_str).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = RendererConfig::default().save_to_file("renderer.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
