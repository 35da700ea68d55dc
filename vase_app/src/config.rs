//! Demo configuration

use prism_engine::config::{Config, RendererConfig};
use serde::{Deserialize, Serialize};

/// Viewer camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Viewer position on the z axis
    pub start_z: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 50.0,
            near: 0.1,
            far: 10.0,
            start_z: -2.5,
        }
    }
}

/// OBJ files making up the scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub flat_vase: String,
    pub smooth_vase: String,
    pub floor: String,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            flat_vase: "resources/models/flat_vase.obj".to_string(),
            smooth_vase: "resources/models/smooth_vase.obj".to_string(),
            floor: "resources/models/quad.obj".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub renderer: RendererConfig,
    pub camera: CameraConfig,
    pub models: ModelPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::new("Vase Demo").with_window("Prism - Vases", 800, 600),
            camera: CameraConfig::default(),
            models: ModelPaths::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.renderer.validate()?;
        let camera = &self.camera;
        if camera.near <= 0.0 || camera.far <= camera.near {
            return Err(format!(
                "Camera clip planes must satisfy 0 < near < far, got near={} far={}",
                camera.near, camera.far
            ));
        }
        if !(1.0..180.0).contains(&camera.fov_y_degrees) {
            return Err(format!("Camera field of view out of range: {}", camera.fov_y_degrees));
        }
        Ok(())
    }
}

impl Config for AppConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.camera.start_z, -2.5);
        assert!(config.renderer.shadow.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AppConfig = load_partial(
            r#"
            [camera]
            fov_y_degrees = 70.0

            [models]
            floor = "assets/floor.obj"
            "#,
        );
        assert_relative_eq!(config.camera.fov_y_degrees, 70.0);
        assert_relative_eq!(config.camera.far, 10.0);
        assert_eq!(config.models.floor, "assets/floor.obj");
        assert_eq!(config.models.flat_vase, ModelPaths::default().flat_vase);
        assert_eq!(config.renderer, AppConfig::default().renderer);
    }

    #[test]
    fn test_inverted_clip_planes_are_rejected() {
        let mut config = AppConfig::default();
        config.camera.near = 5.0;
        config.camera.far = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("vase_app_{}.toml", std::process::id()));
        let path = path.to_string_lossy().into_owned();

        let mut config = AppConfig::default();
        config.renderer.shadow.display_shadow_map = true;
        config.save_to_file(&path).expect("save config");
        let loaded = AppConfig::load_from_file(&path).expect("load config");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    fn load_partial(source: &str) -> AppConfig {
        let path = std::env::temp_dir().join(format!("vase_app_partial_{}.toml", std::process::id()));
        let path = path.to_string_lossy().into_owned();
        std::fs::write(&path, source).expect("write config");
        let config = AppConfig::load_from_file(&path).expect("parse config");
        let _ = std::fs::remove_file(&path);
        config
    }
}
