//! Scene configuration.
//!
//! Every tunable of the backdrop lives in [`SceneConfig`]. The defaults
//! reproduce the stock landing page; alternative looks (denser particle
//! fields, other camera framings or light colours) are expressed by
//! overriding fields, usually from a JSON blob handed over by the page.

use serde::{Deserialize, Serialize};

use crate::{error::SceneError, quality::QualityLevel};

/// Converts a `0xRRGGBB` colour into linear-ish `[r, g, b]` floats.
pub fn rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub particle_count: usize,
    /// Horizontal half extent of the particle volume on x and z.
    pub particle_spread: f32,
    /// Vertical band `[min, max)` particles are placed in.
    pub particle_band: [f32; 2],
    /// Fixed seed for reproducible particle fields.
    pub particle_seed: Option<u64>,
    pub particle_size: f32,
    pub particle_opacity: f32,

    pub low_res_background: String,
    pub high_res_background: Option<String>,
    pub model_path: Option<String>,
    pub audio_path: Option<String>,
    pub audio_volume: f32,

    /// Forces the initial quality level instead of the capability heuristic.
    pub quality: Option<QualityLevel>,

    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub lighting: LightingConfig,
    pub environment: EnvironmentConfig,
    pub model: ModelPlacement,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            particle_count: 600,
            particle_spread: 30.0,
            particle_band: [-2.0, 18.0],
            particle_seed: None,
            particle_size: 0.12,
            particle_opacity: 0.9,
            low_res_background: "assets/images/hero_bg-low.jpg".to_string(),
            high_res_background: Some("assets/images/hero_bg.jpg".to_string()),
            model_path: Some("assets/models/model_scene.glb".to_string()),
            audio_path: Some("assets/audio/theme_loop.mp3".to_string()),
            audio_volume: 0.18,
            quality: None,
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            lighting: LightingConfig::default(),
            environment: EnvironmentConfig::default(),
            model: ModelPlacement::default(),
        }
    }
}

impl SceneConfig {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let config: SceneConfig =
            serde_json::from_str(json).map_err(|e| SceneError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if self.low_res_background.trim().is_empty() {
            return Err(SceneError::InvalidConfig(
                "a low resolution background image is required".to_string(),
            ));
        }
        // the sampler needs the full width of each range to be finite
        if !(self.particle_spread > 0.0 && (2.0 * self.particle_spread).is_finite()) {
            return Err(SceneError::InvalidConfig(format!(
                "particle_spread must be positive and finite, got {}",
                self.particle_spread
            )));
        }
        let [low, high] = self.particle_band;
        if !(low < high && (high - low).is_finite()) {
            return Err(SceneError::InvalidConfig(format!(
                "particle_band must be a non-empty finite range, got [{low}, {high}]"
            )));
        }
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near && camera.far.is_finite()) {
            return Err(SceneError::InvalidConfig(format!(
                "camera clip planes must satisfy 0 < near < far, got near {} far {}",
                camera.near, camera.far
            )));
        }
        if !(camera.fovy_degrees > 0.0 && camera.fovy_degrees < 180.0) {
            return Err(SceneError::InvalidConfig(format!(
                "camera fovy_degrees must lie in (0, 180), got {}",
                camera.fovy_degrees
            )));
        }
        if self.camera.focus_duration_ms == 0 || self.camera.tween_duration_ms == 0 {
            return Err(SceneError::InvalidConfig(
                "camera tween durations must be positive".to_string(),
            ));
        }
        if self.controls.min_distance > self.controls.max_distance {
            return Err(SceneError::InvalidConfig(format!(
                "controls distance range [{}, {}] is inverted",
                self.controls.min_distance, self.controls.max_distance
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fovy_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    pub focus_target: [f32; 3],
    pub focus_duration_ms: u64,
    pub tween_duration_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fovy_degrees: 50.0,
            near: 0.1,
            far: 2000.0,
            position: [0.0, 2.0, 6.0],
            look_at: [0.0, 0.0, 0.0],
            focus_target: [0.0, 1.8, 4.0],
            focus_duration_ms: 900,
            tween_duration_ms: 700,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub damping: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            damping: 0.07,
            min_distance: 2.0,
            max_distance: 20.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub hemisphere_sky: u32,
    pub hemisphere_ground: u32,
    pub hemisphere_intensity: f32,
    pub directional_color: u32,
    pub directional_position: [f32; 3],
    pub directional_intensity: f32,
    /// Directional intensity used on constrained devices.
    pub constrained_intensity: f32,
    pub shadow_map_size: u32,
    pub shadow_near: f32,
    pub shadow_far: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            hemisphere_sky: 0xffffee,
            hemisphere_ground: 0x222233,
            hemisphere_intensity: 0.45,
            directional_color: 0xfff0ff,
            directional_position: [5.0, 10.0, 7.0],
            directional_intensity: 1.2,
            constrained_intensity: 0.8,
            shadow_map_size: 1024,
            shadow_near: 0.5,
            shadow_far: 50.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub clear_color: u32,
    pub fog_density: f32,
    pub ground_size: f32,
    pub ground_segments: u32,
    pub ground_color: u32,
    pub ground_metalness: f32,
    pub ground_roughness: f32,
    pub ground_offset: f32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            clear_color: 0x05060a,
            fog_density: 0.02,
            ground_size: 200.0,
            ground_segments: 8,
            ground_color: 0x071723,
            ground_metalness: 0.1,
            ground_roughness: 0.7,
            ground_offset: -1.4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPlacement {
    pub position: [f32; 3],
    pub scale: f32,
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self {
            position: [0.0, -1.3, 0.0],
            scale: 0.9,
        }
    }
}
