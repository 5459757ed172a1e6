//! Rendering quality levels.
//!
//! A [`QualityLevel`] maps to a fixed [`QualityProfile`]: pixel density cap,
//! shadow casting, particle point size and particle spin rate. Applying a
//! level is idempotent and can happen any number of times while a session
//! runs.

use std::{fmt, str::FromStr};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Material, RenderBackend, RenderTarget},
    data_structures::scene_graph::SceneGraph,
    error::SceneError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn profile(self) -> QualityProfile {
        match self {
            QualityLevel::Low => QualityProfile {
                pixel_density_cap: 1.0,
                shadows_enabled: false,
                particle_size: 0.08,
                particle_spin: 0.036,
            },
            QualityLevel::Medium => QualityProfile {
                pixel_density_cap: 1.5,
                shadows_enabled: false,
                particle_size: 0.10,
                particle_spin: 0.054,
            },
            QualityLevel::High => QualityProfile {
                pixel_density_cap: 2.0,
                shadows_enabled: true,
                particle_size: 0.12,
                particle_spin: 0.054,
            },
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLevel::Low => f.write_str("low"),
            QualityLevel::Medium => f.write_str("medium"),
            QualityLevel::High => f.write_str("high"),
        }
    }
}

impl FromStr for QualityLevel {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityLevel::Low),
            "medium" => Ok(QualityLevel::Medium),
            "high" => Ok(QualityLevel::High),
            other => Err(SceneError::InvalidConfig(format!(
                "unknown quality level `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityProfile {
    /// Upper bound for the device pixel ratio.
    pub pixel_density_cap: f32,
    pub shadows_enabled: bool,
    pub particle_size: f32,
    /// Particle field rotation in radians per second.
    pub particle_spin: f32,
}

/// What the host environment can afford.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Mobile class hardware: no shadows, dimmer key light, low quality start.
    pub constrained: bool,
}

impl DeviceCapabilities {
    pub fn constrained() -> Self {
        Self { constrained: true }
    }

    /// Classifies a browser user agent string.
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            constrained: user_agent.contains("Mobi") || user_agent.contains("Android"),
        }
    }

    /// Probes the current host.
    pub fn detect() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            web_sys::window()
                .and_then(|w| w.navigator().user_agent().ok())
                .map(|ua| Self::from_user_agent(&ua))
                .unwrap_or_default()
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QualityController {
    level: QualityLevel,
    caps: DeviceCapabilities,
    /// Page toggle for shadows, on by default.
    shadows_requested: bool,
}

impl QualityController {
    pub fn new(caps: DeviceCapabilities, level_override: Option<QualityLevel>) -> Self {
        Self {
            level: Self::initial_level(caps, level_override),
            caps,
            shadows_requested: true,
        }
    }

    /// Constrained devices start on low, everything else on high.
    pub fn initial_level(caps: DeviceCapabilities, level_override: Option<QualityLevel>) -> QualityLevel {
        level_override.unwrap_or(if caps.constrained {
            QualityLevel::Low
        } else {
            QualityLevel::High
        })
    }

    pub fn level(&self) -> QualityLevel {
        self.level
    }

    pub fn profile(&self) -> QualityProfile {
        self.level.profile()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    pub fn set_shadows_requested(&mut self, requested: bool) {
        self.shadows_requested = requested;
    }

    pub fn shadows_requested(&self) -> bool {
        self.shadows_requested
    }

    /// Shadows are cast only when the level, the device and the page all
    /// allow it.
    pub fn shadows_active(&self) -> bool {
        self.profile().shadows_enabled && !self.caps.constrained && self.shadows_requested
    }

    /// Applies `level` to the backend, the scene and the render target.
    ///
    /// Applying the same level twice leaves everything in the same state.
    pub fn apply<B: RenderBackend>(
        &mut self,
        level: QualityLevel,
        backend: &mut B,
        graph: &mut SceneGraph,
        target: &mut RenderTarget,
    ) -> Result<(), SceneError> {
        if level != self.level {
            info!("quality {} -> {}", self.level, level);
        } else {
            debug!("re-applying quality {level}");
        }
        self.level = level;
        let profile = level.profile();

        target.pixel_ratio = profile.pixel_density_cap.min(backend.device_pixel_ratio());

        self.apply_shadows(backend, graph);

        if let Some(field) = graph.particle_field_mut() {
            field.size = profile.particle_size;
            backend.update_material(
                field.material.id,
                &Material::Points {
                    color: field.color,
                    size: field.size,
                    opacity: field.opacity,
                },
            )?;
        }

        // resize pass
        backend.set_viewport(target.viewport());
        Ok(())
    }

    /// Pushes the effective shadow state to the backend and the scene.
    pub fn apply_shadows<B: RenderBackend>(&self, backend: &mut B, graph: &mut SceneGraph) {
        let active = self.shadows_active();
        backend.set_shadows_enabled(active);
        graph.set_shadows_active(active);
    }
}
