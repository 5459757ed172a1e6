//! Per-frame scheduling.
//!
//! [`RenderLoop`] owns the camera, its controls and any running camera tween.
//! Each [`RenderLoop::tick`] advances those, spins the particle field and
//! issues exactly one draw of the scene graph. The loop only reads the graph;
//! the particle rotation is loop state handed to the backend with the draw.

use std::f32::consts::TAU;

use cgmath::EuclideanSpace;
use instant::{Duration, Instant};
use log::{debug, warn};

use crate::{
    backend::{FrameView, RenderBackend},
    camera::{Camera, CameraTween, OrbitControls},
    config::SceneConfig,
    data_structures::scene_graph::SceneGraph,
    quality::QualityProfile,
};

/// Longest step the animation takes in one frame, so a backgrounded tab does
/// not jump on return.
const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// Nothing was scheduled: the loop is cancelled or the session not running.
    Skipped,
}

#[derive(Debug)]
pub struct RenderLoop {
    camera: Camera,
    controls: OrbitControls,
    tween: Option<CameraTween>,
    look_at: cgmath::Point3<f32>,
    last_frame: Option<Instant>,
    particle_rotation: f32,
    frames: u64,
    cancelled: bool,
}

impl RenderLoop {
    pub fn new(config: &SceneConfig, aspect: f32) -> Self {
        let look_at = cgmath::Point3::from(config.camera.look_at);
        Self {
            camera: Camera::from_config(&config.camera, aspect),
            controls: OrbitControls::from_config(&config.controls, look_at),
            tween: None,
            look_at,
            last_frame: None,
            particle_rotation: 0.0,
            frames: 0,
            cancelled: false,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.camera.aspect = aspect;
    }

    /// Starts a tween from wherever the camera is now. A tween already running
    /// is dropped; the last request wins.
    pub fn focus_camera(&mut self, target: [f32; 3], duration: Duration) {
        if let Some(previous) = self.tween.take() {
            debug!(
                "camera tween to {:?} superseded",
                previous.destination().to_vec()
            );
        }
        self.tween = Some(CameraTween::new(
            self.camera.position,
            target.into(),
            self.look_at,
            duration,
        ));
    }

    pub fn is_tweening(&self) -> bool {
        self.tween.is_some()
    }

    pub fn particle_rotation(&self) -> f32 {
        self.particle_rotation
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Stops scheduling. No further tick draws anything.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.tween = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn tick<B: RenderBackend>(
        &mut self,
        now: Instant,
        graph: &SceneGraph,
        profile: &QualityProfile,
        backend: &mut B,
    ) -> FrameStatus {
        if self.cancelled {
            return FrameStatus::Skipped;
        }
        let dt = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default()
            .min(MAX_FRAME_DELTA);
        self.last_frame = Some(now);

        if let Some(tween) = self.tween.as_mut() {
            if tween.advance(&mut self.camera, now) {
                self.tween = None;
            }
        }

        if graph.particle_field().is_some_and(|f| f.motion_enabled) {
            self.particle_rotation =
                (self.particle_rotation + profile.particle_spin * dt.as_secs_f32()).rem_euclid(TAU);
        }

        self.controls.update(&mut self.camera);

        let view = FrameView {
            camera: &self.camera,
            particle_rotation: self.particle_rotation,
        };
        if let Err(e) = backend.draw(graph, view) {
            warn!("frame {} was not drawn: {e:#}", self.frames);
        }
        self.frames += 1;
        FrameStatus::Rendered
    }
}
