//! Perspective camera, damped orbit controls and camera tweens.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace};
use instant::{Duration, Instant};

use crate::config::{CameraConfig, ControlsConfig};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: cgmath::Point3<f32>,
    pub target: cgmath::Point3<f32>,
    pub fovy: cgmath::Deg<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: config.position.into(),
            target: config.look_at.into(),
            fovy: cgmath::Deg(config.fovy_degrees),
            aspect,
            znear: config.near,
            zfar: config.far,
        }
    }

    pub fn view_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::look_at_rh(self.position, self.target, cgmath::Vector3::unit_y())
    }

    pub fn projection_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn view_proj(&self) -> cgmath::Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.projection_matrix() * self.view_matrix()
    }

    pub fn distance(&self) -> f32 {
        (self.position - self.target).magnitude()
    }
}

/// Linear camera move towards a fixed point while looking at `look_at`.
///
/// The clock starts on the first frame that advances the tween.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraTween {
    from: cgmath::Point3<f32>,
    to: cgmath::Point3<f32>,
    look_at: cgmath::Point3<f32>,
    duration: Duration,
    started: Option<Instant>,
}

impl CameraTween {
    pub fn new(
        from: cgmath::Point3<f32>,
        to: cgmath::Point3<f32>,
        look_at: cgmath::Point3<f32>,
        duration: Duration,
    ) -> Self {
        Self {
            from,
            to,
            look_at,
            duration,
            started: None,
        }
    }

    pub fn destination(&self) -> cgmath::Point3<f32> {
        self.to
    }

    /// Moves the camera to the position for `now`. Returns true once the
    /// destination is reached.
    pub fn advance(&mut self, camera: &mut Camera, now: Instant) -> bool {
        let start = *self.started.get_or_insert(now);
        let p = if self.duration.is_zero() {
            1.0
        } else {
            let elapsed = now.saturating_duration_since(start);
            (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        camera.position = if p >= 1.0 {
            self.to
        } else {
            self.from + (self.to - self.from) * p
        };
        camera.target = self.look_at;
        p >= 1.0
    }
}

/// Damped orbit around a target point with a clamped distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitControls {
    pub target: cgmath::Point3<f32>,
    pub damping: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
}

impl OrbitControls {
    const POLE_EPS: f32 = 1e-4;

    pub fn from_config(config: &ControlsConfig, target: cgmath::Point3<f32>) -> Self {
        Self {
            target,
            damping: config.damping.clamp(0.0, 1.0),
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
        }
    }

    /// Queues an orbit by azimuth and polar angle deltas, in radians.
    pub fn rotate(&mut self, d_theta: f32, d_phi: f32) {
        self.theta_delta += d_theta;
        self.phi_delta += d_phi;
    }

    /// Queues a zoom: factors above one move away from the target.
    pub fn dolly(&mut self, factor: f32) {
        if factor > 0.0 {
            self.scale *= factor;
        }
    }

    pub fn update(&mut self, camera: &mut Camera) {
        let offset = camera.position - self.target;
        let radius = offset.magnitude();
        if radius <= f32::EPSILON {
            return;
        }
        let theta = offset.x.atan2(offset.z) + self.theta_delta * self.damping;
        let phi = ((offset.y / radius).clamp(-1.0, 1.0).acos() + self.phi_delta * self.damping)
            .clamp(Self::POLE_EPS, PI - Self::POLE_EPS);
        let radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        let ring = radius * phi.sin();
        camera.position = self.target
            + cgmath::Vector3::new(ring * theta.sin(), radius * phi.cos(), ring * theta.cos());
        camera.target = self.target;

        self.theta_delta *= 1.0 - self.damping;
        self.phi_delta *= 1.0 - self.damping;
        self.scale = 1.0;
    }

    pub fn is_settled(&self) -> bool {
        self.theta_delta.abs() < 1e-5 && self.phi_delta.abs() < 1e-5
    }
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default(), cgmath::Point3::origin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::from_config(&CameraConfig::default(), 16.0 / 9.0)
    }

    #[test]
    fn tween_ends_exactly_on_target() {
        let mut cam = camera();
        let mut tween = CameraTween::new(
            cam.position,
            cgmath::Point3::new(0.0, 1.8, 4.0),
            cgmath::Point3::origin(),
            Duration::from_millis(900),
        );
        let t0 = Instant::now();
        assert!(!tween.advance(&mut cam, t0));
        assert_eq!(cam.position, cgmath::Point3::new(0.0, 2.0, 6.0));
        assert!(!tween.advance(&mut cam, t0 + Duration::from_millis(450)));
        assert_relative_eq!(cam.position.z, 5.0, epsilon = 1e-4);
        assert!(tween.advance(&mut cam, t0 + Duration::from_millis(2000)));
        assert_eq!(cam.position, cgmath::Point3::new(0.0, 1.8, 4.0));
    }

    #[test]
    fn idle_controls_keep_the_camera_in_place() {
        let mut cam = camera();
        let mut controls = OrbitControls::default();
        controls.update(&mut cam);
        assert_relative_eq!(cam.position.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(cam.position.y, 2.0, epsilon = 1e-4);
        assert_relative_eq!(cam.position.z, 6.0, epsilon = 1e-4);
    }

    #[test]
    fn distance_is_clamped() {
        let mut cam = camera();
        let mut controls = OrbitControls::default();
        controls.dolly(100.0);
        controls.update(&mut cam);
        assert_relative_eq!(cam.distance(), 20.0, epsilon = 1e-3);
        controls.dolly(0.001);
        controls.update(&mut cam);
        assert_relative_eq!(cam.distance(), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn orbit_is_damped() {
        let mut cam = camera();
        let mut controls = OrbitControls::default();
        controls.rotate(1.0, 0.0);
        controls.update(&mut cam);
        let after_one = cam.position.x;
        assert!(after_one > 0.0);
        for _ in 0..400 {
            controls.update(&mut cam);
        }
        assert!(controls.is_settled());
        assert_relative_eq!(cam.distance(), 40.0f32.sqrt(), epsilon = 1e-3);
    }
}
