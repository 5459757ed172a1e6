//! Rendering backend abstraction.
//!
//! Everything the lifecycle core needs from a GPU goes through
//! [`RenderBackend`]. The wgpu implementation lives in [`crate::context`];
//! [`headless::HeadlessBackend`] records calls instead of drawing and is what
//! the integration tests run against.
//!
//! Backends hand out opaque [`ResourceId`]s. Ownership of those ids is tracked
//! by the [`ResourceRegistry`](crate::resources::registry::ResourceRegistry),
//! never by the backend itself.

use std::future::Future;

use crate::{
    camera::Camera,
    data_structures::{model::MeshData, scene_graph::SceneGraph, texture::DecodedImage},
    error::SceneError,
};

pub mod headless;

/// Opaque id of a GPU-side resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// Size and density of the drawable area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Logical width in css pixels.
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    /// Size of the backing buffer in physical pixels, never zero.
    pub fn physical_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

/// The drawable surface as the session sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
            pixel_ratio: self.pixel_ratio,
        }
    }
}

/// Geometry upload request. The data is borrowed, the backend copies it.
#[derive(Clone, Copy, Debug)]
pub enum Geometry<'a> {
    Mesh(&'a MeshData),
    Points(&'a [[f32; 3]]),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Standard {
        color: [f32; 4],
        metalness: f32,
        roughness: f32,
    },
    Points {
        color: [f32; 3],
        size: f32,
        opacity: f32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowParams {
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Hemisphere {
        sky: [f32; 3],
        ground: [f32; 3],
        intensity: f32,
    },
    Directional {
        color: [f32; 3],
        intensity: f32,
        position: [f32; 3],
        shadow: Option<ShadowParams>,
    },
}

/// Per-frame inputs of a draw that are not part of the scene graph.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub camera: &'a Camera,
    /// Accumulated rotation of the particle field around the y axis.
    pub particle_rotation: f32,
}

/// A GPU the lifecycle core can draw with.
///
/// `dispose` of an id that is unknown or already disposed must be a no-op
/// returning `Ok`, so teardown paths can be replayed safely.
pub trait RenderBackend: Sized {
    /// Whatever the backend renders into (a window, a canvas, a test stub).
    type Surface;

    fn acquire(surface: Self::Surface) -> impl Future<Output = Result<Self, SceneError>>;

    /// Logical size of the surface at acquisition time.
    fn surface_size(&self) -> (u32, u32);
    fn device_pixel_ratio(&self) -> f32;
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_shadows_enabled(&mut self, enabled: bool);
    fn set_environment(&mut self, clear_color: [f32; 3], fog_density: f32);

    fn create_geometry(&mut self, geometry: Geometry<'_>) -> Result<ResourceId, SceneError>;
    fn create_material(&mut self, material: &Material) -> Result<ResourceId, SceneError>;
    fn update_material(&mut self, id: ResourceId, material: &Material) -> Result<(), SceneError>;
    fn create_texture(&mut self, image: &DecodedImage) -> Result<ResourceId, SceneError>;
    fn create_light(&mut self, light: &Light) -> Result<ResourceId, SceneError>;
    fn set_background(&mut self, texture: Option<ResourceId>);

    fn draw(&mut self, scene: &SceneGraph, view: FrameView<'_>) -> anyhow::Result<()>;

    fn dispose(&mut self, id: ResourceId) -> Result<(), SceneError>;

    /// Id standing for the surface/context itself.
    fn render_target(&self) -> ResourceId;
    /// Releases the context. Further draws are no-ops.
    fn lose_context(&mut self);
}
