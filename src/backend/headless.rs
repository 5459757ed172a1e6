//! A backend that draws nothing and remembers everything.
//!
//! Used by the integration tests and usable wherever a session has to run
//! without a GPU. Every allocation, disposal and state change is recorded so
//! callers can assert on leaks, double releases and applied settings.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    backend::{FrameView, Geometry, Light, Material, RenderBackend, ResourceId, Viewport},
    data_structures::{
        scene_graph::{NodeKind, SceneGraph},
        texture::DecodedImage,
    },
    error::SceneError,
};

/// What a headless backend is acquired from.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessSurface {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// False simulates a host without a usable graphics context.
    pub supported: bool,
    /// Makes every resource creation after this many fail.
    pub fail_create_after: Option<usize>,
    /// Makes every dispose report an error (the resource is still dropped).
    pub fail_dispose: bool,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
            supported: true,
            fail_create_after: None,
            fail_dispose: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Allocation {
    Geometry { vertices: usize },
    Material(Material),
    Texture { source: String },
    Light(Light),
    RenderTarget,
}

/// Summary of the last draw call.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub nodes: usize,
    pub particle_field: bool,
    pub models: usize,
    pub camera_position: [f32; 3],
    pub particle_rotation: f32,
    pub shadows: bool,
    pub background: Option<ResourceId>,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    surface: HeadlessSurface,
    next_id: u64,
    created: usize,
    live: BTreeMap<ResourceId, Allocation>,
    disposed: BTreeSet<ResourceId>,
    double_disposals: usize,
    viewport: Option<Viewport>,
    shadows: bool,
    environment: Option<([f32; 3], f32)>,
    background: Option<ResourceId>,
    draws: u64,
    last_draw: Option<DrawRecord>,
    context_lost: bool,
    target: ResourceId,
}

impl HeadlessBackend {
    pub fn new(surface: HeadlessSurface) -> Self {
        let target = ResourceId(0);
        let mut live = BTreeMap::new();
        live.insert(target, Allocation::RenderTarget);
        Self {
            surface,
            next_id: 1,
            created: 0,
            live,
            disposed: BTreeSet::new(),
            double_disposals: 0,
            viewport: None,
            shadows: false,
            environment: None,
            background: None,
            draws: 0,
            last_draw: None,
            context_lost: false,
            target,
        }
    }

    fn allocate(&mut self, allocation: Allocation) -> Result<ResourceId, SceneError> {
        if self.context_lost {
            return Err(SceneError::backend("context was lost"));
        }
        if self
            .surface
            .fail_create_after
            .is_some_and(|limit| self.created >= limit)
        {
            return Err(SceneError::backend(format!(
                "out of memory after {} allocations",
                self.created
            )));
        }
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        debug!("headless: allocate {id:?} {allocation:?}");
        self.live.insert(id, allocation);
        Ok(id)
    }

    /// Resources created and not yet disposed, render target included.
    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn live_ids(&self) -> Vec<ResourceId> {
        self.live.keys().copied().collect()
    }

    pub fn allocation(&self, id: ResourceId) -> Option<&Allocation> {
        self.live.get(&id)
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn disposed(&self) -> usize {
        self.disposed.len()
    }

    pub fn double_disposals(&self) -> usize {
        self.double_disposals
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn shadows_enabled(&self) -> bool {
        self.shadows
    }

    pub fn environment(&self) -> Option<([f32; 3], f32)> {
        self.environment
    }

    pub fn background(&self) -> Option<ResourceId> {
        self.background
    }

    pub fn background_source(&self) -> Option<&str> {
        match self.live.get(&self.background?) {
            Some(Allocation::Texture { source }) => Some(source),
            _ => None,
        }
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn last_draw(&self) -> Option<&DrawRecord> {
        self.last_draw.as_ref()
    }

    pub fn context_lost(&self) -> bool {
        self.context_lost
    }

    /// The points material, if one is alive.
    pub fn points_material(&self) -> Option<&Material> {
        self.live.values().find_map(|a| match a {
            Allocation::Material(m @ Material::Points { .. }) => Some(m),
            _ => None,
        })
    }

    /// Simulates the window moving to a display with another density.
    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.surface.pixel_ratio = ratio;
    }
}

impl RenderBackend for HeadlessBackend {
    type Surface = HeadlessSurface;

    async fn acquire(surface: HeadlessSurface) -> Result<Self, SceneError> {
        if !surface.supported {
            return Err(SceneError::backend("no graphics context available"));
        }
        Ok(Self::new(surface))
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.surface.pixel_ratio
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn set_shadows_enabled(&mut self, enabled: bool) {
        self.shadows = enabled;
    }

    fn set_environment(&mut self, clear_color: [f32; 3], fog_density: f32) {
        self.environment = Some((clear_color, fog_density));
    }

    fn create_geometry(&mut self, geometry: Geometry<'_>) -> Result<ResourceId, SceneError> {
        let vertices = match geometry {
            Geometry::Mesh(mesh) => mesh.positions.len(),
            Geometry::Points(points) => points.len(),
        };
        self.allocate(Allocation::Geometry { vertices })
    }

    fn create_material(&mut self, material: &Material) -> Result<ResourceId, SceneError> {
        self.allocate(Allocation::Material(material.clone()))
    }

    fn update_material(&mut self, id: ResourceId, material: &Material) -> Result<(), SceneError> {
        match self.live.get_mut(&id) {
            Some(Allocation::Material(current)) => {
                *current = material.clone();
                Ok(())
            }
            _ => Err(SceneError::backend(format!("{id:?} is not a live material"))),
        }
    }

    fn create_texture(&mut self, image: &DecodedImage) -> Result<ResourceId, SceneError> {
        self.allocate(Allocation::Texture {
            source: image.source.clone(),
        })
    }

    fn create_light(&mut self, light: &Light) -> Result<ResourceId, SceneError> {
        self.allocate(Allocation::Light(light.clone()))
    }

    fn set_background(&mut self, texture: Option<ResourceId>) {
        self.background = texture;
    }

    fn draw(&mut self, scene: &SceneGraph, view: FrameView<'_>) -> anyhow::Result<()> {
        if self.context_lost {
            anyhow::bail!("draw after context loss");
        }
        self.draws += 1;
        self.last_draw = Some(DrawRecord {
            nodes: scene.len(),
            particle_field: scene.contains(NodeKind::ParticleField),
            models: scene.count(NodeKind::ModelRoot),
            camera_position: view.camera.position.into(),
            particle_rotation: view.particle_rotation,
            shadows: self.shadows,
            background: self.background,
        });
        Ok(())
    }

    fn dispose(&mut self, id: ResourceId) -> Result<(), SceneError> {
        if self.live.remove(&id).is_none() {
            if self.disposed.contains(&id) {
                self.double_disposals += 1;
            }
            return Ok(());
        }
        self.disposed.insert(id);
        if self.background == Some(id) {
            self.background = None;
        }
        if self.surface.fail_dispose {
            return Err(SceneError::backend("simulated dispose failure"));
        }
        Ok(())
    }

    fn render_target(&self) -> ResourceId {
        self.target
    }

    fn lose_context(&mut self) {
        if self.live.remove(&self.target).is_some() {
            self.disposed.insert(self.target);
        }
        self.context_lost = true;
    }
}
