//! Builds the initial scene and attaches late arrivals to it.
//!
//! Every GPU resource is registered with the [`ResourceRegistry`] the moment
//! it is created, before its node exists. If composition fails half way the
//! registry therefore still knows about everything allocated so far.

use std::{fmt, str::FromStr};

use log::{debug, info};
use rand::Rng;

use crate::{
    backend::{Geometry, Light, Material, RenderBackend, ShadowParams},
    config::{SceneConfig, rgb},
    data_structures::{
        instance::Transform,
        model::{MeshData, ModelData},
        scene_graph::{
            Environment, GroundPlane, LightSource, ModelMesh, ModelRoot, NodeId, ParticleField,
            SceneGraph, SceneNode,
        },
    },
    error::SceneError,
    quality::{DeviceCapabilities, QualityController},
    resources::registry::{Owner, ResourceHandle, ResourceKind, ResourceRegistry},
};

/// Parts of the scene the page can switch on and off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Shadows,
    /// Particle motion; the field itself stays visible.
    Particles,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Shadows => f.write_str("shadows"),
            Subsystem::Particles => f.write_str("particles"),
        }
    }
}

impl FromStr for Subsystem {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shadows" => Ok(Subsystem::Shadows),
            "particles" => Ok(Subsystem::Particles),
            other => Err(SceneError::InvalidConfig(format!(
                "unknown subsystem `{other}`"
            ))),
        }
    }
}

/// Uniformly scatters `count` points inside the box spanned by
/// `[-spread, spread)` on x and z and `band` on y.
pub fn scatter_particles<R: Rng>(
    count: usize,
    spread: f32,
    band: [f32; 2],
    rng: &mut R,
) -> Vec<[f32; 3]> {
    (0..count)
        .map(|_| {
            [
                rng.gen_range(-spread..spread),
                rng.gen_range(band[0]..band[1]),
                rng.gen_range(-spread..spread),
            ]
        })
        .collect()
}

/// A flat grid in the xz plane facing up.
pub fn ground_mesh(size: f32, segments: u32) -> MeshData {
    let segments = segments.max(1);
    let step = size / segments as f32;
    let half = size / 2.0;
    let row = segments + 1;

    let mut positions = Vec::with_capacity((row * row) as usize);
    for j in 0..row {
        for i in 0..row {
            positions.push([-half + i as f32 * step, 0.0, -half + j as f32 * step]);
        }
    }
    let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
    for j in 0..segments {
        for i in 0..segments {
            let a = j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            indices.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    let normals = vec![[0.0, 1.0, 0.0]; positions.len()];
    MeshData::new("ground", positions, Some(normals), Some(indices))
}

#[derive(Clone, Debug)]
pub struct SceneComposer {
    config: SceneConfig,
    caps: DeviceCapabilities,
}

impl SceneComposer {
    pub fn new(config: SceneConfig, caps: DeviceCapabilities) -> Self {
        Self { config, caps }
    }

    /// Builds ground, lights and the particle field.
    pub fn compose<B: RenderBackend, R: Rng>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        rng: &mut R,
    ) -> Result<SceneGraph, SceneError> {
        let env = &self.config.environment;
        let environment = Environment {
            clear_color: rgb(env.clear_color),
            fog_density: env.fog_density,
        };
        backend.set_environment(environment.clear_color, environment.fog_density);
        let mut graph = SceneGraph::new(environment);

        let lighting = &self.config.lighting;
        let hemisphere = Light::Hemisphere {
            sky: rgb(lighting.hemisphere_sky),
            ground: rgb(lighting.hemisphere_ground),
            intensity: lighting.hemisphere_intensity,
        };
        let node = self.light(&mut graph, backend, registry, hemisphere, false)?;
        graph.insert(node);

        let constrained = self.caps.constrained;
        let directional = Light::Directional {
            color: rgb(lighting.directional_color),
            intensity: if constrained {
                lighting.constrained_intensity
            } else {
                lighting.directional_intensity
            },
            position: lighting.directional_position,
            shadow: (!constrained).then_some(ShadowParams {
                map_size: lighting.shadow_map_size,
                near: lighting.shadow_near,
                far: lighting.shadow_far,
            }),
        };
        let node = self.light(&mut graph, backend, registry, directional, !constrained)?;
        graph.insert(node);

        let node = self.ground(&mut graph, backend, registry)?;
        graph.insert(node);

        if self.config.particle_count > 0 {
            let node = self.particles(&mut graph, backend, registry, rng)?;
            graph.insert(node);
        } else {
            debug!("particle field disabled by configuration");
        }

        info!("scene composed with {} nodes", graph.len());
        Ok(graph)
    }

    fn light<B: RenderBackend>(
        &self,
        graph: &mut SceneGraph,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        light: Light,
        cast_shadow: bool,
    ) -> Result<SceneNode, SceneError> {
        let id = graph.reserve_id();
        let handle = register(
            registry,
            id,
            ResourceKind::Light,
            backend.create_light(&light)?,
        );
        Ok(SceneNode::LightSource(LightSource {
            id,
            handle,
            light,
            authored_cast_shadow: cast_shadow,
            cast_shadow,
        }))
    }

    fn ground<B: RenderBackend>(
        &self,
        graph: &mut SceneGraph,
        backend: &mut B,
        registry: &mut ResourceRegistry,
    ) -> Result<SceneNode, SceneError> {
        let env = &self.config.environment;
        let id = graph.reserve_id();
        let mesh = ground_mesh(env.ground_size, env.ground_segments);
        let geometry = register(
            registry,
            id,
            ResourceKind::Geometry,
            backend.create_geometry(Geometry::Mesh(&mesh))?,
        );
        let [r, g, b] = rgb(env.ground_color);
        let material = register(
            registry,
            id,
            ResourceKind::Material,
            backend.create_material(&Material::Standard {
                color: [r, g, b, 1.0],
                metalness: env.ground_metalness,
                roughness: env.ground_roughness,
            })?,
        );
        Ok(SceneNode::GroundPlane(GroundPlane {
            id,
            geometry,
            material,
            transform: Transform::placed([0.0, env.ground_offset, 0.0], 1.0),
            receive_shadow: true,
        }))
    }

    fn particles<B: RenderBackend, R: Rng>(
        &self,
        graph: &mut SceneGraph,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        rng: &mut R,
    ) -> Result<SceneNode, SceneError> {
        let config = &self.config;
        let id = graph.reserve_id();
        let positions = scatter_particles(
            config.particle_count,
            config.particle_spread,
            config.particle_band,
            rng,
        );
        let geometry = register(
            registry,
            id,
            ResourceKind::Geometry,
            backend.create_geometry(Geometry::Points(&positions))?,
        );
        let color = [1.0, 1.0, 1.0];
        let material = register(
            registry,
            id,
            ResourceKind::Material,
            backend.create_material(&Material::Points {
                color,
                size: config.particle_size,
                opacity: config.particle_opacity,
            })?,
        );
        Ok(SceneNode::ParticleField(ParticleField {
            id,
            geometry,
            material,
            positions,
            color,
            size: config.particle_size,
            opacity: config.particle_opacity,
            motion_enabled: true,
        }))
    }

    /// Attaches a loaded model at the configured placement.
    ///
    /// The node is inserted only once all of its meshes are on the GPU. On
    /// failure whatever was created for it is released again.
    pub fn insert_model<B: RenderBackend>(
        &self,
        graph: &mut SceneGraph,
        backend: &mut B,
        registry: &mut ResourceRegistry,
        model: &ModelData,
        shadows_active: bool,
    ) -> Result<NodeId, SceneError> {
        let id = graph.reserve_id();
        let mut meshes = Vec::with_capacity(model.meshes.len());
        for mesh in &model.meshes {
            match Self::upload_mesh(backend, registry, id, mesh) {
                Ok((geometry, material)) => meshes.push(ModelMesh {
                    geometry,
                    material,
                    transform: mesh.transform,
                    authored_cast_shadow: true,
                    cast_shadow: shadows_active,
                    receive_shadow: true,
                    frustum_culled: true,
                }),
                Err(e) => {
                    registry.release_owned_by(Owner::Node(id), |h| backend.dispose(h.id));
                    return Err(e);
                }
            }
        }
        let placement = &self.config.model;
        let node = ModelRoot {
            id,
            source: model.source.clone(),
            transform: Transform::placed(placement.position, placement.scale),
            meshes,
        };
        info!(
            "model `{}` attached with {} meshes",
            node.source,
            node.meshes.len()
        );
        Ok(graph.insert(SceneNode::ModelRoot(node)))
    }

    fn upload_mesh<B: RenderBackend>(
        backend: &mut B,
        registry: &mut ResourceRegistry,
        id: NodeId,
        mesh: &MeshData,
    ) -> Result<(ResourceHandle, ResourceHandle), SceneError> {
        let geometry = register(
            registry,
            id,
            ResourceKind::Geometry,
            backend.create_geometry(Geometry::Mesh(mesh))?,
        );
        let material = register(
            registry,
            id,
            ResourceKind::Material,
            backend.create_material(&Material::Standard {
                color: mesh.color,
                metalness: mesh.metalness,
                roughness: mesh.roughness,
            })?,
        );
        Ok((geometry, material))
    }

    /// Switches a subsystem on or off while the scene runs.
    pub fn apply_visibility<B: RenderBackend>(
        &self,
        subsystem: Subsystem,
        enabled: bool,
        graph: &mut SceneGraph,
        quality: &mut QualityController,
        backend: &mut B,
    ) {
        info!("{subsystem} {}", if enabled { "on" } else { "off" });
        match subsystem {
            Subsystem::Shadows => {
                quality.set_shadows_requested(enabled);
                quality.apply_shadows(backend, graph);
            }
            Subsystem::Particles => match graph.particle_field_mut() {
                Some(field) => field.motion_enabled = enabled,
                None => debug!("no particle field to toggle"),
            },
        }
    }
}

fn register(
    registry: &mut ResourceRegistry,
    owner: NodeId,
    kind: ResourceKind,
    id: crate::backend::ResourceId,
) -> ResourceHandle {
    registry.register(ResourceHandle::new(id, kind), Owner::Node(owner))
}
