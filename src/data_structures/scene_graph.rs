//! Scene graph of the backdrop.
//!
//! The graph is flat: a root holding a closed set of node kinds. Every node
//! owns the GPU resources it was built from and reports them through
//! [`OwnsResources`], which is how teardown finds what to release.
//!
//! Nodes are only ever inserted fully built, so a reader never observes a
//! half-constructed node.

use log::debug;

use crate::{
    backend::Light,
    data_structures::instance::Transform,
    resources::registry::ResourceHandle,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Visitor seam used by resource release.
pub trait OwnsResources {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle));

    fn resources(&self) -> Vec<ResourceHandle> {
        let mut out = Vec::new();
        self.visit_resources(&mut |handle| out.push(handle));
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ParticleField,
    GroundPlane,
    LightSource,
    ModelRoot,
}

/// Point sprites scattered through the volume around the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleField {
    pub id: NodeId,
    pub geometry: ResourceHandle,
    pub material: ResourceHandle,
    pub positions: Vec<[f32; 3]>,
    pub color: [f32; 3],
    pub size: f32,
    pub opacity: f32,
    /// Spin gate toggled by the page; the field stays visible either way.
    pub motion_enabled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroundPlane {
    pub id: NodeId,
    pub geometry: ResourceHandle,
    pub material: ResourceHandle,
    pub transform: Transform,
    pub receive_shadow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightSource {
    pub id: NodeId,
    pub handle: ResourceHandle,
    pub light: Light,
    /// Whether the light was set up to cast shadows at all.
    pub authored_cast_shadow: bool,
    /// Effective flag after quality and capability gating.
    pub cast_shadow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelMesh {
    pub geometry: ResourceHandle,
    pub material: ResourceHandle,
    /// Transform relative to the model root.
    pub transform: cgmath::Matrix4<f32>,
    pub authored_cast_shadow: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub frustum_culled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelRoot {
    pub id: NodeId,
    pub source: String,
    pub transform: Transform,
    pub meshes: Vec<ModelMesh>,
}

impl ModelRoot {
    pub fn world_matrix(&self, mesh: &ModelMesh) -> cgmath::Matrix4<f32> {
        self.transform.to_matrix() * mesh.transform
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneNode {
    ParticleField(ParticleField),
    GroundPlane(GroundPlane),
    LightSource(LightSource),
    ModelRoot(ModelRoot),
}

impl SceneNode {
    pub fn id(&self) -> NodeId {
        match self {
            SceneNode::ParticleField(n) => n.id,
            SceneNode::GroundPlane(n) => n.id,
            SceneNode::LightSource(n) => n.id,
            SceneNode::ModelRoot(n) => n.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            SceneNode::ParticleField(_) => NodeKind::ParticleField,
            SceneNode::GroundPlane(_) => NodeKind::GroundPlane,
            SceneNode::LightSource(_) => NodeKind::LightSource,
            SceneNode::ModelRoot(_) => NodeKind::ModelRoot,
        }
    }
}

impl OwnsResources for ParticleField {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        visit(self.geometry);
        visit(self.material);
    }
}

impl OwnsResources for GroundPlane {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        visit(self.geometry);
        visit(self.material);
    }
}

impl OwnsResources for LightSource {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        visit(self.handle);
    }
}

impl OwnsResources for ModelRoot {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        for mesh in &self.meshes {
            visit(mesh.geometry);
            visit(mesh.material);
        }
    }
}

impl OwnsResources for SceneNode {
    fn visit_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        match self {
            SceneNode::ParticleField(n) => n.visit_resources(visit),
            SceneNode::GroundPlane(n) => n.visit_resources(visit),
            SceneNode::LightSource(n) => n.visit_resources(visit),
            SceneNode::ModelRoot(n) => n.visit_resources(visit),
        }
    }
}

/// Clear colour and fog of the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    pub clear_color: [f32; 3],
    pub fog_density: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    next_id: u32,
    pub environment: Environment,
}

impl SceneGraph {
    pub fn new(environment: Environment) -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 0,
            environment,
        }
    }

    /// Id for a node that is about to be built.
    pub fn reserve_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, node: SceneNode) -> NodeId {
        let id = node.id();
        debug!("scene graph: attach {:?} {:?}", node.kind(), id);
        self.nodes.push(node);
        id
    }

    pub fn remove(&mut self, id: NodeId) -> Option<SceneNode> {
        let idx = self.nodes.iter().position(|n| n.id() == id)?;
        Some(self.nodes.remove(idx))
    }

    /// Detaches every node. Resources must have been released beforehand.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind() == kind).count()
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        self.count(kind) > 0
    }

    pub fn particle_field(&self) -> Option<&ParticleField> {
        self.nodes.iter().find_map(|n| match n {
            SceneNode::ParticleField(field) => Some(field),
            _ => None,
        })
    }

    pub fn particle_field_mut(&mut self) -> Option<&mut ParticleField> {
        self.nodes.iter_mut().find_map(|n| match n {
            SceneNode::ParticleField(field) => Some(field),
            _ => None,
        })
    }

    pub fn ground(&self) -> Option<&GroundPlane> {
        self.nodes.iter().find_map(|n| match n {
            SceneNode::GroundPlane(ground) => Some(ground),
            _ => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = &LightSource> {
        self.nodes.iter().filter_map(|n| match n {
            SceneNode::LightSource(light) => Some(light),
            _ => None,
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelRoot> {
        self.nodes.iter().filter_map(|n| match n {
            SceneNode::ModelRoot(model) => Some(model),
            _ => None,
        })
    }

    /// Every resource owned by any node, in node order.
    pub fn walk_resources(&self, visit: &mut dyn FnMut(ResourceHandle)) {
        for node in &self.nodes {
            node.visit_resources(visit);
        }
    }

    /// Applies the effective shadow flag to every caster. Authored flags are
    /// kept so re-enabling restores exactly the authored casters.
    pub fn set_shadows_active(&mut self, active: bool) {
        for node in &mut self.nodes {
            match node {
                SceneNode::LightSource(light) => {
                    light.cast_shadow = light.authored_cast_shadow && active;
                }
                SceneNode::ModelRoot(model) => {
                    for mesh in &mut model.meshes {
                        mesh.cast_shadow = mesh.authored_cast_shadow && active;
                    }
                }
                SceneNode::ParticleField(_) | SceneNode::GroundPlane(_) => (),
            }
        }
    }

    pub fn shadows_cast(&self) -> bool {
        self.lights().any(|l| l.cast_shadow)
    }
}
