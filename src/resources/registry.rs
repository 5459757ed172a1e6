//! Ownership ledger of GPU and media resources.
//!
//! Every resource the session allocates is registered here together with its
//! owner. Release goes through the registry as well, which is what guarantees
//! that nothing is released twice and nothing is forgotten on teardown.

use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    backend::ResourceId,
    data_structures::scene_graph::{NodeId, SceneGraph},
    error::SceneError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Geometry,
    Material,
    Texture,
    Light,
    Audio,
    RenderTarget,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Geometry,
        ResourceKind::Material,
        ResourceKind::Texture,
        ResourceKind::Light,
        ResourceKind::Audio,
        ResourceKind::RenderTarget,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    pub fn new(id: ResourceId, kind: ResourceKind) -> Self {
        Self { id, kind }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    /// Held by the session itself (background textures, audio, the target).
    Session,
    Node(NodeId),
}

#[derive(Debug)]
struct Entry {
    handle: ResourceHandle,
    owner: Owner,
    released: bool,
}

/// Outcome of a bulk release.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    /// Handles reachable from the graph that were never registered.
    pub skipped: usize,
    /// Releases that reported an error. They still count as released.
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Vec<Entry>,
    index: HashMap<ResourceHandle, usize>,
    registered: HashMap<ResourceKind, usize>,
    released: HashMap<ResourceKind, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly allocated resource. Registering the same handle
    /// twice keeps the first registration.
    pub fn register(&mut self, handle: ResourceHandle, owner: Owner) -> ResourceHandle {
        if self.index.contains_key(&handle) {
            warn!("{handle:?} registered twice, keeping the first owner");
            return handle;
        }
        self.index.insert(handle, self.entries.len());
        self.entries.push(Entry {
            handle,
            owner,
            released: false,
        });
        *self.registered.entry(handle.kind).or_default() += 1;
        handle
    }

    pub fn owner(&self, handle: ResourceHandle) -> Option<Owner> {
        self.index.get(&handle).map(|&idx| self.entries[idx].owner)
    }

    pub fn is_live(&self, handle: ResourceHandle) -> bool {
        self.index
            .get(&handle)
            .is_some_and(|&idx| !self.entries[idx].released)
    }

    /// Releases a single resource through `release`.
    ///
    /// Returns false without calling `release` when the handle is unknown or
    /// already released. A failing release is logged and the handle is still
    /// considered released.
    pub fn release<F>(&mut self, handle: ResourceHandle, release: F) -> bool
    where
        F: FnOnce(ResourceHandle) -> Result<(), SceneError>,
    {
        self.release_tracked(handle, release) != Released::No
    }

    fn release_tracked<F>(&mut self, handle: ResourceHandle, release: F) -> Released
    where
        F: FnOnce(ResourceHandle) -> Result<(), SceneError>,
    {
        let Some(&idx) = self.index.get(&handle) else {
            return Released::No;
        };
        if self.entries[idx].released {
            return Released::No;
        }
        self.entries[idx].released = true;
        *self.released.entry(handle.kind).or_default() += 1;
        match release(handle) {
            Ok(()) => {
                debug!("released {handle:?}");
                Released::Ok
            }
            Err(e) => {
                warn!("{e}");
                Released::WithError
            }
        }
    }

    /// Releases everything owned by `owner`, in registration order.
    pub fn release_owned_by<F>(&mut self, owner: Owner, mut release: F) -> ReleaseReport
    where
        F: FnMut(ResourceHandle) -> Result<(), SceneError>,
    {
        let handles: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.owner == owner && !e.released)
            .map(|e| e.handle)
            .collect();
        let mut report = ReleaseReport::default();
        for handle in handles {
            self.tally(&mut report, handle, &mut release);
        }
        report
    }

    /// Releases every live resource.
    ///
    /// The graph is walked first so node-owned resources go in node order.
    /// Whatever is left afterwards (session resources, leftovers of nodes that
    /// never made it into the graph) follows in registration order, and the
    /// render target always goes last.
    pub fn release_all<F>(&mut self, graph: &SceneGraph, mut release: F) -> ReleaseReport
    where
        F: FnMut(ResourceHandle) -> Result<(), SceneError>,
    {
        let mut report = ReleaseReport::default();

        let mut reachable = Vec::new();
        graph.walk_resources(&mut |handle| reachable.push(handle));
        for handle in reachable {
            if !self.index.contains_key(&handle) {
                warn!("{handle:?} is attached to the scene but was never registered");
                report.skipped += 1;
                continue;
            }
            self.tally(&mut report, handle, &mut release);
        }

        let (targets, rest): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .filter(|e| !e.released)
            .map(|e| e.handle)
            .partition(|h| h.kind == ResourceKind::RenderTarget);
        for handle in rest.into_iter().chain(targets) {
            self.tally(&mut report, handle, &mut release);
        }
        report
    }

    fn tally<F>(&mut self, report: &mut ReleaseReport, handle: ResourceHandle, release: &mut F)
    where
        F: FnMut(ResourceHandle) -> Result<(), SceneError>,
    {
        match self.release_tracked(handle, |h| release(h)) {
            Released::Ok => report.released += 1,
            Released::WithError => {
                report.released += 1;
                report.failed += 1;
            }
            Released::No => (),
        }
    }

    pub fn registered(&self, kind: ResourceKind) -> usize {
        self.registered.get(&kind).copied().unwrap_or(0)
    }

    pub fn released(&self, kind: ResourceKind) -> usize {
        self.released.get(&kind).copied().unwrap_or(0)
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.registered(kind) - self.released(kind)
    }

    pub fn live_total(&self) -> usize {
        self.entries.iter().filter(|e| !e.released).count()
    }

    pub fn registered_total(&self) -> usize {
        self.entries.len()
    }

    /// Handles still holding a resource.
    pub fn retained(&self) -> Vec<ResourceHandle> {
        self.entries
            .iter()
            .filter(|e| !e.released)
            .map(|e| e.handle)
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Released {
    No,
    Ok,
    WithError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::scene_graph::Environment;

    fn graph() -> SceneGraph {
        SceneGraph::new(Environment {
            clear_color: [0.0; 3],
            fog_density: 0.0,
        })
    }

    fn h(id: u64, kind: ResourceKind) -> ResourceHandle {
        ResourceHandle::new(ResourceId(id), kind)
    }

    #[test]
    fn release_is_at_most_once() {
        let mut registry = ResourceRegistry::new();
        let tex = registry.register(h(1, ResourceKind::Texture), Owner::Session);
        let mut calls = 0;
        assert!(registry.release(tex, |_| {
            calls += 1;
            Ok(())
        }));
        assert!(!registry.release(tex, |_| {
            calls += 1;
            Ok(())
        }));
        assert_eq!(calls, 1);
        assert_eq!(registry.released(ResourceKind::Texture), 1);
    }

    #[test]
    fn unknown_handles_are_ignored() {
        let mut registry = ResourceRegistry::new();
        assert!(!registry.release(h(9, ResourceKind::Light), |_| Ok(())));
        assert_eq!(registry.released(ResourceKind::Light), 0);
    }

    #[test]
    fn render_target_goes_last() {
        let mut registry = ResourceRegistry::new();
        registry.register(h(0, ResourceKind::RenderTarget), Owner::Session);
        registry.register(h(1, ResourceKind::Geometry), Owner::Session);
        registry.register(h(2, ResourceKind::Audio), Owner::Session);

        let mut order = Vec::new();
        let report = registry.release_all(&graph(), |handle| {
            order.push(handle.kind);
            Ok(())
        });
        assert_eq!(
            order,
            vec![
                ResourceKind::Geometry,
                ResourceKind::Audio,
                ResourceKind::RenderTarget
            ]
        );
        assert_eq!(report.released, 3);
        assert_eq!(registry.live_total(), 0);
    }

    #[test]
    fn failures_are_swallowed_and_counted() {
        let mut registry = ResourceRegistry::new();
        registry.register(h(1, ResourceKind::Material), Owner::Session);
        registry.register(h(2, ResourceKind::Material), Owner::Session);
        let report = registry.release_all(&graph(), |handle| {
            if handle.id == ResourceId(1) {
                Err(SceneError::ResourceReleaseFailure {
                    kind: handle.kind,
                    id: handle.id.0,
                    reason: "context already gone".into(),
                })
            } else {
                Ok(())
            }
        });
        assert_eq!(report.released, 2);
        assert_eq!(report.failed, 1);
        assert!(registry.retained().is_empty());
    }

    #[test]
    fn release_by_owner_leaves_others() {
        let mut registry = ResourceRegistry::new();
        let mut g = graph();
        let node = g.reserve_id();
        registry.register(h(1, ResourceKind::Geometry), Owner::Node(node));
        registry.register(h(2, ResourceKind::Texture), Owner::Session);
        let report = registry.release_owned_by(Owner::Node(node), |_| Ok(()));
        assert_eq!(report.released, 1);
        assert_eq!(registry.retained(), vec![h(2, ResourceKind::Texture)]);
    }
}
