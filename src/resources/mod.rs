//! Asset loading: where bytes come from, how they are decoded and how loads
//! that outlive a frame are tracked.
//!
//! Loads never retry. A failed image or model is logged once and reported
//! through [`AssetEvent`]; the session decides how to degrade.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    rc::Rc,
    task::{Context, Poll},
};

use futures::{
    FutureExt, StreamExt,
    channel::oneshot,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use log::{info, warn};

use crate::{
    data_structures::{model::ModelData, texture::DecodedImage},
    error::{AssetKind, SceneError},
    resources::{audio::AudioTrack, texture::BackgroundVariant},
};

pub mod audio;
pub mod gltf_loader;
pub mod mesh;
pub mod registry;
pub mod texture;

/// Anything that can hand out the raw bytes of an asset path.
pub trait AssetSource {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>>;
}

/// Resolves `relative` against the directory of `base`.
pub(crate) fn resolve_relative(base: &str, relative: &str) -> String {
    if relative.starts_with('/') || relative.contains("://") {
        return relative.to_string();
    }
    match base.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{relative}"),
        None => relative.to_string(),
    }
}

/// Reads assets from a directory on disk.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FsAssets {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FsAssets {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for FsAssets {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let full = self.root.join(path);
        async move {
            // blocking read, polled outside of any runtime
            let data = std::fs::read(&full)
                .map_err(|e| anyhow::anyhow!("{}: {e}", full.display()))?;
            Ok(data)
        }
        .boxed_local()
    }
}

/// Fetches assets over http relative to the page origin.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug)]
pub struct HttpAssets {
    base: reqwest::Url,
}

#[cfg(target_arch = "wasm32")]
impl HttpAssets {
    pub fn from_origin() -> anyhow::Result<Self> {
        let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
        let origin = window
            .location()
            .origin()
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let base = reqwest::Url::parse(&format!("{origin}/"))?;
        Ok(Self { base })
    }

    fn format_url(&self, file_name: &str) -> anyhow::Result<reqwest::Url> {
        Ok(self.base.join(file_name)?)
    }
}

#[cfg(target_arch = "wasm32")]
impl AssetSource for HttpAssets {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let url = self.format_url(path);
        async move {
            let url = url?;
            let data = reqwest::get(url)
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec();
            Ok(data)
        }
        .boxed_local()
    }
}

#[derive(Default)]
struct MemoryInner {
    files: HashMap<String, Vec<u8>>,
    held: HashSet<String>,
    waiting: HashMap<String, Vec<oneshot::Sender<()>>>,
    fetches: Vec<String>,
}

/// In-memory asset store.
///
/// Paths can be held back with [`MemoryAssets::hold`] to simulate slow
/// network loads; held fetches complete once [`MemoryAssets::release`] is
/// called. Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryAssets {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.inner.borrow_mut().files.insert(path.to_string(), bytes);
    }

    pub fn hold(&self, path: &str) {
        self.inner.borrow_mut().held.insert(path.to_string());
    }

    pub fn release(&self, path: &str) {
        let mut inner = self.inner.borrow_mut();
        inner.held.remove(path);
        for tx in inner.waiting.remove(path).unwrap_or_default() {
            let _ = tx.send(());
        }
    }

    /// Paths fetched so far, in request order.
    pub fn fetches(&self) -> Vec<String> {
        self.inner.borrow().fetches.clone()
    }
}

impl fmt::Debug for MemoryAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryAssets")
            .field("files", &inner.files.keys().collect::<Vec<_>>())
            .field("held", &inner.held)
            .finish()
    }
}

impl AssetSource for MemoryAssets {
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, anyhow::Result<Vec<u8>>> {
        let gate = {
            let mut inner = self.inner.borrow_mut();
            inner.fetches.push(path.to_string());
            if inner.held.contains(path) {
                let (tx, rx) = oneshot::channel();
                inner.waiting.entry(path.to_string()).or_default().push(tx);
                Some(rx)
            } else {
                None
            }
        };
        let inner = self.inner.clone();
        let path = path.to_string();
        async move {
            if let Some(rx) = gate {
                rx.await
                    .map_err(|_| anyhow::anyhow!("`{path}` was dropped while held"))?;
            }
            inner
                .borrow()
                .files
                .get(&path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("`{path}` not found"))
        }
        .boxed_local()
    }
}

/// Turns paths into decoded assets.
#[derive(Clone)]
pub struct AssetLoader {
    source: Rc<dyn AssetSource>,
}

impl fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AssetLoader")
    }
}

impl AssetLoader {
    pub fn new(source: impl AssetSource + 'static) -> Self {
        Self {
            source: Rc::new(source),
        }
    }

    pub fn load_image(
        &self,
        path: &str,
    ) -> LocalBoxFuture<'static, Result<DecodedImage, SceneError>> {
        let fetch = self.source.fetch(path);
        let path = path.to_string();
        async move {
            let bytes = fetch
                .await
                .map_err(|e| SceneError::asset(AssetKind::Image, &path, e))?;
            DecodedImage::from_bytes(&bytes, &path)
                .map_err(|e| SceneError::asset(AssetKind::Image, &path, format!("{e:#}")))
        }
        .boxed_local()
    }

    /// Loads a .glb, .gltf or .obj model. Failures are logged and become
    /// `None`; a missing model never affects the rest of the scene.
    pub fn load_model(&self, path: &str) -> LocalBoxFuture<'static, Option<ModelData>> {
        let source = self.source.clone();
        let path = path.to_string();
        async move {
            let result = async {
                let bytes = source.fetch(&path).await?;
                let lower = path.to_ascii_lowercase();
                if lower.ends_with(".obj") {
                    mesh::load_obj(&bytes, &path, source.clone()).await
                } else {
                    gltf_loader::load_gltf(&bytes, &path, source.clone()).await
                }
            }
            .await;
            match result {
                Ok(model) if model.meshes.is_empty() => {
                    warn!("model `{path}` contains no triangle meshes, skipping it");
                    None
                }
                Ok(model) => {
                    info!("model `{path}` loaded with {} meshes", model.meshes.len());
                    Some(model)
                }
                Err(e) => {
                    warn!(
                        "{}",
                        SceneError::asset(AssetKind::Model, &path, format!("{e:#}"))
                    );
                    None
                }
            }
        }
        .boxed_local()
    }

    /// Opens the looping audio track. The browser streams `path` itself;
    /// native builds read the bytes up front and play silently when they
    /// are not available right away.
    pub fn load_audio(&self, path: &str, volume: f32) -> Result<Box<dyn AudioTrack>, SceneError> {
        #[cfg(target_arch = "wasm32")]
        let track = audio::open_track(path, volume);
        #[cfg(not(target_arch = "wasm32"))]
        let track = {
            let bytes = match self.source.fetch(path).now_or_never() {
                Some(Ok(bytes)) => Some(bytes),
                Some(Err(e)) => {
                    warn!("audio `{path}` is unavailable: {e:#}");
                    None
                }
                None => {
                    warn!("audio `{path}` is not ready, playing silently");
                    None
                }
            };
            audio::open_track(path, volume, bytes)
        };
        track.map_err(|e| SceneError::asset(AssetKind::Audio, path, format!("{e:#}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Resolved,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub path: String,
    pub state: RequestState,
}

/// A load that finished since the last poll.
#[derive(Debug)]
pub enum AssetEvent {
    Background {
        variant: BackgroundVariant,
        path: String,
        image: Result<DecodedImage, SceneError>,
    },
    Model {
        path: String,
        model: Option<ModelData>,
    },
}

impl AssetEvent {
    fn state(&self) -> RequestState {
        match self {
            AssetEvent::Background { image: Ok(_), .. } | AssetEvent::Model { model: Some(_), .. } => {
                RequestState::Resolved
            }
            _ => RequestState::Failed,
        }
    }
}

/// Loads in flight, polled without blocking once per frame.
#[derive(Default)]
pub struct PendingAssets {
    requests: Vec<AssetRequest>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, (usize, AssetEvent)>>,
}

impl fmt::Debug for PendingAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAssets")
            .field("requests", &self.requests)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl PendingAssets {
    fn track(&mut self, kind: AssetKind, path: &str, state: RequestState) -> usize {
        self.requests.push(AssetRequest {
            kind,
            path: path.to_string(),
            state,
        });
        self.requests.len() - 1
    }

    pub fn request_background(
        &mut self,
        loader: &AssetLoader,
        variant: BackgroundVariant,
        path: &str,
    ) {
        let idx = self.track(AssetKind::Image, path, RequestState::Pending);
        let load = loader.load_image(path);
        let path = path.to_string();
        self.in_flight.push(
            async move {
                let image = load.await;
                (
                    idx,
                    AssetEvent::Background {
                        variant,
                        path,
                        image,
                    },
                )
            }
            .boxed_local(),
        );
    }

    pub fn request_model(&mut self, loader: &AssetLoader, path: &str) {
        let idx = self.track(AssetKind::Model, path, RequestState::Pending);
        let load = loader.load_model(path);
        let path = path.to_string();
        self.in_flight.push(
            async move {
                let model = load.await;
                (idx, AssetEvent::Model { path, model })
            }
            .boxed_local(),
        );
    }

    /// Audio streams from its element, so its request settles immediately.
    pub fn record_audio(&mut self, path: &str, opened: bool) {
        let state = if opened {
            RequestState::Resolved
        } else {
            RequestState::Failed
        };
        self.track(AssetKind::Audio, path, state);
    }

    pub fn requests(&self) -> &[AssetRequest] {
        &self.requests
    }

    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    /// Collects every load that has completed, without waiting.
    pub fn poll_ready(&mut self) -> Vec<AssetEvent> {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let mut ready = Vec::new();
        while let Poll::Ready(Some((idx, event))) = self.in_flight.poll_next_unpin(&mut cx) {
            if let Some(request) = self.requests.get_mut(idx) {
                request.state = event.state();
            }
            ready.push(event);
        }
        ready
    }

    /// Drops every outstanding load. Their results are never delivered.
    pub fn cancel_all(&mut self) {
        if !self.in_flight.is_empty() {
            info!("dropping {} outstanding asset loads", self.in_flight.len());
        }
        self.in_flight.clear();
    }
}
