//! One run of the backdrop, from backend acquisition to teardown.
//!
//! A [`Session`] owns everything a running scene needs: the backend, the
//! scene graph, the resource registry, the render loop and outstanding asset
//! loads. It moves through [`LifecycleState`] exactly once; a torn down or
//! failed session is never reused.

use instant::{Duration, Instant};
use log::{debug, error, info, warn};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    backend::{RenderBackend, RenderTarget, ResourceId},
    command::{self, Command, CommandReceiver, CommandSender},
    composer::{SceneComposer, Subsystem},
    config::{SceneConfig, rgb},
    data_structures::{
        scene_graph::{Environment, SceneGraph},
        texture::DecodedImage,
    },
    error::SceneError,
    lifecycle::LifecycleState,
    quality::{DeviceCapabilities, QualityController, QualityLevel},
    render::{FrameStatus, RenderLoop},
    resources::{
        AssetEvent, AssetLoader, PendingAssets,
        audio::AudioTrack,
        registry::{Owner, ReleaseReport, ResourceHandle, ResourceKind, ResourceRegistry},
        texture::{Background, BackgroundVariant},
    },
};

pub struct Session<B: RenderBackend> {
    state: LifecycleState,
    config: SceneConfig,
    composer: SceneComposer,
    quality: QualityController,
    loader: AssetLoader,
    backend: Option<B>,
    target: RenderTarget,
    graph: SceneGraph,
    registry: ResourceRegistry,
    render_loop: RenderLoop,
    pending: PendingAssets,
    background: Background,
    audio: Option<(ResourceHandle, Box<dyn AudioTrack>)>,
    audio_enabled: bool,
    commands: CommandReceiver,
    sender: CommandSender,
}

fn running<'a, B>(
    state: LifecycleState,
    backend: &'a mut Option<B>,
    action: &'static str,
) -> Result<&'a mut B, SceneError> {
    match (state, backend.as_mut()) {
        (LifecycleState::Running, Some(backend)) => Ok(backend),
        _ => Err(SceneError::InvalidStateTransition { action, state }),
    }
}

impl<B: RenderBackend> Session<B> {
    pub fn new(config: SceneConfig, caps: DeviceCapabilities, loader: AssetLoader) -> Self {
        let (sender, commands) = command::channel();
        let environment = Environment {
            clear_color: rgb(config.environment.clear_color),
            fog_density: config.environment.fog_density,
        };
        Self {
            state: LifecycleState::Uninitialized,
            composer: SceneComposer::new(config.clone(), caps),
            quality: QualityController::new(caps, config.quality),
            loader,
            backend: None,
            target: RenderTarget::new(1, 1),
            graph: SceneGraph::new(environment),
            registry: ResourceRegistry::new(),
            render_loop: RenderLoop::new(&config, 1.0),
            pending: PendingAssets::default(),
            background: Background::new(&config.low_res_background),
            audio: None,
            audio_enabled: false,
            commands,
            sender,
            config,
        }
    }

    /// Acquires the backend, composes the scene, applies the initial quality
    /// and kicks off the asset loads.
    ///
    /// Without a surface, or if the backend cannot be acquired, the session
    /// ends up `Failed` with everything allocated so far released.
    pub async fn initialize(&mut self, surface: Option<B::Surface>) -> Result<(), SceneError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(SceneError::InvalidStateTransition {
                action: "initialize",
                state: self.state,
            });
        }
        self.state = LifecycleState::Initializing;
        info!("initializing scene session");

        match self.bring_up(surface).await {
            Ok(()) => {
                self.state = LifecycleState::Running;
                info!(
                    "scene running at {} quality with {} resources",
                    self.quality.level(),
                    self.registry.live_total()
                );
                Ok(())
            }
            Err(e) => {
                error!("scene initialization failed: {e}");
                let report = self.release_everything();
                if report.released > 0 {
                    info!(
                        "released {} resources left by the failed start",
                        report.released
                    );
                }
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn bring_up(&mut self, surface: Option<B::Surface>) -> Result<(), SceneError> {
        self.config.validate()?;
        let surface =
            surface.ok_or_else(|| SceneError::backend("no output surface to render into"))?;
        let backend = B::acquire(surface).await?;
        let backend = self.backend.insert(backend);

        self.registry.register(
            ResourceHandle::new(backend.render_target(), ResourceKind::RenderTarget),
            Owner::Session,
        );
        let (width, height) = backend.surface_size();
        self.target = RenderTarget::new(width, height);

        let seed = self
            .config
            .particle_seed
            .unwrap_or_else(|| instant::now().to_bits());
        let mut rng = StdRng::seed_from_u64(seed);
        self.graph = self
            .composer
            .compose(backend, &mut self.registry, &mut rng)?;

        let level = self.quality.level();
        self.quality
            .apply(level, backend, &mut self.graph, &mut self.target)?;
        self.render_loop.set_aspect(self.target.aspect());

        self.pending.request_background(
            &self.loader,
            BackgroundVariant::LowRes,
            &self.config.low_res_background,
        );
        if let Some(path) = &self.config.high_res_background {
            self.pending
                .request_background(&self.loader, BackgroundVariant::HighRes, path);
        }
        if let Some(path) = &self.config.model_path {
            self.pending.request_model(&self.loader, path);
        }
        if let Some(path) = &self.config.audio_path {
            match self.loader.load_audio(path, self.config.audio_volume) {
                Ok(track) => {
                    let handle = self.registry.register(
                        ResourceHandle::new(ResourceId(0), ResourceKind::Audio),
                        Owner::Session,
                    );
                    self.audio = Some((handle, track));
                    self.pending.record_audio(path, true);
                }
                Err(e) => {
                    warn!("{e}");
                    self.pending.record_audio(path, false);
                }
            }
        }
        Ok(())
    }

    /// Runs one frame: queued commands, finished loads, then the render tick.
    pub fn frame(&mut self, now: Instant) -> FrameStatus {
        if self.state != LifecycleState::Running {
            return FrameStatus::Skipped;
        }
        for command in command::drain(&mut self.commands) {
            if let Err(e) = self.handle(command) {
                warn!("{e}");
            }
        }
        for event in self.pending.poll_ready() {
            self.apply_asset(event);
        }
        let Some(backend) = self.backend.as_mut() else {
            return FrameStatus::Skipped;
        };
        let profile = self.quality.profile();
        self.render_loop
            .tick(now, &self.graph, &profile, backend)
    }

    pub fn handle(&mut self, command: Command) -> Result<(), SceneError> {
        debug!("command {command:?}");
        match command {
            Command::SetQuality(level) => self.set_quality(level),
            Command::SetSubsystemEnabled { subsystem, enabled } => {
                self.set_subsystem_enabled(subsystem, enabled)
            }
            Command::SetAudioEnabled(enabled) => self.set_audio_enabled(enabled),
            Command::FocusCamera => self.focus_camera(),
        }
    }

    pub fn set_quality(&mut self, level: QualityLevel) -> Result<(), SceneError> {
        let backend = running(self.state, &mut self.backend, "change the quality of")?;
        self.quality
            .apply(level, backend, &mut self.graph, &mut self.target)
    }

    /// Re-applies the current level so a changed device pixel ratio is
    /// picked up, e.g. after the window moved to another monitor.
    pub fn rescale(&mut self) -> Result<(), SceneError> {
        self.set_quality(self.quality.level())
    }

    pub fn set_subsystem_enabled(
        &mut self,
        subsystem: Subsystem,
        enabled: bool,
    ) -> Result<(), SceneError> {
        let backend = running(self.state, &mut self.backend, "toggle a subsystem of")?;
        self.composer.apply_visibility(
            subsystem,
            enabled,
            &mut self.graph,
            &mut self.quality,
            backend,
        );
        Ok(())
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) -> Result<(), SceneError> {
        running(self.state, &mut self.backend, "toggle audio of")?;
        self.audio_enabled = enabled;
        let Some((_, track)) = self.audio.as_mut() else {
            debug!("no audio track, ignoring toggle");
            return Ok(());
        };
        if enabled {
            if let Err(e) = track.play() {
                warn!("audio `{}` did not start: {e:#}", track.path());
            }
        } else {
            track.pause();
        }
        Ok(())
    }

    /// Tweens the camera to the configured focus point.
    pub fn focus_camera(&mut self) -> Result<(), SceneError> {
        let camera = &self.config.camera;
        let (target, duration) = (camera.focus_target, camera.focus_duration_ms);
        self.focus_camera_on(target, Some(Duration::from_millis(duration)))
    }

    /// Tweens the camera to `target`. A tween already running is replaced.
    pub fn focus_camera_on(
        &mut self,
        target: [f32; 3],
        duration: Option<Duration>,
    ) -> Result<(), SceneError> {
        running(self.state, &mut self.backend, "move the camera of")?;
        let duration = duration
            .unwrap_or_else(|| Duration::from_millis(self.config.camera.tween_duration_ms));
        self.render_loop.focus_camera(target, duration);
        Ok(())
    }

    /// Follows a change of the host surface size, in logical pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Ok(backend) = running(self.state, &mut self.backend, "resize") else {
            debug!("ignoring resize of a {:?} session", self.state);
            return;
        };
        if width == 0 || height == 0 {
            return;
        }
        self.target.resize(width, height);
        backend.set_viewport(self.target.viewport());
        self.render_loop.set_aspect(self.target.aspect());
    }

    /// Stops the loop and releases every resource. Idempotent.
    pub fn teardown(&mut self) -> Option<ReleaseReport> {
        match self.state {
            LifecycleState::Running | LifecycleState::Initializing => {
                info!("tearing down scene session");
                self.render_loop.cancel();
                let report = self.release_everything();
                self.state = LifecycleState::TornDown;
                info!(
                    "teardown released {} resources ({} failed)",
                    report.released, report.failed
                );
                Some(report)
            }
            state => {
                debug!("teardown of a {state:?} session is a no-op");
                None
            }
        }
    }

    fn release_everything(&mut self) -> ReleaseReport {
        self.pending.cancel_all();
        if let Some(backend) = self.backend.as_mut() {
            backend.set_background(None);
        }
        let backend = &mut self.backend;
        let audio = &mut self.audio;
        let report = self
            .registry
            .release_all(&self.graph, |handle| match handle.kind {
                ResourceKind::Audio => {
                    if let Some((_, track)) = audio.as_mut() {
                        track.release();
                    }
                    Ok(())
                }
                ResourceKind::RenderTarget => {
                    if let Some(backend) = backend.as_mut() {
                        backend.lose_context();
                    }
                    Ok(())
                }
                kind => match backend.as_mut() {
                    Some(backend) => backend.dispose(handle.id).map_err(|e| {
                        SceneError::ResourceReleaseFailure {
                            kind,
                            id: handle.id.0,
                            reason: e.to_string(),
                        }
                    }),
                    None => Ok(()),
                },
            });
        self.graph.clear();
        self.background.reset();
        report
    }

    fn apply_asset(&mut self, event: AssetEvent) {
        match event {
            AssetEvent::Background {
                variant,
                path,
                image: Ok(image),
            } => self.show_background(variant, &path, &image),
            AssetEvent::Background {
                variant: BackgroundVariant::LowRes,
                image: Err(e),
                ..
            } => warn!("{e}; background stays on the clear colour"),
            AssetEvent::Background { image: Err(e), .. } => warn!(
                "{e}; keeping the {} background `{}`",
                self.background.variant(),
                self.background.path()
            ),
            AssetEvent::Model {
                model: Some(model), ..
            } => {
                let Some(backend) = self.backend.as_mut() else {
                    return;
                };
                let shadows = self.quality.shadows_active();
                if let Err(e) = self.composer.insert_model(
                    &mut self.graph,
                    backend,
                    &mut self.registry,
                    &model,
                    shadows,
                ) {
                    warn!("model `{}` could not be attached: {e}", model.source);
                }
            }
            AssetEvent::Model { model: None, path } => {
                debug!("continuing without model `{path}`");
            }
        }
    }

    fn show_background(&mut self, variant: BackgroundVariant, path: &str, image: &DecodedImage) {
        if !self.background.accepts(variant) {
            debug!("ignoring late {variant} background `{path}`");
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.create_texture(image) {
            Ok(id) => {
                let handle = self
                    .registry
                    .register(ResourceHandle::new(id, ResourceKind::Texture), Owner::Session);
                backend.set_background(Some(id));
                if let Some(previous) = self.background.swap(variant, path, handle) {
                    self.registry
                        .release(previous, |h| backend.dispose(h.id));
                }
                info!("{variant} background `{path}` shown");
            }
            Err(e) => warn!("background `{path}` could not be uploaded: {e}"),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// A handle for queuing commands from elsewhere, e.g. page callbacks.
    pub fn commands(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    pub fn render_loop_mut(&mut self) -> &mut RenderLoop {
        &mut self.render_loop
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn pending(&self) -> &PendingAssets {
        &self.pending
    }

    pub fn audio(&self) -> Option<&dyn AudioTrack> {
        self.audio.as_ref().map(|(_, track)| track.as_ref())
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }
}

impl<B: RenderBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.teardown();
        }
    }
}
