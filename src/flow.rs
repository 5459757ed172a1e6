//! Window and event loop glue.
//!
//! [`run`] opens a window (natively) or binds the page canvas (on the web),
//! brings a [`Session`] up against it and drives one frame per redraw until
//! the window closes or the page unmounts the scene.
//!
//! # Lifecycle Flow
//!
//! 1. `resumed` creates the window and initializes a session, blocking on the
//!    native runtime or on a `spawn_local` task in the browser
//! 2. the initialized session is handed to the [`SceneHost`]
//! 3. every `RedrawRequested` runs [`SceneHost::frame`] and schedules the next
//! 4. closing the window tears the session down and exits the loop
//!
//! In the browser the loop outlives the session. `unmount` (also sent when
//! the page is hidden or unloaded) tears the session down and a later
//! `mount` starts a new one on a fresh canvas through the same loop.
//!
//! If the backend cannot be brought up the canvas is replaced by a fallback
//! message instead of being left blank.

use std::sync::Arc;

use instant::Instant;
use log::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::Window,
};

use crate::{
    command::Command,
    composer::Subsystem,
    config::SceneConfig,
    context::WgpuBackend,
    error::{SceneError, fallback_message},
    lifecycle::SceneHost,
    quality::{DeviceCapabilities, QualityLevel},
    render::FrameStatus,
    resources::AssetLoader,
    session::Session,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Radians of orbit per pixel of pointer drag.
const DRAG_SPEED: f32 = 0.005;

pub(crate) enum SceneEvent {
    /// A session finished initializing on a spawned task.
    #[allow(dead_code)]
    Initialized {
        mount: u64,
        session: Session<WgpuBackend>,
    },
    /// The page mounted the scene again after an unmount.
    #[allow(dead_code)]
    Mount(SceneConfig),
    /// The page asked to take the scene down.
    #[allow(dead_code)]
    Unmount,
}

impl std::fmt::Debug for SceneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { mount, session } => f
                .debug_struct("Initialized")
                .field("mount", mount)
                .field("state", &session.state())
                .finish(),
            Self::Mount(_) => f.write_str("Mount"),
            Self::Unmount => f.write_str("Unmount"),
        }
    }
}

/// Numbers mounts so a session that finishes starting after its mount was
/// withdrawn can be told apart from the current one.
#[derive(Debug, Default)]
struct Mounts {
    current: u64,
    live: bool,
}

impl Mounts {
    fn begin(&mut self) -> u64 {
        self.current += 1;
        self.live = true;
        self.current
    }

    fn withdraw(&mut self) {
        self.live = false;
    }

    fn is_current(&self, mount: u64) -> bool {
        self.live && mount == self.current
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: EventLoopProxy<SceneEvent>,
    config: SceneConfig,
    loader: AssetLoader,
    host: SceneHost<WgpuBackend>,
    window: Option<Arc<Window>>,
    started: bool,
    mounts: Mounts,
    dragging: bool,
    cursor: Option<(f64, f64)>,
}

impl App {
    fn new(
        event_loop: &EventLoop<SceneEvent>,
        config: SceneConfig,
        loader: AssetLoader,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(target_arch = "wasm32")]
        PROXY.with(|p| *p.borrow_mut() = Some(proxy.clone()));
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy,
            config,
            loader,
            host: SceneHost::new(),
            window: None,
            started: false,
            mounts: Mounts::default(),
            dragging: false,
            cursor: None,
        })
    }

    /// Creates the window, on the web bound to `#canvas`. A canvas that
    /// already backed a torn down session is swapped for a blank copy so the
    /// new session gets a fresh graphics context.
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("backdrop");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|w| w.document())
                .and_then(|d| d.get_element_by_id(CANVAS_ID));
            let Some(mut canvas) = canvas else {
                show_fallback(None, &SceneError::backend(format!("no #{CANVAS_ID} element")));
                return None;
            };
            if self.window.take().is_some() {
                match canvas.clone_node().and_then(|fresh| {
                    canvas.replace_with_with_node_1(&fresh)?;
                    Ok(fresh)
                }) {
                    Ok(fresh) => canvas = fresh.unchecked_into(),
                    Err(e) => warn!("could not replace the canvas, reusing it: {e:?}"),
                }
            }
            window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
        }

        match event_loop.create_window(window_attributes) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(e) => {
                show_fallback(None, &SceneError::backend(e));
                None
            }
        }
    }

    /// Builds a session from the current config and brings it up against
    /// `window`.
    fn start_session(&mut self, window: Arc<Window>) {
        let mount = self.mounts.begin();
        let mut session = Session::new(
            self.config.clone(),
            DeviceCapabilities::detect(),
            self.loader.clone(),
        );

        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Err(e) = self
                .async_runtime
                .block_on(session.initialize(Some(window)))
            {
                show_fallback(self.window.as_deref(), &e);
            }
            self.adopt(mount, session);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = session.initialize(Some(window)).await {
                    show_fallback(None, &e);
                }
                if proxy
                    .send_event(SceneEvent::Initialized { mount, session })
                    .is_err()
                {
                    warn!("event loop closed before the scene started");
                }
            });
        }
    }

    fn adopt(&mut self, mount: u64, mut session: Session<WgpuBackend>) {
        if !self.mounts.is_current(mount) {
            info!("scene was unmounted while starting");
            session.teardown();
            return;
        }
        #[cfg(target_arch = "wasm32")]
        COMMANDS.with(|c| *c.borrow_mut() = Some(session.commands()));
        self.host.adopt(session);
        self.fit_to_window();
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn fit_to_window(&mut self) {
        if let Some(window) = &self.window {
            let size: winit::dpi::LogicalSize<u32> =
                window.inner_size().to_logical(window.scale_factor());
            self.host.resize(size.width, size.height);
        }
    }

    fn unmount(&mut self) {
        self.mounts.withdraw();
        self.host.shutdown();
    }

    fn send(&mut self, command: Command) {
        if let Some(session) = self.host.session_mut() {
            if let Err(e) = session.handle(command) {
                warn!("{e}");
            }
        }
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Some(session) = self.host.session() else {
            return;
        };
        let graph = session.graph();
        let command = match &event.logical_key {
            Key::Character(c) => match c.as_str() {
                "1" => Command::SetQuality(QualityLevel::Low),
                "2" => Command::SetQuality(QualityLevel::Medium),
                "3" => Command::SetQuality(QualityLevel::High),
                "s" => Command::SetSubsystemEnabled {
                    subsystem: Subsystem::Shadows,
                    enabled: !session.quality().shadows_requested(),
                },
                "p" => Command::SetSubsystemEnabled {
                    subsystem: Subsystem::Particles,
                    enabled: !graph.particle_field().is_some_and(|f| f.motion_enabled),
                },
                "m" => Command::SetAudioEnabled(!session.audio_enabled()),
                "f" => Command::FocusCamera,
                _ => return,
            },
            Key::Named(NamedKey::Space) => Command::FocusCamera,
            _ => return,
        };
        self.send(command);
    }
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    static COMMANDS: std::cell::RefCell<Option<crate::command::CommandSender>> =
        const { std::cell::RefCell::new(None) };
    static PROXY: std::cell::RefCell<Option<EventLoopProxy<SceneEvent>>> =
        const { std::cell::RefCell::new(None) };
}

/// Replaces the scene with a readable message.
fn show_fallback(window: Option<&Window>, err: &SceneError) {
    let message = fallback_message(err);
    error!("{message}");

    #[cfg(target_arch = "wasm32")]
    {
        let _ = window;
        const FALLBACK_ID: &str = "canvas-wrap";

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let Some(wrap) = document.get_element_by_id(FALLBACK_ID) else {
            warn!("no #{FALLBACK_ID} element to show the fallback in");
            return;
        };
        wrap.set_inner_html("");
        match document.create_element("p") {
            Ok(note) => {
                note.set_class_name("webgl-fallback");
                note.set_text_content(Some(&message));
                if let Err(e) = wrap.append_child(&note) {
                    warn!("could not show the fallback: {e:?}");
                }
            }
            Err(e) => warn!("could not show the fallback: {e:?}"),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    if let Some(window) = window {
        window.set_title(&message);
    }
}

impl ApplicationHandler<SceneEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        if let Some(window) = self.create_window(event_loop) {
            self.start_session(window);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: SceneEvent) {
        match event {
            SceneEvent::Initialized { mount, session } => self.adopt(mount, session),
            SceneEvent::Mount(config) => {
                if self.host.is_active() {
                    warn!("scene is already mounted");
                    return;
                }
                info!("mounting the scene again");
                self.config = config;
                if let Some(window) = self.create_window(event_loop) {
                    self.start_session(window);
                }
            }
            SceneEvent::Unmount => self.unmount(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.unmount();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &self.window {
                    let size: winit::dpi::LogicalSize<u32> =
                        size.to_logical(window.scale_factor());
                    self.host.resize(size.width, size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("device pixel ratio is now {scale_factor}");
                if let Some(session) = self.host.session_mut() {
                    if let Err(e) = session.rescale() {
                        debug!("{e}");
                    }
                }
                self.fit_to_window();
            }
            WindowEvent::RedrawRequested => {
                if self.host.frame(Instant::now()) == FrameStatus::Rendered {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(&event),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::CursorMoved { position, .. } => {
                let last = self.cursor.replace((position.x, position.y));
                if let (true, Some((x, y)), Some(session)) =
                    (self.dragging, last, self.host.session_mut())
                {
                    let (dx, dy) = ((position.x - x) as f32, (position.y - y) as f32);
                    session
                        .render_loop_mut()
                        .controls_mut()
                        .rotate(-dx * DRAG_SPEED, -dy * DRAG_SPEED);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                if let Some(session) = self.host.session_mut() {
                    session
                        .render_loop_mut()
                        .controls_mut()
                        .dolly(0.95f32.powf(lines));
                }
            }
            _ => (),
        }
    }
}

/// Runs the backdrop until its window closes.
pub fn run(config: SceneConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        // a logger left over from an earlier mount keeps working
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            debug!("logger already initialized: {e}");
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    let loader = AssetLoader::new(crate::resources::FsAssets::new("."));
    #[cfg(target_arch = "wasm32")]
    let loader = AssetLoader::new(crate::resources::HttpAssets::from_origin()?);

    let event_loop: EventLoop<SceneEvent> = EventLoop::with_user_event().build()?;

    #[allow(unused_mut)]
    let mut app = App::new(&event_loop, config, loader)?;

    #[cfg(not(target_arch = "wasm32"))]
    event_loop.run_app(&mut app)?;

    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;

        unmount_on_page_exit()?;
        event_loop.spawn_app(app);
    }

    Ok(())
}

/// Takes the scene down when the page is hidden for good or unloaded.
#[cfg(target_arch = "wasm32")]
fn unmount_on_page_exit() -> anyhow::Result<()> {
    use wasm_bindgen::{JsCast, closure::Closure};

    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    for name in ["pagehide", "beforeunload"] {
        let closure = Closure::wrap(Box::new(move |event: web_sys::Event| {
            info!("{} fired, unmounting the scene", event.type_());
            unmount();
        }) as Box<dyn FnMut(web_sys::Event)>);
        window
            .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            .map_err(|e| anyhow::anyhow!("could not listen for {name}: {e:?}"))?;
        // lives as long as the page
        closure.forget();
    }
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn with_commands(f: impl FnOnce(&crate::command::CommandSender)) {
    COMMANDS.with(|c| match c.borrow().as_ref() {
        Some(commands) => f(commands),
        None => warn!("no scene is mounted"),
    });
}

#[cfg(target_arch = "wasm32")]
fn to_js(e: SceneError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Mounts the backdrop on `#canvas`. `config` is an optional JSON object
/// overriding [`SceneConfig`] fields.
///
/// The first call starts the event loop; later calls after an `unmount`
/// start a new session on the running loop.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn mount(config: Option<String>) -> Result<(), JsValue> {
    let config = match config {
        Some(json) => SceneConfig::from_json(&json).map_err(to_js)?,
        None => SceneConfig::default(),
    };
    match PROXY.with(|p| p.borrow().clone()) {
        Some(proxy) => proxy
            .send_event(SceneEvent::Mount(config))
            .map_err(|_| JsValue::from_str("the scene's event loop has stopped")),
        None => run(config).map_err(|e| JsValue::from_str(&format!("{e:#}"))),
    }
}

/// Tears the scene down. The event loop stays alive for a later `mount`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn unmount() {
    PROXY.with(|p| {
        if let Some(proxy) = p.borrow().as_ref() {
            if proxy.send_event(SceneEvent::Unmount).is_err() {
                warn!("scene already stopped");
            }
        }
    });
    COMMANDS.with(|c| c.borrow_mut().take());
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn set_quality(level: &str) -> Result<(), JsValue> {
    let level: QualityLevel = level.parse().map_err(to_js)?;
    with_commands(|c| c.set_quality(level));
    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn set_subsystem_enabled(subsystem: &str, enabled: bool) -> Result<(), JsValue> {
    let subsystem: Subsystem = subsystem.parse().map_err(to_js)?;
    with_commands(|c| c.set_subsystem_enabled(subsystem, enabled));
    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn set_audio_enabled(enabled: bool) {
    with_commands(|c| c.set_audio_enabled(enabled));
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn focus_camera() {
    with_commands(|c| c.focus_camera());
}
