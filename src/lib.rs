//! backdrop-ngin
//!
//! Lifecycle and resource-management core for a real-time 3D backdrop as it
//! appears behind a landing page hero section. Runs natively and in the
//! browser through WASM. The crate brings a renderer up against a surface,
//! composes a small scene (ground, lights, a drifting particle field and an
//! optional model), streams in progressive assets, adapts to the device and
//! releases every GPU resource it allocated when the scene goes away.
//!
//! High-level modules
//! - `backend`: the renderer abstraction plus a recording headless backend
//! - `camera`: camera, camera tweens and damped orbit controls
//! - `command`: fire-and-forget commands from the page into a running scene
//! - `composer`: builds the scene graph and toggles its subsystems
//! - `config`: every tunable, loadable from JSON
//! - `context`: the wgpu backend that owns device, queue and pipelines
//! - `data_structures`: meshes, transforms, textures and the scene graph
//! - `flow`: the winit event loop driving a session on a window or canvas
//! - `lifecycle`: session states and the host that restarts sessions
//! - `pipelines`: render pipelines and their WGSL shaders
//! - `quality`: quality levels and device capability heuristics
//! - `render`: the per-frame scheduler
//! - `resources`: asset loading, the resource registry, backgrounds and audio
//! - `session`: one run of the scene from initialization to teardown
//!

pub mod backend;
pub mod camera;
pub mod command;
pub mod composer;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod pipelines;
pub mod quality;
pub mod render;
pub mod resources;
pub mod session;

// Re-exports commonly used types for convenience in downstream code.
pub use backend::{RenderBackend, ResourceId, headless::HeadlessBackend};
pub use command::{Command, CommandSender};
pub use composer::Subsystem;
pub use config::SceneConfig;
pub use context::WgpuBackend;
pub use error::SceneError;
pub use lifecycle::{LifecycleState, SceneHost};
pub use quality::{DeviceCapabilities, QualityLevel};
pub use resources::AssetLoader;
pub use session::Session;
