//! Session lifecycle.
//!
//! ```text
//! Uninitialized -> Initializing -> Running -> TornDown
//!                        |
//!                        +-------> Failed
//! ```
//!
//! A session walks this graph once. [`SceneHost`] is what a page keeps
//! around: it holds at most one live session and builds a fresh one when the
//! scene is mounted again after a teardown.

use instant::Instant;
use log::{debug, info};

use crate::{
    backend::RenderBackend,
    command::CommandSender,
    config::SceneConfig,
    error::SceneError,
    quality::DeviceCapabilities,
    render::FrameStatus,
    resources::{AssetLoader, registry::ReleaseReport},
    session::Session,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    TornDown,
    Failed,
}

impl LifecycleState {
    /// Initializing or running: the session may hold resources.
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Initializing | LifecycleState::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::TornDown | LifecycleState::Failed)
    }
}

/// Owns the current session of a mounted scene.
pub struct SceneHost<B: RenderBackend> {
    session: Option<Session<B>>,
}

impl<B: RenderBackend> Default for SceneHost<B> {
    fn default() -> Self {
        Self { session: None }
    }
}

impl<B: RenderBackend> SceneHost<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and initializes a new session.
    ///
    /// Rejected while a previous session is still active. A failed start
    /// leaves the failed session in place so its state can be inspected.
    pub async fn start(
        &mut self,
        config: SceneConfig,
        caps: DeviceCapabilities,
        loader: AssetLoader,
        surface: Option<B::Surface>,
    ) -> Result<CommandSender, SceneError> {
        if let Some(current) = &self.session {
            if current.state().is_active() {
                return Err(SceneError::InvalidStateTransition {
                    action: "start a second session alongside",
                    state: current.state(),
                });
            }
        }
        let session = self.session.insert(Session::new(config, caps, loader));
        session.initialize(surface).await?;
        Ok(session.commands())
    }

    /// Takes over a session initialized elsewhere, e.g. on a spawned task.
    /// Whatever session was there before is torn down first.
    pub fn adopt(&mut self, session: Session<B>) {
        if let Some(mut previous) = self.session.replace(session) {
            if previous.state().is_active() {
                debug!("replacing an active session");
                previous.teardown();
            }
        }
    }

    pub fn session(&self) -> Option<&Session<B>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<B>> {
        self.session.as_mut()
    }

    pub fn state(&self) -> LifecycleState {
        self.session
            .as_ref()
            .map_or(LifecycleState::Uninitialized, Session::state)
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn frame(&mut self, now: Instant) -> FrameStatus {
        match self.session.as_mut() {
            Some(session) => session.frame(now),
            None => FrameStatus::Skipped,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(session) = self.session.as_mut() {
            session.resize(width, height);
        }
    }

    /// Tears the current session down. Safe to call any number of times.
    pub fn shutdown(&mut self) -> Option<ReleaseReport> {
        let report = self.session.as_mut()?.teardown();
        if let Some(report) = &report {
            info!("scene unmounted, {} resources released", report.released);
        }
        report
    }
}
