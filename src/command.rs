//! Commands the page sends to a running scene.
//!
//! Senders are fire-and-forget: a command is queued and applied at the start
//! of the next frame. Sending after the session is gone is silently dropped.

use futures::channel::mpsc;
use log::debug;

use crate::{composer::Subsystem, quality::QualityLevel};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetQuality(QualityLevel),
    SetSubsystemEnabled { subsystem: Subsystem, enabled: bool },
    SetAudioEnabled(bool),
    /// Tween the camera to the configured focus point.
    FocusCamera,
}

#[derive(Clone, Debug)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded();
    (CommandSender { tx }, rx)
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        if let Err(e) = self.tx.unbounded_send(command) {
            debug!("scene is gone, dropping {:?}", e.into_inner());
        }
    }

    pub fn set_quality(&self, level: QualityLevel) {
        self.send(Command::SetQuality(level));
    }

    pub fn set_subsystem_enabled(&self, subsystem: Subsystem, enabled: bool) {
        self.send(Command::SetSubsystemEnabled { subsystem, enabled });
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.send(Command::SetAudioEnabled(enabled));
    }

    pub fn focus_camera(&self) {
        self.send(Command::FocusCamera);
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Takes every queued command without waiting.
pub fn drain(rx: &mut CommandReceiver) -> Vec<Command> {
    let mut out = Vec::new();
    while let Ok(Some(command)) = rx.try_next() {
        out.push(command);
    }
    out
}
