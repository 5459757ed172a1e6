//! Error taxonomy shared by every component of the backdrop core.
//!
//! Only [`SceneError::BackendUnavailable`] and
//! [`SceneError::InvalidStateTransition`] ever reach the caller of a session.
//! Asset failures stop at the asset loader and release failures are swallowed
//! by the registry, so both only show up in logs and reports.

use std::fmt;

use thiserror::Error;

use crate::{lifecycle::LifecycleState, resources::registry::ResourceKind};

/// Category of an asset request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Model,
    Audio,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Image => f.write_str("image"),
            AssetKind::Model => f.write_str("model"),
            AssetKind::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    /// The rendering backend or the output surface could not be acquired.
    #[error("rendering backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to load {kind} asset `{path}`: {reason}")]
    AssetLoadFailed {
        kind: AssetKind,
        path: String,
        reason: String,
    },

    /// A lifecycle operation was issued in a state that does not allow it.
    #[error("cannot {action} a session that is {state:?}")]
    InvalidStateTransition {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("failed to release {kind:?} resource #{id}: {reason}")]
    ResourceReleaseFailure {
        kind: ResourceKind,
        id: u64,
        reason: String,
    },

    #[error("invalid scene configuration: {0}")]
    InvalidConfig(String),
}

impl SceneError {
    pub(crate) fn asset(kind: AssetKind, path: &str, reason: impl fmt::Display) -> Self {
        SceneError::AssetLoadFailed {
            kind,
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn backend(reason: impl fmt::Display) -> Self {
        SceneError::BackendUnavailable(reason.to_string())
    }

    /// True for errors that abort initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SceneError::BackendUnavailable(_))
    }
}

/// Text shown in place of the scene when the backend could not be brought up.
///
/// A failed backend must never leave a silently blank surface behind, so the
/// host replaces the canvas with this message.
pub fn fallback_message(err: &SceneError) -> String {
    match err {
        SceneError::BackendUnavailable(reason) => format!(
            "The 3D scene could not be started ({reason}). Check your connection or try a browser with WebGL support."
        ),
        other => format!("The 3D scene could not be started: {other}"),
    }
}
