//! Progressive background image.
//!
//! The low resolution variant is shown as soon as it decodes and is replaced by
//! the high resolution one if and when that arrives. The background never
//! steps back down, no matter the order the two loads complete in.

use std::fmt;

use crate::resources::registry::ResourceHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackgroundVariant {
    LowRes,
    HighRes,
}

impl fmt::Display for BackgroundVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundVariant::LowRes => f.write_str("low-res"),
            BackgroundVariant::HighRes => f.write_str("high-res"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Shown {
    variant: BackgroundVariant,
    path: String,
    texture: ResourceHandle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Background {
    /// Path assigned up front, before any texture exists.
    assigned: String,
    shown: Option<Shown>,
}

impl Background {
    pub fn new(low_res_path: &str) -> Self {
        Self {
            assigned: low_res_path.to_string(),
            shown: None,
        }
    }

    /// Path of the image the background currently stands for.
    pub fn path(&self) -> &str {
        self.shown
            .as_ref()
            .map_or(self.assigned.as_str(), |s| s.path.as_str())
    }

    pub fn variant(&self) -> BackgroundVariant {
        self.shown
            .as_ref()
            .map_or(BackgroundVariant::LowRes, |s| s.variant)
    }

    pub fn texture(&self) -> Option<ResourceHandle> {
        self.shown.as_ref().map(|s| s.texture)
    }

    /// False when `variant` would downgrade what is already displayed.
    pub fn accepts(&self, variant: BackgroundVariant) -> bool {
        self.shown.as_ref().is_none_or(|s| variant >= s.variant)
    }

    /// Displays a new texture and hands back the one it replaces.
    pub fn swap(
        &mut self,
        variant: BackgroundVariant,
        path: &str,
        texture: ResourceHandle,
    ) -> Option<ResourceHandle> {
        let previous = self.shown.replace(Shown {
            variant,
            path: path.to_string(),
            texture,
        });
        previous.map(|s| s.texture)
    }

    /// Forgets the displayed texture, which has been released elsewhere.
    pub fn reset(&mut self) {
        self.shown = None;
    }
}
