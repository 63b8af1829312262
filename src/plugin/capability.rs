//! Capability tags and typed capability views.
//!
//! A plugin declares the capabilities it satisfies through the
//! `as_*` views on [`Plugin`]. The registry resolves those views once at
//! registration time and indexes the plugin under each matching tag.

use crate::plugin::chat::ChatPlugin;
use crate::plugin::image::ImageAnalysisPlugin;
use crate::plugin::interface::Plugin;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Named operation set a plugin may implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Conversational message handling
    Chat,
    /// Image analysis jobs
    ImageAnalysis,
}

impl Capability {
    /// Every known capability.
    pub const ALL: [Capability; 2] = [Capability::Chat, Capability::ImageAnalysis];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Chat => write!(f, "chat"),
            Capability::ImageAnalysis => write!(f, "image_analysis"),
        }
    }
}

/// Capability views resolved from a plugin instance.
#[derive(Clone, Default)]
pub struct CapabilityViews {
    /// Chat view, if implemented
    pub chat: Option<Arc<dyn ChatPlugin>>,
    /// Image-analysis view, if implemented
    pub image_analysis: Option<Arc<dyn ImageAnalysisPlugin>>,
}

impl CapabilityViews {
    /// Resolve the views a plugin declares.
    pub fn of(plugin: &Arc<dyn Plugin>) -> Self {
        Self {
            chat: Arc::clone(plugin).as_chat(),
            image_analysis: Arc::clone(plugin).as_image_analysis(),
        }
    }

    /// Whether the given capability is present.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Chat => self.chat.is_some(),
            Capability::ImageAnalysis => self.image_analysis.is_some(),
        }
    }

    /// Capabilities present, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }
}

/// Compile-time capability marker used for typed registry lookups.
pub trait CapabilityKind {
    /// Trait object handed back by lookups.
    type Target: ?Sized + Send + Sync;

    /// Runtime tag for this marker.
    const CAPABILITY: Capability;

    /// Pick this capability's view.
    fn select(views: &CapabilityViews) -> Option<Arc<Self::Target>>;
}

/// Marker for [`ChatPlugin`] lookups.
pub struct ChatCapability;

impl CapabilityKind for ChatCapability {
    type Target = dyn ChatPlugin;
    const CAPABILITY: Capability = Capability::Chat;

    fn select(views: &CapabilityViews) -> Option<Arc<Self::Target>> {
        views.chat.clone()
    }
}

/// Marker for [`ImageAnalysisPlugin`] lookups.
pub struct ImageAnalysisCapability;

impl CapabilityKind for ImageAnalysisCapability {
    type Target = dyn ImageAnalysisPlugin;
    const CAPABILITY: Capability = Capability::ImageAnalysis;

    fn select(views: &CapabilityViews) -> Option<Arc<Self::Target>> {
        views.image_analysis.clone()
    }
}
