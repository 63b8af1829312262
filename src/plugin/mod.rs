//! Plugin Module
//!
//! Provides the pluggable core:
//! - Base plugin contract and health reporting
//! - Chat and image-analysis capabilities
//! - Capability-indexed registry with lifecycle management

pub mod capability;
pub mod chat;
pub mod image;
pub mod interface;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::{Capability, CapabilityKind, CapabilityViews, ChatCapability, ImageAnalysisCapability};
pub use chat::{ChatContext, ChatHelp, ChatPlugin, ChatResponse, ChatResponseType};
pub use image::{
    ImageAnalysisContext, ImageAnalysisPlugin, ImageAnalysisResponse, ImageAnalysisType, ImageFileInfo,
};
pub use interface::{HealthStatus, Plugin, PluginError, PluginInfo, PluginResult};
pub use registry::{PluginRegistry, RegisteredPlugin};
