//! Dispatch Module
//!
//! Services that pick one capable plugin per request:
//! - Chat dispatch with suggestion, help and status aggregation
//! - Image analysis dispatch with upload validation and batching

pub mod chat;
pub mod config;
pub mod image;

pub use chat::{ChatService, ChatStatus, NO_HANDLER_FOUND};
pub use config::{ChatConfig, DispatchConfig, ImageConfig};
pub use image::{
    AnalysisCapabilities, AnalysisTypeInfo, ImageAnalysisService, ImageHealthReport, ImagePluginCapabilities,
    ImagePluginHealth, ImageUpload,
};
