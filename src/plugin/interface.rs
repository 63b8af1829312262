//! Plugin interface definition.
//!
//! Defines the base contract every plugin implements. Specialised
//! capabilities (chat, image analysis) extend it in sibling modules.

use crate::plugin::chat::ChatPlugin;
use crate::plugin::image::ImageAnalysisPlugin;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Plugin information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin name
    pub name: String,
    /// Semantic version
    pub version: String,
    /// Description
    pub description: String,
    /// Author
    pub author: String,
}

impl PluginInfo {
    /// Create new plugin info.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Set author.
    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }
}

/// Health reported by a plugin's self-check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Operational with reduced functionality
    Degraded,
    /// Not operational
    Unhealthy,
}

impl HealthStatus {
    /// Whether this status counts as healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Plugin-specific error.
#[derive(Clone, Debug)]
pub struct PluginError {
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
    /// Is recoverable
    pub recoverable: bool,
}

impl PluginError {
    /// Create a new error.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: "PLUGIN_ERROR".to_string(),
            recoverable: true,
        }
    }

    /// Create a fatal error.
    pub fn fatal(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: "PLUGIN_FATAL".to_string(),
            recoverable: false,
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: "TIMEOUT".to_string(),
            recoverable: true,
        }
    }

    /// Override the error code.
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    /// Whether this error came from a timeout.
    pub fn is_timeout(&self) -> bool {
        self.code == "TIMEOUT"
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginError: {}", self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::new(&err.to_string()).with_code("IO_ERROR")
    }
}

/// Plugin trait that all plugins must implement.
///
/// Lifecycle hooks are driven exclusively by the registry; a plugin never
/// flips its own enabled state. Capability views are declared explicitly by
/// overriding [`Plugin::as_chat`] / [`Plugin::as_image_analysis`] to return
/// `Some(self)`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin info.
    fn info(&self) -> PluginInfo;

    /// Whether the plugin starts out enabled when registered.
    fn enabled_by_default(&self) -> bool {
        true
    }

    /// Initialize the plugin.
    async fn initialize(&self) -> PluginResult<()>;

    /// Release plugin resources.
    async fn dispose(&self) -> PluginResult<()>;

    /// Health check.
    async fn check_health(&self) -> PluginResult<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    /// Chat capability view.
    fn as_chat(self: Arc<Self>) -> Option<Arc<dyn ChatPlugin>> {
        None
    }

    /// Image-analysis capability view.
    fn as_image_analysis(self: Arc<Self>) -> Option<Arc<dyn ImageAnalysisPlugin>> {
        None
    }
}

/// Run a plugin future, turning a panic into a [`PluginError`].
pub async fn guarded<T, F>(fut: F) -> PluginResult<T>
where
    F: Future<Output = PluginResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PluginError::fatal(&panic_message(payload.as_ref()))),
    }
}

/// Run a synchronous plugin call, turning a panic into a [`PluginError`].
pub fn guarded_sync<T>(f: impl FnOnce() -> T) -> PluginResult<T> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| PluginError::fatal(&panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("plugin panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("plugin panicked: {}", s)
    } else {
        "plugin panicked".to_string()
    }
}
