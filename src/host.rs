//! Plugin host.
//!
//! Owns the registry and the dispatch services built on it, and gives the
//! process an explicit startup and shutdown sequence: construct, register
//! plugins, `start()` before serving requests, `shutdown()` on exit.

use crate::core::{Error, Result};
use crate::dispatch::chat::ChatService;
use crate::dispatch::config::DispatchConfig;
use crate::dispatch::image::ImageAnalysisService;
use crate::monitoring::logging::LoggerConfig;
use crate::plugin::interface::Plugin;
use crate::plugin::registry::PluginRegistry;
use crate::plugins::assistant::{AssistantChatPlugin, AssistantConfig};
use crate::plugins::invoice::{InvoiceAnalysisPlugin, InvoiceConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Host configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Logging settings
    pub logging: LoggerConfig,
    /// Dispatch limits
    pub dispatch: DispatchConfig,
    /// Assistant chat plugin
    pub assistant: AssistantConfig,
    /// Invoice analysis plugin
    pub invoice: InvoiceConfig,
}

impl HostConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid host config: {}", e)))
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Process-scoped owner of the registry and dispatch services.
pub struct PluginHost {
    registry: Arc<PluginRegistry>,
    chat: ChatService,
    image: ImageAnalysisService,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PluginHost {
    /// Create a host with an empty registry.
    pub fn new(config: &DispatchConfig) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        Self {
            chat: ChatService::new(registry.clone(), config.chat.clone()),
            image: ImageAnalysisService::new(registry.clone(), config.image.clone()),
            registry,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Create a host with the bundled assistant and invoice plugins registered.
    pub fn with_default_plugins(config: &HostConfig) -> Result<Self> {
        let host = Self::new(&config.dispatch);
        host.register(Arc::new(AssistantChatPlugin::new(config.assistant.clone())))?;
        host.register(Arc::new(InvoiceAnalysisPlugin::new(config.invoice.clone())))?;
        Ok(host)
    }

    /// Register a plugin.
    ///
    /// After `start` a newly registered plugin is left disabled; enable it
    /// through [`PluginHost::registry`] to run its initialize hook.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.registry.register(plugin)
    }

    /// Initialize every enabled plugin. Runs once; later calls return immediately.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting plugin host with {} plugins", self.registry.len());
        self.registry.initialize_all().await;
        let enabled = self.registry.get_all_plugins().len();
        info!("Plugin host started: {}/{} plugins enabled", enabled, self.registry.len());
    }

    /// Dispose every enabled plugin. Runs once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down plugin host");
        self.registry.dispose_all().await;
    }

    /// Whether `start` ran and `shutdown` has not.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Chat dispatch.
    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    /// Image analysis dispatch.
    pub fn image(&self) -> &ImageAnalysisService {
        &self.image
    }
}
