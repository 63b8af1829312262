//! Chat dispatch service.
//!
//! Routes each message to the first enabled chat plugin whose `can_handle`
//! accepts it and aggregates suggestions, help and health across all chat
//! plugins. Every operation returns a value; plugin failures never escape.

use crate::core::Error;
use crate::dispatch::config::ChatConfig;
use crate::plugin::capability::ChatCapability;
use crate::plugin::chat::{ChatContext, ChatHelp, ChatPlugin, ChatResponse};
use crate::plugin::interface::{guarded, guarded_sync, HealthStatus};
use crate::plugin::registry::PluginRegistry;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Error code when chat plugins exist but none accepts the message.
pub const NO_HANDLER_FOUND: &str = "NO_HANDLER_FOUND";

/// Aggregate state of the chat plugins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    /// At least one chat plugin reports healthy
    pub is_available: bool,
    /// Healthy chat plugins
    pub available_plugins: usize,
    /// Enabled chat plugins
    pub total_plugins: usize,
    /// Health per chat plugin
    pub plugin_health: BTreeMap<String, HealthStatus>,
    /// First chat plugin in registration order
    pub preferred_plugin: Option<String>,
}

/// Chat service coordinating chat plugins.
pub struct ChatService {
    registry: Arc<PluginRegistry>,
    config: ChatConfig,
}

impl ChatService {
    /// Create a new chat service.
    pub fn new(registry: Arc<PluginRegistry>, config: ChatConfig) -> Self {
        Self { registry, config }
    }

    fn error_response(err: Error) -> ChatResponse {
        ChatResponse::error(err.error_code(), &err.to_string())
    }

    /// Process a chat message from `username`.
    pub async fn process_message(&self, message: &str, username: &str) -> ChatResponse {
        if message.trim().is_empty() {
            return Self::error_response(Error::Validation("message must not be empty".to_string()));
        }

        let context = ChatContext::new(username);
        info!(user = %username, session = %context.session_id, "Processing chat message");

        let plugins = self.registry.get_all::<ChatCapability>();
        if plugins.is_empty() {
            return Self::error_response(Error::NoCapableProvider(
                "no chat plugins available".to_string(),
            ));
        }

        let Some(plugin) = plugins.iter().find(|p| accepts(p.as_ref(), message)) else {
            return ChatResponse::error(
                NO_HANDLER_FOUND,
                "No plugin found that can handle this kind of message",
            );
        };
        let name = plugin.info().name;
        debug!("Using plugin {} to process message", name);

        let started = Instant::now();
        match guarded(plugin.process_message(message, &context)).await {
            Ok(mut response) => {
                if response.processing_time.is_zero() {
                    response.processing_time = started.elapsed();
                }
                info!(
                    elapsed_ms = response.processing_time.as_millis() as u64,
                    "Message processed by {}", name
                );
                response
            }
            Err(e) => {
                error!("Error processing message with plugin {}: {}", name, e.message);
                let err = Error::ProviderExecution {
                    plugin: name,
                    message: e.message,
                };
                Self::error_response(err).with_processing_time(started.elapsed())
            }
        }
    }

    /// Aggregate suggestions from every chat plugin.
    ///
    /// Results keep plugin order, drop exact duplicates and are capped.
    pub async fn get_suggestions(&self, input: &str) -> Vec<String> {
        let plugins = self.registry.get_all::<ChatCapability>();

        let batches = join_all(plugins.iter().map(|plugin| async move {
            match guarded(plugin.get_suggestions(input)).await {
                Ok(suggestions) => suggestions,
                Err(e) => {
                    warn!("Error getting suggestions from plugin {}: {}", plugin.info().name, e.message);
                    Vec::new()
                }
            }
        }))
        .await;

        let mut seen = HashSet::new();
        batches
            .into_iter()
            .flatten()
            .filter(|s| seen.insert(s.clone()))
            .take(self.config.max_suggestions)
            .collect()
    }

    /// Merge help from every chat plugin, tagging entries with their origin.
    pub fn get_help(&self) -> ChatHelp {
        let mut merged = ChatHelp::default();

        for plugin in self.registry.get_all::<ChatCapability>() {
            let name = plugin.info().name;
            let help = match guarded_sync(|| plugin.get_help()) {
                Ok(help) => help,
                Err(e) => {
                    warn!("Error getting help from plugin {}: {}", name, e.message);
                    continue;
                }
            };

            merged
                .commands
                .extend(help.commands.iter().map(|cmd| format!("[{}] {}", name, cmd)));
            merged.examples.extend(help.examples);
            merged.tips.extend(help.tips);
            for (key, value) in help.shortcuts {
                merged.shortcuts.insert(format!("[{}] {}", name, key), value);
            }
        }

        merged
    }

    /// Health summary restricted to chat plugins.
    pub async fn get_status(&self) -> ChatStatus {
        let chat_names: Vec<String> = self
            .registry
            .get_all::<ChatCapability>()
            .iter()
            .map(|p| p.info().name)
            .collect();

        let health = self.registry.check_health().await;
        let plugin_health: BTreeMap<String, HealthStatus> = health
            .into_iter()
            .filter(|(name, _)| chat_names.contains(name))
            .collect();
        let available_plugins = plugin_health.values().filter(|h| h.is_healthy()).count();

        ChatStatus {
            is_available: available_plugins > 0,
            available_plugins,
            total_plugins: chat_names.len(),
            plugin_health,
            preferred_plugin: chat_names.first().cloned(),
        }
    }
}

fn accepts(plugin: &dyn ChatPlugin, message: &str) -> bool {
    guarded_sync(|| plugin.can_handle(message)).unwrap_or_else(|e| {
        warn!("can_handle of plugin {} failed: {}", plugin.info().name, e.message);
        false
    })
}
