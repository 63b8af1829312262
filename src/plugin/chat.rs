//! Chat capability.

use crate::core::{duration_ms, new_session_id, now, PropertyBag, Timestamp};
use crate::plugin::interface::{Plugin, PluginResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Plugins that can hold a conversation.
#[async_trait]
pub trait ChatPlugin: Plugin {
    /// Process a chat message.
    async fn process_message(&self, message: &str, context: &ChatContext) -> PluginResult<ChatResponse>;

    /// Suggest completions for a partial input.
    async fn get_suggestions(&self, input: &str) -> PluginResult<Vec<String>>;

    /// Cheap, side-effect-free check whether this plugin handles `message`.
    fn can_handle(&self, message: &str) -> bool;

    /// Help descriptor.
    fn get_help(&self) -> ChatHelp;
}

/// Per-request chat context.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    /// Requesting user
    pub username: String,
    /// Fresh identifier for this request
    pub session_id: String,
    /// Creation time
    pub timestamp: Timestamp,
    /// Free-form properties
    pub properties: PropertyBag,
}

impl ChatContext {
    /// Create a context with a fresh session id.
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            session_id: new_session_id(),
            timestamp: now(),
            properties: PropertyBag::new(),
        }
    }

    /// Attach a property.
    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

/// Kind of content carried by a [`ChatResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatResponseType {
    Text,
    Code,
    Error,
    System,
    File,
    Image,
}

/// Chat plugin response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Response text
    pub message: String,
    /// Content kind
    #[serde(rename = "type")]
    pub response_type: ChatResponseType,
    /// Time spent producing the response
    #[serde(with = "duration_ms", rename = "processingTimeMs")]
    pub processing_time: Duration,
    /// Success flag callers branch on
    pub is_success: bool,
    /// Error code on failure
    pub error_code: Option<String>,
    /// Extra metadata
    pub metadata: PropertyBag,
}

impl ChatResponse {
    /// Create a successful response.
    pub fn new(message: &str, response_type: ChatResponseType) -> Self {
        Self {
            message: message.to_string(),
            response_type,
            processing_time: Duration::ZERO,
            is_success: true,
            error_code: None,
            metadata: PropertyBag::new(),
        }
    }

    /// Create a successful text response.
    pub fn text(message: &str) -> Self {
        Self::new(message, ChatResponseType::Text)
    }

    /// Create an error response.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            message: message.to_string(),
            response_type: ChatResponseType::Error,
            processing_time: Duration::ZERO,
            is_success: false,
            error_code: Some(code.to_string()),
            metadata: PropertyBag::new(),
        }
    }

    /// Set processing time.
    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Help descriptor exposed by chat plugins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHelp {
    pub commands: Vec<String>,
    pub examples: Vec<String>,
    pub tips: Vec<String>,
    pub shortcuts: BTreeMap<String, String>,
}
