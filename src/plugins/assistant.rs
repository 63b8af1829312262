//! Chat plugin backed by an external coding-assistant CLI.
//!
//! Messages fall into three kinds:
//! - direct shell commands whose first word is on the allow-list
//! - slash commands (`/help`, `/status`, `/version`) answered locally
//! - everything else, forwarded to the CLI as a conversational turn

use crate::core::{duration_secs, now};
use crate::plugin::chat::{ChatContext, ChatHelp, ChatPlugin, ChatResponse, ChatResponseType};
use crate::plugin::interface::{HealthStatus, Plugin, PluginInfo, PluginResult};
use crate::plugins::command::{CommandRunner, SPAWN_ERROR};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registered plugin name.
pub const ASSISTANT_PLUGIN_NAME: &str = "AssistantChat";

const ALLOWED_COMMANDS: [&str; 20] = [
    "help", "status", "version", "ls", "dir", "pwd", "cd", "dotnet", "git", "npm", "node", "python", "pip",
    "curl", "ping", "echo", "cat", "type", "more", "less",
];

const BLOCKED_COMMANDS: [&str; 18] = [
    "rm", "del", "rmdir", "rd", "format", "fdisk", "mkfs", "kill", "taskkill", "shutdown", "reboot", "halt",
    "chmod", "chown", "passwd", "sudo", "su", "runas",
];

const DEFAULT_SUGGESTIONS: [&str; 6] = [
    "/help",
    "/status",
    "What files are in the project?",
    "dotnet build",
    "git status",
    "Explain the authentication code",
];

const SUGGESTION_CATALOGUE: [&str; 7] = [
    "/help - Show help",
    "/status - Assistant status",
    "dotnet build - Build the project",
    "dotnet run - Run the application",
    "git status - Repository status",
    "What files are there? - List files",
    "Explain the code in [file] - Analyze code",
];

const MAX_SUGGESTIONS: usize = 10;

/// Chaining, substitution, path traversal and redirection.
static SHELL_METACHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&&|\|\||;|\$\(|`|\.\.[/\\]|[<>]").expect("valid regex"));

static VERSION_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").expect("valid regex"));

/// Assistant CLI configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// CLI executable
    pub program: String,
    /// Directory commands run in (current directory when unset)
    pub working_dir: Option<PathBuf>,
    /// Limit for `--version` probes
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
    /// Limit for conversational turns
    #[serde(with = "duration_secs")]
    pub conversation_timeout: Duration,
    /// Limit for direct shell commands
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            working_dir: None,
            probe_timeout: Duration::from_secs(5),
            conversation_timeout: Duration::from_secs(120),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// What a message asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MessageKind {
    Command,
    Special,
    Natural,
}

impl MessageKind {
    fn classify(message: &str) -> Self {
        let trimmed = message.trim();
        let first = first_word(trimmed);
        let has_args = trimmed.contains(char::is_whitespace);
        if (has_args && ALLOWED_COMMANDS.contains(&first.as_str())) || BLOCKED_COMMANDS.contains(&first.as_str()) {
            return MessageKind::Command;
        }
        if trimmed.starts_with('/') {
            return MessageKind::Special;
        }
        MessageKind::Natural
    }

    fn label(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Special => "special",
            MessageKind::Natural => "natural",
        }
    }

    /// Value reported in response metadata; slash commands count as commands.
    fn processing_type(&self) -> &'static str {
        match self {
            MessageKind::Natural => "natural",
            MessageKind::Command | MessageKind::Special => "command",
        }
    }
}

fn first_word(message: &str) -> String {
    message.split_whitespace().next().unwrap_or_default().to_lowercase()
}

/// Whether a direct command may run.
fn is_command_safe(command: &str) -> bool {
    let normalized = command.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    if BLOCKED_COMMANDS.contains(&first_word(&normalized).as_str()) {
        return false;
    }
    !SHELL_METACHARACTERS.is_match(&normalized)
}

/// Chat plugin that talks to an assistant CLI.
pub struct AssistantChatPlugin {
    config: AssistantConfig,
    runner: CommandRunner,
}

impl AssistantChatPlugin {
    /// Create the plugin.
    pub fn new(config: AssistantConfig) -> Self {
        let runner = CommandRunner::new().with_working_dir(config.working_dir.clone());
        Self { config, runner }
    }

    /// Active configuration.
    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    async fn is_available(&self) -> bool {
        match self
            .runner
            .run(&self.config.program, &["--version"], self.config.probe_timeout)
            .await
        {
            Ok(output) => output.success() && !output.stdout.is_empty(),
            Err(e) => {
                debug!("Assistant CLI not available: {}", e.message);
                false
            }
        }
    }

    async fn cli_version(&self) -> String {
        match self
            .runner
            .run(&self.config.program, &["--version"], self.config.probe_timeout)
            .await
        {
            Ok(output) if output.success() && !output.stdout.is_empty() => VERSION_NUMBER
                .captures(&output.stdout)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or(output.stdout),
            Ok(_) => "not detected".to_string(),
            Err(e) => {
                warn!("Error getting assistant version: {}", e.message);
                "unknown".to_string()
            }
        }
    }

    /// Run an allow-listed command. A program that cannot be started is
    /// reported in the reply; a timeout is returned as an error.
    async fn run_direct_command(&self, command: &str) -> PluginResult<ChatResponse> {
        let mut parts = command.split_whitespace();
        let program = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        let output = match self.runner.run(&program, &args, self.config.command_timeout).await {
            Ok(output) => output,
            Err(e) if e.code == SPAWN_ERROR => {
                warn!("Could not start command {}: {}", program, e.message);
                return Ok(ChatResponse::text(&format!(
                    "Error executing system command: {}",
                    e.message
                )));
            }
            Err(e) => return Err(e),
        };

        let reply = if !output.success() {
            format!("Error executing command:\n{}", output.stderr)
        } else if output.stdout.is_empty() {
            "Command executed successfully".to_string()
        } else {
            output.stdout
        };
        Ok(ChatResponse::new(&reply, ChatResponseType::Code))
    }

    async fn handle_special_command(&self, command: &str) -> String {
        match command.trim().to_lowercase().as_str() {
            "/help" => format_help(&self.get_help()),
            "/status" => self.status_text().await,
            "/version" => self.cli_version().await,
            _ => format!("Unrecognized command: {}", command.trim()),
        }
    }

    async fn status_text(&self) -> String {
        let available = self.is_available().await;
        let version = self.cli_version().await;
        let directory = self
            .runner
            .working_dir()
            .map(|d| d.display().to_string())
            .or_else(|| std::env::current_dir().ok().map(|d| d.display().to_string()))
            .unwrap_or_default();

        format!(
            "Assistant plugin status\n\nAvailability: {}\nVersion: {}\nLast check: {}\nDirectory: {}\n\n{}",
            if available { "connected" } else { "not available" },
            version,
            now().format("%H:%M:%S"),
            directory,
            if available {
                "Ready to process commands"
            } else {
                "Check that the assistant CLI is installed"
            }
        )
    }

    async fn converse(&self, message: &str) -> ChatResponse {
        let result = self
            .runner
            .run(&self.config.program, &["-p", message], self.config.conversation_timeout)
            .await;

        match result {
            Ok(output) if output.success() => {
                if output.stdout.is_empty() {
                    ChatResponse::text("The assistant processed the message but returned no response.")
                } else {
                    ChatResponse::text(&output.stdout)
                }
            }
            Ok(output) => ChatResponse::error("ASSISTANT_ERROR", &format!("Assistant error: {}", output.stderr)),
            Err(e) if e.is_timeout() => {
                ChatResponse::text("The assistant is taking too long to respond. Try a simpler message.")
            }
            Err(e) => {
                warn!("Error sending message to assistant: {}", e.message);
                ChatResponse::error(
                    "ASSISTANT_UNAVAILABLE",
                    &format!("Could not reach the assistant: {}", e.message),
                )
            }
        }
    }
}

impl Default for AssistantChatPlugin {
    fn default() -> Self {
        Self::new(AssistantConfig::default())
    }
}

fn format_help(help: &ChatHelp) -> String {
    let mut out = String::from("Assistant chat plugin help\n\nAvailable commands:\n");
    for cmd in &help.commands {
        out.push_str(&format!("- {}\n", cmd));
    }
    out.push_str("\nExamples:\n");
    for example in &help.examples {
        out.push_str(&format!("- \"{}\"\n", example));
    }
    out.push_str("\nTips:\n");
    for tip in &help.tips {
        out.push_str(&format!("- {}\n", tip));
    }
    out
}

#[async_trait]
impl Plugin for AssistantChatPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(ASSISTANT_PLUGIN_NAME, "1.0.0")
            .with_description("Chat integrated with a coding-assistant CLI")
            .with_author("plughub")
    }

    fn enabled_by_default(&self) -> bool {
        false
    }

    async fn initialize(&self) -> PluginResult<()> {
        info!("Initializing assistant chat plugin");
        if !self.is_available().await {
            warn!("Assistant CLI {} is not available", self.config.program);
        }
        Ok(())
    }

    async fn dispose(&self) -> PluginResult<()> {
        info!("Shutting down assistant chat plugin");
        Ok(())
    }

    async fn check_health(&self) -> PluginResult<HealthStatus> {
        Ok(if self.is_available().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        })
    }

    fn as_chat(self: Arc<Self>) -> Option<Arc<dyn ChatPlugin>> {
        Some(self)
    }
}

#[async_trait]
impl ChatPlugin for AssistantChatPlugin {
    async fn process_message(&self, message: &str, context: &ChatContext) -> PluginResult<ChatResponse> {
        let started = Instant::now();
        let kind = MessageKind::classify(message);
        info!(user = %context.username, kind = kind.label(), "Assistant processing message");

        let response = match kind {
            MessageKind::Command => {
                if !is_command_safe(message) {
                    warn!(user = %context.username, "Rejected command: {}", message);
                    return Ok(ChatResponse::error(
                        "FORBIDDEN_COMMAND",
                        &format!("Command not allowed for security reasons: {}", message),
                    )
                    .with_processing_time(started.elapsed()));
                }
                self.run_direct_command(message).await?
            }
            MessageKind::Special => {
                ChatResponse::new(&self.handle_special_command(message).await, ChatResponseType::System)
            }
            MessageKind::Natural => self.converse(message).await,
        };

        Ok(response
            .with_processing_time(started.elapsed())
            .with_metadata("originalMessage", serde_json::Value::from(message))
            .with_metadata("processingType", serde_json::Value::from(kind.processing_type())))
    }

    async fn get_suggestions(&self, input: &str) -> PluginResult<Vec<String>> {
        let suggestions: Vec<String> = if input.trim().is_empty() {
            DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            let needle = input.to_lowercase();
            SUGGESTION_CATALOGUE
                .iter()
                .filter(|s| s.to_lowercase().contains(&needle))
                .map(|s| s.to_string())
                .collect()
        };
        Ok(suggestions.into_iter().take(MAX_SUGGESTIONS).collect())
    }

    fn can_handle(&self, _message: &str) -> bool {
        true
    }

    fn get_help(&self) -> ChatHelp {
        ChatHelp {
            commands: vec![
                "/help - Show this help".to_string(),
                "/status - Check the assistant status".to_string(),
                "/version - Show the assistant CLI version".to_string(),
                "dotnet [command] - Run .NET commands".to_string(),
                "git [command] - Run Git commands".to_string(),
                "[question] - Ask the assistant".to_string(),
            ],
            examples: vec![
                "How does JWT authentication work?".to_string(),
                "dotnet build".to_string(),
                "git status".to_string(),
                "Explain the Repository pattern".to_string(),
            ],
            tips: vec![
                "You can write in natural language".to_string(),
                "System commands run without a shell".to_string(),
                "Use /help to see every available command".to_string(),
            ],
            ..Default::default()
        }
    }
}
