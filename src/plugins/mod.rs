//! Plugins Module
//!
//! Concrete plugins shipped with plughub:
//! - Assistant chat backed by an external CLI
//! - Invoice and document image analysis
//! - Shared subprocess runner with timeouts

pub mod assistant;
pub mod command;
pub mod invoice;

pub use assistant::{AssistantChatPlugin, AssistantConfig, ASSISTANT_PLUGIN_NAME};
pub use command::{CommandOutput, CommandRunner, SPAWN_ERROR};
pub use invoice::{InvoiceAnalysisPlugin, InvoiceConfig, INVOICE_PLUGIN_NAME};
