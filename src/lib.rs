//! # plughub - Pluggable request-handling core
//!
//! A capability-indexed plugin registry with dispatch services on top:
//! - **Plugin**: base contract plus chat and image-analysis capabilities
//! - **Registry**: concurrent registration, lookup and enable/disable lifecycle
//! - **Dispatch**: first-match routing for chat messages and image uploads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plughub::host::{HostConfig, PluginHost};
//!
//! #[tokio::main]
//! async fn main() -> plughub::Result<()> {
//!     let config = HostConfig::default();
//!     plughub::monitoring::init_logging(&config.logging)?;
//!
//!     let host = PluginHost::with_default_plugins(&config)?;
//!     host.start().await;
//!
//!     let reply = host.chat().process_message("/help", "alice").await;
//!     println!("{}", reply.message);
//!
//!     host.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod dispatch;
pub mod host;
pub mod monitoring;
pub mod plugin;
pub mod plugins;

pub use core::error::{Error, Result};
