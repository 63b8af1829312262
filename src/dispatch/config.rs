//! Dispatch configuration.

use serde::{Deserialize, Serialize};

/// Default upload size limit (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default batch size limit.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// Default suggestion cap.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 10;

/// Raster image types accepted by default.
pub const DEFAULT_IMAGE_MIME_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
];

/// Dispatch layer configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Chat dispatch settings
    pub chat: ChatConfig,
    /// Image dispatch settings
    pub image: ImageConfig,
}

/// Chat dispatch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum aggregated suggestions
    pub max_suggestions: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

/// Image dispatch configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Maximum upload size in bytes
    pub max_file_size: u64,
    /// Maximum files per batch
    pub max_batch_size: usize,
    /// Accepted MIME types (compared case-insensitively)
    pub allowed_mime_types: Vec<String>,
}

impl ImageConfig {
    /// Whether `mime_type` is on the allow-list.
    pub fn allows(&self, mime_type: &str) -> bool {
        let wanted = mime_type.trim();
        !wanted.is_empty()
            && self
                .allowed_mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(wanted))
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            allowed_mime_types: DEFAULT_IMAGE_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
