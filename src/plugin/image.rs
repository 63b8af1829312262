//! Image-analysis capability.

use crate::core::{duration_ms, new_session_id, now, PropertyBag, Timestamp};
use crate::plugin::interface::{Plugin, PluginResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

/// Plugins that can analyze uploaded images.
#[async_trait]
pub trait ImageAnalysisPlugin: Plugin {
    /// Analyze an image.
    async fn analyze(
        &self,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
        analysis_type: ImageAnalysisType,
        context: &ImageAnalysisContext,
    ) -> PluginResult<ImageAnalysisResponse>;

    /// Cheap check whether this plugin handles the MIME type and analysis kind.
    fn can_analyze(&self, mime_type: &str, analysis_type: ImageAnalysisType) -> bool;

    /// MIME types this plugin accepts.
    fn supported_mime_types(&self) -> BTreeSet<String>;

    /// Analysis kinds this plugin performs.
    fn supported_analysis_types(&self) -> BTreeSet<ImageAnalysisType>;
}

/// Kind of analysis requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageAnalysisType {
    /// General description
    #[default]
    General = 0,
    /// Invoice with structured extraction
    Invoice = 1,
    /// Receipt
    Receipt = 2,
    /// Generic document
    Document = 3,
    /// OCR
    TextExtraction = 4,
    /// Screenshot of source code
    CodeAnalysis = 5,
}

impl ImageAnalysisType {
    /// Every analysis type, in numeric order.
    pub const ALL: [ImageAnalysisType; 6] = [
        ImageAnalysisType::General,
        ImageAnalysisType::Invoice,
        ImageAnalysisType::Receipt,
        ImageAnalysisType::Document,
        ImageAnalysisType::TextExtraction,
        ImageAnalysisType::CodeAnalysis,
    ];

    /// Numeric wire value.
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Variant name.
    pub fn name(&self) -> &'static str {
        match self {
            ImageAnalysisType::General => "General",
            ImageAnalysisType::Invoice => "Invoice",
            ImageAnalysisType::Receipt => "Receipt",
            ImageAnalysisType::Document => "Document",
            ImageAnalysisType::TextExtraction => "TextExtraction",
            ImageAnalysisType::CodeAnalysis => "CodeAnalysis",
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ImageAnalysisType::General => "General image analysis",
            ImageAnalysisType::Invoice => "Invoice analysis with structured data extraction",
            ImageAnalysisType::Receipt => "Receipt and ticket analysis",
            ImageAnalysisType::Document => "General document analysis",
            ImageAnalysisType::TextExtraction => "Text extraction (OCR)",
            ImageAnalysisType::CodeAnalysis => "Analysis of source code screenshots",
        }
    }

    /// Look up by numeric value.
    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.value() == value)
    }
}

impl std::fmt::Display for ImageAnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ImageAnalysisType {
    type Err = String;

    /// Parses a variant name (case-insensitive) or its numeric value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<u8>() {
            return Self::from_value(value).ok_or_else(|| format!("unknown analysis type: {}", s));
        }
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown analysis type: {}", s))
    }
}

/// Per-request image analysis context.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisContext {
    /// Requesting user
    pub username: String,
    /// Fresh identifier for this request
    pub session_id: String,
    /// Creation time
    pub timestamp: Timestamp,
    /// Free-form data
    pub additional_data: PropertyBag,
    /// Optional user instruction
    pub user_prompt: Option<String>,
}

impl ImageAnalysisContext {
    /// Create a context with a fresh session id.
    pub fn new(username: &str, user_prompt: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            session_id: new_session_id(),
            timestamp: now(),
            additional_data: PropertyBag::new(),
            user_prompt: user_prompt.map(str::to_string),
        }
    }
}

/// Descriptor of the analyzed file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFileInfo {
    pub file_name: String,
    pub mime_type: String,
    pub size_in_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
}

impl ImageFileInfo {
    /// Create a descriptor without pixel information.
    pub fn new(file_name: &str, mime_type: &str, size_in_bytes: u64) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            size_in_bytes,
            ..Default::default()
        }
    }
}

/// Image analysis result.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResponse {
    /// Free-text analysis
    pub analysis: String,
    /// Structured data pulled from the image
    pub extracted_data: PropertyBag,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Time spent analyzing
    #[serde(with = "duration_ms", rename = "processingTimeMs")]
    pub processing_time: Duration,
    /// Success flag callers branch on
    pub is_success: bool,
    /// Error code on failure
    pub error_code: Option<String>,
    /// Error message on failure
    pub error_message: Option<String>,
    /// Extra metadata
    pub metadata: PropertyBag,
    /// Analysis performed
    pub analysis_type: ImageAnalysisType,
    /// File descriptor
    pub file_info: ImageFileInfo,
}

impl ImageAnalysisResponse {
    /// Create a successful response.
    pub fn success(analysis: &str, analysis_type: ImageAnalysisType, file_info: ImageFileInfo) -> Self {
        Self {
            analysis: analysis.to_string(),
            is_success: true,
            analysis_type,
            file_info,
            ..Default::default()
        }
    }

    /// Create a failed response.
    pub fn failure(code: &str, message: &str, file_info: ImageFileInfo) -> Self {
        Self {
            is_success: false,
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            file_info,
            ..Default::default()
        }
    }

    /// Set confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set processing time.
    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }
}
