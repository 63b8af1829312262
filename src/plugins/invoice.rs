//! Image analysis plugin for invoices, receipts and documents.
//!
//! The upload is written to a temporary file which the assistant CLI is
//! pointed at together with a prompt chosen by analysis type. For invoices
//! the JSON object embedded in the reply becomes the extracted data.

use crate::core::{duration_secs, now, PropertyBag};
use crate::dispatch::config::DEFAULT_IMAGE_MIME_TYPES;
use crate::plugin::image::{
    ImageAnalysisContext, ImageAnalysisPlugin, ImageAnalysisResponse, ImageAnalysisType, ImageFileInfo,
};
use crate::plugin::interface::{HealthStatus, Plugin, PluginError, PluginInfo, PluginResult};
use crate::plugins::command::CommandRunner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Registered plugin name.
pub const INVOICE_PLUGIN_NAME: &str = "InvoiceAnalysis";

const PLUGIN_VERSION: &str = "1.0.0";

const INVOICE_CONFIDENCE: f64 = 0.85;
const UNSTRUCTURED_INVOICE_CONFIDENCE: f64 = 0.70;
const GENERAL_CONFIDENCE: f64 = 0.80;

const SUPPORTED_ANALYSIS_TYPES: [ImageAnalysisType; 5] = [
    ImageAnalysisType::General,
    ImageAnalysisType::Invoice,
    ImageAnalysisType::Receipt,
    ImageAnalysisType::Document,
    ImageAnalysisType::TextExtraction,
];

const INVOICE_PROMPT: &str = r#"Analyze this invoice image and extract the following information as JSON:
{
  "document_type": "invoice",
  "issuer": {"name": "", "tax_id": "", "address": "", "phone": "", "email": ""},
  "customer": {"name": "", "tax_id": "", "address": ""},
  "invoice": {"number": "", "issue_date": "", "due_date": "", "currency": "", "subtotal": 0, "taxes": 0, "total": 0},
  "items": [{"description": "", "quantity": 0, "unit_price": 0, "total": 0}],
  "notes": ""
}

Besides the JSON, give a plain-language summary of the most important invoice data."#;

const RECEIPT_PROMPT: &str = "Analyze this receipt and extract the relevant information:
- Store or merchant
- Date and time
- Items purchased
- Individual prices
- Total
- Payment method
- Transaction number if available

Present the information clearly and in a structured way.";

const DOCUMENT_PROMPT: &str = "Analyze this document and identify:
- Document type
- Main content
- Important data
- Relevant dates
- Any structured information

Give a complete summary of the content.";

const OCR_PROMPT: &str = "Extract all visible text in this image.
Keep the structure and formatting as much as possible.
If there are tables, try to preserve the tabular layout.";

const GENERAL_PROMPT: &str = "Describe this image in detail.
If it contains text, extract it.
If it is a document, identify what kind of document it is and summarize its content.";

/// Invoice analysis configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceConfig {
    /// CLI executable
    pub program: String,
    /// Limit for one analysis run
    #[serde(with = "duration_secs")]
    pub analysis_timeout: Duration,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            analysis_timeout: Duration::from_secs(120),
        }
    }
}

/// Prompt for `analysis_type`, followed by the user's own instruction if any.
fn analysis_prompt(analysis_type: ImageAnalysisType, user_prompt: Option<&str>) -> String {
    let base = match analysis_type {
        ImageAnalysisType::Invoice => INVOICE_PROMPT,
        ImageAnalysisType::Receipt => RECEIPT_PROMPT,
        ImageAnalysisType::Document => DOCUMENT_PROMPT,
        ImageAnalysisType::TextExtraction => OCR_PROMPT,
        _ => GENERAL_PROMPT,
    };

    match user_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(extra) => format!("{}\n\nAdditional user instructions: {}", base, extra),
        None => base.to_string(),
    }
}

/// Outermost `{...}` in `text`, parsed as a JSON object.
fn extract_json_object(text: &str) -> Option<PropertyBag> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<PropertyBag>(&text[start..=end]).ok()
}

/// Image analysis plugin driving the assistant CLI.
pub struct InvoiceAnalysisPlugin {
    config: InvoiceConfig,
    runner: CommandRunner,
    mime_types: BTreeSet<String>,
}

impl InvoiceAnalysisPlugin {
    /// Create the plugin.
    pub fn new(config: InvoiceConfig) -> Self {
        Self {
            config,
            runner: CommandRunner::new(),
            mime_types: DEFAULT_IMAGE_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn run_analysis(
        &self,
        data: &[u8],
        file_name: &str,
        prompt: &str,
    ) -> PluginResult<String> {
        let suffix = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let mut image = tempfile::Builder::new()
            .prefix("plughub_image_")
            .suffix(&suffix)
            .tempfile()?;
        image.write_all(data)?;
        image.flush()?;
        debug!("Image stored temporarily at {}", image.path().display());

        let request = format!("{}\n\nImage file: {}", prompt, image.path().display());
        let output = self
            .runner
            .run(&self.config.program, &["-p", request.as_str()], self.config.analysis_timeout)
            .await?;

        if !output.success() {
            return Err(PluginError::new(&format!("assistant CLI failed: {}", output.stderr)));
        }
        Ok(output.stdout)
    }

    fn build_response(
        &self,
        analysis: String,
        analysis_type: ImageAnalysisType,
        file_info: ImageFileInfo,
    ) -> ImageAnalysisResponse {
        let mut response = ImageAnalysisResponse::success(&analysis, analysis_type, file_info);

        let confidence = if analysis_type == ImageAnalysisType::Invoice {
            match extract_json_object(&analysis) {
                Some(data) => {
                    response.extracted_data = data;
                    INVOICE_CONFIDENCE
                }
                None => {
                    warn!("Could not extract structured invoice data");
                    UNSTRUCTURED_INVOICE_CONFIDENCE
                }
            }
        } else {
            GENERAL_CONFIDENCE
        };

        response.metadata.insert("pluginName".to_string(), INVOICE_PLUGIN_NAME.into());
        response.metadata.insert("pluginVersion".to_string(), PLUGIN_VERSION.into());
        response
            .metadata
            .insert("analysisTimestamp".to_string(), now().to_rfc3339().into());
        response.with_confidence(confidence)
    }
}

impl Default for InvoiceAnalysisPlugin {
    fn default() -> Self {
        Self::new(InvoiceConfig::default())
    }
}

#[async_trait]
impl Plugin for InvoiceAnalysisPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(INVOICE_PLUGIN_NAME, PLUGIN_VERSION)
            .with_description("Analyzes invoices and documents with a vision-capable assistant CLI")
            .with_author("plughub")
    }

    async fn initialize(&self) -> PluginResult<()> {
        info!("Invoice analysis plugin ready for invoices, receipts and documents");
        Ok(())
    }

    async fn dispose(&self) -> PluginResult<()> {
        info!("Shutting down invoice analysis plugin");
        Ok(())
    }

    async fn check_health(&self) -> PluginResult<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    fn as_image_analysis(self: Arc<Self>) -> Option<Arc<dyn ImageAnalysisPlugin>> {
        Some(self)
    }
}

#[async_trait]
impl ImageAnalysisPlugin for InvoiceAnalysisPlugin {
    async fn analyze(
        &self,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
        analysis_type: ImageAnalysisType,
        context: &ImageAnalysisContext,
    ) -> PluginResult<ImageAnalysisResponse> {
        let started = Instant::now();
        let file_info = ImageFileInfo::new(file_name, mime_type, data.len() as u64);
        info!(
            user = %context.username,
            "Analyzing image {} ({} bytes, type {})", file_name, data.len(), analysis_type
        );

        if !self.can_analyze(mime_type, analysis_type) {
            return Ok(ImageAnalysisResponse::failure(
                "UNSUPPORTED_TYPE",
                &format!("File type {} or analysis {} not supported", mime_type, analysis_type),
                file_info,
            )
            .with_processing_time(started.elapsed()));
        }

        let prompt = analysis_prompt(analysis_type, context.user_prompt.as_deref());
        let response = match self.run_analysis(data, file_name, &prompt).await {
            Ok(analysis) => self.build_response(analysis, analysis_type, file_info),
            Err(e) => {
                error!("Error analyzing image {}: {}", file_name, e.message);
                ImageAnalysisResponse::failure("ANALYSIS_ERROR", &e.message, file_info)
            }
        };

        let elapsed = started.elapsed();
        info!("Analysis of {} finished in {}ms", file_name, elapsed.as_millis());
        Ok(response.with_processing_time(elapsed))
    }

    fn can_analyze(&self, mime_type: &str, analysis_type: ImageAnalysisType) -> bool {
        self.mime_types.contains(&mime_type.to_lowercase()) && SUPPORTED_ANALYSIS_TYPES.contains(&analysis_type)
    }

    fn supported_mime_types(&self) -> BTreeSet<String> {
        self.mime_types.clone()
    }

    fn supported_analysis_types(&self) -> BTreeSet<ImageAnalysisType> {
        SUPPORTED_ANALYSIS_TYPES.into_iter().collect()
    }
}
