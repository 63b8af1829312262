//! Image analysis dispatch service.
//!
//! Validates uploads against [`ImageConfig`], selects the first enabled
//! image-analysis plugin whose `can_analyze` accepts the MIME type and
//! analysis kind, and reports capabilities and health across those plugins.

use crate::core::{now, Error, Result, Timestamp};
use crate::dispatch::config::ImageConfig;
use crate::plugin::capability::ImageAnalysisCapability;
use crate::plugin::image::{
    ImageAnalysisContext, ImageAnalysisPlugin, ImageAnalysisResponse, ImageAnalysisType, ImageFileInfo,
};
use crate::plugin::interface::{guarded, guarded_sync, HealthStatus};
use crate::plugin::registry::PluginRegistry;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// An uploaded file awaiting analysis.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    /// Create an upload.
    pub fn new(file_name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            data,
        }
    }

    /// Descriptor of this upload.
    pub fn file_info(&self) -> ImageFileInfo {
        ImageFileInfo::new(&self.file_name, &self.mime_type, self.data.len() as u64)
    }
}

/// Analysis type entry in a capabilities report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTypeInfo {
    pub value: u8,
    pub name: String,
    pub description: String,
}

impl From<ImageAnalysisType> for AnalysisTypeInfo {
    fn from(kind: ImageAnalysisType) -> Self {
        Self {
            value: kind.value(),
            name: kind.name().to_string(),
            description: kind.description().to_string(),
        }
    }
}

/// What one image plugin can do.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePluginCapabilities {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub is_enabled: bool,
    pub supported_mime_types: Vec<String>,
    pub supported_analysis_types: Vec<AnalysisTypeInfo>,
}

/// Capabilities of the image analysis subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisCapabilities {
    /// Upload size limit in bytes
    pub max_file_size: u64,
    /// Upload size limit in MiB
    pub max_file_size_mb: f64,
    /// Validator allow-list
    pub allowed_mime_types: Vec<String>,
    /// Enabled image plugins
    pub plugins: Vec<ImagePluginCapabilities>,
    /// Every analysis type
    pub analysis_types: Vec<AnalysisTypeInfo>,
}

/// Health of one image plugin.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePluginHealth {
    pub name: String,
    pub version: String,
    pub is_enabled: bool,
    pub health: HealthStatus,
    pub is_healthy: bool,
}

/// Aggregate health of the image plugins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHealthReport {
    pub total_plugins: usize,
    pub healthy_plugins: usize,
    /// Every image plugin is healthy
    pub is_system_healthy: bool,
    pub plugins: Vec<ImagePluginHealth>,
    pub timestamp: Timestamp,
}

/// Image analysis service coordinating image plugins.
pub struct ImageAnalysisService {
    registry: Arc<PluginRegistry>,
    config: ImageConfig,
}

impl ImageAnalysisService {
    /// Create a new image analysis service.
    pub fn new(registry: Arc<PluginRegistry>, config: ImageConfig) -> Self {
        Self { registry, config }
    }

    /// Active configuration.
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Check an upload against the size limit and MIME allow-list.
    pub fn validate(&self, upload: &ImageUpload) -> Result<()> {
        if upload.data.is_empty() {
            return Err(Error::Validation("no file provided or file is empty".to_string()));
        }
        if upload.data.len() as u64 > self.config.max_file_size {
            return Err(Error::Validation(format!(
                "file exceeds maximum size of {} MB",
                self.config.max_file_size / (1024 * 1024)
            )));
        }
        if !self.config.allows(&upload.mime_type) {
            return Err(Error::Validation(format!(
                "file type not allowed: {}. Allowed types: {}",
                upload.mime_type,
                self.config.allowed_mime_types.join(", ")
            )));
        }
        Ok(())
    }

    /// First enabled image plugin accepting the MIME type and analysis kind.
    pub fn select(&self, mime_type: &str, analysis_type: ImageAnalysisType) -> Option<Arc<dyn ImageAnalysisPlugin>> {
        self.registry
            .get_all::<ImageAnalysisCapability>()
            .into_iter()
            .find(|plugin| {
                guarded_sync(|| plugin.can_analyze(mime_type, analysis_type)).unwrap_or_else(|e| {
                    warn!("can_analyze of plugin {} failed: {}", plugin.info().name, e.message);
                    false
                })
            })
    }

    fn available_plugins(&self) -> String {
        let plugins: Vec<String> = self
            .registry
            .get_all::<ImageAnalysisCapability>()
            .iter()
            .map(|plugin| {
                let info = plugin.info();
                format!("{} v{}", info.name, info.version)
            })
            .collect();
        if plugins.is_empty() {
            "none".to_string()
        } else {
            plugins.join(", ")
        }
    }

    /// Validate and analyze a single upload.
    ///
    /// Bad input fails with `Validation`, a missing plugin with
    /// `NoCapableProvider` and a plugin failure with `ProviderExecution`.
    pub async fn analyze(
        &self,
        upload: &ImageUpload,
        analysis_type: ImageAnalysisType,
        username: &str,
        user_prompt: Option<&str>,
    ) -> Result<ImageAnalysisResponse> {
        self.validate(upload)?;

        info!(
            user = %username,
            file = %upload.file_name,
            size = upload.data.len(),
            "Analyzing image as {}", analysis_type
        );

        let plugin = self.select(&upload.mime_type, analysis_type).ok_or_else(|| {
            Error::NoCapableProvider(format!(
                "no plugin available for {} with analysis type {} (available plugins: {})",
                upload.mime_type,
                analysis_type,
                self.available_plugins()
            ))
        })?;
        let name = plugin.info().name;
        debug!("Using plugin {} to analyze {}", name, upload.file_name);

        let context = ImageAnalysisContext::new(username, user_prompt);
        let started = Instant::now();
        let fut = plugin.analyze(&upload.data, &upload.file_name, &upload.mime_type, analysis_type, &context);

        match guarded(fut).await {
            Ok(mut response) => {
                if response.processing_time.is_zero() {
                    response.processing_time = started.elapsed();
                }
                info!(
                    success = response.is_success,
                    elapsed_ms = response.processing_time.as_millis() as u64,
                    "Image {} analyzed by {}", upload.file_name, name
                );
                Ok(response)
            }
            Err(e) => {
                error!("Error analyzing image {} with plugin {}: {}", upload.file_name, name, e.message);
                Err(Error::ProviderExecution {
                    plugin: name,
                    message: e.message,
                })
            }
        }
    }

    /// Analyze several uploads, one result per upload in input order.
    ///
    /// An empty batch or one larger than the configured cap is rejected as a
    /// whole. Per-item failures become failed responses and do not stop the
    /// remaining items.
    pub async fn analyze_batch(
        &self,
        uploads: &[ImageUpload],
        analysis_type: ImageAnalysisType,
        username: &str,
        user_prompt: Option<&str>,
    ) -> Result<Vec<ImageAnalysisResponse>> {
        if uploads.is_empty() {
            return Err(Error::Validation("no files provided".to_string()));
        }
        if uploads.len() > self.config.max_batch_size {
            return Err(Error::Validation(format!(
                "maximum {} files per batch",
                self.config.max_batch_size
            )));
        }

        let mut results = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let result = match self.analyze(upload, analysis_type, username, user_prompt).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Batch item {} failed: {}", upload.file_name, e);
                    ImageAnalysisResponse::failure(e.error_code(), &e.to_string(), upload.file_info())
                }
            };
            results.push(result);
        }

        let successes = results.iter().filter(|r| r.is_success).count();
        info!(
            user = %username,
            "Batch analysis completed: {}/{} successful", successes, results.len()
        );

        Ok(results)
    }

    /// Limits, plugins and analysis types on offer.
    pub fn capabilities(&self) -> AnalysisCapabilities {
        let plugins = self
            .registry
            .get_all::<ImageAnalysisCapability>()
            .into_iter()
            .map(|plugin| {
                let info = plugin.info();
                let is_enabled = self.registry.is_enabled(&info.name).unwrap_or(false);
                let supported_mime_types = guarded_sync(|| plugin.supported_mime_types())
                    .map(|set| set.into_iter().collect())
                    .unwrap_or_default();
                let supported_analysis_types = guarded_sync(|| plugin.supported_analysis_types())
                    .map(|set| set.into_iter().map(AnalysisTypeInfo::from).collect())
                    .unwrap_or_default();
                ImagePluginCapabilities {
                    name: info.name,
                    version: info.version,
                    description: info.description,
                    author: info.author,
                    is_enabled,
                    supported_mime_types,
                    supported_analysis_types,
                }
            })
            .collect();

        AnalysisCapabilities {
            max_file_size: self.config.max_file_size,
            max_file_size_mb: self.config.max_file_size as f64 / (1024.0 * 1024.0),
            allowed_mime_types: self.config.allowed_mime_types.clone(),
            plugins,
            analysis_types: ImageAnalysisType::ALL.into_iter().map(AnalysisTypeInfo::from).collect(),
        }
    }

    /// Poll every enabled image plugin.
    pub async fn health(&self) -> ImageHealthReport {
        let image_plugins = self.registry.get_all::<ImageAnalysisCapability>();

        let plugins: Vec<ImagePluginHealth> = join_all(image_plugins.iter().map(|plugin| async move {
            let info = plugin.info();
            let health = match guarded(plugin.check_health()).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Error checking health of plugin {}: {}", info.name, e.message);
                    HealthStatus::Unhealthy
                }
            };
            (info, health)
        }))
        .await
        .into_iter()
        .map(|(info, health)| ImagePluginHealth {
            is_enabled: self.registry.is_enabled(&info.name).unwrap_or(false),
            name: info.name,
            version: info.version,
            health,
            is_healthy: health.is_healthy(),
        })
        .collect();

        let healthy_plugins = plugins.iter().filter(|p| p.is_healthy).count();
        ImageHealthReport {
            total_plugins: plugins.len(),
            healthy_plugins,
            is_system_healthy: healthy_plugins == plugins.len(),
            plugins,
            timestamp: now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::StubPlugin;

    fn service_with(plugins: Vec<Arc<StubPlugin>>) -> ImageAnalysisService {
        let registry = Arc::new(PluginRegistry::new());
        for plugin in plugins {
            registry.register(plugin).unwrap();
        }
        ImageAnalysisService::new(registry, ImageConfig::default())
    }

    fn png(name: &str) -> ImageUpload {
        ImageUpload::new(name, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
    }

    #[test]
    fn test_validate_rejects_bad_uploads() {
        let service = service_with(vec![]);

        let empty = ImageUpload::new("a.png", "image/png", Vec::new());
        let oversized = ImageUpload::new("b.png", "image/png", vec![0; 10 * 1024 * 1024 + 1]);
        let pdf = ImageUpload::new("c.pdf", "application/pdf", vec![1, 2, 3]);

        assert!(matches!(service.validate(&empty), Err(Error::Validation(_))));
        assert!(matches!(service.validate(&oversized), Err(Error::Validation(_))));
        assert!(matches!(service.validate(&pdf), Err(Error::Validation(_))));
        assert!(service.validate(&ImageUpload::new("d.png", "IMAGE/PNG", vec![1])).is_ok());
    }

    #[test]
    fn test_exact_size_limit_accepted() {
        let service = service_with(vec![]);
        let upload = ImageUpload::new("max.png", "image/png", vec![0; 10 * 1024 * 1024]);
        assert!(service.validate(&upload).is_ok());
    }

    #[tokio::test]
    async fn test_analyze_selects_first_capable_plugin() {
        let jpeg_only = Arc::new(StubPlugin::new("jpeg").with_image().with_mime_types(&["image/jpeg"]));
        let png_plugin = Arc::new(StubPlugin::new("png").with_image());
        let service = service_with(vec![jpeg_only.clone(), png_plugin.clone()]);

        let response = service
            .analyze(&png("a.png"), ImageAnalysisType::General, "alice", None)
            .await
            .unwrap();

        assert!(response.is_success);
        assert_eq!(response.analysis, "reply from png");
        assert_eq!(jpeg_only.analyze_calls(), 0);
        assert_eq!(png_plugin.analyze_calls(), 1);
    }

    #[tokio::test]
    async fn test_analyze_without_capable_plugin() {
        let service = service_with(vec![Arc::new(StubPlugin::new("shy").with_image().declining())]);

        let err = service
            .analyze(&png("a.png"), ImageAnalysisType::Invoice, "alice", None)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "NO_PLUGIN_AVAILABLE");
        assert!(err.to_string().contains("available plugins: shy v1.0.0"));

        let empty = service_with(vec![])
            .analyze(&png("a.png"), ImageAnalysisType::General, "alice", None)
            .await
            .unwrap_err();
        assert!(empty.to_string().contains("available plugins: none"));
    }

    #[tokio::test]
    async fn test_analyze_rejects_invalid_upload_before_dispatch() {
        let plugin = Arc::new(StubPlugin::new("png").with_image());
        let service = service_with(vec![plugin.clone()]);

        let err = service
            .analyze(&ImageUpload::new("a.png", "image/png", Vec::new()), ImageAnalysisType::General, "alice", None)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(plugin.analyze_calls(), 0);
    }

    #[tokio::test]
    async fn test_analyze_plugin_failure() {
        let service = service_with(vec![Arc::new(StubPlugin::new("boom").with_image().failing_process())]);

        let err = service
            .analyze(&png("a.png"), ImageAnalysisType::General, "alice", None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ProviderExecution { ref plugin, .. } if plugin == "boom"));
    }

    #[tokio::test]
    async fn test_batch_continues_past_invalid_item() {
        let plugin = Arc::new(StubPlugin::new("png").with_image());
        let service = service_with(vec![plugin.clone()]);
        let uploads = vec![
            png("one.png"),
            ImageUpload::new("two.pdf", "application/pdf", vec![1, 2, 3]),
            png("three.png"),
        ];

        let results = service
            .analyze_batch(&uploads, ImageAnalysisType::General, "alice", None)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success);
        assert!(!results[1].is_success);
        assert_eq!(results[1].error_code.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(results[1].file_info.file_name, "two.pdf");
        assert!(results[2].is_success);
        assert_eq!(plugin.analyze_calls(), 2);
    }

    #[tokio::test]
    async fn test_batch_rejected_as_whole() {
        let service = service_with(vec![Arc::new(StubPlugin::new("png").with_image())]);

        let empty = service.analyze_batch(&[], ImageAnalysisType::General, "alice", None).await;
        let uploads: Vec<ImageUpload> = (0..11).map(|i| png(&format!("{}.png", i))).collect();
        let too_many = service
            .analyze_batch(&uploads, ImageAnalysisType::General, "alice", None)
            .await;

        assert!(matches!(empty, Err(Error::Validation(_))));
        assert!(matches!(too_many, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_batch_plugin_failure_is_per_item() {
        let service = service_with(vec![Arc::new(StubPlugin::new("boom").with_image().failing_process())]);

        let results = service
            .analyze_batch(&[png("a.png"), png("b.png")], ImageAnalysisType::General, "alice", None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error_code.as_deref() == Some("PROCESSING_ERROR")));
    }

    #[test]
    fn test_capabilities_report() {
        let service = service_with(vec![
            Arc::new(StubPlugin::new("chat").with_chat()),
            Arc::new(StubPlugin::new("png").with_image().with_version("2.1.0")),
        ]);

        let caps = service.capabilities();

        assert_eq!(caps.max_file_size, 10 * 1024 * 1024);
        assert_eq!(caps.max_file_size_mb, 10.0);
        assert_eq!(caps.allowed_mime_types.len(), 7);
        assert_eq!(caps.analysis_types.len(), 6);
        assert_eq!(caps.plugins.len(), 1);
        assert_eq!(caps.plugins[0].name, "png");
        assert_eq!(caps.plugins[0].version, "2.1.0");
        assert!(caps.plugins[0].is_enabled);
        assert!(caps.plugins[0].supported_mime_types.contains(&"image/png".to_string()));
        assert_eq!(caps.plugins[0].supported_analysis_types[0].name, "General");
    }

    #[tokio::test]
    async fn test_health_report() {
        let service = service_with(vec![
            Arc::new(StubPlugin::new("good").with_image()),
            Arc::new(StubPlugin::new("bad").with_image().failing_health()),
            Arc::new(StubPlugin::new("chat").with_chat().failing_health()),
        ]);

        let report = service.health().await;

        assert_eq!(report.total_plugins, 2);
        assert_eq!(report.healthy_plugins, 1);
        assert!(!report.is_system_healthy);
        let bad = report.plugins.iter().find(|p| p.name == "bad").unwrap();
        assert_eq!(bad.health, HealthStatus::Unhealthy);
        assert!(!bad.is_healthy);
    }

    #[tokio::test]
    async fn test_health_polls_only_image_plugins() {
        let chat = Arc::new(StubPlugin::new("chat").with_chat());
        let png_plugin = Arc::new(StubPlugin::new("png").with_image());
        let service = service_with(vec![chat.clone(), png_plugin.clone()]);

        let report = service.health().await;

        assert_eq!(report.total_plugins, 1);
        assert_eq!(png_plugin.health_calls(), 1);
        assert_eq!(chat.health_calls(), 0);
    }
}
