//! Configurable stub plugin shared by unit tests.

use crate::plugin::chat::{ChatContext, ChatHelp, ChatPlugin, ChatResponse};
use crate::plugin::image::{
    ImageAnalysisContext, ImageAnalysisPlugin, ImageAnalysisResponse, ImageAnalysisType, ImageFileInfo,
};
use crate::plugin::interface::{HealthStatus, Plugin, PluginError, PluginInfo, PluginResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct StubPlugin {
    info: PluginInfo,
    enabled_by_default: bool,
    chat: bool,
    image: bool,
    fail_init: bool,
    panic_init: bool,
    fail_dispose: bool,
    health: Option<HealthStatus>,
    handles: bool,
    fail_process: bool,
    reply: String,
    suggestions: Vec<String>,
    fail_suggestions: bool,
    help: ChatHelp,
    mime_types: BTreeSet<String>,
    init_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
    process_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

impl StubPlugin {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            info: PluginInfo::new(name, "1.0.0").with_author("tests"),
            enabled_by_default: true,
            chat: false,
            image: false,
            fail_init: false,
            panic_init: false,
            fail_dispose: false,
            health: Some(HealthStatus::Healthy),
            handles: true,
            fail_process: false,
            reply: format!("reply from {}", name),
            suggestions: Vec::new(),
            fail_suggestions: false,
            help: ChatHelp::default(),
            mime_types: ["image/png", "image/jpeg"].iter().map(|s| s.to_string()).collect(),
            init_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_version(mut self, version: &str) -> Self {
        self.info.version = version.to_string();
        self
    }

    pub(crate) fn with_chat(mut self) -> Self {
        self.chat = true;
        self
    }

    pub(crate) fn with_image(mut self) -> Self {
        self.image = true;
        self
    }

    pub(crate) fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub(crate) fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub(crate) fn panicking_init(mut self) -> Self {
        self.panic_init = true;
        self
    }

    pub(crate) fn failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    pub(crate) fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = Some(health);
        self
    }

    pub(crate) fn failing_health(mut self) -> Self {
        self.health = None;
        self
    }

    pub(crate) fn declining(mut self) -> Self {
        self.handles = false;
        self
    }

    pub(crate) fn failing_process(mut self) -> Self {
        self.fail_process = true;
        self
    }

    pub(crate) fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub(crate) fn failing_suggestions(mut self) -> Self {
        self.fail_suggestions = true;
        self
    }

    pub(crate) fn with_help(mut self, help: ChatHelp) -> Self {
        self.help = help;
        self
    }

    pub(crate) fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.mime_types = mime_types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub(crate) fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for StubPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    async fn initialize(&self) -> PluginResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_init {
            panic!("initialize exploded");
        }
        if self.fail_init {
            return Err(PluginError::new("initialize failed"));
        }
        Ok(())
    }

    async fn dispose(&self) -> PluginResult<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose {
            return Err(PluginError::new("dispose failed"));
        }
        Ok(())
    }

    async fn check_health(&self) -> PluginResult<HealthStatus> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.health.ok_or_else(|| PluginError::new("probe failed"))
    }

    fn as_chat(self: Arc<Self>) -> Option<Arc<dyn ChatPlugin>> {
        if self.chat {
            Some(self)
        } else {
            None
        }
    }

    fn as_image_analysis(self: Arc<Self>) -> Option<Arc<dyn ImageAnalysisPlugin>> {
        if self.image {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ChatPlugin for StubPlugin {
    async fn process_message(&self, _message: &str, _context: &ChatContext) -> PluginResult<ChatResponse> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_process {
            return Err(PluginError::new("process exploded"));
        }
        Ok(ChatResponse::text(&self.reply))
    }

    async fn get_suggestions(&self, _input: &str) -> PluginResult<Vec<String>> {
        if self.fail_suggestions {
            return Err(PluginError::new("suggestions unavailable"));
        }
        Ok(self.suggestions.clone())
    }

    fn can_handle(&self, _message: &str) -> bool {
        self.handles
    }

    fn get_help(&self) -> ChatHelp {
        self.help.clone()
    }
}

#[async_trait]
impl ImageAnalysisPlugin for StubPlugin {
    async fn analyze(
        &self,
        data: &[u8],
        file_name: &str,
        mime_type: &str,
        analysis_type: ImageAnalysisType,
        _context: &ImageAnalysisContext,
    ) -> PluginResult<ImageAnalysisResponse> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_process {
            return Err(PluginError::new("analysis exploded"));
        }
        let info = ImageFileInfo::new(file_name, mime_type, data.len() as u64);
        Ok(ImageAnalysisResponse::success(&self.reply, analysis_type, info).with_confidence(0.9))
    }

    fn can_analyze(&self, mime_type: &str, _analysis_type: ImageAnalysisType) -> bool {
        self.handles && self.mime_types.contains(&mime_type.to_lowercase())
    }

    fn supported_mime_types(&self) -> BTreeSet<String> {
        self.mime_types.clone()
    }

    fn supported_analysis_types(&self) -> BTreeSet<ImageAnalysisType> {
        [ImageAnalysisType::General, ImageAnalysisType::Invoice].into_iter().collect()
    }
}
