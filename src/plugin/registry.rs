//! Plugin registry for managing plugins.
//!
//! Handles registration, capability-indexed lookup, the enable/disable
//! lifecycle and health polling. All state lives behind a short-lived
//! `RwLock`; plugin hooks are always awaited after the lock is released so
//! lookups never wait on a slow plugin.

use crate::core::{now, Error, Result, Timestamp};
use crate::plugin::capability::{Capability, CapabilityKind, CapabilityViews};
use crate::plugin::interface::{guarded, HealthStatus, Plugin, PluginInfo};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Registered plugin entry.
struct PluginEntry {
    /// Plugin instance
    plugin: Arc<dyn Plugin>,
    /// Plugin info captured at registration
    info: PluginInfo,
    /// Capability views declared by the plugin
    views: CapabilityViews,
    /// Enabled flag, only flipped by the registry
    enabled: AtomicBool,
    /// Serializes enable/disable transitions
    transition: Mutex<()>,
    /// Registration time
    registered_at: Timestamp,
}

impl PluginEntry {
    fn new(plugin: Arc<dyn Plugin>) -> Self {
        let info = plugin.info();
        let views = CapabilityViews::of(&plugin);
        let enabled = plugin.enabled_by_default();
        Self {
            plugin,
            info,
            views,
            enabled: AtomicBool::new(enabled),
            transition: Mutex::new(()),
            registered_at: now(),
        }
    }

    fn name(&self) -> &str {
        &self.info.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

#[derive(Default)]
struct RegistryState {
    /// Name -> entry
    by_name: HashMap<String, Arc<PluginEntry>>,
    /// All entries in registration order
    order: Vec<Arc<PluginEntry>>,
    /// Capability -> entries in registration order
    by_capability: HashMap<Capability, Vec<Arc<PluginEntry>>>,
}

impl RegistryState {
    fn remove_name(&mut self, name: &str) {
        self.order.retain(|e| e.name() != name);
        for entries in self.by_capability.values_mut() {
            entries.retain(|e| e.name() != name);
        }
    }

    fn enabled_entries(&self) -> Vec<Arc<PluginEntry>> {
        self.order.iter().filter(|e| e.is_enabled()).cloned().collect()
    }

    fn enabled_for(&self, capability: Capability) -> impl Iterator<Item = &Arc<PluginEntry>> {
        self.by_capability
            .get(&capability)
            .into_iter()
            .flatten()
            .filter(|e| e.is_enabled())
    }
}

/// Registration details for one plugin.
#[derive(Clone, Debug)]
pub struct RegisteredPlugin {
    /// Plugin info
    pub info: PluginInfo,
    /// Declared capabilities
    pub capabilities: Vec<Capability>,
    /// Current enabled flag
    pub enabled: bool,
    /// Registration time
    pub registered_at: Timestamp,
}

/// Plugin registry.
///
/// Process-scoped: build one, register plugins, call
/// [`PluginRegistry::initialize_all`] before serving, and
/// [`PluginRegistry::dispose_all`] on shutdown.
#[derive(Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    /// Set between `initialize_all` and `dispose_all`
    live: AtomicBool,
}

impl PluginRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `initialize_all` ran and `dispose_all` has not.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn entry(&self, name: &str) -> Result<Arc<PluginEntry>> {
        self.read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    /// Register a plugin.
    ///
    /// A plugin registered under an existing name replaces the previous
    /// instance in every index. Once [`PluginRegistry::initialize_all`] has
    /// run, new registrations start disabled; call
    /// [`PluginRegistry::enable`] to initialize them.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let entry = Arc::new(PluginEntry::new(plugin));
        let name = entry.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::Validation("plugin name must not be empty".to_string()));
        }
        if entry.is_enabled() && self.is_live() {
            debug!("Plugin {} registered after startup, left disabled until enabled", name);
            entry.set_enabled(false);
        }

        let capabilities = entry.views.capabilities();
        {
            let mut state = self.write();
            if state.by_name.contains_key(&name) {
                warn!("Plugin {} is already registered, replacing", name);
                state.remove_name(&name);
            }
            state.by_name.insert(name.clone(), Arc::clone(&entry));
            state.order.push(Arc::clone(&entry));
            for capability in &capabilities {
                state
                    .by_capability
                    .entry(*capability)
                    .or_default()
                    .push(Arc::clone(&entry));
            }
        }

        info!(
            capabilities = ?capabilities,
            "Registered plugin: {} v{} by {}",
            name, entry.info.version, entry.info.author
        );
        Ok(())
    }

    /// First enabled plugin with capability `K`, in registration order.
    pub fn get<K: CapabilityKind>(&self) -> Option<Arc<K::Target>> {
        let state = self.read();
        let found = state
            .enabled_for(K::CAPABILITY)
            .find_map(|e| K::select(&e.views));
        found
    }

    /// All enabled plugins with capability `K`, in registration order.
    pub fn get_all<K: CapabilityKind>(&self) -> Vec<Arc<K::Target>> {
        self.read()
            .enabled_for(K::CAPABILITY)
            .filter_map(|e| K::select(&e.views))
            .collect()
    }

    /// All enabled plugins indexed under `capability`.
    pub fn get_all_by(&self, capability: Capability) -> Vec<Arc<dyn Plugin>> {
        self.read()
            .enabled_for(capability)
            .map(|e| Arc::clone(&e.plugin))
            .collect()
    }

    /// All enabled plugins, in registration order.
    pub fn get_all_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.read()
            .enabled_entries()
            .into_iter()
            .map(|e| Arc::clone(&e.plugin))
            .collect()
    }

    /// Direct lookup by name, regardless of enabled state.
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.read().by_name.get(name).map(|e| Arc::clone(&e.plugin))
    }

    /// Enabled flag of a plugin, if registered.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.read().by_name.get(name).map(|e| e.is_enabled())
    }

    /// Capabilities a registered plugin declares.
    pub fn capabilities_of(&self, name: &str) -> Option<Vec<Capability>> {
        self.read().by_name.get(name).map(|e| e.views.capabilities())
    }

    /// Registration details for every plugin, enabled or not.
    pub fn list(&self) -> Vec<RegisteredPlugin> {
        self.read()
            .order
            .iter()
            .map(|e| RegisteredPlugin {
                info: e.info.clone(),
                capabilities: e.views.capabilities(),
                enabled: e.is_enabled(),
                registered_at: e.registered_at,
            })
            .collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.read().order.iter().map(|e| e.name().to_string()).collect()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enable a plugin, running its initialize hook.
    ///
    /// No-op if already enabled. The flag flips only after a successful
    /// initialize; a failure leaves the plugin disabled and is returned.
    pub async fn enable(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let _transition = entry.transition.lock().await;
        if entry.is_enabled() {
            return Ok(());
        }

        match guarded(entry.plugin.initialize()).await {
            Ok(()) => {
                entry.set_enabled(true);
                info!("Plugin enabled: {}", name);
                Ok(())
            }
            Err(e) => {
                error!("Error enabling plugin {}: {}", name, e.message);
                Err(Error::ProviderInitialization {
                    plugin: name.to_string(),
                    message: e.message,
                })
            }
        }
    }

    /// Disable a plugin, running its dispose hook.
    ///
    /// No-op if already disabled. The flag flips regardless of the dispose
    /// outcome; a dispose failure is logged and returned.
    pub async fn disable(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let _transition = entry.transition.lock().await;
        if !entry.is_enabled() {
            return Ok(());
        }

        let outcome = guarded(entry.plugin.dispose()).await;
        entry.set_enabled(false);
        match outcome {
            Ok(()) => {
                info!("Plugin disabled: {}", name);
                Ok(())
            }
            Err(e) => {
                error!("Error disposing plugin {} while disabling: {}", name, e.message);
                Err(Error::ProviderDisposal {
                    plugin: name.to_string(),
                    message: e.message,
                })
            }
        }
    }

    /// Initialize every currently-enabled plugin concurrently.
    ///
    /// A plugin whose initialize hook fails is force-disabled and logged;
    /// the remaining plugins are unaffected.
    pub async fn initialize_all(&self) {
        self.live.store(true, Ordering::Release);
        let (entries, total) = {
            let state = self.read();
            (state.enabled_entries(), state.by_name.len())
        };
        info!("Initializing {} plugins...", entries.len());

        join_all(entries.iter().map(|entry| async move {
            let _transition = entry.transition.lock().await;
            if !entry.is_enabled() {
                return;
            }
            match guarded(entry.plugin.initialize()).await {
                Ok(()) => debug!("Plugin initialized: {}", entry.name()),
                Err(e) => {
                    error!("Error initializing plugin {}: {}", entry.name(), e.message);
                    entry.set_enabled(false);
                }
            }
        }))
        .await;

        let enabled = self.read().enabled_entries().len();
        info!("Plugins initialized: {}/{}", enabled, total);
    }

    /// Dispose every enabled plugin concurrently.
    ///
    /// Best-effort: failures are logged and swallowed. Disposed plugins are
    /// left disabled.
    pub async fn dispose_all(&self) {
        self.live.store(false, Ordering::Release);
        let entries = self.read().enabled_entries();
        info!("Disposing {} plugins...", entries.len());

        join_all(entries.iter().map(|entry| async move {
            let _transition = entry.transition.lock().await;
            if !entry.is_enabled() {
                return;
            }
            if let Err(e) = guarded(entry.plugin.dispose()).await {
                error!("Error disposing plugin {}: {}", entry.name(), e.message);
            } else {
                debug!("Plugin disposed: {}", entry.name());
            }
            entry.set_enabled(false);
        }))
        .await;

        info!("All plugins disposed");
    }

    /// Poll every enabled plugin's health probe concurrently.
    ///
    /// A probe that fails is recorded as [`HealthStatus::Unhealthy`].
    pub async fn check_health(&self) -> HashMap<String, HealthStatus> {
        let entries = self.read().enabled_entries();

        let results = join_all(entries.iter().map(|entry| async move {
            let status = match guarded(entry.plugin.check_health()).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Error checking health of plugin {}: {}", entry.name(), e.message);
                    HealthStatus::Unhealthy
                }
            };
            (entry.name().to_string(), status)
        }))
        .await;

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::capability::{ChatCapability, ImageAnalysisCapability};
    use crate::plugin::testing::StubPlugin;

    fn registry_with(plugins: Vec<Arc<StubPlugin>>) -> PluginRegistry {
        let registry = PluginRegistry::new();
        for plugin in plugins {
            registry.register(plugin).unwrap();
        }
        registry
    }

    #[test]
    fn test_registry_creation() {
        let registry = PluginRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get::<ChatCapability>().is_none());
    }

    #[test]
    fn test_register_and_lookup_by_name() {
        let plugin = Arc::new(StubPlugin::new("echo").with_chat());
        let registry = registry_with(vec![plugin.clone()]);

        assert_eq!(registry.len(), 1);
        let found = registry.plugin("echo").unwrap();
        assert_eq!(found.info().name, "echo");
        assert_eq!(registry.capabilities_of("echo"), Some(vec![Capability::Chat]));
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = PluginRegistry::new();
        let result = registry.register(Arc::new(StubPlugin::new("  ")));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistration_replaces_without_ghosts() {
        let first = Arc::new(StubPlugin::new("dup").with_chat().with_version("1.0.0"));
        let second = Arc::new(StubPlugin::new("dup").with_image().with_version("2.0.0"));
        let registry = registry_with(vec![first, second]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.plugin("dup").unwrap().info().version, "2.0.0");
        // Old chat view is gone, new image view is present
        assert!(registry.get_all::<ChatCapability>().is_empty());
        assert_eq!(registry.get_all::<ImageAnalysisCapability>().len(), 1);
        assert_eq!(registry.names(), vec!["dup".to_string()]);
    }

    #[test]
    fn test_reregistration_same_capability_no_duplicates() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("a").with_chat()),
            Arc::new(StubPlugin::new("b").with_chat()),
            Arc::new(StubPlugin::new("a").with_chat()),
        ]);

        let names: Vec<String> = registry
            .get_all::<ChatCapability>()
            .iter()
            .map(|p| p.info().name)
            .collect();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_lookups_filter_disabled() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("off").with_chat().disabled_by_default()),
            Arc::new(StubPlugin::new("on").with_chat()),
        ]);

        let chat = registry.get::<ChatCapability>().unwrap();
        assert_eq!(chat.info().name, "on");
        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);
        assert_eq!(registry.get_all_plugins().len(), 1);
        assert_eq!(registry.get_all_by(Capability::Chat).len(), 1);
        // Name lookup still resolves disabled plugins
        assert!(registry.plugin("off").is_some());
        assert_eq!(registry.is_enabled("off"), Some(false));
    }

    #[test]
    fn test_multi_capability_plugin_indexed_twice() {
        let registry = registry_with(vec![Arc::new(StubPlugin::new("both").with_chat().with_image())]);

        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);
        assert_eq!(registry.get_all::<ImageAnalysisCapability>().len(), 1);
        assert_eq!(registry.get_all_plugins().len(), 1);
    }

    #[tokio::test]
    async fn test_disable_removes_from_queries() {
        let plugin = Arc::new(StubPlugin::new("chatty").with_chat());
        let registry = registry_with(vec![plugin.clone()]);
        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);

        registry.disable("chatty").await.unwrap();

        assert!(registry.get_all::<ChatCapability>().is_empty());
        assert_eq!(plugin.dispose_calls(), 1);
    }

    #[tokio::test]
    async fn test_disable_twice_disposes_once() {
        let plugin = Arc::new(StubPlugin::new("once"));
        let registry = registry_with(vec![plugin.clone()]);

        registry.disable("once").await.unwrap();
        registry.disable("once").await.unwrap();

        assert_eq!(plugin.dispose_calls(), 1);
    }

    #[tokio::test]
    async fn test_disable_flips_even_when_dispose_fails() {
        let plugin = Arc::new(StubPlugin::new("sticky").failing_dispose());
        let registry = registry_with(vec![plugin]);

        let result = registry.disable("sticky").await;

        assert!(matches!(result, Err(Error::ProviderDisposal { .. })));
        assert_eq!(registry.is_enabled("sticky"), Some(false));
    }

    #[tokio::test]
    async fn test_enable_unknown_plugin() {
        let registry = PluginRegistry::new();
        assert!(matches!(registry.enable("ghost").await, Err(Error::PluginNotFound(_))));
        assert!(matches!(registry.disable("ghost").await, Err(Error::PluginNotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_runs_initialize() {
        let plugin = Arc::new(StubPlugin::new("late").with_chat().disabled_by_default());
        let registry = registry_with(vec![plugin.clone()]);

        registry.enable("late").await.unwrap();
        registry.enable("late").await.unwrap();

        assert_eq!(plugin.init_calls(), 1);
        assert_eq!(registry.is_enabled("late"), Some(true));
        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_keeps_disabled() {
        let plugin = Arc::new(StubPlugin::new("broken").failing_init().disabled_by_default());
        let registry = registry_with(vec![plugin.clone()]);

        let result = registry.enable("broken").await;

        match result {
            Err(Error::ProviderInitialization { plugin: name, .. }) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(registry.is_enabled("broken"), Some(false));
    }

    #[tokio::test]
    async fn test_initialize_all_disables_failures() {
        let good = Arc::new(StubPlugin::new("good").with_chat());
        let bad = Arc::new(StubPlugin::new("bad").with_chat().failing_init());
        let idle = Arc::new(StubPlugin::new("idle").disabled_by_default());
        let registry = registry_with(vec![good.clone(), bad.clone(), idle.clone()]);

        registry.initialize_all().await;

        assert_eq!(good.init_calls(), 1);
        assert_eq!(bad.init_calls(), 1);
        assert_eq!(idle.init_calls(), 0);
        assert_eq!(registry.is_enabled("bad"), Some(false));
        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_all_survives_panics() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("panicky").panicking_init()),
            Arc::new(StubPlugin::new("calm")),
        ]);

        registry.initialize_all().await;

        assert_eq!(registry.is_enabled("panicky"), Some(false));
        assert_eq!(registry.is_enabled("calm"), Some(true));
    }

    #[tokio::test]
    async fn test_register_after_initialize_starts_disabled() {
        let early = Arc::new(StubPlugin::new("early").with_chat());
        let registry = registry_with(vec![early.clone()]);
        registry.initialize_all().await;
        assert!(registry.is_live());

        let late = Arc::new(StubPlugin::new("late").with_chat());
        registry.register(late.clone()).unwrap();

        assert_eq!(registry.is_enabled("late"), Some(false));
        assert_eq!(registry.get_all::<ChatCapability>().len(), 1);

        registry.enable("late").await.unwrap();

        assert_eq!(late.init_calls(), 1);
        assert_eq!(registry.get_all::<ChatCapability>().len(), 2);

        registry.dispose_all().await;
        assert!(!registry.is_live());
    }

    #[tokio::test]
    async fn test_dispose_all_is_best_effort() {
        let ok = Arc::new(StubPlugin::new("ok"));
        let failing = Arc::new(StubPlugin::new("failing").failing_dispose());
        let registry = registry_with(vec![ok.clone(), failing.clone()]);

        registry.dispose_all().await;

        assert_eq!(ok.dispose_calls(), 1);
        assert_eq!(failing.dispose_calls(), 1);
        assert!(registry.get_all_plugins().is_empty());

        // Second pass has nothing left to dispose
        registry.dispose_all().await;
        assert_eq!(ok.dispose_calls(), 1);
    }

    #[tokio::test]
    async fn test_check_health_records_failures() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("fine").with_health(HealthStatus::Healthy)),
            Arc::new(StubPlugin::new("meh").with_health(HealthStatus::Degraded)),
            Arc::new(StubPlugin::new("sick").failing_health()),
        ]);

        let health = registry.check_health().await;

        assert_eq!(health.len(), 3);
        assert_eq!(health["fine"], HealthStatus::Healthy);
        assert_eq!(health["meh"], HealthStatus::Degraded);
        assert_eq!(health["sick"], HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_check_health_skips_disabled() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("on")),
            Arc::new(StubPlugin::new("off").disabled_by_default()),
        ]);

        let health = registry.check_health().await;
        assert_eq!(health.len(), 1);
        assert!(health.contains_key("on"));
    }

    #[test]
    fn test_list_reports_state() {
        let registry = registry_with(vec![
            Arc::new(StubPlugin::new("a").with_chat()),
            Arc::new(StubPlugin::new("b").disabled_by_default()),
        ]);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].info.name, "a");
        assert!(listed[0].enabled);
        assert_eq!(listed[0].capabilities, vec![Capability::Chat]);
        assert!(!listed[1].enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_lookup() {
        let registry = Arc::new(PluginRegistry::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let name = format!("plugin-{}", i % 8);
                registry
                    .register(Arc::new(StubPlugin::new(&name).with_chat()))
                    .unwrap();
                let _ = registry.get_all::<ChatCapability>();
                let _ = registry.check_health().await;
                if i % 3 == 0 {
                    let _ = registry.disable(&name).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 8);
        let chat_names: Vec<String> = registry
            .get_all::<ChatCapability>()
            .iter()
            .map(|p| p.info().name)
            .collect();
        let mut deduped = chat_names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(chat_names.len(), deduped.len());
    }
}
