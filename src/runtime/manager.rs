//! 运行时管理器
//!
//! 内容进程中的插件/主题管理入口：加载、卸载、启用、禁用、启停，
//! 以及页面加载完成后的批量加载。

use std::sync::{Arc, Weak};

use super::api::RuntimeApi;
use super::channel::SignalBus;
use super::guest::{GuestHost, ScriptEngine};
use super::handshake::Handshake;
use super::injector::{
    plugin_script_tag, plugin_style_tag, theme_style_tag, CodeInjector, InjectionHandle,
    StyleInjector,
};
use super::lifecycle::{controller_for, LifecycleController};
use super::registry::{RegistryRecord, RegistryStore};
use super::types::{BootReport, InstanceView, LoadOutcome, RuntimeError, SharedInstance};
use crate::config::{LifecycleStrategy, RuntimeOptions};
use crate::content::{validate_id, ContentProvider};
use crate::introspect::Introspection;
use crate::ipc::ExecQueue;
use crate::page::Page;
use tokio_util::sync::CancellationToken;

/// 策略实现共享的运行时状态
pub(crate) struct RuntimeCore {
    pub(crate) options: RuntimeOptions,
    pub(crate) provider: Arc<dyn ContentProvider>,
    pub(crate) page: Arc<dyn Page>,
    pub(crate) registry: RegistryStore,
    pub(crate) handshake: Handshake,
    pub(crate) signals: SignalBus,
    pub(crate) styles: StyleInjector,
    pub(crate) code: CodeInjector,
    pub(crate) guest: Arc<GuestHost>,
}

impl RuntimeCore {
    pub(crate) fn inject_code(
        &self,
        plugin_id: &str,
        source: &str,
        watcher: Option<CancellationToken>,
    ) -> InjectionHandle {
        self.code.inject(
            &self.page,
            &self.guest,
            self.signals.channel(plugin_id),
            plugin_id,
            source,
            watcher,
        )
    }

    /// 删除记录以及该插件在页面上的全部节点
    fn purge(&self, plugin_id: &str) -> Option<RegistryRecord> {
        let record = self.registry.remove(plugin_id);
        if let Some(resource) = record.as_ref().and_then(|r| r.resource.as_ref()) {
            self.page.revoke_resource(resource);
        }
        self.guest.discard(plugin_id);
        let scripts = self.code.remove(self.page.as_ref(), plugin_id);
        let styles = self
            .styles
            .remove(self.page.as_ref(), &plugin_style_tag(plugin_id));
        tracing::debug!(
            "[RUNTIME] 插件 {} 已清理: {} 个脚本节点, {} 个样式节点",
            plugin_id,
            scripts,
            styles
        );
        record
    }
}

pub(crate) struct ManagerInner {
    pub(crate) core: RuntimeCore,
    pub(crate) lifecycle: Box<dyn LifecycleController>,
    pub(crate) introspection: Introspection,
    exec: ExecQueue<dyn Page>,
}

impl ManagerInner {
    pub(crate) async fn load_plugin(&self, plugin_id: &str) -> LoadOutcome {
        if let Err(e) = validate_id(plugin_id) {
            tracing::warn!("[RUNTIME] {}", e);
            return LoadOutcome::Failed(RuntimeError::InvalidId(plugin_id.to_string()));
        }

        if let Some(existing) = self.core.registry.get(plugin_id) {
            tracing::info!("[RUNTIME] 插件 {} 已加载，跳过", plugin_id);
            return if existing.instance.is_some() {
                LoadOutcome::Running
            } else {
                LoadOutcome::LoadedWithoutInstance
            };
        }

        let Some(files) = self
            .core
            .provider
            .plugin_files(plugin_id)
            .filter(|files| !files.is_empty())
        else {
            let err = RuntimeError::ContentNotFound(plugin_id.to_string());
            tracing::warn!("[RUNTIME] {}", err);
            return LoadOutcome::Failed(err);
        };

        if !self.core.registry.insert_new(plugin_id) {
            tracing::info!("[RUNTIME] 插件 {} 正在加载，跳过", plugin_id);
            return LoadOutcome::LoadedWithoutInstance;
        }

        if let Some(css) = files.css.as_deref() {
            let style = self.core.styles.apply(
                self.core.page.as_ref(),
                &plugin_style_tag(plugin_id),
                css,
            );
            self.core
                .registry
                .update(plugin_id, |record| record.style = Some(style));
        }

        let outcome = match files.code.as_deref() {
            Some(code) => self.lifecycle.deliver(&self.core, plugin_id, code).await,
            None => LoadOutcome::LoadedWithoutInstance,
        };

        match &outcome {
            LoadOutcome::Failed(e) => {
                tracing::error!("[RUNTIME] 插件 {} 加载失败: {}", plugin_id, e);
                self.core.purge(plugin_id);
            }
            LoadOutcome::Running => {
                tracing::info!("[RUNTIME] 插件 {} 已加载并启动", plugin_id);
            }
            LoadOutcome::LoadedWithoutInstance => {
                tracing::info!("[RUNTIME] 插件 {} 已加载，但没有运行实例", plugin_id);
            }
            LoadOutcome::Delivered => {
                tracing::info!("[RUNTIME] 插件 {} 已注入", plugin_id);
            }
        }
        outcome
    }

    pub(crate) fn unload_plugin(&self, plugin_id: &str) -> bool {
        let Some(record) = self.core.registry.get(plugin_id) else {
            tracing::debug!("[RUNTIME] 插件 {} 未加载，无需卸载", plugin_id);
            return false;
        };

        self.lifecycle.release(plugin_id, &record);
        self.core.purge(plugin_id);
        tracing::info!("[RUNTIME] 插件 {} 已卸载", plugin_id);
        true
    }

    pub(crate) async fn enable_plugin(&self, plugin_id: &str) -> bool {
        if !self.core.provider.enable_plugin(plugin_id) {
            tracing::warn!("[RUNTIME] 启用插件 {} 失败", plugin_id);
            return false;
        }
        // 返回值只反映持久化结果，加载结果仅记录日志
        let outcome = self.load_plugin(plugin_id).await;
        if outcome.is_loaded() {
            tracing::info!("[RUNTIME] 插件 {} 已启用: {}", plugin_id, outcome);
        } else {
            tracing::warn!("[RUNTIME] 插件 {} 已启用，但加载失败: {}", plugin_id, outcome);
        }
        true
    }

    pub(crate) fn disable_plugin(&self, plugin_id: &str) -> bool {
        self.unload_plugin(plugin_id);
        let persisted = self.core.provider.disable_plugin(plugin_id);
        if !persisted {
            tracing::warn!("[RUNTIME] 禁用插件 {} 失败", plugin_id);
        }
        persisted
    }

    pub(crate) fn load_theme(&self, theme_id: &str) -> bool {
        if let Err(e) = validate_id(theme_id) {
            tracing::warn!("[RUNTIME] {}", e);
            return false;
        }
        let Some(css) = self
            .core
            .provider
            .theme_files(theme_id)
            .and_then(|files| files.css)
        else {
            tracing::warn!("[RUNTIME] 主题 {} 没有样式内容", theme_id);
            return false;
        };

        let page = self.core.page.as_ref();
        let tag = theme_style_tag(theme_id);
        // 重复加载时替换旧节点
        self.core.styles.remove(page, &tag);
        self.core.styles.apply(page, &tag, &css);
        tracing::info!("[RUNTIME] 主题 {} 已应用", theme_id);
        true
    }

    pub(crate) fn unload_theme(&self, theme_id: &str) -> bool {
        let removed = self
            .core
            .styles
            .remove(self.core.page.as_ref(), &theme_style_tag(theme_id));
        tracing::info!("[RUNTIME] 主题 {} 已卸载", theme_id);
        removed > 0
    }

    pub(crate) fn enable_theme(&self, theme_id: &str) -> bool {
        let persisted = self.core.provider.enable_theme(theme_id);
        if persisted {
            self.load_theme(theme_id);
        } else {
            tracing::warn!("[RUNTIME] 启用主题 {} 失败", theme_id);
        }
        persisted
    }

    pub(crate) fn disable_theme(&self, theme_id: &str) -> bool {
        self.unload_theme(theme_id);
        self.core.provider.disable_theme(theme_id)
    }

    pub(crate) fn register_plugin(&self, instance: SharedInstance) -> bool {
        match self.core.handshake.register(instance) {
            Ok(plugin_id) => {
                tracing::debug!("[HANDSHAKE] 收到插件 {} 的注册", plugin_id);
                true
            }
            Err(e) => {
                tracing::error!("[HANDSHAKE] {}", e);
                false
            }
        }
    }

    pub(crate) fn set_running(&self, plugin_id: &str, running: bool) -> bool {
        self.lifecycle.set_running(&self.core, plugin_id, running)
    }

    pub(crate) fn is_plugin_running(&self, plugin_id: &str) -> bool {
        self.lifecycle.is_running(&self.core, plugin_id)
    }

    async fn load_enabled(&self) -> BootReport {
        let mut report = BootReport::default();

        let plugins = self.core.provider.list_plugins();
        tracing::info!("[RUNTIME] 发现 {} 个插件", plugins.len());
        for listing in plugins.iter().filter(|p| p.enabled) {
            let outcome = self.load_plugin(&listing.id).await;
            if outcome.is_loaded() {
                tracing::info!("[RUNTIME] 已加载插件: {} ({})", listing.id, outcome);
                report.plugins_loaded.push(listing.id.clone());
            } else {
                tracing::warn!("[RUNTIME] 插件加载失败: {} ({})", listing.id, outcome);
                report.plugins_failed.push(listing.id.clone());
            }
        }

        let themes = self.core.provider.list_themes();
        tracing::info!("[RUNTIME] 发现 {} 个主题", themes.len());
        for listing in themes.iter().filter(|t| t.enabled) {
            if self.load_theme(&listing.id) {
                report.themes_loaded.push(listing.id.clone());
            } else {
                report.themes_failed.push(listing.id.clone());
            }
        }

        self.exec.mark_loaded();
        report
    }
}

/// 运行时管理器
///
/// 可克隆的句柄，所有克隆共享同一个内容进程状态。
#[derive(Clone)]
pub struct RuntimeManager {
    inner: Arc<ManagerInner>,
}

impl RuntimeManager {
    pub fn builder(provider: Arc<dyn ContentProvider>, page: Arc<dyn Page>) -> RuntimeBuilder {
        RuntimeBuilder {
            options: RuntimeOptions::default(),
            provider,
            page,
            engine: None,
            introspection: Introspection::default(),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.core.options
    }

    pub fn strategy(&self) -> LifecycleStrategy {
        self.inner.lifecycle.strategy()
    }

    /// 交给插件代码的 API 句柄
    pub fn api(&self) -> RuntimeApi {
        RuntimeApi::new(Arc::downgrade(&self.inner))
    }

    pub async fn load_plugin(&self, plugin_id: &str) -> LoadOutcome {
        self.inner.load_plugin(plugin_id).await
    }

    pub fn unload_plugin(&self, plugin_id: &str) -> bool {
        self.inner.unload_plugin(plugin_id)
    }

    pub async fn enable_plugin(&self, plugin_id: &str) -> bool {
        self.inner.enable_plugin(plugin_id).await
    }

    pub fn disable_plugin(&self, plugin_id: &str) -> bool {
        self.inner.disable_plugin(plugin_id)
    }

    pub fn load_theme(&self, theme_id: &str) -> bool {
        self.inner.load_theme(theme_id)
    }

    pub fn unload_theme(&self, theme_id: &str) -> bool {
        self.inner.unload_theme(theme_id)
    }

    pub fn enable_theme(&self, theme_id: &str) -> bool {
        self.inner.enable_theme(theme_id)
    }

    pub fn disable_theme(&self, theme_id: &str) -> bool {
        self.inner.disable_theme(theme_id)
    }

    pub fn register_plugin(&self, instance: SharedInstance) -> bool {
        self.inner.register_plugin(instance)
    }

    pub fn set_running(&self, plugin_id: &str, running: bool) -> bool {
        self.inner.set_running(plugin_id, running)
    }

    pub fn start_plugin(&self, plugin_id: &str) -> bool {
        self.set_running(plugin_id, true)
    }

    pub fn stop_plugin(&self, plugin_id: &str) -> bool {
        self.set_running(plugin_id, false)
    }

    pub fn is_plugin_running(&self, plugin_id: &str) -> bool {
        self.inner.is_plugin_running(plugin_id)
    }

    pub fn is_loaded(&self, plugin_id: &str) -> bool {
        self.inner.core.registry.contains(plugin_id)
    }

    pub fn instances(&self) -> Vec<InstanceView> {
        self.inner.core.registry.views()
    }

    /// 页面加载完成：加载所有已启用的插件和主题，并投递缓存的执行请求
    pub async fn load_enabled(&self) -> BootReport {
        self.inner.load_enabled().await
    }

    /// 单向执行请求，页面加载完成前缓存
    pub fn run_remote(&self, code: impl Into<String>) -> bool {
        self.inner.exec.send(code)
    }

    pub fn introspection(&self) -> &Introspection {
        &self.inner.introspection
    }

    /// 卸载全部插件并解除页面挂钩
    pub fn shutdown(&self) {
        for plugin_id in self.inner.core.registry.ids() {
            self.inner.unload_plugin(&plugin_id);
        }
        self.inner.core.page.set_executor(None);
        self.inner.introspection.uninstall();
        tracing::info!("[RUNTIME] 运行时已关闭");
    }
}

pub struct RuntimeBuilder {
    options: RuntimeOptions,
    provider: Arc<dyn ContentProvider>,
    page: Arc<dyn Page>,
    engine: Option<Arc<dyn ScriptEngine>>,
    introspection: Introspection,
}

impl RuntimeBuilder {
    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// 原生脚本引擎；webview 页面不需要
    pub fn engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn introspection(mut self, introspection: Introspection) -> Self {
        self.introspection = introspection;
        self
    }

    pub fn build(self) -> RuntimeManager {
        let Self {
            options,
            provider,
            page,
            engine,
            introspection,
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let api = RuntimeApi::new(weak.clone());
            ManagerInner {
                core: RuntimeCore {
                    registry: RegistryStore::new(),
                    handshake: Handshake::new(options.registration_timeout()),
                    signals: SignalBus::default(),
                    styles: StyleInjector::new(options.marker_attribute.clone()),
                    code: CodeInjector::new(&options),
                    guest: Arc::new(GuestHost::new(engine, api)),
                    provider,
                    page: page.clone(),
                    options: options.clone(),
                },
                lifecycle: controller_for(options.strategy),
                introspection,
                exec: ExecQueue::new(page),
            }
        });

        inner.core.page.set_executor(Some(inner.core.guest.clone()));
        tracing::info!(
            "[RUNTIME] 运行时已创建，生命周期策略: {:?}",
            inner.lifecycle.strategy()
        );
        RuntimeManager { inner }
    }
}
