//! 插件 API
//!
//! 暴露给插件代码的全局对象。持有管理器的弱引用，
//! 管理器关闭后所有调用返回默认值。

use std::sync::{Arc, Weak};

use super::manager::ManagerInner;
use super::types::{InstanceView, LoadOutcome, RuntimeError, SharedInstance};
use crate::content::ContentListing;
use crate::introspect::{ModuleIndex, UiPatcher};

#[derive(Clone)]
pub struct RuntimeApi {
    inner: Weak<ManagerInner>,
}

impl RuntimeApi {
    pub(crate) fn new(inner: Weak<ManagerInner>) -> Self {
        Self { inner }
    }

    fn upgrade(&self) -> Option<Arc<ManagerInner>> {
        let inner = self.inner.upgrade();
        if inner.is_none() {
            tracing::debug!("[API] {}", RuntimeError::Shutdown);
        }
        inner
    }

    // ===== 握手 =====

    /// 把插件实例交给当前等待中的加载
    pub fn register_plugin(&self, instance: SharedInstance) -> bool {
        self.upgrade()
            .map(|inner| inner.register_plugin(instance))
            .unwrap_or(false)
    }

    /// 报告插件代码执行完毕但没有导出实例
    pub fn report_empty(&self, plugin_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.core.handshake.report_empty(plugin_id))
            .unwrap_or(false)
    }

    /// 当前等待注册的插件 ID
    pub fn pending_id(&self) -> Option<String> {
        self.upgrade()
            .and_then(|inner| inner.core.handshake.pending_id())
    }

    // ===== 生命周期 =====

    pub fn is_plugin_running(&self, plugin_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.is_plugin_running(plugin_id))
            .unwrap_or(false)
    }

    pub fn start_plugin(&self, plugin_id: &str) -> bool {
        self.set_running(plugin_id, true)
    }

    pub fn stop_plugin(&self, plugin_id: &str) -> bool {
        self.set_running(plugin_id, false)
    }

    pub fn set_running(&self, plugin_id: &str, running: bool) -> bool {
        self.upgrade()
            .map(|inner| inner.set_running(plugin_id, running))
            .unwrap_or(false)
    }

    // ===== 内容管理 =====

    pub fn list_plugins(&self) -> Vec<ContentListing> {
        self.upgrade()
            .map(|inner| inner.core.provider.list_plugins())
            .unwrap_or_default()
    }

    pub fn list_themes(&self) -> Vec<ContentListing> {
        self.upgrade()
            .map(|inner| inner.core.provider.list_themes())
            .unwrap_or_default()
    }

    pub async fn load_plugin(&self, plugin_id: &str) -> LoadOutcome {
        match self.upgrade() {
            Some(inner) => inner.load_plugin(plugin_id).await,
            None => LoadOutcome::Failed(RuntimeError::Shutdown),
        }
    }

    pub fn unload_plugin(&self, plugin_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.unload_plugin(plugin_id))
            .unwrap_or(false)
    }

    pub async fn enable_plugin(&self, plugin_id: &str) -> bool {
        match self.upgrade() {
            Some(inner) => inner.enable_plugin(plugin_id).await,
            None => false,
        }
    }

    pub fn disable_plugin(&self, plugin_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.disable_plugin(plugin_id))
            .unwrap_or(false)
    }

    pub fn load_theme(&self, theme_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.load_theme(theme_id))
            .unwrap_or(false)
    }

    pub fn unload_theme(&self, theme_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.unload_theme(theme_id))
            .unwrap_or(false)
    }

    pub fn enable_theme(&self, theme_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.enable_theme(theme_id))
            .unwrap_or(false)
    }

    pub fn disable_theme(&self, theme_id: &str) -> bool {
        self.upgrade()
            .map(|inner| inner.disable_theme(theme_id))
            .unwrap_or(false)
    }

    pub fn instances(&self) -> Vec<InstanceView> {
        self.upgrade()
            .map(|inner| inner.core.registry.views())
            .unwrap_or_default()
    }

    // ===== 内省 =====

    pub fn modules(&self) -> Option<Arc<dyn ModuleIndex>> {
        self.upgrade().and_then(|inner| inner.introspection.modules())
    }

    pub fn ui(&self) -> Option<Arc<UiPatcher>> {
        self.upgrade().and_then(|inner| inner.introspection.ui())
    }
}
