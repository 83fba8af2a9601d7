//! 内省工具
//!
//! 暴露给插件代码的两个工具：
//! - 模块解析器：在宿主页面的打包运行时中按条件查找模块导出
//! - UI 树补丁器：替换宿主 UI 中的组件并让已渲染的树失效

mod modules;
mod ui_tree;
mod value;

pub use modules::{
    module_object, safe_match, BundlerRuntime, Chunk, ChunkModuleIndex, Filter, MemoryBundler,
    ModuleFactory, ModuleIndex, RequireFn,
};
pub use ui_tree::{
    component, fiber, mark_stale, missing_component, ComponentFn, ContainerNode, CreateElementFn,
    DomClient, Element, ElementRuntime, ElementType, FiberNode, FiberRef, HostDocument, HostRoot,
    IntegrationAdapter, MemoryDocument, MemoryRoot, Props, ReactDomAdapter, RootConstructor,
    UiNode, UiPatcher, ORIGINAL_FLAG, ROOT_KEY_PREFIX, STALE_MARKER,
};
pub use value::{same_value, HostRef, HostValue, ValueKind};

use std::sync::Arc;

/// 已安装的内省工具
#[derive(Clone, Default)]
pub struct Introspection {
    modules: Option<Arc<dyn ModuleIndex>>,
    ui: Option<Arc<UiPatcher>>,
}

impl Introspection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modules(mut self, modules: Arc<dyn ModuleIndex>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn with_ui(mut self, ui: Arc<UiPatcher>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// 在页面上安装模块解析器和 UI 树补丁器
    ///
    /// 任何一步失败都只记录日志，对应的工具保持缺失。
    pub fn install(
        bundler: Arc<dyn BundlerRuntime>,
        document: Arc<dyn HostDocument>,
        container_class: &str,
    ) -> Self {
        let Some(index) = ChunkModuleIndex::install(bundler) else {
            return Self::default();
        };
        let modules: Arc<dyn ModuleIndex> = Arc::new(index);
        let ui = ReactDomAdapter::from_modules(modules.as_ref(), document, container_class)
            .map(|adapter| UiPatcher::install(Arc::new(adapter)));

        Self {
            modules: Some(modules),
            ui,
        }
    }

    pub fn modules(&self) -> Option<Arc<dyn ModuleIndex>> {
        self.modules.clone()
    }

    pub fn ui(&self) -> Option<Arc<UiPatcher>> {
        self.ui.clone()
    }

    pub fn uninstall(&self) {
        if let Some(ui) = &self.ui {
            ui.uninstall();
        }
    }
}

#[cfg(test)]
mod tests;
