//! livemod - 运行时插件与主题管理器
//!
//! 在不重启宿主应用的前提下，把第三方插件脚本和主题样式注入到正在运行的页面中，
//! 并负责它们的注册握手、启停生命周期以及卸载清理。
//!
//! 模块划分：
//! - config: 持久化配置与运行时选项
//! - content: 特权进程侧的清单/内容提供者
//! - ipc: 特权进程与内容进程之间的请求/响应模型
//! - page: 页面节点模型（样式节点、脚本节点、临时资源）
//! - runtime: 注册表、注入器、握手、生命周期控制器与插件 API
//! - introspect: 暴露给插件代码的模块解析器和 UI 树补丁器
//! - logger: 日志存储与 tracing 初始化

pub mod config;
pub mod content;
pub mod introspect;
pub mod ipc;
pub mod logger;
pub mod page;
pub mod runtime;

pub use config::{Config, ConfigError, ConfigStore, LifecycleStrategy, RuntimeOptions};
pub use content::{
    ContentError, ContentListing, ContentProvider, FsContentStore, Manifest, MemoryProvider,
    PluginFiles, ThemeFiles,
};
pub use introspect::{Introspection, ModuleIndex, UiPatcher};
pub use page::{MemoryPage, NodeId, NodeKind, Page};
pub use runtime::{
    BootReport, InstanceView, LoadOutcome, PluginFault, PluginInstance, RuntimeApi,
    RuntimeError, RuntimeManager, ScriptEngine, Startable, Stoppable,
};
