//! 运行时类型定义
//!
//! 定义 RuntimeError、插件实例能力 trait、加载结果等核心类型

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 运行时错误类型
///
/// 对外操作只返回 bool / 结果枚举并记录日志，这里的错误用于日志和 `LoadOutcome::Failed`。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("内容不存在: {0}")]
    ContentNotFound(String),

    #[error("注册超时: {plugin_id} 在 {timeout_ms}ms 内未调用 registerPlugin")]
    RegistrationTimeout { plugin_id: String, timeout_ms: u64 },

    #[error("registerPlugin 在没有加载上下文时被调用，已忽略")]
    OrphanRegistration,

    #[error("插件 {pending} 正在等待注册，拒绝加载 {requested}")]
    RegistrationBusy { pending: String, requested: String },

    #[error("插件执行失败: {plugin_id} - {message}")]
    PluginFault { plugin_id: String, message: String },

    #[error("无效的插件 ID: {0}")]
    InvalidId(String),

    #[error("插件未加载: {0}")]
    NotLoaded(String),

    #[error("运行时已关闭")]
    Shutdown,
}

/// 插件代码抛出的错误（返回的 Err 或 panic）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PluginFault(pub String);

impl PluginFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 可启动能力
pub trait Startable: Send + Sync {
    fn start(&self) -> Result<(), PluginFault>;
}

/// 可停止能力
pub trait Stoppable: Send + Sync {
    fn stop(&self) -> Result<(), PluginFault>;
}

/// 插件实例
///
/// start/stop 都是可选能力，插件通过覆盖 `as_startable` / `as_stoppable` 声明。
/// 能力只在注册时探测一次并缓存在注册表记录上。
///
/// ```ignore
/// struct Clock;
/// impl Startable for Clock {
///     fn start(&self) -> Result<(), PluginFault> { Ok(()) }
/// }
/// impl PluginInstance for Clock {
///     fn as_startable(&self) -> Option<&dyn Startable> { Some(self) }
/// }
/// ```
pub trait PluginInstance: Send + Sync {
    fn as_startable(&self) -> Option<&dyn Startable> {
        None
    }

    fn as_stoppable(&self) -> Option<&dyn Stoppable> {
        None
    }
}

pub type SharedInstance = Arc<dyn PluginInstance>;

/// 注册时探测到的实例能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_start: bool,
    pub can_stop: bool,
}

impl Capabilities {
    pub fn probe(instance: &dyn PluginInstance) -> Self {
        Self {
            can_start: instance.as_startable().is_some(),
            can_stop: instance.as_stoppable().is_some(),
        }
    }
}

/// 插件加载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 握手成功，实例已启动
    Running,
    /// 内容已注入，但没有可用的插件实例
    LoadedWithoutInstance,
    /// 已注入，启停由插件侧轮询驱动（信号策略）
    Delivered,
    /// 加载失败，页面上不留痕迹
    Failed(RuntimeError),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, LoadOutcome::Failed(_))
    }

    pub fn has_instance(&self) -> bool {
        matches!(self, LoadOutcome::Running)
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOutcome::Running => write!(f, "running"),
            LoadOutcome::LoadedWithoutInstance => write!(f, "loaded without a running instance"),
            LoadOutcome::Delivered => write!(f, "delivered"),
            LoadOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// 插件实例的只读视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub id: String,
    pub has_instance: bool,
    pub running: bool,
    pub desired_running: bool,
    pub capabilities: Capabilities,
    pub loaded_at: DateTime<Utc>,
}

/// 页面加载完成后的批量加载报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootReport {
    pub plugins_loaded: Vec<String>,
    pub plugins_failed: Vec<String>,
    pub themes_loaded: Vec<String>,
    pub themes_failed: Vec<String>,
}
