//! 原生脚本宿主
//!
//! 没有浏览器时，由 `ScriptEngine` 执行插件代码。页面在脚本节点开始执行时
//! 回调 `GuestHost`，后者完成包装脚本在 webview 中做的事：
//! 捕获插件错误、发现导出的插件对象、完成握手或启动信号轮询。

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::api::RuntimeApi;
use super::channel::PluginChannel;
use super::lifecycle::{guarded, watch_signals};
use super::types::{PluginFault, SharedInstance};
use crate::config::LifecycleStrategy;
use crate::page::{NodeId, PageNode, ScriptExecutor};

/// 脚本引擎
pub trait ScriptEngine: Send + Sync {
    /// 执行插件源码；插件通过 `scope` 访问 API 并导出实例
    fn evaluate(&self, source: &str, scope: &mut GuestScope) -> Result<(), PluginFault>;
}

/// 插件代码的执行作用域
pub struct GuestScope {
    plugin_id: String,
    api: RuntimeApi,
    global_slot: Option<SharedInstance>,
    last_export: Option<SharedInstance>,
}

impl GuestScope {
    pub(crate) fn new(plugin_id: &str, api: RuntimeApi) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            api,
            global_slot: None,
            last_export: None,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn api(&self) -> &RuntimeApi {
        &self.api
    }

    /// 写入约定的全局插件插槽
    pub fn set_global_plugin(&mut self, instance: SharedInstance) {
        self.global_slot = Some(instance);
    }

    /// 导出一个值；多次导出时保留最后一个
    pub fn export(&mut self, instance: SharedInstance) {
        self.last_export = Some(instance);
    }

    /// 全局插槽优先，其次是最后一个导出值
    fn discover(&mut self) -> Option<SharedInstance> {
        self.global_slot.take().or_else(|| self.last_export.take())
    }
}

pub(crate) struct PreparedUnit {
    pub plugin_id: String,
    pub source: String,
    pub strategy: LifecycleStrategy,
    pub watcher: Option<CancellationToken>,
    pub channel: PluginChannel,
    pub poll_interval: Duration,
}

pub(crate) struct GuestHost {
    engine: Option<Arc<dyn ScriptEngine>>,
    units: Mutex<HashMap<NodeId, PreparedUnit>>,
    api: RuntimeApi,
}

impl GuestHost {
    pub(crate) fn new(engine: Option<Arc<dyn ScriptEngine>>, api: RuntimeApi) -> Self {
        Self {
            engine,
            units: Mutex::new(HashMap::new()),
            api,
        }
    }

    pub(crate) fn prepare(&self, unit_id: NodeId, unit: PreparedUnit) {
        self.units.lock().insert(unit_id, unit);
    }

    /// 丢弃插件尚未执行的脚本单元
    pub(crate) fn discard(&self, plugin_id: &str) -> usize {
        let mut units = self.units.lock();
        let before = units.len();
        units.retain(|_, unit| unit.plugin_id != plugin_id);
        before - units.len()
    }

    fn run(&self, unit: PreparedUnit) {
        let Some(engine) = &self.engine else {
            tracing::debug!("[GUEST] 未配置脚本引擎，插件 {} 的脚本不会执行", unit.plugin_id);
            return;
        };

        let plugin_id = unit.plugin_id.as_str();
        let mut scope = GuestScope::new(plugin_id, self.api.clone());
        let _ = guarded(plugin_id, "插件代码", || {
            engine.evaluate(&unit.source, &mut scope)
        });
        let discovered = scope.discover();

        match unit.strategy {
            LifecycleStrategy::Handshake => {
                // 插件代码自己调用过 registerPlugin 时等待槽已清空
                if self.api.pending_id().as_deref() != Some(plugin_id) {
                    return;
                }
                match discovered {
                    Some(instance) => {
                        self.api.register_plugin(instance);
                    }
                    None => {
                        self.api.report_empty(plugin_id);
                    }
                }
            }
            LifecycleStrategy::SignalPolling => {
                let Some(instance) = discovered else {
                    tracing::info!("[plugin:{}] 没有导出插件对象，不启动轮询", plugin_id);
                    return;
                };
                let Some(token) = unit.watcher else {
                    return;
                };
                let handle = match tokio::runtime::Handle::try_current() {
                    Ok(handle) => handle,
                    Err(_) => {
                        tracing::warn!("[plugin:{}] 没有可用的异步运行时，无法启动轮询", plugin_id);
                        return;
                    }
                };
                handle.spawn(watch_signals(
                    unit.plugin_id.clone(),
                    instance,
                    self.api.clone(),
                    unit.channel.on_message(),
                    token,
                    unit.poll_interval,
                ));
            }
        }
    }
}

impl ScriptExecutor for GuestHost {
    fn execute(&self, node: &PageNode, _source: &str) {
        let unit = self.units.lock().remove(&node.id);
        if let Some(unit) = unit {
            self.run(unit);
        }
    }
}
