//! 生命周期控制器
//!
//! 两种策略共用同一套接口：
//! - `DirectCall`: 等待握手，成功后由管理器直接调用实例的 start/stop
//! - `SignalPolling`: 注入后立即返回，插件侧轮询 `isPluginRunning` 并按边沿触发 start/stop

use async_trait::async_trait;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::api::RuntimeApi;
use super::channel::{HostMessage, PluginReceiver};
use super::handshake::Registration;
use super::manager::RuntimeCore;
use super::registry::RegistryRecord;
use super::types::{
    Capabilities, LoadOutcome, PluginFault, PluginInstance, RuntimeError, SharedInstance,
};
use crate::config::LifecycleStrategy;

#[async_trait]
pub(crate) trait LifecycleController: Send + Sync {
    fn strategy(&self) -> LifecycleStrategy;

    /// 注入插件代码并确定加载结果；调用前注册表记录已创建
    async fn deliver(&self, core: &RuntimeCore, plugin_id: &str, code: &str) -> LoadOutcome;

    fn set_running(&self, core: &RuntimeCore, plugin_id: &str, running: bool) -> bool;

    fn is_running(&self, core: &RuntimeCore, plugin_id: &str) -> bool;

    /// 卸载前释放实例（停止或取消轮询）
    fn release(&self, plugin_id: &str, record: &RegistryRecord);
}

pub(crate) fn controller_for(strategy: LifecycleStrategy) -> Box<dyn LifecycleController> {
    match strategy {
        LifecycleStrategy::Handshake => Box::new(DirectCall),
        LifecycleStrategy::SignalPolling => Box::new(SignalPolling),
    }
}

pub(crate) struct DirectCall;

#[async_trait]
impl LifecycleController for DirectCall {
    fn strategy(&self) -> LifecycleStrategy {
        LifecycleStrategy::Handshake
    }

    async fn deliver(&self, core: &RuntimeCore, plugin_id: &str, code: &str) -> LoadOutcome {
        let pending = match core.handshake.begin_load(plugin_id) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("[HANDSHAKE] {}", e);
                return LoadOutcome::Failed(e);
            }
        };

        let handle = core.inject_code(plugin_id, code, None);
        core.registry.update(plugin_id, |record| {
            record.script = Some(handle.unit_id.clone());
            record.resource = Some(handle.resource.clone());
        });

        let instance = match pending.wait().await {
            Ok(Registration::Instance(instance)) => instance,
            Ok(Registration::Empty) => {
                tracing::info!("[HANDSHAKE] 插件 {} 没有导出插件对象", plugin_id);
                return LoadOutcome::LoadedWithoutInstance;
            }
            Err(e) => return LoadOutcome::Failed(e),
        };

        tracing::info!("[HANDSHAKE] 插件 {} 注册成功", plugin_id);
        let capabilities = Capabilities::probe(instance.as_ref());
        let _ = invoke_start(plugin_id, instance.as_ref(), capabilities);

        let attached = core.registry.update(plugin_id, |record| {
            record.attach_instance(instance.clone(), capabilities);
            record.running = true;
            record.desired_running = true;
        });
        if attached.is_none() {
            // 等待期间已被卸载
            tracing::warn!("[RUNTIME] 插件 {} 在注册完成前已被卸载", plugin_id);
            let _ = invoke_stop(plugin_id, instance.as_ref(), capabilities);
            return LoadOutcome::Failed(RuntimeError::NotLoaded(plugin_id.to_string()));
        }
        LoadOutcome::Running
    }

    fn set_running(&self, core: &RuntimeCore, plugin_id: &str, running: bool) -> bool {
        let Some((instance, current, capabilities)) = core
            .registry
            .inspect(plugin_id, |r| (r.instance.clone(), r.running, r.capabilities))
        else {
            tracing::warn!("[RUNTIME] 插件 {} 未加载", plugin_id);
            return false;
        };
        let Some(instance) = instance else {
            tracing::warn!("[RUNTIME] 插件 {} 没有运行实例", plugin_id);
            return false;
        };
        if current == running {
            return true;
        }

        if running {
            let _ = invoke_start(plugin_id, instance.as_ref(), capabilities);
        } else {
            let _ = invoke_stop(plugin_id, instance.as_ref(), capabilities);
        }
        core.registry.update(plugin_id, |r| {
            r.running = running;
            r.desired_running = running;
        });
        true
    }

    fn is_running(&self, core: &RuntimeCore, plugin_id: &str) -> bool {
        core.registry
            .inspect(plugin_id, |r| r.running)
            .unwrap_or(false)
    }

    fn release(&self, plugin_id: &str, record: &RegistryRecord) {
        if !record.running {
            return;
        }
        if let Some(instance) = &record.instance {
            let _ = invoke_stop(plugin_id, instance.as_ref(), record.capabilities);
        }
    }
}

pub(crate) struct SignalPolling;

#[async_trait]
impl LifecycleController for SignalPolling {
    fn strategy(&self) -> LifecycleStrategy {
        LifecycleStrategy::SignalPolling
    }

    async fn deliver(&self, core: &RuntimeCore, plugin_id: &str, code: &str) -> LoadOutcome {
        let token = CancellationToken::new();
        core.registry.update(plugin_id, |record| {
            record.desired_running = true;
            record.watcher = Some(token.clone());
        });

        let handle = core.inject_code(plugin_id, code, Some(token));
        core.registry.update(plugin_id, |record| {
            record.script = Some(handle.unit_id.clone());
            record.resource = Some(handle.resource.clone());
        });
        handle.channel.send(HostMessage::Start);
        LoadOutcome::Delivered
    }

    fn set_running(&self, core: &RuntimeCore, plugin_id: &str, running: bool) -> bool {
        let changed = core.registry.update(plugin_id, |r| {
            let changed = r.desired_running != running;
            r.desired_running = running;
            changed
        });
        match changed {
            None => {
                tracing::warn!("[RUNTIME] 插件 {} 未加载", plugin_id);
                false
            }
            Some(changed) => {
                if changed {
                    core.signals
                        .channel(plugin_id)
                        .send(HostMessage::for_state(running));
                }
                true
            }
        }
    }

    fn is_running(&self, core: &RuntimeCore, plugin_id: &str) -> bool {
        core.registry
            .inspect(plugin_id, |r| r.desired_running)
            .unwrap_or(false)
    }

    fn release(&self, _plugin_id: &str, record: &RegistryRecord) {
        if let Some(token) = &record.watcher {
            token.cancel();
        }
    }
}

/// 插件侧的轮询任务
///
/// 每个间隔（或收到信号时）读取期望状态，只在状态变化时调用 start/stop。
/// 取消后如果插件仍处于运行状态，调用一次 stop。能力在启动轮询时探测一次。
pub(crate) async fn watch_signals(
    plugin_id: String,
    instance: SharedInstance,
    api: RuntimeApi,
    mut rx: PluginReceiver,
    token: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let capabilities = Capabilities::probe(instance.as_ref());
    let mut observed = false;
    let mut signals_open = true;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            message = rx.recv(), if signals_open => {
                if message.is_none() {
                    signals_open = false;
                }
            }
            _ = ticker.tick() => {}
        }

        let desired = api.is_plugin_running(&plugin_id);
        observed = apply_transition(&plugin_id, instance.as_ref(), capabilities, observed, desired);
    }

    if observed {
        let _ = invoke_stop(&plugin_id, instance.as_ref(), capabilities);
    }
    tracing::debug!("[plugin:{}] 轮询已停止", plugin_id);
}

/// 边沿触发：返回新的观测状态，start/stop 出错时状态照样更新
pub(crate) fn apply_transition(
    plugin_id: &str,
    instance: &dyn PluginInstance,
    capabilities: Capabilities,
    observed: bool,
    desired: bool,
) -> bool {
    match (observed, desired) {
        (false, true) => {
            let _ = invoke_start(plugin_id, instance, capabilities);
            true
        }
        (true, false) => {
            let _ = invoke_stop(plugin_id, instance, capabilities);
            false
        }
        _ => observed,
    }
}

/// 调用 start()；注册时未探测到该能力时不触碰实例，返回 Ok(false)
pub(crate) fn invoke_start(
    plugin_id: &str,
    instance: &dyn PluginInstance,
    capabilities: Capabilities,
) -> Result<bool, PluginFault> {
    if !capabilities.can_start {
        return Ok(false);
    }
    match instance.as_startable() {
        Some(startable) => guarded(plugin_id, "start()", || startable.start()).map(|_| true),
        None => Ok(false),
    }
}

/// 调用 stop()；注册时未探测到该能力时不触碰实例，返回 Ok(false)
pub(crate) fn invoke_stop(
    plugin_id: &str,
    instance: &dyn PluginInstance,
    capabilities: Capabilities,
) -> Result<bool, PluginFault> {
    if !capabilities.can_stop {
        return Ok(false);
    }
    match instance.as_stoppable() {
        Some(stoppable) => guarded(plugin_id, "stop()", || stoppable.stop()).map(|_| true),
        None => Ok(false),
    }
}

/// 执行插件代码，捕获错误和 panic 并以插件 ID 记录日志
pub(crate) fn guarded<F>(plugin_id: &str, phase: &str, f: F) -> Result<(), PluginFault>
where
    F: FnOnce() -> Result<(), PluginFault>,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PluginFault::new(panic_message(payload))),
    };
    if let Err(fault) = &outcome {
        tracing::error!("[plugin:{}] {} 执行出错: {}", plugin_id, phase, fault);
    }
    outcome
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
