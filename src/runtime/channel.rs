//! 生命周期信号通道
//!
//! 管理器与插件之间的类型化消息通道，基于 tokio broadcast。
//! 注入器为每个插件返回一个按 ID 过滤的 `PluginChannel`。

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// 管理器发给插件的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    Start,
    Stop,
}

impl HostMessage {
    pub fn for_state(running: bool) -> Self {
        if running {
            HostMessage::Start
        } else {
            HostMessage::Stop
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    pub plugin_id: String,
    pub message: HostMessage,
}

/// 全局信号总线
#[derive(Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 广播信号，返回接收者数量（没有接收者时为 0）
    pub fn send(&self, signal: LifecycleSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }

    pub fn channel(&self, plugin_id: &str) -> PluginChannel {
        PluginChannel {
            plugin_id: plugin_id.to_string(),
            bus: self.clone(),
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// 单个插件的通道句柄
#[derive(Clone)]
pub struct PluginChannel {
    plugin_id: String,
    bus: SignalBus,
}

impl PluginChannel {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn send(&self, message: HostMessage) -> usize {
        self.bus.send(LifecycleSignal {
            plugin_id: self.plugin_id.clone(),
            message,
        })
    }

    /// 订阅发给该插件的消息
    pub fn on_message(&self) -> PluginReceiver {
        PluginReceiver {
            plugin_id: self.plugin_id.clone(),
            rx: self.bus.subscribe(),
        }
    }
}

pub struct PluginReceiver {
    plugin_id: String,
    rx: broadcast::Receiver<LifecycleSignal>,
}

impl PluginReceiver {
    /// 等待下一条消息；总线关闭时返回 None
    pub async fn recv(&mut self) -> Option<HostMessage> {
        loop {
            match self.rx.recv().await {
                Ok(signal) if signal.plugin_id == self.plugin_id => return Some(signal.message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "[SIGNAL] 插件 {} 的接收端落后，跳过 {} 条信号",
                        self.plugin_id,
                        skipped
                    );
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<HostMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(signal) if signal.plugin_id == self.plugin_id => return Some(signal.message),
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
