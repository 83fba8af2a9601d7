//! 插件运行时
//!
//! 内容进程中的核心：
//! - `RegistryStore`: 按插件 ID 记录注入句柄、实例和运行状态
//! - `StyleInjector` / `CodeInjector`: 向页面挂载带标记的样式和脚本
//! - `Handshake`: 单槽注册握手，超时 1 秒
//! - 生命周期控制器：直接调用或信号轮询
//! - `RuntimeApi`: 暴露给插件代码的 API
//! - `RuntimeManager`: 对外操作入口

mod api;
mod channel;
mod guest;
mod handshake;
mod injector;
mod lifecycle;
mod manager;
mod registry;
mod types;

pub use api::RuntimeApi;
pub use channel::{HostMessage, LifecycleSignal, PluginChannel, PluginReceiver, SignalBus};
pub use guest::{GuestScope, ScriptEngine};
pub use handshake::{Handshake, PendingLoad, Registration};
pub use injector::{CodeInjector, InjectionHandle, StyleInjector, WrapperTemplate};
pub use manager::{RuntimeBuilder, RuntimeManager};
pub use registry::{RegistryRecord, RegistryStore};
pub use types::{
    BootReport, Capabilities, InstanceView, LoadOutcome, PluginFault, PluginInstance,
    RuntimeError, SharedInstance, Startable, Stoppable,
};
