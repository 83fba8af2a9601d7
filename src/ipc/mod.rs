//! IPC 模块
//!
//! 特权进程与内容进程之间的消息模型：
//! - 同步查询：`Request` / `Response`，回复大小受限
//! - `PrivilegedEndpoint`: 特权进程侧分发到 `ContentProvider`
//! - `RemoteProvider`: 内容进程侧通过 `Transport` 实现 `ContentProvider`
//! - `ExecQueue`: 单向执行请求，按序投递，页面加载完成前缓存

mod endpoint;
mod exec_queue;
mod types;

pub use endpoint::{PrivilegedEndpoint, RemoteProvider};
pub use exec_queue::{CodeSink, ExecQueue};
pub use types::{IpcError, Request, Response, Transport};

#[cfg(test)]
mod tests;
