//! 页面模块
//!
//! 内容进程中宿主页面的最小模型：带标记属性的样式/脚本节点、
//! 临时资源（blob URL）以及脚本执行回调。

mod memory;
mod types;

pub use memory::MemoryPage;
pub use types::{
    NodeId, NodeKind, Page, PageNode, ResourceUrl, ScriptExecutor, ScriptNode, StyleNode,
};
