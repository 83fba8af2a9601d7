//! 页面模型类型定义

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 页面节点 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 生成 `<prefix>-<uuid>` 形式的唯一 ID
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Style,
    Script,
}

/// 临时资源地址（对应浏览器中的 blob URL）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUrl(String);

impl ResourceUrl {
    pub fn generate() -> Self {
        Self(format!("blob:livemod/{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 已挂载到页面上的节点
#[derive(Debug, Clone, PartialEq)]
pub struct PageNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub attributes: IndexMap<String, String>,
    /// 样式节点的 CSS 文本；脚本节点为空
    pub text: String,
    pub src: Option<ResourceUrl>,
    pub module: bool,
}

impl PageNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_tagged(&self, kind: NodeKind, attribute: &str, value: &str) -> bool {
        self.kind == kind && self.attribute(attribute) == Some(value)
    }
}

/// 待插入的样式节点
#[derive(Debug, Clone)]
pub struct StyleNode {
    pub id: NodeId,
    pub attributes: IndexMap<String, String>,
    pub css: String,
}

/// 待插入的脚本节点
pub struct ScriptNode {
    pub id: NodeId,
    pub attributes: IndexMap<String, String>,
    pub src: ResourceUrl,
    pub module: bool,
    /// 脚本开始执行时回调一次
    pub on_load: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for ScriptNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptNode")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("src", &self.src)
            .field("module", &self.module)
            .field("on_load", &self.on_load.is_some())
            .finish()
    }
}

/// 脚本执行器
///
/// 页面在脚本节点开始执行时调用；原生引擎由运行时注册，webview 页面不需要。
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, node: &PageNode, source: &str);
}

/// 页面抽象
///
/// 所有方法都在内容进程的 UI 线程上调用。
pub trait Page: Send + Sync {
    fn append_style(&self, node: StyleNode) -> NodeId;

    /// 挂载脚本节点；页面负责在脚本开始执行时调用 `on_load`
    fn append_script(&self, node: ScriptNode) -> NodeId;

    /// 删除节点，节点不存在时返回 false
    fn remove_node(&self, id: &NodeId) -> bool;

    fn find_tagged(&self, kind: NodeKind, attribute: &str, value: &str) -> Vec<NodeId>;

    fn create_resource(&self, text: String) -> ResourceUrl;

    fn revoke_resource(&self, url: &ResourceUrl) -> bool;

    /// 单向执行一段代码，不等待结果
    fn evaluate(&self, code: &str);

    fn set_executor(&self, executor: Option<Arc<dyn ScriptExecutor>>);

    /// 删除所有带指定标记的节点，返回删除数量
    fn remove_tagged(&self, kind: NodeKind, attribute: &str, value: &str) -> usize {
        self.find_tagged(kind, attribute, value)
            .iter()
            .filter(|id| self.remove_node(id))
            .count()
    }
}
