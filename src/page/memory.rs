//! 内存页面
//!
//! 不依赖浏览器的 `Page` 实现：节点保存在列表中，脚本交给注册的执行器同步执行。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{
    NodeId, NodeKind, Page, PageNode, ResourceUrl, ScriptExecutor, ScriptNode, StyleNode,
};

#[derive(Default)]
pub struct MemoryPage {
    nodes: RwLock<Vec<PageNode>>,
    resources: RwLock<HashMap<ResourceUrl, String>>,
    executor: RwLock<Option<Arc<dyn ScriptExecutor>>>,
    evaluated: RwLock<Vec<String>>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<PageNode> {
        self.nodes.read().clone()
    }

    pub fn node(&self, id: &NodeId) -> Option<PageNode> {
        self.nodes.read().iter().find(|n| &n.id == id).cloned()
    }

    pub fn nodes_of(&self, kind: NodeKind) -> Vec<PageNode> {
        self.nodes
            .read()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// 尚未释放的临时资源数量
    pub fn live_resources(&self) -> usize {
        self.resources.read().len()
    }

    pub fn resource_text(&self, url: &ResourceUrl) -> Option<String> {
        self.resources.read().get(url).cloned()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.read().clone()
    }

    pub fn has_executor(&self) -> bool {
        self.executor.read().is_some()
    }
}

impl Page for MemoryPage {
    fn append_style(&self, node: StyleNode) -> NodeId {
        let id = node.id.clone();
        self.nodes.write().push(PageNode {
            id: node.id,
            kind: NodeKind::Style,
            attributes: node.attributes,
            text: node.css,
            src: None,
            module: false,
        });
        id
    }

    fn append_script(&self, node: ScriptNode) -> NodeId {
        let id = node.id.clone();
        let source = self.resource_text(&node.src).unwrap_or_default();
        let page_node = PageNode {
            id: node.id,
            kind: NodeKind::Script,
            attributes: node.attributes,
            text: String::new(),
            src: Some(node.src),
            module: node.module,
        };
        self.nodes.write().push(page_node.clone());

        // 不持有任何锁，执行器可能回调页面
        let executor = self.executor.read().clone();
        if let Some(on_load) = node.on_load {
            on_load();
        }
        if let Some(executor) = executor {
            executor.execute(&page_node, &source);
        }
        id
    }

    fn remove_node(&self, id: &NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|n| &n.id != id);
        nodes.len() != before
    }

    fn find_tagged(&self, kind: NodeKind, attribute: &str, value: &str) -> Vec<NodeId> {
        self.nodes
            .read()
            .iter()
            .filter(|n| n.is_tagged(kind, attribute, value))
            .map(|n| n.id.clone())
            .collect()
    }

    fn create_resource(&self, text: String) -> ResourceUrl {
        let url = ResourceUrl::generate();
        self.resources.write().insert(url.clone(), text);
        url
    }

    fn revoke_resource(&self, url: &ResourceUrl) -> bool {
        self.resources.write().remove(url).is_some()
    }

    fn evaluate(&self, code: &str) {
        self.evaluated.write().push(code.to_string());
    }

    fn set_executor(&self, executor: Option<Arc<dyn ScriptExecutor>>) {
        *self.executor.write() = executor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tagged(value: &str) -> IndexMap<String, String> {
        let mut attrs = IndexMap::new();
        attrs.insert("data-livemod".to_string(), value.to_string());
        attrs
    }

    struct CountingExecutor {
        runs: AtomicUsize,
        last_source: RwLock<String>,
    }

    impl ScriptExecutor for CountingExecutor {
        fn execute(&self, _node: &PageNode, source: &str) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            *self.last_source.write() = source.to_string();
        }
    }

    #[test]
    fn test_remove_tagged_is_idempotent() {
        let page = MemoryPage::new();
        for _ in 0..2 {
            page.append_style(StyleNode {
                id: NodeId::generate("style"),
                attributes: tagged("plugin-a-style"),
                css: "a{}".to_string(),
            });
        }
        page.append_style(StyleNode {
            id: NodeId::generate("style"),
            attributes: tagged("plugin-b-style"),
            css: "b{}".to_string(),
        });

        assert_eq!(
            page.remove_tagged(NodeKind::Style, "data-livemod", "plugin-a-style"),
            2
        );
        assert_eq!(
            page.remove_tagged(NodeKind::Style, "data-livemod", "plugin-a-style"),
            0
        );
        assert_eq!(page.nodes().len(), 1);
    }

    #[test]
    fn test_script_runs_executor_after_on_load() {
        let page = Arc::new(MemoryPage::new());
        let executor = Arc::new(CountingExecutor {
            runs: AtomicUsize::new(0),
            last_source: RwLock::new(String::new()),
        });
        page.set_executor(Some(executor.clone()));

        let url = page.create_resource("run()".to_string());
        let revoke_page = page.clone();
        let revoke_url = url.clone();
        page.append_script(ScriptNode {
            id: NodeId::generate("script"),
            attributes: tagged("plugin-a"),
            src: url,
            module: true,
            on_load: Some(Box::new(move || {
                revoke_page.revoke_resource(&revoke_url);
            })),
        });

        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        assert_eq!(executor.last_source.read().as_str(), "run()");
        assert_eq!(page.live_resources(), 0);
        assert_eq!(page.nodes_of(NodeKind::Script).len(), 1);
    }
}
