//! UI 树补丁器
//!
//! 包装宿主 UI 库的元素创建入口，按替换表把组件换成插件提供的实现；
//! 每次修改替换表后遍历当前渲染树，把每个节点的缓存输入标记为过期，
//! 让下一次渲染重新走元素创建入口。

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::modules::ModuleIndex;
use super::value::{HostRef, HostValue, ValueKind};

/// 退出替换的 props 标记，创建元素前会被移除
pub const ORIGINAL_FLAG: &str = "__original";

/// 容器上指向渲染树根的属性名前缀
pub const ROOT_KEY_PREFIX: &str = "__reactContainer$";

/// 写入缓存 props 的过期标记
pub const STALE_MARKER: &str = "__livemodStale";

pub type Props = Map<String, Value>;

// ============ 元素 ============

#[derive(Debug, Clone)]
pub enum ElementType {
    Intrinsic(String),
    Component(HostRef),
}

impl ElementType {
    pub fn intrinsic(tag: impl Into<String>) -> Self {
        ElementType::Intrinsic(tag.into())
    }

    pub fn name(&self) -> String {
        match self {
            ElementType::Intrinsic(tag) => tag.clone(),
            ElementType::Component(value) => {
                value.display_name().unwrap_or_else(|| "Unknown".to_string())
            }
        }
    }
}

/// 组件按引用比较
impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Intrinsic(a), ElementType::Intrinsic(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ElementType {}

impl Hash for ElementType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ElementType::Intrinsic(tag) => {
                0u8.hash(state);
                tag.hash(state);
            }
            ElementType::Component(value) => {
                1u8.hash(state);
                (Arc::as_ptr(value) as usize).hash(state);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub ty: ElementType,
    pub props: Props,
    pub children: Vec<UiNode>,
}

#[derive(Debug, Clone)]
pub enum UiNode {
    Element(Element),
    Text(String),
}

impl UiNode {
    /// 渲染结果中的文本内容
    pub fn text_content(&self) -> String {
        match self {
            UiNode::Text(text) => text.clone(),
            UiNode::Element(element) => element.children.iter().map(UiNode::text_content).collect(),
        }
    }
}

/// 组件的原生渲染函数
pub struct ComponentFn(
    pub Arc<dyn Fn(&Props, &[UiNode], &ElementRuntime) -> UiNode + Send + Sync>,
);

/// 构建一个组件函数值
pub fn component<F>(name: &str, render: F) -> HostRef
where
    F: Fn(&Props, &[UiNode], &ElementRuntime) -> UiNode + Send + Sync + 'static,
{
    let value = HostValue::with_native(ValueKind::Function, ComponentFn(Arc::new(render)));
    value.set_display_name(name);
    value
}

/// 找不到组件时的占位组件，渲染醒目的错误提示
pub fn missing_component(name: &str) -> HostRef {
    let message = format!("⚠️ Missing component: {}", name);
    component(&format!("Missing({})", name), move |_, _, runtime| {
        let mut props = Props::new();
        props.insert("style".to_string(), json!({ "color": "red", "fontWeight": "bold" }));
        UiNode::Element(runtime.create_element(
            ElementType::intrinsic("div"),
            props,
            vec![UiNode::Text(message.clone())],
        ))
    })
}

pub type CreateElementFn = Arc<dyn Fn(ElementType, Props, Vec<UiNode>) -> Element + Send + Sync>;

/// 宿主 UI 库的元素运行时，元素创建入口可替换
pub struct ElementRuntime {
    create: RwLock<CreateElementFn>,
}

impl ElementRuntime {
    pub fn new() -> Arc<Self> {
        let base: CreateElementFn = Arc::new(|ty, props, children| Element {
            ty,
            props,
            children,
        });
        Arc::new(Self {
            create: RwLock::new(base),
        })
    }

    pub fn create_element(&self, ty: ElementType, props: Props, children: Vec<UiNode>) -> Element {
        let create = self.create.read().clone();
        create(ty, props, children)
    }

    pub fn entry_point(&self) -> CreateElementFn {
        self.create.read().clone()
    }

    pub fn set_entry_point(&self, create: CreateElementFn) {
        *self.create.write() = create;
    }

    /// 展开组件，得到只含内置元素和文本的树
    pub fn render(&self, element: &Element) -> UiNode {
        match &element.ty {
            ElementType::Intrinsic(_) => UiNode::Element(Element {
                ty: element.ty.clone(),
                props: element.props.clone(),
                children: element.children.iter().map(|c| self.render_node(c)).collect(),
            }),
            ElementType::Component(value) => match value.downcast::<ComponentFn>() {
                Some(render) => {
                    let output = (render.0)(&element.props, &element.children, self);
                    self.render_node(&output)
                }
                None => UiNode::Text(String::new()),
            },
        }
    }

    fn render_node(&self, node: &UiNode) -> UiNode {
        match node {
            UiNode::Element(element) => self.render(element),
            UiNode::Text(text) => UiNode::Text(text.clone()),
        }
    }

    /// 以模块形式暴露，带有 useState/useEffect/createElement 属性
    pub fn module_exports(runtime: &Arc<Self>) -> HostRef {
        let module = HostValue::with_native_arc(ValueKind::Object, runtime.clone());
        for name in ["useState", "useEffect", "createElement"] {
            module.set(name, HostValue::function(Some(name)));
        }
        module
    }
}

// ============ 渲染树 ============

#[derive(Debug)]
pub struct FiberNode {
    pub name: String,
    pub memoized_props: Option<Props>,
    pub child: Option<FiberRef>,
    pub sibling: Option<FiberRef>,
}

pub type FiberRef = Arc<RwLock<FiberNode>>;

pub fn fiber(name: &str, memoized_props: Option<Props>) -> FiberRef {
    Arc::new(RwLock::new(FiberNode {
        name: name.to_string(),
        memoized_props,
        child: None,
        sibling: None,
    }))
}

/// 沿 child/sibling 链接遍历并标记过期，返回被标记的节点数；不触发渲染
pub fn mark_stale(root: &FiberRef) -> usize {
    let mut stack = vec![root.clone()];
    let mut visited = HashSet::new();
    let mut marked = 0;

    while let Some(node) = stack.pop() {
        if !visited.insert(Arc::as_ptr(&node) as usize) {
            continue;
        }
        let mut guard = node.write();
        if let Some(props) = guard.memoized_props.as_mut() {
            props.insert(STALE_MARKER.to_string(), json!(1));
            marked += 1;
        }
        if let Some(sibling) = &guard.sibling {
            stack.push(sibling.clone());
        }
        if let Some(child) = &guard.child {
            stack.push(child.clone());
        }
    }
    marked
}

/// 页面上的容器元素
#[derive(Default)]
pub struct ContainerNode {
    classes: Vec<String>,
    expando: RwLock<IndexMap<String, HostRef>>,
}

impl ContainerNode {
    pub fn new(classes: &[&str]) -> Self {
        Self {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            expando: RwLock::new(IndexMap::new()),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn set_expando(&self, key: impl Into<String>, value: HostRef) {
        self.expando.write().insert(key.into(), value);
    }

    pub fn find_expando(&self, prefix: &str) -> Option<HostRef> {
        self.expando
            .read()
            .iter()
            .find(|(key, _)| key.starts_with(prefix))
            .map(|(_, value)| value.clone())
    }
}

pub trait HostDocument: Send + Sync {
    fn query_by_class(&self, class: &str) -> Option<Arc<ContainerNode>>;

    /// 创建一个不挂载的容器
    fn create_container(&self) -> Arc<ContainerNode>;
}

#[derive(Default)]
pub struct MemoryDocument {
    containers: RwLock<Vec<Arc<ContainerNode>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, classes: &[&str]) -> Arc<ContainerNode> {
        let container = Arc::new(ContainerNode::new(classes));
        self.containers.write().push(container.clone());
        container
    }
}

impl HostDocument for MemoryDocument {
    fn query_by_class(&self, class: &str) -> Option<Arc<ContainerNode>> {
        self.containers
            .read()
            .iter()
            .find(|c| c.has_class(class))
            .cloned()
    }

    fn create_container(&self) -> Arc<ContainerNode> {
        Arc::new(ContainerNode::default())
    }
}

// ============ 根 ============

pub type RootConstructor = Arc<dyn Fn(FiberRef) -> Arc<dyn HostRoot> + Send + Sync>;

/// 宿主 UI 库的根对象
pub trait HostRoot: Send + Sync {
    fn fiber_root(&self) -> Option<FiberRef>;

    fn unmount(&self);

    fn constructor(&self) -> RootConstructor;
}

pub struct MemoryRoot {
    fiber: RwLock<Option<FiberRef>>,
}

impl MemoryRoot {
    pub fn new(fiber: FiberRef) -> Self {
        Self {
            fiber: RwLock::new(Some(fiber)),
        }
    }
}

impl HostRoot for MemoryRoot {
    fn fiber_root(&self) -> Option<FiberRef> {
        self.fiber.read().clone()
    }

    fn unmount(&self) {
        *self.fiber.write() = None;
    }

    fn constructor(&self) -> RootConstructor {
        Arc::new(|fiber| Arc::new(MemoryRoot::new(fiber)) as Arc<dyn HostRoot>)
    }
}

/// DOM 客户端模块（createRoot）
pub struct DomClient {
    constructor: RootConstructor,
}

impl Default for DomClient {
    fn default() -> Self {
        Self {
            constructor: Arc::new(|fiber| Arc::new(MemoryRoot::new(fiber)) as Arc<dyn HostRoot>),
        }
    }
}

impl DomClient {
    /// 在容器上创建根，并把渲染树根写入容器的前缀属性
    pub fn create_root(&self, container: &ContainerNode) -> Arc<dyn HostRoot> {
        let root = fiber("HostRoot", None);
        let handle: Arc<dyn std::any::Any + Send + Sync> = root.clone();
        container.set_expando(
            format!("{}{}", ROOT_KEY_PREFIX, uuid::Uuid::new_v4().simple()),
            HostValue::with_native_arc(ValueKind::Object, handle),
        );
        (self.constructor)(root)
    }

    pub fn module_exports(client: &Arc<Self>) -> HostRef {
        let module = HostValue::with_native_arc(ValueKind::Object, client.clone());
        for name in ["createRoot", "hydrateRoot"] {
            module.set(name, HostValue::function(Some(name)));
        }
        module
    }
}

// ============ 适配器 ============

/// UI 库集成适配器
pub trait IntegrationAdapter: Send + Sync {
    /// 找到当前渲染树根
    fn locate_root(&self) -> Option<FiberRef>;

    fn wrap_root(&self, fiber: FiberRef) -> Arc<dyn HostRoot>;

    fn entry_point(&self) -> CreateElementFn;

    fn set_entry_point(&self, create: CreateElementFn);

    /// 标记整棵树过期
    fn invalidate(&self) -> usize {
        match self.locate_root() {
            Some(root) => mark_stale(&root),
            None => {
                tracing::warn!("[UI] 找不到渲染树根，无法标记过期");
                0
            }
        }
    }
}

/// 基于模块解析器定位的 React 风格适配器
pub struct ReactDomAdapter {
    elements: Arc<ElementRuntime>,
    root_constructor: RootConstructor,
    document: Arc<dyn HostDocument>,
    container_class: String,
}

impl ReactDomAdapter {
    pub fn from_modules(
        modules: &dyn ModuleIndex,
        document: Arc<dyn HostDocument>,
        container_class: &str,
    ) -> Option<Self> {
        let Some(elements) = modules
            .find_by_props(&["useState", "useEffect", "createElement"])
            .and_then(|m| m.native_arc::<ElementRuntime>())
        else {
            tracing::warn!("[UI] 未找到 UI 库模块，放弃安装补丁");
            return None;
        };
        let Some(client) = modules
            .find_by_props(&["createRoot", "hydrateRoot"])
            .and_then(|m| m.native_arc::<DomClient>())
        else {
            tracing::warn!("[UI] 未找到 DOM 客户端模块，放弃安装补丁");
            return None;
        };

        // 用一次性的根拿到根构造器
        let scratch = document.create_container();
        let temp_root = client.create_root(&scratch);
        temp_root.unmount();
        let root_constructor = temp_root.constructor();

        Some(Self {
            elements,
            root_constructor,
            document,
            container_class: container_class.to_string(),
        })
    }

    pub fn elements(&self) -> &Arc<ElementRuntime> {
        &self.elements
    }
}

impl IntegrationAdapter for ReactDomAdapter {
    fn locate_root(&self) -> Option<FiberRef> {
        self.document
            .query_by_class(&self.container_class)?
            .find_expando(ROOT_KEY_PREFIX)?
            .native_arc::<RwLock<FiberNode>>()
    }

    fn wrap_root(&self, fiber: FiberRef) -> Arc<dyn HostRoot> {
        (self.root_constructor)(fiber)
    }

    fn entry_point(&self) -> CreateElementFn {
        self.elements.entry_point()
    }

    fn set_entry_point(&self, create: CreateElementFn) {
        self.elements.set_entry_point(create);
    }
}

// ============ 补丁器 ============

type ReplacementMap = Arc<RwLock<IndexMap<ElementType, ElementType>>>;

pub struct UiPatcher {
    adapter: Arc<dyn IntegrationAdapter>,
    replacements: ReplacementMap,
    original: CreateElementFn,
    installed: AtomicBool,
}

impl UiPatcher {
    /// 包装元素创建入口
    pub fn install(adapter: Arc<dyn IntegrationAdapter>) -> Arc<Self> {
        let original = adapter.entry_point();
        let replacements: ReplacementMap = Arc::new(RwLock::new(IndexMap::new()));

        let map = replacements.clone();
        let target = original.clone();
        let wrapped: CreateElementFn = Arc::new(move |ty: ElementType, mut props: Props, children: Vec<UiNode>| {
            // 只有真值标记会被剥离，假值原样传给原始入口
            let opt_out = props.get(ORIGINAL_FLAG).map(json_truthy).unwrap_or(false);
            if opt_out {
                props.remove(ORIGINAL_FLAG);
            }
            let replacement = if opt_out {
                None
            } else {
                map.read().get(&ty).cloned()
            };
            match replacement {
                Some(replacement) => {
                    tracing::debug!("[UI] 替换元素 {} -> {}", ty.name(), replacement.name());
                    target(replacement, props, children)
                }
                None => target(ty, props, children),
            }
        });
        adapter.set_entry_point(wrapped);
        tracing::info!("[UI] 元素创建入口已包装");

        Arc::new(Self {
            adapter,
            replacements,
            original,
            installed: AtomicBool::new(true),
        })
    }

    /// 设置或移除替换；`replacement` 为 None 时等同于移除
    pub fn replace_component(&self, original: ElementType, replacement: Option<ElementType>) {
        match replacement {
            Some(replacement) => {
                if let ElementType::Component(value) = &replacement {
                    if value.is_function() && value.display_name().is_none() {
                        value.set_display_name(format!("Patched({})", original.name()));
                    }
                }
                tracing::info!("[UI] 组件 {} 替换为 {}", original.name(), replacement.name());
                self.replacements.write().insert(original, replacement);
            }
            None => {
                tracing::info!("[UI] 移除组件 {} 的替换", original.name());
                self.replacements.write().shift_remove(&original);
            }
        }
        self.adapter.invalidate();
    }

    pub fn remove_replacement(&self, original: &ElementType) {
        self.replacements.write().shift_remove(original);
        self.adapter.invalidate();
    }

    pub fn clear_replacements(&self) {
        self.replacements.write().clear();
        self.adapter.invalidate();
    }

    pub fn replacements(&self) -> Vec<(ElementType, ElementType)> {
        self.replacements
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn get_fiber_root(&self) -> Option<FiberRef> {
        self.adapter.locate_root()
    }

    pub fn get_root(&self) -> Option<Arc<dyn HostRoot>> {
        match self.adapter.locate_root() {
            Some(fiber) => Some(self.adapter.wrap_root(fiber)),
            None => {
                tracing::warn!("[UI] 找不到渲染树根");
                None
            }
        }
    }

    /// 恢复原始的元素创建入口
    pub fn uninstall(&self) {
        if self.installed.swap(false, Ordering::SeqCst) {
            self.adapter.set_entry_point(self.original.clone());
            self.replacements.write().clear();
            tracing::info!("[UI] 元素创建入口已恢复");
        }
    }
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
