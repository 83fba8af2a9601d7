//! 模块解析器
//!
//! 从宿主页面的分块打包运行时中枚举已加载模块的导出，并按条件查找。
//! 通过推入一个哨兵分块拿到打包器的 require 函数。

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::ui_tree::missing_component;
use super::value::{HostRef, HostValue};

/// 打包器的 require 函数
pub type RequireFn = Arc<dyn Fn(&str) -> Option<HostRef> + Send + Sync>;

/// 模块工厂，首次 require 时执行
pub type ModuleFactory = Arc<dyn Fn() -> HostRef + Send + Sync>;

/// 查找条件
pub type Filter<'a> = &'a dyn Fn(&HostRef) -> bool;

/// 推入打包运行时的分块
pub struct Chunk {
    pub ids: Vec<String>,
    pub modules: IndexMap<String, ModuleFactory>,
    /// 分块加载后以 require 为参数回调一次
    pub runtime: Option<Box<dyn FnOnce(RequireFn) + Send>>,
}

/// 页面上的分块打包运行时
pub trait BundlerRuntime: Send + Sync {
    fn push_chunk(&self, chunk: Chunk);

    /// 所有已加载分块中的模块 ID，按分块顺序
    fn module_ids(&self) -> Vec<String>;
}

/// 条件执行出错按不匹配处理
pub fn safe_match(filter: Filter<'_>, value: &HostRef) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| filter(value))).unwrap_or(false)
}

/// 模块查询接口
pub trait ModuleIndex: Send + Sync {
    /// 所有可解析且为真值的模块导出
    fn all_exports(&self) -> Vec<HostRef>;

    /// 第一个匹配的模块；`prefer_default` 时先检查 default 导出
    fn find(&self, filter: Filter<'_>, prefer_default: bool) -> Option<HostRef> {
        for module in self.all_exports() {
            if prefer_default {
                if let Some(default) = module.get("default").filter(|d| d.is_truthy()) {
                    if safe_match(filter, &default) {
                        return Some(default);
                    }
                }
            }
            if safe_match(filter, &module) {
                return Some(module);
            }
        }
        None
    }

    fn find_all(&self, filter: Filter<'_>, prefer_default: bool) -> Vec<HostRef> {
        let mut found = Vec::new();
        for module in self.all_exports() {
            if prefer_default {
                if let Some(default) = module.get("default").filter(|d| d.is_truthy()) {
                    if safe_match(filter, &default) {
                        found.push(default);
                        continue;
                    }
                }
            }
            if safe_match(filter, &module) {
                found.push(module);
            }
        }
        found
    }

    /// 拥有全部指定属性的模块
    fn find_by_props(&self, names: &[&str]) -> Option<HostRef> {
        self.find(&|module: &HostRef| names.iter().all(|name| module.has(name)), true)
    }

    /// 在模块及其一层自有属性中查找
    fn find_export(&self, filter: Filter<'_>) -> Option<HostRef> {
        scan_exports(&self.all_exports(), filter, false).into_iter().next()
    }

    /// 全部匹配结果，按引用去重
    fn find_exports(&self, filter: Filter<'_>) -> Vec<HostRef> {
        scan_exports(&self.all_exports(), filter, true)
    }

    /// 按显示名查找组件；找不到时返回一个渲染错误提示的占位组件
    fn find_component(&self, name: &str, filter: Option<Filter<'_>>) -> HostRef {
        let matcher = component_matcher(name, filter);
        self.find_export(&matcher)
            .unwrap_or_else(|| missing_component(name))
    }

    fn find_components(&self, name: &str, filter: Option<Filter<'_>>) -> Vec<HostRef> {
        let matcher = component_matcher(name, filter);
        self.find_exports(&matcher)
    }
}

fn component_matcher<'a>(
    name: &'a str,
    filter: Option<Filter<'a>>,
) -> impl Fn(&HostRef) -> bool + 'a {
    move |value: &HostRef| {
        value.is_function()
            && value.display_name().as_deref() == Some(name)
            && filter.map_or(true, |f| f(value))
    }
}

fn scan_exports(exports: &[HostRef], filter: Filter<'_>, all: bool) -> Vec<HostRef> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for export in exports {
        let candidates = std::iter::once(export.clone())
            .chain(export.entries().into_iter().map(|(_, value)| value));
        for candidate in candidates {
            if !safe_match(filter, &candidate) {
                continue;
            }
            if !all {
                return vec![candidate];
            }
            if seen.insert(Arc::as_ptr(&candidate) as usize) {
                results.push(candidate);
            }
        }
    }
    results
}

/// 基于分块运行时的模块索引
pub struct ChunkModuleIndex {
    bundler: Arc<dyn BundlerRuntime>,
    require: RequireFn,
}

impl ChunkModuleIndex {
    /// 推入哨兵分块捕获 require；打包器不回调时返回 None
    pub fn install(bundler: Arc<dyn BundlerRuntime>) -> Option<Self> {
        let captured: Arc<Mutex<Option<RequireFn>>> = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        bundler.push_chunk(Chunk {
            ids: vec![format!("livemod-sentinel-{}", uuid::Uuid::new_v4())],
            modules: IndexMap::new(),
            runtime: Some(Box::new(move |require| {
                *slot.lock() = Some(require);
            })),
        });

        let require = captured.lock().take();
        match require {
            Some(require) => {
                tracing::debug!("[MODULES] 已捕获打包器 require");
                Some(Self { bundler, require })
            }
            None => {
                tracing::warn!("[MODULES] 打包器没有执行哨兵分块，模块解析不可用");
                None
            }
        }
    }
}

impl ModuleIndex for ChunkModuleIndex {
    fn all_exports(&self) -> Vec<HostRef> {
        self.bundler
            .module_ids()
            .iter()
            .filter_map(|id| {
                panic::catch_unwind(AssertUnwindSafe(|| (self.require)(id)))
                    .ok()
                    .flatten()
            })
            .filter(|exports| exports.is_truthy())
            .collect()
    }
}

#[derive(Default)]
struct BundlerState {
    chunks: RwLock<Vec<Vec<String>>>,
    factories: RwLock<HashMap<String, ModuleFactory>>,
    cache: RwLock<HashMap<String, HostRef>>,
}

impl BundlerState {
    fn require(&self, id: &str) -> Option<HostRef> {
        if let Some(cached) = self.cache.read().get(id) {
            return Some(cached.clone());
        }
        let factory = self.factories.read().get(id).cloned()?;
        let exports = panic::catch_unwind(AssertUnwindSafe(|| factory())).ok()?;
        self.cache.write().insert(id.to_string(), exports.clone());
        Some(exports)
    }
}

/// 内存打包运行时
#[derive(Clone, Default)]
pub struct MemoryBundler {
    state: Arc<BundlerState>,
}

impl MemoryBundler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以固定导出值定义一个单模块分块
    pub fn define(&self, module_id: &str, exports: HostRef) {
        let mut modules: IndexMap<String, ModuleFactory> = IndexMap::new();
        modules.insert(module_id.to_string(), Arc::new(move || exports.clone()));
        self.push_chunk(Chunk {
            ids: vec![format!("chunk-{}", module_id)],
            modules,
            runtime: None,
        });
    }

    pub fn chunk_count(&self) -> usize {
        self.state.chunks.read().len()
    }
}

impl BundlerRuntime for MemoryBundler {
    fn push_chunk(&self, chunk: Chunk) {
        let ids: Vec<String> = chunk.modules.keys().cloned().collect();
        {
            let mut factories = self.state.factories.write();
            for (id, factory) in chunk.modules {
                factories.insert(id, factory);
            }
        }
        self.state.chunks.write().push(ids);

        if let Some(runtime) = chunk.runtime {
            let state = self.state.clone();
            runtime(Arc::new(move |id: &str| state.require(id)));
        }
    }

    fn module_ids(&self) -> Vec<String> {
        self.state.chunks.read().iter().flatten().cloned().collect()
    }
}

/// 以属性列表构建模块对象
pub fn module_object(props: Vec<(&str, HostRef)>) -> HostRef {
    let module = HostValue::object();
    for (key, value) in props {
        module.set(key, value);
    }
    module
}
