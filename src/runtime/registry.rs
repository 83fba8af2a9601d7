//! 注册表
//!
//! 按插件 ID 保存注入句柄、实例引用和运行状态。纯内存，无 I/O。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::types::{Capabilities, InstanceView, SharedInstance};
use crate::page::{NodeId, ResourceUrl};

/// 单个插件的注册表记录
///
/// `instance` 只在握手成功后设置；`running` 只在 `instance` 存在时为 true。
#[derive(Clone)]
pub struct RegistryRecord {
    pub script: Option<NodeId>,
    pub resource: Option<ResourceUrl>,
    pub style: Option<NodeId>,
    pub instance: Option<SharedInstance>,
    pub capabilities: Capabilities,
    pub running: bool,
    /// 信号策略下管理器期望的运行状态
    pub desired_running: bool,
    pub loaded_at: DateTime<Utc>,
    pub(crate) watcher: Option<CancellationToken>,
}

impl Default for RegistryRecord {
    fn default() -> Self {
        Self {
            script: None,
            resource: None,
            style: None,
            instance: None,
            capabilities: Capabilities::default(),
            running: false,
            desired_running: false,
            loaded_at: Utc::now(),
            watcher: None,
        }
    }
}

impl fmt::Debug for RegistryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryRecord")
            .field("script", &self.script)
            .field("style", &self.style)
            .field("has_instance", &self.instance.is_some())
            .field("capabilities", &self.capabilities)
            .field("running", &self.running)
            .field("desired_running", &self.desired_running)
            .finish()
    }
}

impl RegistryRecord {
    /// 设置实例并缓存能力探测结果
    /// 挂上实例以及注册时探测到的能力
    pub(crate) fn attach_instance(&mut self, instance: SharedInstance, capabilities: Capabilities) {
        self.capabilities = capabilities;
        self.instance = Some(instance);
    }

    pub fn view(&self, id: &str) -> InstanceView {
        InstanceView {
            id: id.to_string(),
            has_instance: self.instance.is_some(),
            running: self.running,
            desired_running: self.desired_running,
            capabilities: self.capabilities,
            loaded_at: self.loaded_at,
        }
    }
}

/// 注册表
///
/// 闭包在持锁状态下执行，不能在其中调用插件代码。
#[derive(Default)]
pub struct RegistryStore {
    records: RwLock<IndexMap<String, RegistryRecord>>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<RegistryRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    pub fn inspect<R>(&self, id: &str, f: impl FnOnce(&RegistryRecord) -> R) -> Option<R> {
        self.records.read().get(id).map(f)
    }

    /// 仅当 ID 不存在时创建空记录
    pub fn insert_new(&self, id: &str) -> bool {
        let mut records = self.records.write();
        if records.contains_key(id) {
            return false;
        }
        records.insert(id.to_string(), RegistryRecord::default());
        true
    }

    /// 修改记录，不存在时先创建
    pub fn upsert<R>(&self, id: &str, f: impl FnOnce(&mut RegistryRecord) -> R) -> R {
        let mut records = self.records.write();
        f(records.entry(id.to_string()).or_default())
    }

    /// 修改已存在的记录
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut RegistryRecord) -> R) -> Option<R> {
        self.records.write().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<RegistryRecord> {
        self.records.write().shift_remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    pub fn views(&self) -> Vec<InstanceView> {
        self.records
            .read()
            .iter()
            .map(|(id, record)| record.view(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::{PluginFault, PluginInstance, Startable};
    use std::sync::Arc;

    struct OnlyStart;

    impl Startable for OnlyStart {
        fn start(&self) -> Result<(), PluginFault> {
            Ok(())
        }
    }

    impl PluginInstance for OnlyStart {
        fn as_startable(&self) -> Option<&dyn Startable> {
            Some(self)
        }
    }

    #[test]
    fn test_insert_new_does_not_overwrite() {
        let store = RegistryStore::new();
        assert!(store.insert_new("alpha"));
        store.update("alpha", |r| r.running = true);
        assert!(!store.insert_new("alpha"));
        assert!(store.get("alpha").unwrap().running);
    }

    #[test]
    fn test_update_missing_returns_none() {
        let store = RegistryStore::new();
        assert!(store.update("ghost", |r| r.running = true).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_attach_instance_caches_capabilities() {
        let store = RegistryStore::new();
        let instance: SharedInstance = Arc::new(OnlyStart);
        let capabilities = Capabilities::probe(instance.as_ref());
        store.upsert("alpha", |r| r.attach_instance(instance.clone(), capabilities));

        let view = store.views().pop().unwrap();
        assert!(view.has_instance);
        assert!(view.capabilities.can_start);
        assert!(!view.capabilities.can_stop);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = RegistryStore::new();
        store.insert_new("alpha");
        assert!(store.remove("alpha").is_some());
        assert!(store.remove("alpha").is_none());
    }
}
