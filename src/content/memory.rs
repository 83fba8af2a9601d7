//! 内存内容提供者
//!
//! 不落盘的 `ContentProvider` 实现，用于嵌入式宿主和测试。

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::types::{
    validate_id, ContentListing, ContentProvider, Manifest, PluginFiles, ThemeFiles,
};
use crate::config::Config;

#[derive(Debug, Clone)]
struct PluginEntry {
    manifest: Manifest,
    files: PluginFiles,
}

#[derive(Debug, Clone)]
struct ThemeEntry {
    manifest: Manifest,
    files: ThemeFiles,
}

#[derive(Default)]
pub struct MemoryProvider {
    plugins: RwLock<IndexMap<String, PluginEntry>>,
    themes: RwLock<IndexMap<String, ThemeEntry>>,
    config: RwLock<Config>,
    /// 为 true 时所有启用/禁用写入都失败
    read_only: AtomicBool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            ..Self::default()
        }
    }

    pub fn insert_plugin(&self, id: &str, manifest: Manifest, files: PluginFiles) {
        self.plugins
            .write()
            .insert(id.to_string(), PluginEntry { manifest, files });
    }

    pub fn insert_theme(&self, id: &str, manifest: Manifest, css: &str) {
        self.themes.write().insert(
            id.to_string(),
            ThemeEntry {
                manifest,
                files: ThemeFiles {
                    css: Some(css.to_string()),
                },
            },
        );
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn update_config<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Config) -> bool,
    {
        if validate_id(id).is_err() || self.read_only.load(Ordering::SeqCst) {
            return false;
        }
        let mut config = self.config.write();
        let mut next = config.clone();
        if f(&mut next) {
            *config = next;
        }
        true
    }
}

impl ContentProvider for MemoryProvider {
    fn list_plugins(&self) -> Vec<ContentListing> {
        let config = self.config.read();
        self.plugins
            .read()
            .iter()
            .map(|(id, entry)| {
                ContentListing::from_manifest(
                    id,
                    entry.manifest.clone(),
                    config.is_plugin_enabled(id),
                )
            })
            .collect()
    }

    fn plugin_files(&self, id: &str) -> Option<PluginFiles> {
        self.plugins.read().get(id).map(|e| e.files.clone())
    }

    fn enable_plugin(&self, id: &str) -> bool {
        self.update_config(id, |c| c.enable_plugin(id))
    }

    fn disable_plugin(&self, id: &str) -> bool {
        self.update_config(id, |c| c.disable_plugin(id))
    }

    fn list_themes(&self) -> Vec<ContentListing> {
        let config = self.config.read();
        self.themes
            .read()
            .iter()
            .map(|(id, entry)| {
                ContentListing::from_manifest(id, entry.manifest.clone(), config.is_theme_enabled(id))
            })
            .collect()
    }

    fn theme_files(&self, id: &str) -> Option<ThemeFiles> {
        self.themes.read().get(id).map(|e| e.files.clone())
    }

    fn enable_theme(&self, id: &str) -> bool {
        self.update_config(id, |c| c.enable_theme(id))
    }

    fn disable_theme(&self, id: &str) -> bool {
        self.update_config(id, |c| c.disable_theme(id))
    }
}
