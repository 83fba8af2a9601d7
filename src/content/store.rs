//! 文件系统内容存储
//!
//! 目录布局：
//! - `<base>/plugins/<id>/manifest.json`
//! - `<base>/themes/<id>/manifest.json`
//! - `<base>/config.json`

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::types::{
    validate_id, ContentError, ContentListing, ContentProvider, CssRef, Manifest, PluginFiles,
    ThemeFiles,
};
use crate::config::{default_base_dir, Config, ConfigStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ContentKind {
    Plugin,
    Theme,
}

impl ContentKind {
    fn label(self) -> &'static str {
        match self {
            ContentKind::Plugin => "plugin",
            ContentKind::Theme => "theme",
        }
    }
}

struct CachedManifest {
    manifest: Manifest,
    mtime: Option<SystemTime>,
}

/// 基于文件系统的内容提供者（特权进程侧）
pub struct FsContentStore {
    base_dir: PathBuf,
    plugins_dir: PathBuf,
    themes_dir: PathBuf,
    config: ConfigStore,
    manifests: Mutex<HashMap<(ContentKind, String), CachedManifest>>,
}

impl FsContentStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            plugins_dir: base_dir.join("plugins"),
            themes_dir: base_dir.join("themes"),
            config: ConfigStore::in_dir(&base_dir),
            base_dir,
            manifests: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_base_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn themes_dir(&self) -> &Path {
        &self.themes_dir
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config(&self) -> Config {
        self.config.read()
    }

    fn dir_for(&self, kind: ContentKind) -> &Path {
        match kind {
            ContentKind::Plugin => &self.plugins_dir,
            ContentKind::Theme => &self.themes_dir,
        }
    }

    fn list_ids(&self, kind: ContentKind) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.dir_for(kind)) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|id| validate_id(id).is_ok())
            .collect();
        ids.sort();
        ids
    }

    /// 读取清单，按 mtime 缓存
    fn read_manifest(&self, kind: ContentKind, id: &str) -> Result<Manifest, ContentError> {
        validate_id(id)?;
        let path = self.dir_for(kind).join(id).join("manifest.json");
        if !path.exists() {
            return Err(ContentError::NotFound(format!("{} {}", kind.label(), id)));
        }

        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        let key = (kind, id.to_string());
        if let Some(cached) = self.manifests.lock().get(&key) {
            if cached.mtime.is_some() && cached.mtime == mtime {
                return Ok(cached.manifest.clone());
            }
        }

        let content = fs::read_to_string(&path)?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| ContentError::InvalidManifest {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        self.manifests.lock().insert(
            key,
            CachedManifest {
                manifest: manifest.clone(),
                mtime,
            },
        );
        Ok(manifest)
    }

    fn list(&self, kind: ContentKind, config: &Config) -> Vec<ContentListing> {
        self.list_ids(kind)
            .into_iter()
            .filter_map(|id| match self.read_manifest(kind, &id) {
                Ok(manifest) => {
                    let enabled = match kind {
                        ContentKind::Plugin => config.is_plugin_enabled(&id),
                        ContentKind::Theme => config.is_theme_enabled(&id),
                    };
                    Some(ContentListing::from_manifest(&id, manifest, enabled))
                }
                Err(e) => {
                    tracing::warn!("[CONTENT] 跳过 {} {}: {}", kind.label(), id, e);
                    None
                }
            })
            .collect()
    }

    /// 读取插件脚本与样式
    pub fn read_plugin_files(&self, id: &str) -> Result<PluginFiles, ContentError> {
        let manifest = self.read_manifest(ContentKind::Plugin, id)?;
        let dir = self.plugins_dir.join(id);

        let code = match manifest.entry.as_deref() {
            Some(entry) => {
                let path = resolve_inside(&dir, entry)?;
                if path.is_file() {
                    Some(fs::read_to_string(path)?)
                } else {
                    tracing::warn!("[CONTENT] 插件 {} 的入口文件不存在: {}", id, entry);
                    None
                }
            }
            None => None,
        };

        let css = match manifest.css.as_ref() {
            Some(css) => Some(read_css_files(&dir, css)?),
            None => None,
        };

        Ok(PluginFiles { code, css })
    }

    /// 读取主题样式，清单未指定 css 时使用 `style.css`
    pub fn read_theme_files(&self, id: &str) -> Result<ThemeFiles, ContentError> {
        let manifest = self.read_manifest(ContentKind::Theme, id)?;
        let dir = self.themes_dir.join(id);
        let css_ref = manifest
            .css
            .unwrap_or_else(|| CssRef::One("style.css".to_string()));
        let css = read_css_files(&dir, &css_ref)?;
        Ok(ThemeFiles {
            css: if css.trim().is_empty() { None } else { Some(css) },
        })
    }

    fn update_config<F>(&self, action: &str, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Config) -> bool,
    {
        if let Err(e) = validate_id(id) {
            tracing::warn!("[CONTENT] {} 被拒绝: {}", action, e);
            return false;
        }
        match self.config.update(f) {
            Ok(changed) => {
                if changed {
                    tracing::info!("[CONTENT] {}: {}", action, id);
                }
                true
            }
            Err(e) => {
                tracing::error!("[CONTENT] {} {} 失败: {}", action, id, e);
                false
            }
        }
    }
}

/// 拼接相对路径，拒绝绝对路径和 `..`
fn resolve_inside(dir: &Path, relative: &str) -> Result<PathBuf, ContentError> {
    let rel = Path::new(relative);
    let safe = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(ContentError::PathEscape(relative.to_string()));
    }
    Ok(dir.join(rel))
}

/// 依次读取样式文件并以换行拼接，缺失的文件记为空字符串
fn read_css_files(dir: &Path, css: &CssRef) -> Result<String, ContentError> {
    let mut parts = Vec::new();
    for file in css.paths() {
        let path = resolve_inside(dir, file)?;
        if path.is_file() {
            parts.push(fs::read_to_string(path)?);
        } else {
            parts.push(String::new());
        }
    }
    Ok(parts.join("\n"))
}

impl ContentProvider for FsContentStore {
    fn list_plugins(&self) -> Vec<ContentListing> {
        let config = self.config.read();
        self.list(ContentKind::Plugin, &config)
    }

    fn plugin_files(&self, id: &str) -> Option<PluginFiles> {
        match self.read_plugin_files(id) {
            Ok(files) => Some(files),
            Err(e) => {
                tracing::warn!("[CONTENT] 读取插件 {} 失败: {}", id, e);
                None
            }
        }
    }

    fn enable_plugin(&self, id: &str) -> bool {
        self.update_config("启用插件", id, |c| c.enable_plugin(id))
    }

    fn disable_plugin(&self, id: &str) -> bool {
        self.update_config("禁用插件", id, |c| c.disable_plugin(id))
    }

    fn list_themes(&self) -> Vec<ContentListing> {
        let config = self.config.read();
        self.list(ContentKind::Theme, &config)
    }

    fn theme_files(&self, id: &str) -> Option<ThemeFiles> {
        match self.read_theme_files(id) {
            Ok(files) => Some(files),
            Err(e) => {
                tracing::warn!("[CONTENT] 读取主题 {} 失败: {}", id, e);
                None
            }
        }
    }

    fn enable_theme(&self, id: &str) -> bool {
        self.update_config("启用主题", id, |c| c.enable_theme(id))
    }

    fn disable_theme(&self, id: &str) -> bool {
        self.update_config("禁用主题", id, |c| c.disable_theme(id))
    }
}
