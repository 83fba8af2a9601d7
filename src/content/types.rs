//! 内容提供者类型定义
//!
//! 定义清单、内容载荷、列表项以及 `ContentProvider` trait

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// 内容错误类型
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("内容不存在: {0}")]
    NotFound(String),

    #[error("无效的 ID: {0}")]
    InvalidId(String),

    #[error("清单文件无效: {id} - {message}")]
    InvalidManifest { id: String, message: String },

    #[error("路径越界: {0}")]
    PathEscape(String),

    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
}

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static id pattern"));

/// 校验插件/主题 ID
///
/// ID 即目录名，同时会作为字符串字面量嵌入包装脚本中。
pub fn validate_id(id: &str) -> Result<(), ContentError> {
    if id == "." || id == ".." || !ID_PATTERN.is_match(id) {
        return Err(ContentError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// 清单中的样式引用，可以是单个路径或路径数组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CssRef {
    One(String),
    Many(Vec<String>),
}

impl CssRef {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            CssRef::One(path) => vec![path.as_str()],
            CssRef::Many(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// 插件/主题清单 (manifest.json)
///
/// ID 由所在目录名决定，清单本身对管理器只读。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Manifest {
    /// 脚本入口 (相对于插件目录)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// 样式文件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<CssRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// 其他未识别字段原样保留
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(CssRef::One(css.into()));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// 插件/主题列表项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentListing {
    pub id: String,
    pub manifest: Manifest,
    pub enabled: bool,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ContentListing {
    /// 从清单构建列表项，缺失的名称回退为 ID
    pub fn from_manifest(id: &str, manifest: Manifest, enabled: bool) -> Self {
        Self {
            id: id.to_string(),
            name: manifest.name.clone().unwrap_or_else(|| id.to_string()),
            description: manifest.description.clone().unwrap_or_default(),
            version: manifest.version.clone().unwrap_or_default(),
            author: manifest.author.clone(),
            icon: manifest.icon.clone(),
            manifest,
            enabled,
        }
    }
}

/// 插件内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PluginFiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
}

impl PluginFiles {
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.css.is_none()
    }
}

/// 主题内容，只有样式
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ThemeFiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
}

/// 清单/内容提供者
///
/// 由特权进程实现；对内容进程而言是同步、无副作用的查询（启用/禁用除外）。
/// 所有失败以 `false` / `None` / 空列表表示，不向调用方抛出错误。
pub trait ContentProvider: Send + Sync {
    fn list_plugins(&self) -> Vec<ContentListing>;

    fn plugin_files(&self, id: &str) -> Option<PluginFiles>;

    fn enable_plugin(&self, id: &str) -> bool;

    fn disable_plugin(&self, id: &str) -> bool;

    fn list_themes(&self) -> Vec<ContentListing>;

    fn theme_files(&self, id: &str) -> Option<ThemeFiles>;

    fn enable_theme(&self, id: &str) -> bool;

    fn disable_theme(&self, id: &str) -> bool;
}
