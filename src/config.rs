//! 配置模块
//!
//! - `Config`: 持久化配置（服务器地址、已启用插件/主题列表）
//! - `ConfigStore`: 基于 JSON 文件的配置读写，按修改时间缓存
//! - `RuntimeOptions`: 内容进程运行时选项（生命周期策略、握手超时等）

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 持久化配置
///
/// 进程内唯一，是"已启用"状态的唯一来源，只能通过启用/禁用操作修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// 更新服务器地址
    #[serde(default)]
    pub server_url: String,
    /// 已启用的插件 ID
    #[serde(default)]
    pub plugins_enabled: Vec<String>,
    /// 已启用的主题 ID
    #[serde(default)]
    pub themes_enabled: Vec<String>,
    /// 加载器版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_version: Option<String>,
}

impl Config {
    pub fn is_plugin_enabled(&self, id: &str) -> bool {
        self.plugins_enabled.iter().any(|p| p == id)
    }

    pub fn is_theme_enabled(&self, id: &str) -> bool {
        self.themes_enabled.iter().any(|t| t == id)
    }

    /// 启用插件，返回配置是否发生变化
    pub fn enable_plugin(&mut self, id: &str) -> bool {
        insert_unique(&mut self.plugins_enabled, id)
    }

    /// 禁用插件，返回配置是否发生变化
    pub fn disable_plugin(&mut self, id: &str) -> bool {
        remove_all(&mut self.plugins_enabled, id)
    }

    pub fn enable_theme(&mut self, id: &str) -> bool {
        insert_unique(&mut self.themes_enabled, id)
    }

    pub fn disable_theme(&mut self, id: &str) -> bool {
        remove_all(&mut self.themes_enabled, id)
    }
}

fn insert_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|x| x == id) {
        return false;
    }
    list.push(id.to_string());
    true
}

fn remove_all(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|x| x != id);
    list.len() != before
}

/// 默认数据目录: ~/.livemod
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".livemod")
}

struct CachedConfig {
    config: Config,
    mtime: Option<SystemTime>,
}

/// 配置文件存储
///
/// 读取时按文件修改时间缓存；写入时创建父目录并格式化输出。
pub struct ConfigStore {
    path: PathBuf,
    cache: Mutex<Option<CachedConfig>>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }

    /// 使用 `<base_dir>/config.json`
    pub fn in_dir(base_dir: &Path) -> Self {
        Self::new(base_dir.join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取配置，文件不存在时返回默认配置
    pub fn try_read(&self) -> Result<Config, ConfigError> {
        if !self.path.exists() {
            return Ok(Config::default());
        }

        let mtime = file_mtime(&self.path);
        {
            let cache = self.cache.lock();
            if let Some(cached) = cache.as_ref() {
                if cached.mtime.is_some() && cached.mtime == mtime {
                    return Ok(cached.config.clone());
                }
            }
        }

        let content = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&content)?;
        *self.cache.lock() = Some(CachedConfig {
            config: config.clone(),
            mtime,
        });
        Ok(config)
    }

    /// 读取配置，出错时记录日志并返回默认配置
    pub fn read(&self) -> Config {
        match self.try_read() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("[CONFIG] 读取配置失败 {}: {}", self.path.display(), e);
                Config::default()
            }
        }
    }

    pub fn write(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        *self.cache.lock() = Some(CachedConfig {
            config: config.clone(),
            mtime: file_mtime(&self.path),
        });
        Ok(())
    }

    /// 读取-修改-写回
    ///
    /// 闭包返回 `false` 表示没有变化，此时不写文件。读取失败时不会写入，
    /// 保证失败的启用/禁用操作不改变已持久化的配置。
    pub fn update<F>(&self, f: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&mut Config) -> bool,
    {
        let mut config = self.try_read()?;
        if !f(&mut config) {
            return Ok(false);
        }
        self.write(&config)?;
        Ok(true)
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// 生命周期策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStrategy {
    /// 握手确认后由管理器直接调用 start/stop
    #[default]
    Handshake,
    /// 注入后不等待确认，通过广播信号 + 轮询驱动 start/stop
    SignalPolling,
}

/// 内容进程运行时选项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeOptions {
    /// 生命周期策略
    #[serde(default)]
    pub strategy: LifecycleStrategy,
    /// 注册握手超时 (毫秒)
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_ms: u64,
    /// 信号轮询间隔 (毫秒)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 注入节点上的标记属性名
    #[serde(default = "default_marker_attribute")]
    pub marker_attribute: String,
    /// 插件 API 在页面上的全局名称
    #[serde(default = "default_api_global")]
    pub api_global: String,
    /// UI 根容器的 class 名
    #[serde(default = "default_root_container_class")]
    pub root_container_class: String,
    /// 同步查询回复的最大字节数
    #[serde(default = "default_max_reply_bytes")]
    pub max_reply_bytes: usize,
}

fn default_registration_timeout() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_marker_attribute() -> String {
    "data-livemod".to_string()
}

fn default_api_global() -> String {
    "LiveMod".to_string()
}

fn default_root_container_class() -> String {
    "app-container".to_string()
}

fn default_max_reply_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            strategy: LifecycleStrategy::default(),
            registration_timeout_ms: default_registration_timeout(),
            poll_interval_ms: default_poll_interval(),
            marker_attribute: default_marker_attribute(),
            api_global: default_api_global(),
            root_container_class: default_root_container_class(),
            max_reply_bytes: default_max_reply_bytes(),
        }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: LifecycleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_registration_timeout(mut self, timeout_ms: u64) -> Self {
        self.registration_timeout_ms = timeout_ms;
        self
    }

    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    pub fn with_api_global(mut self, name: impl Into<String>) -> Self {
        self.api_global = name.into();
        self
    }

    pub fn with_root_container_class(mut self, class: impl Into<String>) -> Self {
        self.root_container_class = class.into();
        self
    }

    pub fn with_max_reply_bytes(mut self, max: usize) -> Self {
        self.max_reply_bytes = max;
        self
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    /// 轮询间隔，最小 1ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_config_camel_case_roundtrip() {
        let json = r#"{"serverUrl":"https://example.com","pluginsEnabled":["a"],"themesEnabled":[]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_url, "https://example.com");
        assert_eq!(config.plugins_enabled, vec!["a".to_string()]);
        assert!(config.loader_version.is_none());

        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("pluginsEnabled"));
        assert!(!out.contains("loaderVersion"));
    }

    #[test]
    fn test_config_missing_fields_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_disable_never_enabled_is_noop() {
        let mut config = Config::default();
        config.enable_theme("dark");
        let before = config.clone();
        assert!(!config.disable_plugin("ghost"));
        assert_eq!(config, before);
    }

    #[test]
    fn test_store_update_skips_write_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());

        assert!(!store.update(|c| c.disable_plugin("ghost")).unwrap());
        assert!(!store.path().exists());

        assert!(store.update(|c| c.enable_plugin("alpha")).unwrap());
        assert!(store.path().exists());
        assert!(store.read().is_plugin_enabled("alpha"));
    }

    #[test]
    fn test_store_corrupt_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.update(|c| c.enable_plugin("alpha")).is_err());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
        assert_eq!(store.read(), Config::default());
    }

    #[test]
    fn test_runtime_options_defaults() {
        let options = RuntimeOptions::default();
        assert_eq!(options.registration_timeout(), Duration::from_millis(1000));
        assert_eq!(options.poll_interval(), Duration::from_millis(100));
        assert_eq!(options.strategy, LifecycleStrategy::Handshake);

        let parsed: RuntimeOptions =
            serde_json::from_str(r#"{"strategy":"signal_polling"}"#).unwrap();
        assert_eq!(parsed.strategy, LifecycleStrategy::SignalPolling);
        assert_eq!(parsed.marker_attribute, "data-livemod");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// 任意次数启用同一插件后，列表中该 ID 只出现一次
        #[test]
        fn prop_enable_is_idempotent(id in "[a-z0-9_-]{1,16}", times in 1usize..5) {
            let mut config = Config::default();
            for _ in 0..times {
                config.enable_plugin(&id);
            }
            prop_assert_eq!(config.plugins_enabled.iter().filter(|p| **p == id).count(), 1);
        }

        /// 启用后禁用，列表回到原状态
        #[test]
        fn prop_enable_then_disable_restores(
            existing in prop::collection::vec("[a-z]{1,8}", 0..5),
            id in "[0-9]{1,8}",
        ) {
            let mut config = Config { plugins_enabled: existing.clone(), ..Config::default() };
            config.enable_plugin(&id);
            config.disable_plugin(&id);
            prop_assert_eq!(config.plugins_enabled, existing);
        }
    }
}
