//! 日志管理模块
//!
//! - `LogStore`: 内存环形日志 + 可选的文件输出（按大小轮转、按天清理）
//! - `LogCaptureLayer`: 把 tracing 事件写入 `LogStore` 的 Layer
//! - `init_logging`: 安装 fmt + 捕获 Layer + EnvFilter
use chrono::{Duration, Local, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    pub max_logs: usize,
    pub retention_days: u32,
    pub max_file_size: u64,
    pub enable_file_logging: bool,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            max_logs: 1000,
            retention_days: 7,
            max_file_size: 10 * 1024 * 1024,
            enable_file_logging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

pub struct LogStore {
    logs: VecDeque<LogEntry>,
    config: LogStoreConfig,
    log_file_path: Option<PathBuf>,
}

impl Default for LogStore {
    fn default() -> Self {
        // 默认日志文件路径: ~/.livemod/logs/livemod.log
        let log_dir = crate::config::default_base_dir().join("logs");
        let _ = fs::create_dir_all(&log_dir);
        Self::with_file(log_dir.join("livemod.log"), LogStoreConfig::default())
    }
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 仅保存在内存中，不写文件
    pub fn in_memory() -> Self {
        Self {
            logs: VecDeque::new(),
            config: LogStoreConfig {
                enable_file_logging: false,
                ..LogStoreConfig::default()
            },
            log_file_path: None,
        }
    }

    pub fn with_file(path: PathBuf, config: LogStoreConfig) -> Self {
        Self {
            logs: VecDeque::new(),
            config,
            log_file_path: Some(path),
        }
    }

    pub fn shared(self) -> SharedLogStore {
        Arc::new(RwLock::new(self))
    }

    pub fn add(&mut self, level: &str, message: &str) {
        let sanitized = sanitize_log_message(message);
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_uppercase(),
            message: sanitized,
        };

        if self.config.enable_file_logging {
            if let Some(path) = self.log_file_path.clone() {
                self.append_to_file(&path, &entry);
            }
        }

        self.logs.push_back(entry);
        while self.logs.len() > self.config.max_logs {
            self.logs.pop_front();
        }
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.logs.iter().cloned().collect()
    }

    /// 是否存在指定级别且包含 `needle` 的日志
    pub fn contains(&self, level: &str, needle: &str) -> bool {
        self.logs
            .iter()
            .any(|e| e.level.eq_ignore_ascii_case(level) && e.message.contains(needle))
    }

    pub fn count_level(&self, level: &str) -> usize {
        self.logs
            .iter()
            .filter(|e| e.level.eq_ignore_ascii_case(level))
            .count()
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }

    pub fn get_log_file_path(&self) -> Option<String> {
        self.log_file_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    fn append_to_file(&self, path: &Path, entry: &LogEntry) {
        self.rotate_log_file_if_needed(path);
        let local_time = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("{} [{}] {}\n", local_time, entry.level, entry.message);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(line.as_bytes());
        }
    }

    fn rotate_log_file_if_needed(&self, path: &Path) {
        let Ok(metadata) = fs::metadata(path) else {
            return;
        };
        if metadata.len() <= self.config.max_file_size {
            return;
        }

        let suffix = Local::now().format("%Y%m%d-%H%M%S");
        let rotated = path.with_file_name(format!(
            "{}.{}",
            path.file_name().unwrap_or_default().to_string_lossy(),
            suffix
        ));
        let _ = fs::rename(path, &rotated);
        self.prune_rotated_logs(path);
    }

    fn prune_rotated_logs(&self, path: &Path) {
        let Some(dir) = path.parent() else {
            return;
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let cutoff = Utc::now() - Duration::days(self.config.retention_days as i64);
        let prefix = format!(
            "{}.",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if chrono::DateTime::<Utc>::from(modified) < cutoff {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

pub type SharedLogStore = Arc<RwLock<LogStore>>;

static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        (
            r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "token: ***",
        ),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        // serverUrl 中的 user:pass@
        (r"(https?://)[^/\s:@]+:[^/\s@]+@", "${1}***@"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 日志脱敏
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

/// 把 tracing 事件写入 `LogStore`
pub struct LogCaptureLayer {
    store: SharedLogStore,
}

impl LogCaptureLayer {
    pub fn new(store: SharedLogStore) -> Self {
        Self { store }
    }
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let level = event.metadata().level().to_string();
        self.store.write().add(&level, &visitor.finish());
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时使用 `default_directive`。重复调用返回 `false`。
pub fn init_logging(store: SharedLogStore, default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(LogCaptureLayer::new(store))
        .try_init()
        .is_ok()
}
