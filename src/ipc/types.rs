//! IPC 消息类型

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{ContentListing, PluginFiles, ThemeFiles};

/// 内容进程发往特权进程的同步查询
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    ListPlugins,
    PluginFiles { id: String },
    EnablePlugin { id: String },
    DisablePlugin { id: String },
    ListThemes,
    ThemeFiles { id: String },
    EnableTheme { id: String },
    DisableTheme { id: String },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::ListPlugins => "list_plugins",
            Request::PluginFiles { .. } => "plugin_files",
            Request::EnablePlugin { .. } => "enable_plugin",
            Request::DisablePlugin { .. } => "disable_plugin",
            Request::ListThemes => "list_themes",
            Request::ThemeFiles { .. } => "theme_files",
            Request::EnableTheme { .. } => "enable_theme",
            Request::DisableTheme { .. } => "disable_theme",
        }
    }
}

/// 特权进程的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Response {
    Listing(Vec<ContentListing>),
    PluginFiles(Option<PluginFiles>),
    ThemeFiles(Option<ThemeFiles>),
    Ack(bool),
    Error(String),
}

/// IPC 传输错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    #[error("回复过大: {size} 字节，上限 {limit} 字节")]
    ReplyTooLarge { size: usize, limit: usize },

    #[error("序列化失败: {0}")]
    Codec(String),

    #[error("对端返回错误: {0}")]
    Remote(String),

    #[error("回复类型不匹配: 请求 {request}")]
    UnexpectedResponse { request: &'static str },

    #[error("传输已断开")]
    Disconnected,
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::Codec(err.to_string())
    }
}

/// 同步请求/响应传输
pub trait Transport: Send + Sync {
    fn call(&self, request: &Request) -> Result<Response, IpcError>;
}
