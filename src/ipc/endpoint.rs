//! 特权进程端点与内容进程侧的远程提供者

use std::sync::Arc;

use super::types::{IpcError, Request, Response, Transport};
use crate::content::{ContentListing, ContentProvider, PluginFiles, ThemeFiles};

/// 特权进程端点
///
/// 把请求分发给 `ContentProvider`，回复超过上限时以错误回复代替。
pub struct PrivilegedEndpoint {
    provider: Arc<dyn ContentProvider>,
    max_reply_bytes: usize,
}

impl PrivilegedEndpoint {
    pub fn new(provider: Arc<dyn ContentProvider>, max_reply_bytes: usize) -> Self {
        Self {
            provider,
            max_reply_bytes,
        }
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        let provider = self.provider.as_ref();
        match request {
            Request::ListPlugins => Response::Listing(provider.list_plugins()),
            Request::PluginFiles { id } => Response::PluginFiles(provider.plugin_files(id)),
            Request::EnablePlugin { id } => Response::Ack(provider.enable_plugin(id)),
            Request::DisablePlugin { id } => Response::Ack(provider.disable_plugin(id)),
            Request::ListThemes => Response::Listing(provider.list_themes()),
            Request::ThemeFiles { id } => Response::ThemeFiles(provider.theme_files(id)),
            Request::EnableTheme { id } => Response::Ack(provider.enable_theme(id)),
            Request::DisableTheme { id } => Response::Ack(provider.disable_theme(id)),
        }
    }

    /// 处理一条 JSON 编码的请求，返回 JSON 编码的回复
    pub fn handle_json(&self, raw: &str) -> Result<String, IpcError> {
        let request: Request = serde_json::from_str(raw)?;
        let encoded = serde_json::to_string(&self.dispatch(&request))?;
        if encoded.len() <= self.max_reply_bytes {
            return Ok(encoded);
        }

        let err = IpcError::ReplyTooLarge {
            size: encoded.len(),
            limit: self.max_reply_bytes,
        };
        tracing::warn!("[IPC] {} 的{}", request.name(), err);
        Ok(serde_json::to_string(&Response::Error(err.to_string()))?)
    }
}

impl Transport for PrivilegedEndpoint {
    /// 进程内传输：完整走一遍 JSON 编解码
    fn call(&self, request: &Request) -> Result<Response, IpcError> {
        let raw = serde_json::to_string(request)?;
        let reply = self.handle_json(&raw)?;
        Ok(serde_json::from_str(&reply)?)
    }
}

/// 内容进程侧的提供者，通过传输层查询特权进程
pub struct RemoteProvider<T: Transport> {
    transport: T,
}

impl<T: Transport> RemoteProvider<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn call(&self, request: Request) -> Option<Response> {
        match self.transport.call(&request) {
            Ok(Response::Error(message)) => {
                tracing::warn!(
                    "[IPC] {} 失败: {}",
                    request.name(),
                    IpcError::Remote(message)
                );
                None
            }
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!("[IPC] {} 失败: {}", request.name(), e);
                None
            }
        }
    }

    fn listing(&self, request: Request) -> Vec<ContentListing> {
        let name = request.name();
        match self.call(request) {
            Some(Response::Listing(items)) => items,
            Some(_) => {
                tracing::warn!("[IPC] {}", IpcError::UnexpectedResponse { request: name });
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn ack(&self, request: Request) -> bool {
        let name = request.name();
        match self.call(request) {
            Some(Response::Ack(ok)) => ok,
            Some(_) => {
                tracing::warn!("[IPC] {}", IpcError::UnexpectedResponse { request: name });
                false
            }
            None => false,
        }
    }
}

impl<T: Transport> ContentProvider for RemoteProvider<T> {
    fn list_plugins(&self) -> Vec<ContentListing> {
        self.listing(Request::ListPlugins)
    }

    fn plugin_files(&self, id: &str) -> Option<PluginFiles> {
        match self.call(Request::PluginFiles { id: id.to_string() })? {
            Response::PluginFiles(files) => files,
            _ => None,
        }
    }

    fn enable_plugin(&self, id: &str) -> bool {
        self.ack(Request::EnablePlugin { id: id.to_string() })
    }

    fn disable_plugin(&self, id: &str) -> bool {
        self.ack(Request::DisablePlugin { id: id.to_string() })
    }

    fn list_themes(&self) -> Vec<ContentListing> {
        self.listing(Request::ListThemes)
    }

    fn theme_files(&self, id: &str) -> Option<ThemeFiles> {
        match self.call(Request::ThemeFiles { id: id.to_string() })? {
            Response::ThemeFiles(files) => files,
            _ => None,
        }
    }

    fn enable_theme(&self, id: &str) -> bool {
        self.ack(Request::EnableTheme { id: id.to_string() })
    }

    fn disable_theme(&self, id: &str) -> bool {
        self.ack(Request::DisableTheme { id: id.to_string() })
    }
}
