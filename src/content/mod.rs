//! 内容提供者模块
//!
//! 特权进程侧的清单与内容来源：
//! - `ContentProvider` trait: 列表、读取内容、启用/禁用
//! - `FsContentStore`: 基于 `~/.livemod` 目录布局的实现
//! - `MemoryProvider`: 内存实现

mod memory;
mod store;
mod types;

pub use memory::MemoryProvider;
pub use store::FsContentStore;
pub use types::{
    validate_id, ContentError, ContentListing, ContentProvider, CssRef, Manifest, PluginFiles,
    ThemeFiles,
};

#[cfg(test)]
mod tests;
