//! 注入器
//!
//! - `StyleInjector`: 以标记属性挂载/移除样式节点
//! - `CodeInjector`: 包装插件代码、创建临时资源、挂载模块脚本
//! - `WrapperTemplate`: 生成包裹插件代码的脚本文本

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::channel::PluginChannel;
use super::guest::{GuestHost, PreparedUnit};
use crate::config::{LifecycleStrategy, RuntimeOptions};
use crate::page::{NodeId, NodeKind, Page, ResourceUrl, ScriptNode, StyleNode};

pub(crate) fn plugin_style_tag(id: &str) -> String {
    format!("plugin-{}-style", id)
}

pub(crate) fn plugin_script_tag(id: &str) -> String {
    format!("plugin-{}", id)
}

pub(crate) fn theme_style_tag(id: &str) -> String {
    format!("theme-{}-style", id)
}

fn marker_attributes(marker: &str, tag: &str) -> IndexMap<String, String> {
    let mut attributes = IndexMap::new();
    attributes.insert(marker.to_string(), tag.to_string());
    attributes
}

/// 样式注入器
pub struct StyleInjector {
    marker: String,
}

impl StyleInjector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn apply(&self, page: &dyn Page, tag: &str, css: &str) -> NodeId {
        page.append_style(StyleNode {
            id: NodeId::generate(tag),
            attributes: marker_attributes(&self.marker, tag),
            css: css.to_string(),
        })
    }

    /// 移除所有带该标记的样式节点
    pub fn remove(&self, page: &dyn Page, tag: &str) -> usize {
        page.remove_tagged(NodeKind::Style, &self.marker, tag)
    }
}

/// 包装脚本模板
///
/// 包装后的脚本：
/// 1. 从页面全局读取插件 API 并绑定为 `api`
/// 2. 在 try/catch 中执行插件代码，错误带插件 ID 输出到控制台
/// 3. 从全局插槽或最后一个导出值中找到插件对象
/// 4. 握手策略：注册或报告空导出；信号策略：启动轮询
#[derive(Debug, Clone)]
pub struct WrapperTemplate {
    api_global: String,
    strategy: LifecycleStrategy,
    poll_interval_ms: u64,
}

impl WrapperTemplate {
    pub fn from_options(options: &RuntimeOptions) -> Self {
        Self {
            api_global: options.api_global.clone(),
            strategy: options.strategy,
            poll_interval_ms: options.poll_interval().as_millis() as u64,
        }
    }

    pub fn strategy(&self) -> LifecycleStrategy {
        self.strategy
    }

    pub fn render(&self, plugin_id: &str, source: &str) -> String {
        let id = js_string(plugin_id);
        let global = js_string(&self.api_global);

        let mut out = String::with_capacity(source.len() + 1024);
        out.push_str(&format!("const api = window[{}];\n", global));
        out.push_str(&format!("const __livemodId = {};\n", id));
        out.push_str("let __livemodPlugin = null;\n");
        out.push_str("try {\n");
        out.push_str(source);
        out.push_str("\n  __livemodPlugin = window.__livemodPlugin ?? ");
        out.push_str("(typeof __livemodExport !== \"undefined\" ? __livemodExport : null);\n");
        out.push_str("} catch (error) {\n");
        out.push_str("  console.error(\"[plugin:\" + __livemodId + \"]\", error);\n");
        out.push_str("}\n");

        match self.strategy {
            LifecycleStrategy::Handshake => {
                out.push_str("if (api.pendingId() === __livemodId) {\n");
                out.push_str("  if (__livemodPlugin) api.registerPlugin(__livemodPlugin);\n");
                out.push_str("  else api.reportEmpty(__livemodId);\n");
                out.push_str("}\n");
            }
            LifecycleStrategy::SignalPolling => {
                out.push_str("if (__livemodPlugin) {\n");
                out.push_str("  let __running = false;\n");
                out.push_str("  const __tick = () => {\n");
                out.push_str("    const want = api.isPluginRunning(__livemodId);\n");
                out.push_str("    if (want === __running) return;\n");
                out.push_str("    __running = want;\n");
                out.push_str("    try {\n");
                out.push_str("      if (want) __livemodPlugin.start?.();\n");
                out.push_str("      else __livemodPlugin.stop?.();\n");
                out.push_str("    } catch (error) {\n");
                out.push_str("      console.error(\"[plugin:\" + __livemodId + \"]\", error);\n");
                out.push_str("    }\n");
                out.push_str("  };\n");
                out.push_str("  api.onSignal(__livemodId, __tick);\n");
                out.push_str(&format!(
                    "  setInterval(__tick, {});\n",
                    self.poll_interval_ms
                ));
                out.push_str("}\n");
            }
        }
        out
    }
}

/// 以 JSON 字符串字面量形式转义
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// 一次代码注入的句柄
pub struct InjectionHandle {
    pub unit_id: NodeId,
    pub resource: ResourceUrl,
    pub channel: PluginChannel,
}

/// 代码注入器
pub struct CodeInjector {
    marker: String,
    template: WrapperTemplate,
    poll_interval: Duration,
}

impl CodeInjector {
    pub fn new(options: &RuntimeOptions) -> Self {
        Self {
            marker: options.marker_attribute.clone(),
            template: WrapperTemplate::from_options(options),
            poll_interval: options.poll_interval(),
        }
    }

    pub fn template(&self) -> &WrapperTemplate {
        &self.template
    }

    /// 挂载插件脚本
    ///
    /// 临时资源在脚本开始执行时释放；脚本从未执行时由卸载流程释放。
    pub(crate) fn inject(
        &self,
        page: &Arc<dyn Page>,
        guest: &GuestHost,
        channel: PluginChannel,
        plugin_id: &str,
        source: &str,
        watcher: Option<CancellationToken>,
    ) -> InjectionHandle {
        let tag = plugin_script_tag(plugin_id);
        let unit_id = NodeId::generate(&format!("script-{}", tag));
        let resource = page.create_resource(self.template.render(plugin_id, source));

        guest.prepare(
            unit_id.clone(),
            PreparedUnit {
                plugin_id: plugin_id.to_string(),
                source: source.to_string(),
                strategy: self.template.strategy(),
                watcher,
                channel: channel.clone(),
                poll_interval: self.poll_interval,
            },
        );

        let release_page = Arc::clone(page);
        let release_url = resource.clone();
        page.append_script(ScriptNode {
            id: unit_id.clone(),
            attributes: marker_attributes(&self.marker, &tag),
            src: resource.clone(),
            module: true,
            on_load: Some(Box::new(move || {
                release_page.revoke_resource(&release_url);
            })),
        });

        tracing::debug!("[INJECT] 插件 {} 脚本已挂载: {}", plugin_id, unit_id);
        InjectionHandle {
            unit_id,
            resource,
            channel,
        }
    }

    /// 移除插件的全部脚本节点
    pub fn remove(&self, page: &dyn Page, plugin_id: &str) -> usize {
        page.remove_tagged(NodeKind::Script, &self.marker, &plugin_script_tag(plugin_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_escapes_id_and_binds_api() {
        let options = RuntimeOptions::default().with_api_global("Host");
        let text = WrapperTemplate::from_options(&options).render("we\"ird", "doThing();");

        assert!(text.starts_with("const api = window[\"Host\"];"));
        assert!(text.contains("const __livemodId = \"we\\\"ird\";"));
        assert!(text.contains("doThing();"));
        assert!(text.contains("api.registerPlugin(__livemodPlugin)"));
        assert!(!text.contains("setInterval"));
    }

    #[test]
    fn test_signal_template_polls() {
        let options = RuntimeOptions::default()
            .with_strategy(LifecycleStrategy::SignalPolling)
            .with_poll_interval(250);
        let text = WrapperTemplate::from_options(&options).render("clock", "");

        assert!(text.contains("setInterval(__tick, 250);"));
        assert!(text.contains("api.isPluginRunning(__livemodId)"));
        assert!(!text.contains("registerPlugin"));
    }

    #[test]
    fn test_tags() {
        assert_eq!(plugin_script_tag("a"), "plugin-a");
        assert_eq!(plugin_style_tag("a"), "plugin-a-style");
        assert_eq!(theme_style_tag("a"), "theme-a-style");
    }
}
