//! IPC 模块测试

use super::*;
use crate::content::{Manifest, MemoryProvider, PluginFiles};
use std::sync::Arc;

fn provider_with_plugin() -> Arc<MemoryProvider> {
    let provider = Arc::new(MemoryProvider::new());
    provider.insert_plugin(
        "clock",
        Manifest::default().with_entry("index.js").with_name("Clock"),
        PluginFiles {
            code: Some("tick()".to_string()),
            css: Some(".clock{}".to_string()),
        },
    );
    provider
}

mod message_tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(Request::PluginFiles {
            id: "clock".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "plugin_files");
        assert_eq!(json["payload"]["id"], "clock");

        let unit = serde_json::to_value(Request::ListThemes).unwrap();
        assert_eq!(unit["type"], "list_themes");
    }

    #[test]
    fn test_unknown_request_rejected() {
        let endpoint = PrivilegedEndpoint::new(provider_with_plugin(), 1024);
        let err = endpoint.handle_json(r#"{"type":"format_disk"}"#).unwrap_err();
        assert!(matches!(err, IpcError::Codec(_)));
    }
}

mod endpoint_tests {
    use super::*;
    use crate::content::ContentProvider;

    #[test]
    fn test_remote_provider_round_trips_queries() {
        let provider = provider_with_plugin();
        let remote = RemoteProvider::new(PrivilegedEndpoint::new(provider.clone(), 64 * 1024));

        let plugins = remote.list_plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "Clock");
        assert!(!plugins[0].enabled);

        let files = remote.plugin_files("clock").unwrap();
        assert_eq!(files.code.as_deref(), Some("tick()"));
        assert!(remote.plugin_files("missing").is_none());

        assert!(remote.enable_plugin("clock"));
        assert!(provider.config().is_plugin_enabled("clock"));
        assert!(remote.disable_plugin("clock"));
        assert!(!provider.config().is_plugin_enabled("clock"));
    }

    #[test]
    fn test_oversized_reply_becomes_error() {
        let endpoint = PrivilegedEndpoint::new(provider_with_plugin(), 16);
        let reply = endpoint.call(&Request::ListPlugins).unwrap();
        assert!(matches!(reply, Response::Error(message) if message.contains("16")));

        let remote = RemoteProvider::new(endpoint);
        assert!(remote.list_plugins().is_empty());
        assert!(remote.plugin_files("clock").is_none());
    }
}

mod exec_queue_tests {
    use super::*;
    use crate::page::MemoryPage;

    #[test]
    fn test_send_is_deferred_until_loaded() {
        let page = Arc::new(MemoryPage::new());
        let queue = ExecQueue::new(page.clone());

        assert!(!queue.send("one()"));
        assert!(!queue.send("two()"));
        assert!(page.evaluated().is_empty());
        assert_eq!(queue.pending_len(), 2);

        assert_eq!(queue.mark_loaded(), 2);
        assert!(queue.send("three()"));
        assert_eq!(page.evaluated(), vec!["one()", "two()", "three()"]);
    }

    #[test]
    fn test_mark_loaded_twice_delivers_nothing_new() {
        let page = Arc::new(MemoryPage::new());
        let queue = ExecQueue::new(page.clone());
        queue.send("one()");
        assert_eq!(queue.mark_loaded(), 1);
        assert_eq!(queue.mark_loaded(), 0);
        assert!(queue.is_loaded());
        assert_eq!(page.evaluated().len(), 1);
    }
}
