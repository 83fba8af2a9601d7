//! 内容提供者测试

use super::*;
use std::fs;
use std::path::Path;

fn write_package(root: &Path, kind: &str, id: &str, manifest: &str, files: &[(&str, &str)]) {
    let dir = root.join(kind).join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

#[cfg(test)]
mod manifest_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_css_single_or_list() {
        let single: Manifest = serde_json::from_str(r#"{"css":"a.css"}"#).unwrap();
        assert_eq!(single.css.unwrap().paths(), vec!["a.css"]);

        let many: Manifest = serde_json::from_str(r#"{"css":["a.css","b.css"]}"#).unwrap();
        assert_eq!(many.css.unwrap().paths(), vec!["a.css", "b.css"]);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let manifest: Manifest =
            serde_json::from_str(r#"{"entry":"index.js","homepage":"https://x.dev"}"#).unwrap();
        assert_eq!(manifest.entry.as_deref(), Some("index.js"));
        assert_eq!(manifest.extra["homepage"], "https://x.dev");
    }

    #[test]
    fn test_listing_falls_back_to_id() {
        let listing = ContentListing::from_manifest("quick-react", Manifest::default(), true);
        assert_eq!(listing.name, "quick-react");
        assert_eq!(listing.version, "");
        assert!(listing.enabled);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("my-plugin_1.0").is_ok());
        assert!(validate_id("..").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("x'; alert(1); '").is_err());
        assert!(validate_id("").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_ids_with_separators_rejected(prefix in "[a-z]{0,5}", suffix in "[a-z]{0,5}") {
            let id = format!("{}/{}", prefix, suffix);
            prop_assert!(validate_id(&id).is_err());
        }
    }
}

#[cfg(test)]
mod fs_store_tests {
    use super::*;

    #[test]
    fn test_list_skips_broken_manifests() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "plugins", "good", r#"{"name":"Good"}"#, &[]);
        write_package(dir.path(), "plugins", "broken", "{ nope", &[]);
        fs::create_dir_all(dir.path().join("plugins").join("no-manifest")).unwrap();

        let store = FsContentStore::new(dir.path().to_path_buf());
        let plugins = store.list_plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].id, "good");
        assert_eq!(plugins[0].name, "Good");
        assert!(!plugins[0].enabled);
    }

    #[test]
    fn test_missing_plugins_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("absent"));
        assert!(store.list_plugins().is_empty());
        assert!(store.list_themes().is_empty());
    }

    #[test]
    fn test_plugin_files_reads_entry_and_joins_css() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "plugins",
            "alpha",
            r#"{"entry":"index.js","css":["a.css","missing.css","b.css"]}"#,
            &[("index.js", "console.log(1)"), ("a.css", "a{}"), ("b.css", "b{}")],
        );

        let store = FsContentStore::new(dir.path().to_path_buf());
        let files = store.plugin_files("alpha").unwrap();
        assert_eq!(files.code.as_deref(), Some("console.log(1)"));
        assert_eq!(files.css.as_deref(), Some("a{}\n\nb{}"));
    }

    #[test]
    fn test_plugin_files_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().to_path_buf());
        assert!(store.plugin_files("ghost").is_none());
        assert!(matches!(
            store.read_plugin_files("ghost"),
            Err(ContentError::NotFound(_))
        ));
    }

    #[test]
    fn test_plugin_entry_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "plugins", "evil", r#"{"entry":"../../secret.js"}"#, &[]);
        let store = FsContentStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.read_plugin_files("evil"),
            Err(ContentError::PathEscape(_))
        ));
        assert!(store.plugin_files("evil").is_none());
    }

    #[test]
    fn test_theme_defaults_to_style_css() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "themes", "dark", "{}", &[("style.css", "body{}")]);
        write_package(dir.path(), "themes", "empty", "{}", &[]);

        let store = FsContentStore::new(dir.path().to_path_buf());
        assert_eq!(store.theme_files("dark").unwrap().css.as_deref(), Some("body{}"));
        assert!(store.theme_files("empty").unwrap().css.is_none());
    }

    #[test]
    fn test_enable_disable_persist() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "plugins", "alpha", "{}", &[]);
        let store = FsContentStore::new(dir.path().to_path_buf());

        assert!(store.enable_plugin("alpha"));
        assert!(store.enable_plugin("alpha"));
        assert_eq!(store.config().plugins_enabled, vec!["alpha".to_string()]);
        assert!(store.list_plugins()[0].enabled);

        // 重新打开，从文件读取
        let reopened = FsContentStore::new(dir.path().to_path_buf());
        assert!(reopened.config().is_plugin_enabled("alpha"));

        assert!(reopened.disable_plugin("alpha"));
        assert!(reopened.config().plugins_enabled.is_empty());
    }

    #[test]
    fn test_disable_never_enabled_does_not_create_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().to_path_buf());
        assert!(store.disable_theme("ghost"));
        assert!(!store.config_store().path().exists());
    }

    #[test]
    fn test_enable_rejects_invalid_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().to_path_buf());
        assert!(!store.enable_plugin("../escape"));
        assert!(store.config().plugins_enabled.is_empty());
    }
}

#[cfg(test)]
mod memory_provider_tests {
    use super::*;

    #[test]
    fn test_read_only_leaves_config_unchanged() {
        let provider = MemoryProvider::new();
        provider.enable_plugin("alpha");
        provider.set_read_only(true);

        assert!(!provider.enable_plugin("beta"));
        assert!(!provider.disable_plugin("alpha"));
        assert_eq!(provider.config().plugins_enabled, vec!["alpha".to_string()]);
    }

    #[test]
    fn test_listing_reflects_config() {
        let provider = MemoryProvider::new();
        provider.insert_plugin("alpha", Manifest::default(), PluginFiles::default());
        provider.insert_theme("dark", Manifest::default(), "body{}");
        provider.enable_theme("dark");

        assert!(!provider.list_plugins()[0].enabled);
        assert!(provider.list_themes()[0].enabled);
        assert_eq!(provider.theme_files("dark").unwrap().css.as_deref(), Some("body{}"));
    }
}
