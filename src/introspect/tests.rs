//! 内省工具测试

use super::*;
use serde_json::json;
use std::sync::Arc;

fn text_component(name: &str, text: &'static str) -> HostRef {
    component(name, move |_, _, runtime| {
        UiNode::Element(runtime.create_element(
            ElementType::intrinsic("span"),
            Props::new(),
            vec![UiNode::Text(text.to_string())],
        ))
    })
}

mod module_tests {
    use super::*;
    use indexmap::IndexMap;

    fn index_with(modules: Vec<(&str, HostRef)>) -> ChunkModuleIndex {
        let bundler = MemoryBundler::new();
        for (id, exports) in modules {
            bundler.define(id, exports);
        }
        ChunkModuleIndex::install(Arc::new(bundler)).unwrap()
    }

    #[test]
    fn test_find_by_props_prefers_default_export() {
        let inner = module_object(vec![
            ("useState", HostValue::function(None)),
            ("createElement", HostValue::function(None)),
        ]);
        let wrapped = module_object(vec![("default", inner.clone())]);
        let flat = module_object(vec![
            ("useState", HostValue::function(None)),
            ("createElement", HostValue::function(None)),
        ]);

        let index = index_with(vec![("wrapped", wrapped), ("flat", flat.clone())]);
        let found = index.find_by_props(&["useState", "createElement"]).unwrap();
        assert!(same_value(&found, &inner));

        let index = index_with(vec![("flat", flat.clone())]);
        let found = index.find_by_props(&["useState", "createElement"]).unwrap();
        assert!(same_value(&found, &flat));

        assert!(index.find_by_props(&["useState", "missing"]).is_none());
    }

    #[test]
    fn test_panicking_filter_counts_as_no_match() {
        let bad = module_object(vec![("bad", HostValue::object())]);
        let good = module_object(vec![("good", HostValue::object())]);
        let index = index_with(vec![("bad", bad), ("good", good.clone())]);

        let found = index.find(
            &|m: &HostRef| {
                if m.has("bad") {
                    panic!("filter blew up");
                }
                m.has("good")
            },
            false,
        );
        assert!(same_value(&found.unwrap(), &good));
    }

    #[test]
    fn test_failing_module_factory_is_skipped() {
        let bundler = MemoryBundler::new();
        let mut modules: IndexMap<String, ModuleFactory> = IndexMap::new();
        modules.insert("broken".to_string(), Arc::new(|| -> HostRef { panic!("module init failed") }));
        modules.insert(
            "empty".to_string(),
            Arc::new(|| HostValue::primitive(json!(0))),
        );
        bundler.push_chunk(Chunk {
            ids: vec!["chunk-a".to_string()],
            modules,
            runtime: None,
        });
        bundler.define("ok", module_object(vec![("x", HostValue::object())]));

        let index = ChunkModuleIndex::install(Arc::new(bundler.clone())).unwrap();
        assert_eq!(index.all_exports().len(), 1);
        // 哨兵分块也被记录
        assert_eq!(bundler.chunk_count(), 3);
    }

    #[test]
    fn test_find_exports_looks_one_level_deep_and_dedupes() {
        let shared = HostValue::function(Some("Shared"));
        let a = module_object(vec![("Shared", shared.clone())]);
        let b = module_object(vec![("alias", shared.clone())]);
        let index = index_with(vec![("a", a), ("b", b)]);

        let filter = |v: &HostRef| v.display_name().as_deref() == Some("Shared");
        let all = index.find_exports(&filter);
        assert_eq!(all.len(), 1);
        assert!(same_value(&index.find_export(&filter).unwrap(), &shared));
    }

    #[test]
    fn test_find_component_by_display_name() {
        let button = text_component("Button", "press");
        let other = text_component("Other", "nope");
        let index = index_with(vec![(
            "ui",
            module_object(vec![("Button", button.clone()), ("Other", other)]),
        )]);

        assert!(same_value(&index.find_component("Button", None), &button));

        let rejecting = |_: &HostRef| false;
        let placeholder = index.find_component("Button", Some(&rejecting));
        assert!(!same_value(&placeholder, &button));
        assert_eq!(index.find_components("Button", None).len(), 1);
    }

    #[test]
    fn test_missing_component_renders_placeholder() {
        let index = index_with(vec![]);
        let placeholder = index.find_component("Sidebar", None);
        assert_eq!(placeholder.display_name().as_deref(), Some("Missing(Sidebar)"));

        let runtime = ElementRuntime::new();
        let element = runtime.create_element(ElementType::Component(placeholder), Props::new(), vec![]);
        let rendered = runtime.render(&element);
        assert_eq!(rendered.text_content(), "⚠️ Missing component: Sidebar");
        match rendered {
            UiNode::Element(div) => assert_eq!(div.props["style"]["color"], "red"),
            UiNode::Text(_) => panic!("expected an element"),
        }
    }

    #[test]
    fn test_install_fails_without_runtime_callback() {
        struct SilentBundler;
        impl BundlerRuntime for SilentBundler {
            fn push_chunk(&self, _chunk: Chunk) {}
            fn module_ids(&self) -> Vec<String> {
                Vec::new()
            }
        }
        assert!(ChunkModuleIndex::install(Arc::new(SilentBundler)).is_none());
    }
}

mod ui_tests {
    use super::*;

    struct UiEnv {
        bundler: MemoryBundler,
        elements: Arc<ElementRuntime>,
        document: Arc<MemoryDocument>,
        root_fiber: FiberRef,
        first: FiberRef,
        second: FiberRef,
    }

    fn ui_env() -> UiEnv {
        let bundler = MemoryBundler::new();
        let elements = ElementRuntime::new();
        bundler.define("react", ElementRuntime::module_exports(&elements));
        let client = Arc::new(DomClient::default());
        bundler.define("react-dom-client", DomClient::module_exports(&client));

        let document = Arc::new(MemoryDocument::new());
        let container = document.add_container(&["app-container"]);
        let root = client.create_root(&container);
        let root_fiber = root.fiber_root().unwrap();

        let first = fiber("First", Some(Props::new()));
        let second = fiber("Second", Some(Props::new()));
        let leaf = fiber("Leaf", None);
        second.write().child = Some(leaf);
        first.write().sibling = Some(second.clone());
        root_fiber.write().child = Some(first.clone());

        UiEnv {
            bundler,
            elements,
            document,
            root_fiber,
            first,
            second,
        }
    }

    fn install(env: &UiEnv) -> Introspection {
        Introspection::install(
            Arc::new(env.bundler.clone()),
            env.document.clone(),
            "app-container",
        )
    }

    fn is_stale(node: &FiberRef) -> bool {
        node.read()
            .memoized_props
            .as_ref()
            .map(|p| p.contains_key(STALE_MARKER))
            .unwrap_or(false)
    }

    #[test]
    fn test_install_finds_modules_and_root() {
        let env = ui_env();
        let introspection = install(&env);
        assert!(introspection.modules().is_some());

        let ui = introspection.ui().unwrap();
        let fiber_root = ui.get_fiber_root().unwrap();
        assert!(Arc::ptr_eq(&fiber_root, &env.root_fiber));

        let root = ui.get_root().unwrap();
        assert!(Arc::ptr_eq(&root.fiber_root().unwrap(), &env.root_fiber));
    }

    #[test]
    fn test_replace_component_swaps_unless_opted_out() {
        let env = ui_env();
        let ui = install(&env).ui().unwrap();

        let stock = text_component("Header", "stock");
        let custom = text_component("CustomHeader", "custom");
        ui.replace_component(
            ElementType::Component(stock.clone()),
            Some(ElementType::Component(custom.clone())),
        );

        let element = env
            .elements
            .create_element(ElementType::Component(stock.clone()), Props::new(), vec![]);
        assert_eq!(element.ty, ElementType::Component(custom.clone()));
        assert_eq!(env.elements.render(&element).text_content(), "custom");

        let mut props = Props::new();
        props.insert(ORIGINAL_FLAG.to_string(), json!(true));
        props.insert("id".to_string(), json!("top"));
        let element = env
            .elements
            .create_element(ElementType::Component(stock.clone()), props, vec![]);
        assert_eq!(element.ty, ElementType::Component(stock));
        assert!(!element.props.contains_key(ORIGINAL_FLAG));
        assert_eq!(element.props["id"], "top");
    }

    #[test]
    fn test_falsy_opt_out_flag_passes_through() {
        let env = ui_env();
        let ui = install(&env).ui().unwrap();

        let stock = text_component("Card", "stock");
        let custom = text_component("CustomCard", "custom");
        ui.replace_component(
            ElementType::Component(stock.clone()),
            Some(ElementType::Component(custom.clone())),
        );

        let mut props = Props::new();
        props.insert(ORIGINAL_FLAG.to_string(), json!(false));
        let element = env
            .elements
            .create_element(ElementType::Component(stock), props, vec![]);
        assert_eq!(element.ty, ElementType::Component(custom));
        assert_eq!(element.props[ORIGINAL_FLAG], json!(false));
    }

    #[test]
    fn test_replacement_inside_nested_render() {
        let env = ui_env();
        let ui = install(&env).ui().unwrap();

        let stock = text_component("Badge", "stock");
        let custom = text_component("CustomBadge", "custom");
        let stock_ref = stock.clone();
        let page = component("Page", move |_, _, runtime| {
            let badge = runtime.create_element(ElementType::Component(stock_ref.clone()), Props::new(), vec![]);
            UiNode::Element(runtime.create_element(
                ElementType::intrinsic("main"),
                Props::new(),
                vec![UiNode::Element(badge), UiNode::Text("!".to_string())],
            ))
        });
        ui.replace_component(
            ElementType::Component(stock),
            Some(ElementType::Component(custom)),
        );

        let element = env
            .elements
            .create_element(ElementType::Component(page), Props::new(), vec![]);
        assert_eq!(env.elements.render(&element).text_content(), "custom!");
    }

    #[test]
    fn test_anonymous_replacement_gets_patched_name() {
        let env = ui_env();
        let ui = install(&env).ui().unwrap();

        let anonymous = HostValue::with_native(
            ValueKind::Function,
            ComponentFn(Arc::new(|_: &Props, _: &[UiNode], _: &ElementRuntime| {
                UiNode::Text("anon".to_string())
            })),
        );
        let stock = text_component("Footer", "stock");
        ui.replace_component(
            ElementType::Component(stock),
            Some(ElementType::Component(anonymous.clone())),
        );
        assert_eq!(anonymous.display_name().as_deref(), Some("Patched(Footer)"));
    }

    #[test]
    fn test_map_changes_mark_tree_stale() {
        let env = ui_env();
        let ui = install(&env).ui().unwrap();
        assert!(!is_stale(&env.first));

        ui.replace_component(
            ElementType::intrinsic("button"),
            Some(ElementType::intrinsic("a")),
        );
        assert!(is_stale(&env.first));
        assert!(is_stale(&env.second));
        assert!(env.root_fiber.read().memoized_props.is_none());
        assert_eq!(ui.replacements().len(), 1);

        ui.remove_replacement(&ElementType::intrinsic("button"));
        assert!(ui.replacements().is_empty());

        let element = env
            .elements
            .create_element(ElementType::intrinsic("button"), Props::new(), vec![]);
        assert_eq!(element.ty, ElementType::intrinsic("button"));
    }

    #[test]
    fn test_clear_and_uninstall_restore_entry_point() {
        let env = ui_env();
        let introspection = install(&env);
        let ui = introspection.ui().unwrap();

        ui.replace_component(ElementType::intrinsic("b"), Some(ElementType::intrinsic("strong")));
        ui.clear_replacements();
        assert!(ui.replacements().is_empty());

        ui.replace_component(ElementType::intrinsic("b"), Some(ElementType::intrinsic("strong")));
        introspection.uninstall();
        let element = env
            .elements
            .create_element(ElementType::intrinsic("b"), Props::new(), vec![]);
        assert_eq!(element.ty, ElementType::intrinsic("b"));
    }

    #[test]
    fn test_mark_stale_survives_cycles() {
        let a = fiber("A", Some(Props::new()));
        let b = fiber("B", Some(Props::new()));
        a.write().child = Some(b.clone());
        b.write().sibling = Some(a.clone());

        assert_eq!(mark_stale(&a), 2);
        // 打断循环引用
        b.write().sibling = None;
    }

    #[test]
    fn test_install_without_ui_library_keeps_modules() {
        let bundler = MemoryBundler::new();
        bundler.define("misc", module_object(vec![("x", HostValue::object())]));
        let introspection = Introspection::install(
            Arc::new(bundler),
            Arc::new(MemoryDocument::new()),
            "app-container",
        );
        assert!(introspection.modules().is_some());
        assert!(introspection.ui().is_none());
    }
}
