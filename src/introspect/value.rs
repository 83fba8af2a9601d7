//! 宿主值模型
//!
//! 模块解析器和 UI 树补丁器面对的是宿主运行时的对象图。
//! `HostValue` 是这类对象的最小表示：种类、显示名、自有属性和可选的原生载荷。

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub type HostRef = Arc<HostValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Function,
    Primitive,
    Nullish,
}

pub struct HostValue {
    kind: ValueKind,
    display_name: RwLock<Option<String>>,
    props: RwLock<IndexMap<String, HostRef>>,
    primitive: Option<Value>,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl HostValue {
    fn build(kind: ValueKind) -> Self {
        Self {
            kind,
            display_name: RwLock::new(None),
            props: RwLock::new(IndexMap::new()),
            primitive: None,
            native: None,
        }
    }

    pub fn object() -> HostRef {
        Arc::new(Self::build(ValueKind::Object))
    }

    pub fn function(name: Option<&str>) -> HostRef {
        let value = Self::build(ValueKind::Function);
        *value.display_name.write() = name.map(str::to_string);
        Arc::new(value)
    }

    pub fn primitive(value: Value) -> HostRef {
        let kind = if value.is_null() {
            ValueKind::Nullish
        } else {
            ValueKind::Primitive
        };
        Arc::new(Self {
            primitive: Some(value),
            ..Self::build(kind)
        })
    }

    pub fn nullish() -> HostRef {
        Arc::new(Self::build(ValueKind::Nullish))
    }

    /// 带原生载荷的对象或函数
    pub fn with_native<T: Any + Send + Sync>(kind: ValueKind, payload: T) -> HostRef {
        Self::with_native_arc(kind, Arc::new(payload))
    }

    pub fn with_native_arc(kind: ValueKind, payload: Arc<dyn Any + Send + Sync>) -> HostRef {
        Arc::new(Self {
            native: Some(payload),
            ..Self::build(kind)
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_function(&self) -> bool {
        self.kind == ValueKind::Function
    }

    /// 按宿主语言的真值规则判断
    pub fn is_truthy(&self) -> bool {
        match self.kind {
            ValueKind::Object | ValueKind::Function => true,
            ValueKind::Nullish => false,
            ValueKind::Primitive => match &self.primitive {
                Some(Value::Bool(b)) => *b,
                Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            },
        }
    }

    pub fn as_primitive(&self) -> Option<&Value> {
        self.primitive.as_ref()
    }

    pub fn display_name(&self) -> Option<String> {
        self.display_name.read().clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        *self.display_name.write() = Some(name.into());
    }

    pub fn get(&self, key: &str) -> Option<HostRef> {
        self.props.read().get(key).cloned()
    }

    /// 属性存在且不是 undefined
    pub fn has(&self, key: &str) -> bool {
        self.props
            .read()
            .get(key)
            .map(|v| v.kind != ValueKind::Nullish || v.primitive.is_some())
            .unwrap_or(false)
    }

    pub fn set(&self, key: impl Into<String>, value: HostRef) {
        self.props.write().insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.read().keys().cloned().collect()
    }

    /// 自有属性快照
    pub fn entries(&self) -> Vec<(String, HostRef)> {
        self.props
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.native.as_ref()?.downcast_ref::<T>()
    }

    pub fn native_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.native.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostValue")
            .field("kind", &self.kind)
            .field("display_name", &*self.display_name.read())
            .field("keys", &self.keys())
            .field("has_native", &self.native.is_some())
            .finish()
    }
}

/// 按引用判断是否为同一个宿主值
pub fn same_value(a: &HostRef, b: &HostRef) -> bool {
    Arc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(HostValue::object().is_truthy());
        assert!(!HostValue::nullish().is_truthy());
        assert!(!HostValue::primitive(json!(0)).is_truthy());
        assert!(!HostValue::primitive(json!("")).is_truthy());
        assert!(HostValue::primitive(json!("x")).is_truthy());
        assert!(!HostValue::primitive(Value::Null).is_truthy());
    }

    #[test]
    fn test_has_ignores_undefined() {
        let obj = HostValue::object();
        obj.set("present", HostValue::function(None));
        obj.set("missing", HostValue::nullish());
        obj.set("null", HostValue::primitive(Value::Null));
        assert!(obj.has("present"));
        assert!(!obj.has("missing"));
        assert!(obj.has("null"));
        assert!(!obj.has("absent"));
    }

    #[test]
    fn test_native_payload_downcast() {
        let value = HostValue::with_native(ValueKind::Object, 42u32);
        assert_eq!(value.downcast::<u32>(), Some(&42));
        assert!(value.downcast::<String>().is_none());
        assert_eq!(*value.native_arc::<u32>().unwrap(), 42);
    }
}
