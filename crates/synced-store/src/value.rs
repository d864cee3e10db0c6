//! Values exchanged with the engine.

use indexmap::IndexMap;
use serde_json::Value as Json;
use synced_doc::Primitive;

use crate::store::StoreId;

/// A value read from or written into the synced store.
///
/// Values handed to transforms, drafts and filters are the full current
/// value, with every container the store owns wrapped in `Tracked`. The
/// accessors look through the wrapper, so a draft is read and edited like a
/// plain value; keeping the wrapper in place keeps the identity of the
/// container (and the document node behind it) while its content changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Primitive(Primitive),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    Tracked { id: StoreId, content: Box<Value> },
}

impl Value {
    pub fn null() -> Self {
        Value::Primitive(Primitive::Null)
    }

    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence(items.into_iter().collect())
    }

    pub fn mapping<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn tracked(id: StoreId, content: Value) -> Self {
        Value::Tracked {
            id,
            content: Box::new(content),
        }
    }

    /// Convert plain JSON. Never produces `Tracked`.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Array(items) => Value::Sequence(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
            scalar => Value::Primitive(Primitive::from_json(scalar).unwrap_or(Primitive::Null)),
        }
    }

    /// Plain JSON view. `Tracked` serialises as its content.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Primitive(p) => p.to_json(),
            Value::Sequence(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Mapping(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Tracked { content, .. } => content.to_json(),
        }
    }

    /// The value with any `Tracked` wrappers peeled off.
    pub fn untracked(&self) -> &Value {
        match self {
            Value::Tracked { content, .. } => content.untracked(),
            other => other,
        }
    }

    pub fn untracked_mut(&mut self) -> &mut Value {
        match self {
            Value::Tracked { content, .. } => content.untracked_mut(),
            other => other,
        }
    }

    /// Store container this value is the content of, if any.
    pub fn tracked_id(&self) -> Option<StoreId> {
        match self {
            Value::Tracked { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.untracked(), Value::Sequence(_) | Value::Mapping(_))
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self.untracked() {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive().and_then(Primitive::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_primitive().and_then(Primitive::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_primitive().and_then(Primitive::as_bool)
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self.untracked() {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self.untracked_mut() {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self.untracked() {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self.untracked_mut() {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Member `key` of a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_mapping_mut().and_then(|map| map.get_mut(key))
    }

    /// Element `index` of a sequence.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.as_sequence().and_then(|items| items.get(index))
    }

    /// Whether a `Tracked` reference occurs anywhere in this value.
    pub fn contains_tracked(&self) -> bool {
        match self {
            Value::Primitive(_) => false,
            Value::Tracked { .. } => true,
            Value::Sequence(items) => items.iter().any(Value::contains_tracked),
            Value::Mapping(map) => map.values().any(Value::contains_tracked),
        }
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        Value::Primitive(p)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(&json)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Mapping(map)
    }
}

macro_rules! primitive_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Primitive(Primitive::from(v))
            }
        })*
    };
}

primitive_from!(bool, i32, i64, u64, f64, &str, String);
