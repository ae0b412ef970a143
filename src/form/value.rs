use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

/// Field name to value store shared by every scope of a form.
///
/// Built on serde_json's `preserve_order` map, so iteration follows insertion order.
pub type ValueMap = Map<String, Value>;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Cow<'static, str>);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn owned(value: impl Into<String>) -> Self {
        Self(Cow::Owned(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for FieldKey {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::owned(value)
    }
}

/// Address of a value inside a scope: a named entry of a map or a position of a sequence.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Slot {
    Field(FieldKey),
    Index(usize),
}

impl Slot {
    /// Key used when the slot addresses a map entry.
    pub fn map_key(&self) -> String {
        match self {
            Slot::Field(key) => key.as_str().to_string(),
            Slot::Index(index) => index.to_string(),
        }
    }

    /// Position used when the slot addresses a sequence element.
    pub fn index(&self) -> Option<usize> {
        match self {
            Slot::Field(key) => key.as_str().parse().ok(),
            Slot::Index(index) => Some(*index),
        }
    }

    /// Reads the slot out of a map or sequence value.
    pub fn read(&self, container: &Value) -> Option<Value> {
        match container {
            Value::Object(map) => map.get(&self.map_key()).cloned(),
            Value::Array(items) => self.index().and_then(|index| items.get(index).cloned()),
            _ => None,
        }
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Field(key) => Display::fmt(key, f),
            Slot::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<FieldKey> for Slot {
    fn from(value: FieldKey) -> Self {
        Slot::Field(value)
    }
}

impl From<&'static str> for Slot {
    fn from(value: &'static str) -> Self {
        Slot::Field(FieldKey::new(value))
    }
}

impl From<String> for Slot {
    fn from(value: String) -> Self {
        Slot::Field(FieldKey::owned(value))
    }
}

impl From<usize> for Slot {
    fn from(value: usize) -> Self {
        Slot::Index(value)
    }
}

/// Shallow merge, later entries replace earlier ones.
pub fn merge_into(target: &mut ValueMap, partial: ValueMap) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

/// Map view of a value; anything that is not a map degrades to empty.
pub fn as_value_map(value: Option<&Value>) -> ValueMap {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => ValueMap::new(),
    }
}

/// Sequence view of a value; anything that is not a sequence degrades to empty.
pub fn as_sequence(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Absent, `null` and `""` count as empty.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(_) => false,
    }
}
