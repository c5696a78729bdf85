use std::cell::RefCell;
use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

pub type ListRef = Rc<RefCell<List>>;
pub type MapRef = Rc<RefCell<Map>>;
pub type ObjectRef = Rc<RefCell<Object>>;

/// One Hessian 2.0 value.
///
/// Composites (lists, maps, objects) live behind shared `Rc<RefCell<_>>`
/// handles so a decoded graph can contain the same cell more than once, or
/// contain itself. Cloning a `Value` clones the handle, never the cell.
///
/// `PartialEq` is structural and recurses through composites; comparing a
/// cyclic graph with it will not terminate. Identity questions are answered
/// with [`Rc::ptr_eq`] on the handles instead.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Milliseconds since the Unix epoch, UTC.
    Date(i64),
    String(String),
    Bytes(Vec<u8>),
    List(ListRef),
    Map(MapRef),
    Object(ObjectRef),
}

/// An ordered sequence, optionally carrying a remote type name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    pub type_name: Option<String>,
    pub elements: Vec<Value>,
}

/// Key-value associations in wire order. Keys may be any value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    pub type_name: Option<String>,
    pub entries: Vec<(Value, Value)>,
}

/// An instance of a named class; `fields` follows `class.field_names` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: ClassDef,
    pub fields: Vec<Value>,
}

/// A named, ordered field-list descriptor. Carried on the wire the first
/// time a class is used and indexed thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDef {
    pub name: String,
    pub field_names: Vec<String>,
}

impl ClassDef {
    pub fn new(
        name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            field_names: field_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }
}

impl Object {
    /// Field value by name, per the class declaration order.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.class
            .field_index(name)
            .and_then(|idx| self.fields.get(idx))
    }
}

impl Value {
    pub fn list(elements: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(List {
            type_name: None,
            elements,
        })))
    }

    pub fn typed_list(type_name: impl Into<String>, elements: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(List {
            type_name: Some(type_name.into()),
            elements,
        })))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(Map {
            type_name: None,
            entries,
        })))
    }

    pub fn typed_map(type_name: impl Into<String>, entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(Map {
            type_name: Some(type_name.into()),
            entries,
        })))
    }

    pub fn object(class: ClassDef, fields: Vec<Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object { class, fields })))
    }

    /// Kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Date(_) => "date",
            Value::String(_) => "string",
            Value::Bytes(_) => "binary",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn as_list(&self) -> Option<ListRef> {
        match self {
            Value::List(cell) => Some(Rc::clone(cell)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapRef> {
        match self {
            Value::Map(cell) => Some(Rc::clone(cell)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(cell) => Some(Rc::clone(cell)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            // bit-exact, so NaN payloads and -0.0 compare faithfully
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Map(a), Value::Map(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Long(v) => serializer.serialize_i64(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Date(ms) => serializer.serialize_i64(*ms),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(cell) => {
                let list = cell.borrow();
                let mut seq = serializer.serialize_seq(Some(list.elements.len()))?;
                for element in &list.elements {
                    seq.serialize_element(element)?;
                }
                seq.end()
            }
            Value::Map(cell) => {
                let map = cell.borrow();
                let mut ser = serializer.serialize_map(Some(map.entries.len()))?;
                for (key, value) in &map.entries {
                    ser.serialize_entry(key, value)?;
                }
                ser.end()
            }
            Value::Object(cell) => {
                let object = cell.borrow();
                let mut ser = serializer.serialize_map(Some(2))?;
                ser.serialize_entry("class", &object.class.name)?;
                ser.serialize_entry("fields", &ObjectFields(&object))?;
                ser.end()
            }
        }
    }
}

struct ObjectFields<'a>(&'a Object);

impl Serialize for ObjectFields<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_map(Some(self.0.fields.len()))?;
        for (name, value) in self.0.class.field_names.iter().zip(&self.0.fields) {
            ser.serialize_entry(name, value)?;
        }
        ser.end()
    }
}
