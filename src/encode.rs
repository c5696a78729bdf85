use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::tags;
use crate::value::{ListRef, MapRef, ObjectRef, Value};

/// Serializes host values into a growable Hessian 2.0 byte buffer.
///
/// One encoder is one session: the reference, class-definition and
/// type-name tables live for the lifetime of the instance, so values encoded
/// through consecutive [`Encoder::encode`] calls may share back-references.
/// Not safe for concurrent use; independent instances are fully independent.
pub struct Encoder {
    buffer: Vec<u8>,
    registry: Option<Arc<TypeRegistry>>,
    /// `Rc` cell address of every composite already emitted, by table index.
    refs: HashMap<usize, usize>,
    classes: HashMap<String, ClassEntry>,
    types: HashMap<String, usize>,
}

struct ClassEntry {
    index: usize,
    field_names: Vec<String>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            registry: None,
            refs: HashMap::new(),
            classes: HashMap::new(),
            types: HashMap::new(),
        }
    }

    /// An encoder that rejects objects whose class is not registered.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new()
        }
    }

    /// Append the encoding of `value` to the internal buffer.
    pub fn encode(&mut self, value: &Value) -> Result<()> {
        self.encode_value(value, 0)
    }

    /// The bytes accumulated so far.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn encode_value(&mut self, value: &Value, depth: usize) -> Result<()> {
        if depth > tags::MAX_DEPTH {
            return Err(Error::LimitExceeded("value nesting depth"));
        }
        match value {
            Value::Null => self.buffer.push(tags::TAG_NULL),
            Value::Bool(true) => self.buffer.push(tags::TAG_TRUE),
            Value::Bool(false) => self.buffer.push(tags::TAG_FALSE),
            Value::Int(v) => self.write_int(*v),
            Value::Long(v) => self.write_long(*v),
            Value::Double(v) => self.write_double(*v),
            Value::Date(ms) => self.write_date(*ms),
            Value::String(s) => self.write_string(s),
            Value::Bytes(b) => self.write_binary(b),
            Value::List(cell) => self.encode_list(cell, depth)?,
            Value::Map(cell) => self.encode_map(cell, depth)?,
            Value::Object(cell) => self.encode_object(cell, depth)?,
        }
        Ok(())
    }

    /// Shortest compact int form covering `v`.
    fn write_int(&mut self, v: i32) {
        match v {
            -16..=47 => self.buffer.push((v + i32::from(tags::INT_DIRECT_ZERO)) as u8),
            -2048..=2047 => {
                self.buffer
                    .push((i32::from(tags::INT_BYTE_ZERO) + (v >> 8)) as u8);
                self.buffer.push(v as u8);
            }
            -262_144..=262_143 => {
                self.buffer
                    .push((i32::from(tags::INT_SHORT_ZERO) + (v >> 16)) as u8);
                self.buffer.push((v >> 8) as u8);
                self.buffer.push(v as u8);
            }
            _ => {
                self.buffer.push(tags::TAG_INT);
                self.buffer.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    fn write_long(&mut self, v: i64) {
        match v {
            -8..=15 => self.buffer.push((v + i64::from(tags::LONG_DIRECT_ZERO)) as u8),
            -2048..=2047 => {
                self.buffer
                    .push((i64::from(tags::LONG_BYTE_ZERO) + (v >> 8)) as u8);
                self.buffer.push(v as u8);
            }
            -262_144..=262_143 => {
                self.buffer
                    .push((i64::from(tags::LONG_SHORT_ZERO) + (v >> 16)) as u8);
                self.buffer.push((v >> 8) as u8);
                self.buffer.push(v as u8);
            }
            _ => {
                if let Ok(v) = i32::try_from(v) {
                    self.buffer.push(tags::TAG_LONG_INT);
                    self.buffer.extend_from_slice(&v.to_be_bytes());
                } else {
                    self.buffer.push(tags::TAG_LONG);
                    self.buffer.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
    }

    /// Compact forms are used only when re-decoding reproduces the exact bit
    /// pattern, so -0.0 and NaN payloads round-trip through the full form.
    fn write_double(&mut self, v: f64) {
        let bits = v.to_bits();
        if bits == 0.0f64.to_bits() {
            self.buffer.push(tags::TAG_DOUBLE_ZERO);
        } else if bits == 1.0f64.to_bits() {
            self.buffer.push(tags::TAG_DOUBLE_ONE);
        } else if let Some(b) = double_as_byte(v) {
            self.buffer.push(tags::TAG_DOUBLE_BYTE);
            self.buffer.push(b as u8);
        } else if let Some(s) = double_as_short(v) {
            self.buffer.push(tags::TAG_DOUBLE_SHORT);
            self.buffer.extend_from_slice(&s.to_be_bytes());
        } else if let Some(m) = double_as_milli(v) {
            self.buffer.push(tags::TAG_DOUBLE_MILL);
            self.buffer.extend_from_slice(&m.to_be_bytes());
        } else {
            self.buffer.push(tags::TAG_DOUBLE);
            self.buffer.extend_from_slice(&bits.to_be_bytes());
        }
    }

    fn write_date(&mut self, ms: i64) {
        if ms % 60_000 == 0 {
            if let Ok(minutes) = i32::try_from(ms / 60_000) {
                self.buffer.push(tags::TAG_DATE_MINUTE);
                self.buffer.extend_from_slice(&minutes.to_be_bytes());
                return;
            }
        }
        self.buffer.push(tags::TAG_DATE_MILLI);
        self.buffer.extend_from_slice(&ms.to_be_bytes());
    }

    /// Strings longer than [`tags::CHUNK_MAX`] code points are split into
    /// non-final chunks of exactly that many code points; the remainder
    /// (possibly zero-length) takes the shortest final form.
    fn write_string(&mut self, s: &str) {
        let mut count = s.chars().count();
        let mut rest = s;
        while count > tags::CHUNK_MAX {
            let (chunk, tail) = split_at_code_points(rest, tags::CHUNK_MAX);
            self.buffer.push(tags::TAG_STRING_CHUNK);
            self.buffer
                .extend_from_slice(&(tags::CHUNK_MAX as u16).to_be_bytes());
            self.buffer.extend_from_slice(chunk.as_bytes());
            rest = tail;
            count -= tags::CHUNK_MAX;
        }
        self.write_string_final(rest, count);
    }

    fn write_string_final(&mut self, s: &str, count: usize) {
        if count <= usize::from(tags::STRING_DIRECT_MAX) {
            self.buffer.push(count as u8);
        } else if count <= 1023 {
            self.buffer
                .push(tags::STRING_MEDIUM_MIN + (count >> 8) as u8);
            self.buffer.push(count as u8);
        } else {
            self.buffer.push(tags::TAG_STRING_FINAL);
            self.buffer.extend_from_slice(&(count as u16).to_be_bytes());
        }
        self.buffer.extend_from_slice(s.as_bytes());
    }

    fn write_binary(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while rest.len() > tags::CHUNK_MAX {
            let (chunk, tail) = rest.split_at(tags::CHUNK_MAX);
            self.buffer.push(tags::TAG_BINARY_CHUNK);
            self.buffer
                .extend_from_slice(&(tags::CHUNK_MAX as u16).to_be_bytes());
            self.buffer.extend_from_slice(chunk);
            rest = tail;
        }
        let len = rest.len();
        if len <= 15 {
            self.buffer.push(tags::BINARY_DIRECT_MIN + len as u8);
        } else if len <= 1023 {
            self.buffer.push(tags::BINARY_MEDIUM_MIN + (len >> 8) as u8);
            self.buffer.push(len as u8);
        } else {
            self.buffer.push(tags::TAG_BINARY_FINAL);
            self.buffer.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self.buffer.extend_from_slice(rest);
    }

    fn encode_list(&mut self, cell: &ListRef, depth: usize) -> Result<()> {
        if self.write_back_reference(Rc::as_ptr(cell) as usize)? {
            return Ok(());
        }
        let list = cell.borrow();
        let len = list.elements.len();
        let fixed = len <= 7;
        match (&list.type_name, fixed) {
            (Some(name), true) => {
                self.buffer.push(tags::LIST_TYPED_FIXED_MIN + len as u8);
                self.write_type(name)?;
            }
            (None, true) => {
                self.buffer.push(tags::LIST_UNTYPED_FIXED_MIN + len as u8)
            }
            (Some(name), false) => {
                self.buffer.push(tags::TAG_LIST_TYPED);
                self.write_type(name)?;
            }
            (None, false) => self.buffer.push(tags::TAG_LIST_UNTYPED),
        }
        for element in &list.elements {
            self.encode_value(element, depth + 1)?;
        }
        if !fixed {
            self.buffer.push(tags::TAG_END);
        }
        Ok(())
    }

    fn encode_map(&mut self, cell: &MapRef, depth: usize) -> Result<()> {
        if self.write_back_reference(Rc::as_ptr(cell) as usize)? {
            return Ok(());
        }
        let map = cell.borrow();
        match &map.type_name {
            Some(name) => {
                self.buffer.push(tags::TAG_MAP_TYPED);
                self.write_type(name)?;
            }
            None => self.buffer.push(tags::TAG_MAP_UNTYPED),
        }
        for (key, value) in &map.entries {
            self.encode_value(key, depth + 1)?;
            self.encode_value(value, depth + 1)?;
        }
        self.buffer.push(tags::TAG_END);
        Ok(())
    }

    fn encode_object(&mut self, cell: &ObjectRef, depth: usize) -> Result<()> {
        if self.write_back_reference(Rc::as_ptr(cell) as usize)? {
            return Ok(());
        }
        let object = cell.borrow();
        if object.fields.len() != object.class.field_names.len() {
            return Err(Error::InvalidValue(format!(
                "object of class {:?} carries {} values for {} declared fields",
                object.class.name,
                object.fields.len(),
                object.class.field_names.len(),
            )));
        }
        if let Some(registry) = &self.registry {
            match registry.get(&object.class.name) {
                None => {
                    return Err(Error::UnsupportedType(format!(
                        "class {:?} is not registered",
                        object.class.name
                    )))
                }
                Some(def) if def.field_names != object.class.field_names => {
                    return Err(Error::InvalidValue(format!(
                        "object of class {:?} disagrees with the registered field list",
                        object.class.name
                    )))
                }
                Some(_) => {}
            }
        }
        let index = if let Some(entry) = self.classes.get(&object.class.name) {
            if entry.field_names != object.class.field_names {
                return Err(Error::InvalidValue(format!(
                    "conflicting definitions for class {:?} in one session",
                    object.class.name
                )));
            }
            entry.index
        } else {
            if self.classes.len() >= tags::MAX_TABLE_ENTRIES {
                return Err(Error::LimitExceeded("class-definition table"));
            }
            let index = self.classes.len();
            self.buffer.push(tags::TAG_CLASS_DEF);
            self.write_string(&object.class.name);
            self.write_int(object.class.field_names.len() as i32);
            for field in &object.class.field_names {
                self.write_string(field);
            }
            self.classes.insert(
                object.class.name.clone(),
                ClassEntry {
                    index,
                    field_names: object.class.field_names.clone(),
                },
            );
            index
        };
        if index <= usize::from(tags::OBJECT_DIRECT_MAX - tags::OBJECT_DIRECT_MIN) {
            self.buffer.push(tags::OBJECT_DIRECT_MIN + index as u8);
        } else {
            self.buffer.push(tags::TAG_OBJECT);
            self.write_int(index as i32);
        }
        for field in &object.fields {
            self.encode_value(field, depth + 1)?;
        }
        Ok(())
    }

    /// Registers `ptr` in the reference table, emitting `Q` + index and
    /// returning true when the cell was already emitted. The registration
    /// happens before any child is walked, so cyclic graphs terminate.
    fn write_back_reference(&mut self, ptr: usize) -> Result<bool> {
        if let Some(&index) = self.refs.get(&ptr) {
            self.buffer.push(tags::TAG_REF);
            self.write_int(index as i32);
            return Ok(true);
        }
        if self.refs.len() >= tags::MAX_TABLE_ENTRIES {
            return Err(Error::LimitExceeded("reference table"));
        }
        let index = self.refs.len();
        self.refs.insert(ptr, index);
        Ok(false)
    }

    /// A list/map type name: written as a string on first use, as the
    /// type-name table index afterwards.
    fn write_type(&mut self, name: &str) -> Result<()> {
        if let Some(&index) = self.types.get(name) {
            self.write_int(index as i32);
            return Ok(());
        }
        if self.types.len() >= tags::MAX_TABLE_ENTRIES {
            return Err(Error::LimitExceeded("type-name table"));
        }
        self.types.insert(name.to_owned(), self.types.len());
        self.write_string(name);
        Ok(())
    }
}

fn double_as_byte(v: f64) -> Option<i8> {
    if !v.is_finite() {
        return None;
    }
    let n = v as i64;
    ((-128..=127).contains(&n) && (n as f64).to_bits() == v.to_bits())
        .then(|| n as i8)
}

fn double_as_short(v: f64) -> Option<i16> {
    if !v.is_finite() {
        return None;
    }
    let n = v as i64;
    ((-32768..=32767).contains(&n) && (n as f64).to_bits() == v.to_bits())
        .then(|| n as i16)
}

/// The 0.001-scaled form, valid only when the decoder's `raw * 0.001`
/// reproduces the exact bits.
fn double_as_milli(v: f64) -> Option<i32> {
    if !v.is_finite() {
        return None;
    }
    let n = (v * 1000.0).round() as i64;
    let n = i32::try_from(n).ok()?;
    ((f64::from(n) * 0.001).to_bits() == v.to_bits()).then_some(n)
}

fn split_at_code_points(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    }
}
