use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::tags;
use crate::value::{ClassDef, List, Map, Object, Value};

/// Parses Hessian 2.0 values out of a fully buffered byte slice.
///
/// One decoder is one session: the reference, class-definition and
/// type-name tables live for the lifetime of the instance, so consecutive
/// [`Decoder::decode`] calls resolve back-references across values (a frame
/// body is decoded by one decoder). Not safe for concurrent use.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    registry: Option<Arc<TypeRegistry>>,
    refs: Vec<Value>,
    classes: Vec<ClassDef>,
    type_names: Vec<String>,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            registry: None,
            refs: Vec::new(),
            classes: Vec::new(),
            type_names: Vec::new(),
        }
    }

    /// A decoder that materializes objects of registered classes in the
    /// registry's declared field order.
    pub fn with_registry(buf: &'a [u8], registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new(buf)
        }
    }

    /// Read one complete value, advancing the cursor past it.
    pub fn decode(&mut self) -> Result<Value> {
        self.decode_value(0)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn decode_value(&mut self, depth: usize) -> Result<Value> {
        if depth > tags::MAX_DEPTH {
            return Err(Error::LimitExceeded("value nesting depth"));
        }
        let mut offset = self.pos;
        let mut tag = self.read_u8()?;
        // a value may be preceded by any number of class definitions
        while tag == tags::TAG_CLASS_DEF {
            self.read_class_def()?;
            offset = self.pos;
            tag = self.read_u8()?;
        }
        match tag {
            tags::TAG_NULL => Ok(Value::Null),
            tags::TAG_TRUE => Ok(Value::Bool(true)),
            tags::TAG_FALSE => Ok(Value::Bool(false)),

            tags::INT_DIRECT_MIN..=tags::INT_DIRECT_MAX => Ok(Value::Int(
                i32::from(tag) - i32::from(tags::INT_DIRECT_ZERO),
            )),
            tags::INT_BYTE_MIN..=tags::INT_BYTE_MAX => {
                let b1 = self.read_u8()?;
                Ok(Value::Int(
                    ((i32::from(tag) - i32::from(tags::INT_BYTE_ZERO)) << 8)
                        + i32::from(b1),
                ))
            }
            tags::INT_SHORT_MIN..=tags::INT_SHORT_MAX => {
                let b1 = self.read_u8()?;
                let b2 = self.read_u8()?;
                Ok(Value::Int(
                    ((i32::from(tag) - i32::from(tags::INT_SHORT_ZERO)) << 16)
                        + (i32::from(b1) << 8)
                        + i32::from(b2),
                ))
            }
            tags::TAG_INT => Ok(Value::Int(self.read_i32()?)),

            tags::LONG_DIRECT_MIN..=tags::LONG_DIRECT_MAX => Ok(Value::Long(
                i64::from(tag) - i64::from(tags::LONG_DIRECT_ZERO),
            )),
            tags::LONG_BYTE_MIN..=tags::LONG_BYTE_MAX => {
                let b1 = self.read_u8()?;
                Ok(Value::Long(
                    ((i64::from(tag) - i64::from(tags::LONG_BYTE_ZERO)) << 8)
                        + i64::from(b1),
                ))
            }
            tags::LONG_SHORT_MIN..=tags::LONG_SHORT_MAX => {
                let b1 = self.read_u8()?;
                let b2 = self.read_u8()?;
                Ok(Value::Long(
                    ((i64::from(tag) - i64::from(tags::LONG_SHORT_ZERO)) << 16)
                        + (i64::from(b1) << 8)
                        + i64::from(b2),
                ))
            }
            tags::TAG_LONG_INT => Ok(Value::Long(i64::from(self.read_i32()?))),
            tags::TAG_LONG => Ok(Value::Long(self.read_i64()?)),

            tags::TAG_DOUBLE_ZERO => Ok(Value::Double(0.0)),
            tags::TAG_DOUBLE_ONE => Ok(Value::Double(1.0)),
            tags::TAG_DOUBLE_BYTE => {
                Ok(Value::Double(f64::from(self.read_u8()? as i8)))
            }
            tags::TAG_DOUBLE_SHORT => {
                let b1 = self.read_u8()?;
                let b2 = self.read_u8()?;
                Ok(Value::Double(f64::from(i16::from_be_bytes([b1, b2]))))
            }
            tags::TAG_DOUBLE_MILL => {
                Ok(Value::Double(f64::from(self.read_i32()?) * 0.001))
            }
            tags::TAG_DOUBLE => {
                Ok(Value::Double(f64::from_bits(self.read_u64()?)))
            }

            tags::TAG_DATE_MILLI => Ok(Value::Date(self.read_i64()?)),
            tags::TAG_DATE_MINUTE => {
                Ok(Value::Date(i64::from(self.read_i32()?) * 60_000))
            }

            0x00..=tags::STRING_DIRECT_MAX
            | tags::STRING_MEDIUM_MIN..=tags::STRING_MEDIUM_MAX
            | tags::TAG_STRING_CHUNK
            | tags::TAG_STRING_FINAL => {
                Ok(Value::String(self.read_string(tag)?))
            }

            tags::BINARY_DIRECT_MIN..=tags::BINARY_DIRECT_MAX
            | tags::BINARY_MEDIUM_MIN..=tags::BINARY_MEDIUM_MAX
            | tags::TAG_BINARY_CHUNK
            | tags::TAG_BINARY_FINAL => {
                Ok(Value::Bytes(self.read_binary(tag)?))
            }

            tags::LIST_TYPED_FIXED_MIN..=tags::LIST_TYPED_FIXED_MAX => {
                let len = usize::from(tag - tags::LIST_TYPED_FIXED_MIN);
                self.read_list(depth, true, Some(len))
            }
            tags::LIST_UNTYPED_FIXED_MIN..=tags::LIST_UNTYPED_FIXED_MAX => {
                let len = usize::from(tag - tags::LIST_UNTYPED_FIXED_MIN);
                self.read_list(depth, false, Some(len))
            }
            tags::TAG_LIST_TYPED => self.read_list(depth, true, None),
            tags::TAG_LIST_UNTYPED => self.read_list(depth, false, None),
            tags::TAG_LIST_TYPED_LEN => {
                let type_name = self.read_type()?;
                let len = self.read_length()?;
                self.read_fixed_list(depth, Some(type_name), len)
            }
            tags::TAG_LIST_UNTYPED_LEN => {
                let len = self.read_length()?;
                self.read_fixed_list(depth, None, len)
            }

            tags::TAG_MAP_TYPED => self.read_map(depth, true),
            tags::TAG_MAP_UNTYPED => self.read_map(depth, false),

            tags::OBJECT_DIRECT_MIN..=tags::OBJECT_DIRECT_MAX => {
                let index = usize::from(tag - tags::OBJECT_DIRECT_MIN);
                self.read_object(depth, index)
            }
            tags::TAG_OBJECT => {
                let index = self.read_length()?;
                self.read_object(depth, index)
            }

            tags::TAG_REF => {
                let index = self.read_length()?;
                self.refs
                    .get(index)
                    .cloned()
                    .ok_or(Error::DanglingRef { index })
            }

            _ => Err(Error::UnexpectedTag { tag, offset }),
        }
    }

    fn read_class_def(&mut self) -> Result<()> {
        if self.classes.len() >= tags::MAX_TABLE_ENTRIES {
            return Err(Error::LimitExceeded("class-definition table"));
        }
        let name = self.expect_string()?;
        let count = self.read_length()?;
        if count > tags::MAX_TABLE_ENTRIES {
            return Err(Error::LimitExceeded("class field count"));
        }
        let mut field_names = Vec::with_capacity(count);
        for _ in 0..count {
            field_names.push(self.expect_string()?);
        }
        self.classes.push(ClassDef { name, field_names });
        Ok(())
    }

    fn read_object(&mut self, depth: usize, index: usize) -> Result<Value> {
        let wire_def = self
            .classes
            .get(index)
            .cloned()
            .ok_or(Error::DanglingRef { index })?;
        let registered = self
            .registry
            .as_ref()
            .map(|registry| registry.get(&wire_def.name).cloned());
        match registered {
            // no registry attached: the wire definition is authoritative
            None => self.read_object_fields(depth, wire_def.clone(), &wire_def),
            Some(Some(host_def)) => {
                self.read_object_fields(depth, host_def, &wire_def)
            }
            #[cfg(feature = "restrictive")]
            Some(None) => Err(Error::UnknownClass(wire_def.name)),
            // unknown class: fall back to a field-name keyed map
            #[cfg(not(feature = "restrictive"))]
            Some(None) => {
                let cell = Rc::new(RefCell::new(Map {
                    type_name: Some(wire_def.name.clone()),
                    entries: Vec::with_capacity(wire_def.field_names.len()),
                }));
                self.push_ref(Value::Map(Rc::clone(&cell)))?;
                for field in &wire_def.field_names {
                    let value = self.decode_value(depth + 1)?;
                    cell.borrow_mut()
                        .entries
                        .push((Value::String(field.clone()), value));
                }
                Ok(Value::Map(cell))
            }
        }
    }

    /// Allocate the instance, register it, then fill the fields: the field
    /// count is fixed by the wire definition, the slot each value lands in
    /// by the host definition (matched by name, extra wire fields dropped).
    fn read_object_fields(
        &mut self,
        depth: usize,
        host_def: ClassDef,
        wire_def: &ClassDef,
    ) -> Result<Value> {
        let field_count = host_def.field_names.len();
        let cell = Rc::new(RefCell::new(Object {
            class: host_def,
            fields: vec![Value::Null; field_count],
        }));
        self.push_ref(Value::Object(Rc::clone(&cell)))?;
        for wire_field in &wire_def.field_names {
            let value = self.decode_value(depth + 1)?;
            let slot = cell.borrow().class.field_index(wire_field);
            if let Some(slot) = slot {
                cell.borrow_mut().fields[slot] = value;
            }
        }
        Ok(Value::Object(cell))
    }

    fn read_list(
        &mut self,
        depth: usize,
        typed: bool,
        fixed_len: Option<usize>,
    ) -> Result<Value> {
        let type_name = typed.then(|| self.read_type()).transpose()?;
        match fixed_len {
            Some(len) => self.read_fixed_list(depth, type_name, len),
            None => {
                let cell = Rc::new(RefCell::new(List {
                    type_name,
                    elements: Vec::new(),
                }));
                self.push_ref(Value::List(Rc::clone(&cell)))?;
                loop {
                    match self.peek_u8() {
                        None => return Err(Error::TruncatedInput),
                        Some(tags::TAG_END) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => {
                            let element = self.decode_value(depth + 1)?;
                            cell.borrow_mut().elements.push(element);
                        }
                    }
                }
                Ok(Value::List(cell))
            }
        }
    }

    fn read_fixed_list(
        &mut self,
        depth: usize,
        type_name: Option<String>,
        len: usize,
    ) -> Result<Value> {
        let cell = Rc::new(RefCell::new(List {
            type_name,
            elements: Vec::with_capacity(len.min(tags::CHUNK_MAX)),
        }));
        self.push_ref(Value::List(Rc::clone(&cell)))?;
        for _ in 0..len {
            let element = self.decode_value(depth + 1)?;
            cell.borrow_mut().elements.push(element);
        }
        Ok(Value::List(cell))
    }

    fn read_map(&mut self, depth: usize, typed: bool) -> Result<Value> {
        let type_name = typed.then(|| self.read_type()).transpose()?;
        let cell = Rc::new(RefCell::new(Map {
            type_name,
            entries: Vec::new(),
        }));
        self.push_ref(Value::Map(Rc::clone(&cell)))?;
        loop {
            match self.peek_u8() {
                None => return Err(Error::TruncatedInput),
                Some(tags::TAG_END) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let key = self.decode_value(depth + 1)?;
                    let value = self.decode_value(depth + 1)?;
                    cell.borrow_mut().entries.push((key, value));
                }
            }
        }
        Ok(Value::Map(cell))
    }

    /// The type position of a typed list/map: a string on first occurrence,
    /// an int back-reference into the type-name table afterwards.
    fn read_type(&mut self) -> Result<String> {
        let offset = self.pos;
        match self.peek_u8() {
            None => Err(Error::TruncatedInput),
            Some(
                0x00..=tags::STRING_DIRECT_MAX
                | tags::STRING_MEDIUM_MIN..=tags::STRING_MEDIUM_MAX
                | tags::TAG_STRING_CHUNK
                | tags::TAG_STRING_FINAL,
            ) => {
                let name = self.expect_string()?;
                if self.type_names.len() >= tags::MAX_TABLE_ENTRIES {
                    return Err(Error::LimitExceeded("type-name table"));
                }
                self.type_names.push(name.clone());
                Ok(name)
            }
            Some(
                tags::INT_DIRECT_MIN..=tags::INT_DIRECT_MAX
                | tags::INT_BYTE_MIN..=tags::INT_BYTE_MAX
                | tags::INT_SHORT_MIN..=tags::INT_SHORT_MAX
                | tags::TAG_INT,
            ) => {
                let index = self.read_length()?;
                self.type_names
                    .get(index)
                    .cloned()
                    .ok_or(Error::DanglingRef { index })
            }
            Some(tag) => Err(Error::UnexpectedTag { tag, offset }),
        }
    }

    fn read_string(&mut self, first_tag: u8) -> Result<String> {
        let mut out = String::new();
        let mut tag = first_tag;
        loop {
            let (count, last) = match tag {
                0x00..=tags::STRING_DIRECT_MAX => (usize::from(tag), true),
                tags::STRING_MEDIUM_MIN..=tags::STRING_MEDIUM_MAX => {
                    let b1 = self.read_u8()?;
                    (
                        (usize::from(tag - tags::STRING_MEDIUM_MIN) << 8)
                            + usize::from(b1),
                        true,
                    )
                }
                tags::TAG_STRING_FINAL => {
                    (usize::from(self.read_u16()?), true)
                }
                tags::TAG_STRING_CHUNK => {
                    (usize::from(self.read_u16()?), false)
                }
                tag => {
                    return Err(Error::UnexpectedTag {
                        tag,
                        offset: self.pos - 1,
                    })
                }
            };
            self.read_utf8_chars(count, &mut out)?;
            if last {
                return Ok(out);
            }
            tag = self.read_u8()?;
        }
    }

    /// Consume `count` code points worth of UTF-8 and append them.
    fn read_utf8_chars(&mut self, count: usize, out: &mut String) -> Result<()> {
        let start = self.pos;
        for _ in 0..count {
            let first = self.read_u8()?;
            let width = match first {
                0x00..=0x7f => 1,
                0xc0..=0xdf => 2,
                0xe0..=0xef => 3,
                0xf0..=0xf7 => 4,
                _ => return Err(Error::InvalidUtf8),
            };
            if width > 1 {
                self.read_slice(width - 1)?;
            }
        }
        let raw = &self.buf[start..self.pos];
        let text = core::str::from_utf8(raw).map_err(|_| Error::InvalidUtf8)?;
        out.push_str(text);
        Ok(())
    }

    fn read_binary(&mut self, first_tag: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut tag = first_tag;
        loop {
            let (len, last) = match tag {
                tags::BINARY_DIRECT_MIN..=tags::BINARY_DIRECT_MAX => {
                    (usize::from(tag - tags::BINARY_DIRECT_MIN), true)
                }
                tags::BINARY_MEDIUM_MIN..=tags::BINARY_MEDIUM_MAX => {
                    let b1 = self.read_u8()?;
                    (
                        (usize::from(tag - tags::BINARY_MEDIUM_MIN) << 8)
                            + usize::from(b1),
                        true,
                    )
                }
                tags::TAG_BINARY_FINAL => {
                    (usize::from(self.read_u16()?), true)
                }
                tags::TAG_BINARY_CHUNK => {
                    (usize::from(self.read_u16()?), false)
                }
                tag => {
                    return Err(Error::UnexpectedTag {
                        tag,
                        offset: self.pos - 1,
                    })
                }
            };
            out.extend_from_slice(self.read_slice(len)?);
            if last {
                return Ok(out);
            }
            tag = self.read_u8()?;
        }
    }

    /// A non-negative length or table index carried as an int value.
    fn read_length(&mut self) -> Result<usize> {
        let offset = self.pos;
        match self.decode_value_int()? {
            v if v >= 0 => Ok(v as usize),
            _ => Err(Error::UnexpectedTag {
                tag: self.buf[offset],
                offset,
            }),
        }
    }

    /// Reads one int-typed value (any of the four int forms).
    fn decode_value_int(&mut self) -> Result<i32> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        match tag {
            tags::INT_DIRECT_MIN..=tags::INT_DIRECT_MAX => {
                Ok(i32::from(tag) - i32::from(tags::INT_DIRECT_ZERO))
            }
            tags::INT_BYTE_MIN..=tags::INT_BYTE_MAX => {
                let b1 = self.read_u8()?;
                Ok(((i32::from(tag) - i32::from(tags::INT_BYTE_ZERO)) << 8)
                    + i32::from(b1))
            }
            tags::INT_SHORT_MIN..=tags::INT_SHORT_MAX => {
                let b1 = self.read_u8()?;
                let b2 = self.read_u8()?;
                Ok(
                    ((i32::from(tag) - i32::from(tags::INT_SHORT_ZERO)) << 16)
                        + (i32::from(b1) << 8)
                        + i32::from(b2),
                )
            }
            tags::TAG_INT => self.read_i32(),
            tag => Err(Error::UnexpectedTag { tag, offset }),
        }
    }

    /// Reads one string-typed value (class names, field names).
    fn expect_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let tag = self.read_u8()?;
        match tag {
            0x00..=tags::STRING_DIRECT_MAX
            | tags::STRING_MEDIUM_MIN..=tags::STRING_MEDIUM_MAX
            | tags::TAG_STRING_CHUNK
            | tags::TAG_STRING_FINAL => self.read_string(tag),
            tag => Err(Error::UnexpectedTag { tag, offset }),
        }
    }

    fn push_ref(&mut self, value: Value) -> Result<()> {
        if self.refs.len() >= tags::MAX_TABLE_ENTRIES {
            return Err(Error::LimitExceeded("reference table"));
        }
        self.refs.push(value);
        Ok(())
    }

    fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or(Error::TruncatedInput)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::TruncatedInput)?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let raw = self.read_slice(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let raw = self.read_slice(4)?;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let raw = self.read_slice(8)?;
        Ok(u64::from_be_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]))
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.read_u64().map(|v| v as i64)
    }
}
