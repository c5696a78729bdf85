use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::value::ClassDef;

/// Process-wide mapping from remote class names to their wire field lists.
///
/// Built once at startup, then frozen by moving it into an `Arc` shared by
/// every encoder and decoder. Registration is grow-only: adding a new class
/// is always allowed, re-registering an existing one with the same shape is
/// a no-op, and re-registering with a different shape is an error.
///
/// Host types with embedded/anonymous members must be flattened by the
/// caller: `field_names` is exactly the ordered field list the remote class
/// declares on the wire.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, ClassDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the wire shape of a remote class.
    pub fn register(
        &mut self,
        class_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let name = class_name.into();
        let def = ClassDef {
            name: name.clone(),
            field_names: field_names.into_iter().map(Into::into).collect(),
        };
        match self.by_name.get(&name) {
            None => {
                self.by_name.insert(name, def);
                Ok(())
            }
            Some(existing) if *existing == def => Ok(()),
            Some(_) => Err(Error::InvalidValue(format!(
                "class {name:?} already registered with a different field list"
            ))),
        }
    }

    pub fn get(&self, class_name: &str) -> Option<&ClassDef> {
        self.by_name.get(class_name)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.by_name.contains_key(class_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
