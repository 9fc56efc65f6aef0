//! Static fields and arrays.

use super::error::{ExecError, ExecResult};
use std::collections::HashMap;

/// Handle of an array on the [`Heap`]. Equal handles mean the same array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(usize);

/// Element kind of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Boolean,
    Byte,
    Int,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i32),
    /// Occupies two slots
    Long(i64),
    Str(String),
    Array(ArrayRef),
}

impl Value {
    /// Stack or local slots the value occupies.
    #[must_use]
    pub const fn slots(&self) -> usize {
        match self {
            Self::Long(_) => 2,
            _ => 1,
        }
    }

    /// Default value of a field with the given descriptor.
    #[must_use]
    pub fn default_for(desc: &str) -> Self {
        match desc.as_bytes().first() {
            Some(b'J') => Self::Long(0),
            Some(b'I' | b'Z' | b'B' | b'S' | b'C') => Self::Int(0),
            _ => Self::Null,
        }
    }
}

#[derive(Debug, Clone)]
struct Array {
    kind: ArrayKind,
    data: Vec<i32>,
}

/// Simulated heap shared by every thread of a machine.
#[derive(Debug, Default)]
pub struct Heap {
    statics: HashMap<(String, String), Value>,
    arrays: Vec<Array>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed array.
    pub fn alloc(&mut self, kind: ArrayKind, length: i32) -> ExecResult<ArrayRef> {
        let len = usize::try_from(length).map_err(|_| ExecError::NegativeArraySize { size: length })?;
        self.arrays.push(Array {
            kind,
            data: vec![0; len],
        });
        Ok(ArrayRef(self.arrays.len() - 1))
    }

    /// Number of arrays allocated so far.
    #[must_use]
    pub fn array_count(&self) -> usize {
        self.arrays.len()
    }

    fn array(&self, array: ArrayRef) -> &Array {
        // handles are only minted by alloc
        &self.arrays[array.0]
    }

    #[must_use]
    pub fn kind(&self, array: ArrayRef) -> ArrayKind {
        self.array(array).kind
    }

    #[must_use]
    pub fn length(&self, array: ArrayRef) -> usize {
        self.array(array).data.len()
    }

    pub fn load(&self, array: ArrayRef, index: i32) -> ExecResult<i32> {
        let data = &self.array(array).data;
        usize::try_from(index)
            .ok()
            .and_then(|i| data.get(i).copied())
            .ok_or(ExecError::ArrayIndexOutOfBounds {
                index,
                length: data.len(),
            })
    }

    pub fn store(&mut self, array: ArrayRef, index: i32, value: i32) -> ExecResult<()> {
        let target = &mut self.arrays[array.0];
        let value = match target.kind {
            ArrayKind::Boolean => value & 1,
            ArrayKind::Byte => i32::from(i8::from_le_bytes([value.to_le_bytes()[0]])),
            ArrayKind::Int => value,
        };
        let length = target.data.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| target.data.get_mut(i))
            .ok_or(ExecError::ArrayIndexOutOfBounds { index, length })?;
        *slot = value;
        Ok(())
    }

    /// Contents of a boolean array.
    #[must_use]
    pub fn flags(&self, array: ArrayRef) -> Vec<bool> {
        self.array(array).data.iter().map(|&v| v != 0).collect()
    }

    /// Current value of a static field, the type default if never written.
    #[must_use]
    pub fn get_static(&self, owner: &str, name: &str, desc: &str) -> Value {
        self.statics
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_else(|| Value::default_for(desc))
    }

    pub fn put_static(&mut self, owner: &str, name: &str, value: Value) {
        self.statics
            .insert((owner.to_string(), name.to_string()), value);
    }
}
