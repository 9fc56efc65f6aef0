//! Stack map frames.
//!
//! A frame describes the types of the local variables and of the operand
//! stack at an instruction. The verifier needs one at every branch target and
//! after every unconditional transfer. Frames here are always expanded: every
//! frame lists all locals and the full stack, never a delta to the previous
//! frame.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verification type of a single local or stack entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationType {
    /// Unusable or unset slot
    Top,
    /// int, short, char, byte or boolean
    Integer,
    Float,
    /// Occupies two slots
    Long,
    /// Occupies two slots
    Double,
    Null,
    UninitializedThis,
    /// Reference to a class (internal name) or array (descriptor)
    Object(String),
}

impl VerificationType {
    /// Verification type of a reference to the given internal name or
    /// array descriptor.
    #[must_use]
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// Number of slots the type occupies.
    #[must_use]
    pub const fn slots(&self) -> usize {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Reference type (including null).
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Null | Self::Object(_) | Self::UninitializedThis)
    }

    /// Whether a value of type `self` may be stored where `target` is expected.
    #[must_use]
    pub fn is_assignable_to(&self, target: &Self) -> bool {
        match (self, target) {
            (_, Self::Top) => true,
            (Self::Null, Self::Object(_)) => true,
            (Self::Object(_), Self::Object(name)) if name == "java/lang/Object" => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Integer => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Long => f.write_str("long"),
            Self::Double => f.write_str("double"),
            Self::Null => f.write_str("null"),
            Self::UninitializedThis => f.write_str("uninitializedThis"),
            Self::Object(name) => f.write_str(name),
        }
    }
}

/// An expanded stack map frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// One entry per local variable; two-slot types appear once
    pub locals: Vec<VerificationType>,
    /// Operand stack, bottom first
    pub stack: Vec<VerificationType>,
}

impl Frame {
    /// Create a frame from its locals and stack.
    #[must_use]
    pub fn new(locals: Vec<VerificationType>, stack: Vec<VerificationType>) -> Self {
        Self { locals, stack }
    }

    /// Number of local variable slots the frame covers.
    #[must_use]
    pub fn local_slots(&self) -> usize {
        self.locals.iter().map(VerificationType::slots).sum()
    }

    /// Operand stack depth in slots.
    #[must_use]
    pub fn stack_slots(&self) -> usize {
        self.stack.iter().map(VerificationType::slots).sum()
    }

    /// Locals laid out per slot; the second slot of a two-slot type is `Top`.
    #[must_use]
    pub fn locals_by_slot(&self) -> Vec<VerificationType> {
        let mut slots = Vec::with_capacity(self.local_slots());
        for local in &self.locals {
            slots.push(local.clone());
            if local.slots() == 2 {
                slots.push(VerificationType::Top);
            }
        }
        slots
    }

    /// Insert `ty` so that it starts at local slot `slot`, padding with `Top`
    /// when the frame covers fewer slots.
    ///
    /// Returns false when `slot` falls inside a two-slot local.
    pub fn insert_local(&mut self, slot: usize, ty: VerificationType) -> bool {
        let mut covered = 0;
        let mut position = 0;
        while covered < slot && position < self.locals.len() {
            covered += self.locals[position].slots();
            position += 1;
        }
        if covered > slot {
            return false;
        }
        while covered < slot {
            self.locals.push(VerificationType::Top);
            covered += 1;
            position += 1;
        }
        self.locals.insert(position, ty);
        true
    }
}
