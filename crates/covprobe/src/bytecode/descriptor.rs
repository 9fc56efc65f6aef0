//! Field and method descriptors.

use super::frame::VerificationType;
use crate::error::{InstrError, Result};
use std::fmt;

/// A parsed field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    /// Class reference by internal name
    Object(String),
    /// Array of the component type
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor such as `[Z` or `Ljava/lang/String;`.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (ty, rest) = parse_field(descriptor, descriptor)?;
        if rest.is_empty() {
            Ok(ty)
        } else {
            Err(invalid(descriptor))
        }
    }

    /// Number of local or stack slots a value of this type occupies.
    #[must_use]
    pub const fn slots(&self) -> usize {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// Verification type of a value of this type.
    #[must_use]
    pub fn verification_type(&self) -> VerificationType {
        match self {
            Self::Byte | Self::Char | Self::Int | Self::Short | Self::Boolean => {
                VerificationType::Integer
            }
            Self::Float => VerificationType::Float,
            Self::Long => VerificationType::Long,
            Self::Double => VerificationType::Double,
            Self::Object(name) => VerificationType::Object(name.clone()),
            Self::Array(_) => VerificationType::Object(self.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("B"),
            Self::Char => f.write_str("C"),
            Self::Double => f.write_str("D"),
            Self::Float => f.write_str("F"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Short => f.write_str("S"),
            Self::Boolean => f.write_str("Z"),
            Self::Object(name) => write!(f, "L{};", name),
            Self::Array(component) => write!(f, "[{}", component),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(JLjava/lang/String;I)[Z`.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut rest = descriptor
            .strip_prefix('(')
            .ok_or_else(|| invalid(descriptor))?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            if rest.is_empty() {
                return Err(invalid(descriptor));
            }
            let (ty, tail) = parse_field(rest, descriptor)?;
            params.push(ty);
            rest = tail;
        }
        let ret_text = &rest[1..];
        let ret = if ret_text == "V" {
            None
        } else {
            Some(FieldType::parse(ret_text).map_err(|_| invalid(descriptor))?)
        };
        Ok(Self { params, ret })
    }

    /// Slots occupied by the parameters, excluding any receiver.
    #[must_use]
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// Slots occupied by the return value (0 for void).
    #[must_use]
    pub fn ret_slots(&self) -> usize {
        self.ret.as_ref().map_or(0, FieldType::slots)
    }
}

fn parse_field<'a>(text: &'a str, whole: &str) -> Result<(FieldType, &'a str)> {
    let mut chars = text.chars();
    let head = chars.next().ok_or_else(|| invalid(whole))?;
    let rest = chars.as_str();
    let ty = match head {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        'Z' => FieldType::Boolean,
        'L' => {
            let end = rest.find(';').ok_or_else(|| invalid(whole))?;
            if end == 0 {
                return Err(invalid(whole));
            }
            return Ok((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
        }
        '[' => {
            let (component, tail) = parse_field(rest, whole)?;
            return Ok((FieldType::Array(Box::new(component)), tail));
        }
        _ => return Err(invalid(whole)),
    };
    Ok((ty, rest))
}

fn invalid(descriptor: &str) -> InstrError {
    InstrError::InvalidDescriptor {
        descriptor: descriptor.to_string(),
    }
}
