//! Instructions and method body elements.

use super::frame::Frame;
use super::label::Label;
use super::opcode::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe probe identifier
///
/// Index of a region's flag in the module's probe array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeId(u32);

impl ProbeId {
    /// Create a new probe ID
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A loadable constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Str(String),
}

impl Constant {
    /// Two-slot constant (loaded with `ldc2_w`).
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Insn {
    /// Instruction without operands
    Simple(Opcode),
    /// `bipush`, `sipush` or `newarray` with an immediate operand
    Int { op: Opcode, operand: i32 },
    /// Local variable load or store
    Var { op: Opcode, var: u16 },
    /// `iinc var delta`
    Iinc { var: u16, delta: i16 },
    /// `ldc`/`ldc_w`/`ldc2_w`; the encoding is chosen at assembly
    Ldc(Constant),
    /// Branch to a label
    Jump { op: Opcode, target: Label },
    /// Static field access
    Field {
        op: Opcode,
        owner: String,
        name: String,
        desc: String,
    },
    /// Static method invocation
    Method {
        op: Opcode,
        owner: String,
        name: String,
        desc: String,
    },
}

impl Insn {
    /// The instruction's opcode.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Simple(op)
            | Self::Int { op, .. }
            | Self::Var { op, .. }
            | Self::Jump { op, .. }
            | Self::Field { op, .. }
            | Self::Method { op, .. } => *op,
            Self::Iinc { .. } => Opcode::Iinc,
            Self::Ldc(c) if c.is_wide() => Opcode::Ldc2W,
            Self::Ldc(_) => Opcode::Ldc,
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(op) => write!(f, "{op}"),
            Self::Int { op, operand } => write!(f, "{op} {operand}"),
            Self::Var { op, var } => write!(f, "{op} {var}"),
            Self::Iinc { var, delta } => write!(f, "iinc {var} {delta}"),
            Self::Ldc(c) => write!(f, "{} {c}", self.opcode()),
            Self::Jump { op, target } => write!(f, "{op} {target}"),
            Self::Field {
                op,
                owner,
                name,
                desc,
            }
            | Self::Method {
                op,
                owner,
                name,
                desc,
            } => write!(f, "{op} {owner}.{name}{desc}"),
        }
    }
}

/// One element of a method body in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeElement {
    Insn(Insn),
    /// Binds a label to the following instruction
    Label(Label),
    /// Stack map frame for the following instruction
    Frame(Frame),
    /// Region marker from upstream analysis, lowered by the instrumenter
    Probe(ProbeId),
}
