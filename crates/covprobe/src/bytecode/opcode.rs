//! Opcodes of the supported instruction subset.
//!
//! Byte values follow the JVM instruction set. Only the instructions the
//! instrumenter injects, the simulator executes, or the verifier checks are
//! listed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    AconstNull = 0x01,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Lconst0 = 0x09,
    Lconst1 = 0x0a,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,
    Ldc2W = 0x14,
    Iload = 0x15,
    Lload = 0x16,
    Aload = 0x19,
    Baload = 0x33,
    Istore = 0x36,
    Lstore = 0x37,
    Astore = 0x3a,
    Bastore = 0x54,
    Pop = 0x57,
    Pop2 = 0x58,
    Dup = 0x59,
    Swap = 0x5f,
    Iadd = 0x60,
    Isub = 0x64,
    Imul = 0x68,
    Iinc = 0x84,
    Ifeq = 0x99,
    Ifne = 0x9a,
    IfIcmplt = 0xa1,
    IfIcmpge = 0xa2,
    Goto = 0xa7,
    Ireturn = 0xac,
    Lreturn = 0xad,
    Areturn = 0xb0,
    Return = 0xb1,
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Invokestatic = 0xb8,
    Newarray = 0xbc,
    Arraylength = 0xbe,
    Wide = 0xc4,
    Ifnull = 0xc6,
    Ifnonnull = 0xc7,
}

/// `newarray` element type code for `boolean`.
pub const T_BOOLEAN: i32 = 4;
/// `newarray` element type code for `byte`.
pub const T_BYTE: i32 = 8;
/// `newarray` element type code for `int`.
pub const T_INT: i32 = 10;

impl Opcode {
    /// The encoded byte.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Lower-case assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::AconstNull => "aconst_null",
            Self::IconstM1 => "iconst_m1",
            Self::Iconst0 => "iconst_0",
            Self::Iconst1 => "iconst_1",
            Self::Iconst2 => "iconst_2",
            Self::Iconst3 => "iconst_3",
            Self::Iconst4 => "iconst_4",
            Self::Iconst5 => "iconst_5",
            Self::Lconst0 => "lconst_0",
            Self::Lconst1 => "lconst_1",
            Self::Bipush => "bipush",
            Self::Sipush => "sipush",
            Self::Ldc => "ldc",
            Self::LdcW => "ldc_w",
            Self::Ldc2W => "ldc2_w",
            Self::Iload => "iload",
            Self::Lload => "lload",
            Self::Aload => "aload",
            Self::Baload => "baload",
            Self::Istore => "istore",
            Self::Lstore => "lstore",
            Self::Astore => "astore",
            Self::Bastore => "bastore",
            Self::Pop => "pop",
            Self::Pop2 => "pop2",
            Self::Dup => "dup",
            Self::Swap => "swap",
            Self::Iadd => "iadd",
            Self::Isub => "isub",
            Self::Imul => "imul",
            Self::Iinc => "iinc",
            Self::Ifeq => "ifeq",
            Self::Ifne => "ifne",
            Self::IfIcmplt => "if_icmplt",
            Self::IfIcmpge => "if_icmpge",
            Self::Goto => "goto",
            Self::Ireturn => "ireturn",
            Self::Lreturn => "lreturn",
            Self::Areturn => "areturn",
            Self::Return => "return",
            Self::Getstatic => "getstatic",
            Self::Putstatic => "putstatic",
            Self::Invokestatic => "invokestatic",
            Self::Newarray => "newarray",
            Self::Arraylength => "arraylength",
            Self::Wide => "wide",
            Self::Ifnull => "ifnull",
            Self::Ifnonnull => "ifnonnull",
        }
    }

    /// Push constant for `-1..=5`, if one exists.
    #[must_use]
    pub const fn iconst(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::IconstM1),
            0 => Some(Self::Iconst0),
            1 => Some(Self::Iconst1),
            2 => Some(Self::Iconst2),
            3 => Some(Self::Iconst3),
            4 => Some(Self::Iconst4),
            5 => Some(Self::Iconst5),
            _ => None,
        }
    }

    /// Value pushed by an `iconst_<n>` opcode.
    #[must_use]
    pub const fn iconst_value(self) -> Option<i32> {
        match self {
            Self::IconstM1 => Some(-1),
            Self::Iconst0 => Some(0),
            Self::Iconst1 => Some(1),
            Self::Iconst2 => Some(2),
            Self::Iconst3 => Some(3),
            Self::Iconst4 => Some(4),
            Self::Iconst5 => Some(5),
            _ => None,
        }
    }

    /// Conditional or unconditional branch taking a label operand.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Ifeq
                | Self::Ifne
                | Self::IfIcmplt
                | Self::IfIcmpge
                | Self::Goto
                | Self::Ifnull
                | Self::Ifnonnull
        )
    }

    /// Local variable load or store.
    #[must_use]
    pub const fn is_var(self) -> bool {
        matches!(
            self,
            Self::Iload | Self::Lload | Self::Aload | Self::Istore | Self::Lstore | Self::Astore
        )
    }

    /// Control never falls through to the next instruction.
    #[must_use]
    pub const fn is_unconditional(self) -> bool {
        matches!(
            self,
            Self::Goto | Self::Ireturn | Self::Lreturn | Self::Areturn | Self::Return
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
