//! Encoding method bodies to bytecode.
//!
//! [`assemble`] lowers a [`MethodNode`] body into its byte encoding, resolving
//! label offsets and interning every symbolic operand into a shared
//! [`ConstantPool`]. Frame positions are reported as byte offsets so a
//! class file writer can build the stack map table.

use super::frame::Frame;
use super::insn::{CodeElement, Constant, Insn};
use super::label::Label;
use super::node::MethodNode;
use super::opcode::Opcode;
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for assembly.
pub type AssembleResult<T> = std::result::Result<T, AssembleError>;

/// Largest code attribute the format allows.
pub const MAX_CODE_LENGTH: usize = 65_535;

/// Errors raised while assembling a method body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("Label {label} is never bound")]
    UnresolvedLabel { label: Label },

    #[error("Label {label} is bound twice")]
    DuplicateLabel { label: Label },

    #[error("Branch at offset {offset} to {label} is out of range")]
    BranchOutOfRange { offset: usize, label: Label },

    #[error("Code length {length} exceeds 65535 bytes")]
    CodeTooLarge { length: usize },

    /// A region marker reached the assembler instead of being lowered.
    #[error("Probe {probe} was not lowered before assembly")]
    UnloweredProbe { probe: u32 },

    #[error("Constant pool overflow")]
    PoolOverflow,

    #[error("Operand {operand} out of range for {op}")]
    InvalidOperand { op: Opcode, operand: i64 },

    /// Instruction form and opcode disagree, e.g. `Simple(bipush)`.
    #[error("Malformed instruction: {insn}")]
    MalformedInsn { insn: String },
}

/// One constant pool entry. Indices refer to other entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    /// Occupies two pool slots
    Long(i64),
    Str(u16),
    Class(u16),
    NameAndType(u16, u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
}

impl PoolEntry {
    const fn tag(&self) -> u8 {
        match self {
            Self::Utf8(_) => 1,
            Self::Integer(_) => 3,
            Self::Long(_) => 5,
            Self::Class(_) => 7,
            Self::Str(_) => 8,
            Self::Fieldref(..) => 9,
            Self::Methodref(..) => 10,
            Self::NameAndType(..) => 12,
        }
    }

    const fn width(&self) -> u16 {
        match self {
            Self::Long(_) => 2,
            _ => 1,
        }
    }
}

/// Deduplicating constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<(u16, PoolEntry)>,
    index: HashMap<PoolEntry, u16>,
    next: u16,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Empty pool; the first entry gets index 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: 1,
        }
    }

    /// The `constant_pool_count` value: one more than the highest index.
    #[must_use]
    pub const fn count(&self) -> u16 {
        self.next
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&PoolEntry> {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, entry)| entry)
    }

    fn insert(&mut self, entry: PoolEntry) -> AssembleResult<u16> {
        if let Some(&existing) = self.index.get(&entry) {
            return Ok(existing);
        }
        let index = self.next;
        self.next = index
            .checked_add(entry.width())
            .ok_or(AssembleError::PoolOverflow)?;
        self.index.insert(entry.clone(), index);
        self.entries.push((index, entry));
        Ok(index)
    }

    pub fn utf8(&mut self, text: &str) -> AssembleResult<u16> {
        if text.len() > usize::from(u16::MAX) {
            return Err(AssembleError::PoolOverflow);
        }
        self.insert(PoolEntry::Utf8(text.to_string()))
    }

    pub fn integer(&mut self, value: i32) -> AssembleResult<u16> {
        self.insert(PoolEntry::Integer(value))
    }

    pub fn long(&mut self, value: i64) -> AssembleResult<u16> {
        self.insert(PoolEntry::Long(value))
    }

    pub fn string(&mut self, text: &str) -> AssembleResult<u16> {
        let utf8 = self.utf8(text)?;
        self.insert(PoolEntry::Str(utf8))
    }

    pub fn class(&mut self, name: &str) -> AssembleResult<u16> {
        let utf8 = self.utf8(name)?;
        self.insert(PoolEntry::Class(utf8))
    }

    pub fn name_and_type(&mut self, name: &str, desc: &str) -> AssembleResult<u16> {
        let name = self.utf8(name)?;
        let desc = self.utf8(desc)?;
        self.insert(PoolEntry::NameAndType(name, desc))
    }

    pub fn fieldref(&mut self, owner: &str, name: &str, desc: &str) -> AssembleResult<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, desc)?;
        self.insert(PoolEntry::Fieldref(class, nat))
    }

    pub fn methodref(&mut self, owner: &str, name: &str, desc: &str) -> AssembleResult<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, desc)?;
        self.insert(PoolEntry::Methodref(class, nat))
    }

    /// Encode the count followed by every entry.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.next.to_be_bytes());
        for (_, entry) in &self.entries {
            out.push(entry.tag());
            match entry {
                PoolEntry::Utf8(text) => {
                    // length checked on insert
                    let len = u16::try_from(text.len()).unwrap_or(u16::MAX);
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(text.as_bytes());
                }
                PoolEntry::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
                PoolEntry::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                PoolEntry::Str(i) | PoolEntry::Class(i) => out.extend_from_slice(&i.to_be_bytes()),
                PoolEntry::NameAndType(a, b)
                | PoolEntry::Fieldref(a, b)
                | PoolEntry::Methodref(a, b) => {
                    out.extend_from_slice(&a.to_be_bytes());
                    out.extend_from_slice(&b.to_be_bytes());
                }
            }
        }
        out
    }
}

/// An assembled method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    /// Frames keyed by the byte offset of the instruction they describe
    pub frames: Vec<(u16, Frame)>,
}

/// Instruction with its pool operand resolved.
enum Lowered<'a> {
    Plain(&'a Insn),
    Pooled(&'a Insn, u16),
}

/// Assemble the body of `method`, interning operands into `pool`.
pub fn assemble(method: &MethodNode, pool: &mut ConstantPool) -> AssembleResult<AssembledCode> {
    let mut labels: HashMap<Label, usize> = HashMap::new();
    let mut pending_frames: Vec<(usize, Frame)> = Vec::new();
    let mut lowered: Vec<(usize, Lowered<'_>)> = Vec::new();
    let mut offset = 0usize;

    for element in &method.body {
        match element {
            CodeElement::Label(label) => {
                if labels.insert(*label, offset).is_some() {
                    return Err(AssembleError::DuplicateLabel { label: *label });
                }
            }
            CodeElement::Frame(frame) => pending_frames.push((offset, frame.clone())),
            CodeElement::Probe(probe) => {
                return Err(AssembleError::UnloweredProbe {
                    probe: probe.as_u32(),
                })
            }
            CodeElement::Insn(insn) => {
                let low = lower(insn, pool)?;
                let size = encoded_size(&low)?;
                lowered.push((offset, low));
                offset += size;
            }
        }
    }
    if offset > MAX_CODE_LENGTH {
        return Err(AssembleError::CodeTooLarge { length: offset });
    }

    let mut code = Vec::with_capacity(offset);
    for (at, low) in &lowered {
        emit(&mut code, *at, low, &labels)?;
    }

    let frames = pending_frames
        .into_iter()
        .map(|(at, frame)| (u16::try_from(at).unwrap_or(u16::MAX), frame))
        .collect();

    Ok(AssembledCode {
        code,
        max_stack: method.max_stack,
        max_locals: method.max_locals,
        frames,
    })
}

fn malformed(insn: &Insn) -> AssembleError {
    AssembleError::MalformedInsn {
        insn: insn.to_string(),
    }
}

fn lower<'a>(insn: &'a Insn, pool: &mut ConstantPool) -> AssembleResult<Lowered<'a>> {
    Ok(match insn {
        Insn::Ldc(Constant::Int(v)) => Lowered::Pooled(insn, pool.integer(*v)?),
        Insn::Ldc(Constant::Long(v)) => Lowered::Pooled(insn, pool.long(*v)?),
        Insn::Ldc(Constant::Str(s)) => Lowered::Pooled(insn, pool.string(s)?),
        Insn::Field {
            op: Opcode::Getstatic | Opcode::Putstatic,
            owner,
            name,
            desc,
        } => Lowered::Pooled(insn, pool.fieldref(owner, name, desc)?),
        Insn::Method {
            op: Opcode::Invokestatic,
            owner,
            name,
            desc,
        } => Lowered::Pooled(insn, pool.methodref(owner, name, desc)?),
        Insn::Field { .. } | Insn::Method { .. } => return Err(malformed(insn)),
        _ => Lowered::Plain(insn),
    })
}

const fn short_form_base(op: Opcode) -> Option<u8> {
    match op {
        Opcode::Iload => Some(0x1a),
        Opcode::Lload => Some(0x1e),
        Opcode::Aload => Some(0x2a),
        Opcode::Istore => Some(0x3b),
        Opcode::Lstore => Some(0x3f),
        Opcode::Astore => Some(0x4b),
        _ => None,
    }
}

const fn takes_no_operand(op: Opcode) -> bool {
    !(op.is_jump()
        || op.is_var()
        || matches!(
            op,
            Opcode::Bipush
                | Opcode::Sipush
                | Opcode::Ldc
                | Opcode::LdcW
                | Opcode::Ldc2W
                | Opcode::Iinc
                | Opcode::Getstatic
                | Opcode::Putstatic
                | Opcode::Invokestatic
                | Opcode::Newarray
                | Opcode::Wide
        ))
}

fn encoded_size(low: &Lowered<'_>) -> AssembleResult<usize> {
    let size = match low {
        Lowered::Pooled(Insn::Ldc(c), index) => {
            if c.is_wide() || *index > 255 {
                3
            } else {
                2
            }
        }
        Lowered::Pooled(..) => 3,
        Lowered::Plain(insn) => match insn {
            Insn::Simple(op) if takes_no_operand(*op) => 1,
            Insn::Int {
                op: Opcode::Bipush | Opcode::Newarray,
                ..
            } => 2,
            Insn::Int {
                op: Opcode::Sipush, ..
            } => 3,
            Insn::Var { op, var } if op.is_var() => {
                if *var <= 3 {
                    1
                } else if *var <= 255 {
                    2
                } else {
                    4
                }
            }
            Insn::Iinc { var, delta } => {
                if *var <= 255 && i8::try_from(*delta).is_ok() {
                    3
                } else {
                    6
                }
            }
            Insn::Jump { op, .. } if op.is_jump() => 3,
            other => return Err(malformed(other)),
        },
    };
    Ok(size)
}

fn emit(
    code: &mut Vec<u8>,
    at: usize,
    low: &Lowered<'_>,
    labels: &HashMap<Label, usize>,
) -> AssembleResult<()> {
    match low {
        Lowered::Pooled(Insn::Ldc(c), index) => {
            if c.is_wide() {
                code.push(Opcode::Ldc2W.code());
                code.extend_from_slice(&index.to_be_bytes());
            } else if let Ok(narrow) = u8::try_from(*index) {
                code.push(Opcode::Ldc.code());
                code.push(narrow);
            } else {
                code.push(Opcode::LdcW.code());
                code.extend_from_slice(&index.to_be_bytes());
            }
        }
        Lowered::Pooled(insn, index) => {
            code.push(insn.opcode().code());
            code.extend_from_slice(&index.to_be_bytes());
        }
        Lowered::Plain(insn) => emit_plain(code, at, insn, labels)?,
    }
    Ok(())
}

fn emit_plain(
    code: &mut Vec<u8>,
    at: usize,
    insn: &Insn,
    labels: &HashMap<Label, usize>,
) -> AssembleResult<()> {
    match insn {
        Insn::Simple(op) => code.push(op.code()),
        Insn::Int { op, operand } => {
            let out_of_range = || AssembleError::InvalidOperand {
                op: *op,
                operand: i64::from(*operand),
            };
            code.push(op.code());
            match op {
                Opcode::Bipush => {
                    let v = i8::try_from(*operand).map_err(|_| out_of_range())?;
                    code.extend_from_slice(&v.to_be_bytes());
                }
                Opcode::Sipush => {
                    let v = i16::try_from(*operand).map_err(|_| out_of_range())?;
                    code.extend_from_slice(&v.to_be_bytes());
                }
                _ => {
                    let v = u8::try_from(*operand)
                        .ok()
                        .filter(|t| (4..=11).contains(t))
                        .ok_or_else(out_of_range)?;
                    code.push(v);
                }
            }
        }
        Insn::Var { op, var } => {
            match (short_form_base(*op), u8::try_from(*var)) {
                (Some(base), Ok(v)) if v <= 3 => code.push(base + v),
                (_, Ok(v)) => {
                    code.push(op.code());
                    code.push(v);
                }
                (_, Err(_)) => {
                    code.push(Opcode::Wide.code());
                    code.push(op.code());
                    code.extend_from_slice(&var.to_be_bytes());
                }
            }
        }
        Insn::Iinc { var, delta } => match (u8::try_from(*var), i8::try_from(*delta)) {
            (Ok(v), Ok(d)) => {
                code.push(Opcode::Iinc.code());
                code.push(v);
                code.extend_from_slice(&d.to_be_bytes());
            }
            _ => {
                code.push(Opcode::Wide.code());
                code.push(Opcode::Iinc.code());
                code.extend_from_slice(&var.to_be_bytes());
                code.extend_from_slice(&delta.to_be_bytes());
            }
        },
        Insn::Jump { op, target } => {
            let dest = *labels
                .get(target)
                .ok_or(AssembleError::UnresolvedLabel { label: *target })?;
            let delta = i64::try_from(dest).unwrap_or(i64::MAX) - i64::try_from(at).unwrap_or(0);
            let delta = i16::try_from(delta).map_err(|_| AssembleError::BranchOutOfRange {
                offset: at,
                label: *target,
            })?;
            code.push(op.code());
            code.extend_from_slice(&delta.to_be_bytes());
        }
        other => return Err(malformed(other)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::frame::VerificationType;
    use crate::bytecode::insn::ProbeId;
    use crate::bytecode::node::static_method;
    use pretty_assertions::assert_eq;

    fn body(elements: Vec<CodeElement>) -> MethodNode {
        static_method("m", "()V", elements, 4, 4)
    }

    fn insn(i: Insn) -> CodeElement {
        CodeElement::Insn(i)
    }

    #[test]
    fn lazy_load_shape_resolves_branch_and_frame() {
        let done = Label::fresh();
        let frame = Frame::new(vec![], vec![VerificationType::object("[Z")]);
        let method = body(vec![
            insn(Insn::Field {
                op: Opcode::Getstatic,
                owner: "A".into(),
                name: "f".into(),
                desc: "[Z".into(),
            }),
            insn(Insn::Simple(Opcode::Dup)),
            insn(Insn::Jump {
                op: Opcode::Ifnonnull,
                target: done,
            }),
            insn(Insn::Simple(Opcode::Pop)),
            insn(Insn::Simple(Opcode::AconstNull)),
            CodeElement::Frame(frame.clone()),
            CodeElement::Label(done),
            insn(Insn::Simple(Opcode::Areturn)),
        ]);
        let mut pool = ConstantPool::new();
        let out = assemble(&method, &mut pool).unwrap();
        assert_eq!(
            out.code,
            vec![0xb2, 0x00, 0x06, 0x59, 0xc7, 0x00, 0x05, 0x57, 0x01, 0xb0]
        );
        assert_eq!(out.frames, vec![(9, frame)]);
        assert_eq!(
            pool.get(6),
            Some(&PoolEntry::Fieldref(2, 5)),
            "fieldref interned after its class and name-and-type"
        );
    }

    #[test]
    fn var_encodings() {
        let method = body(vec![
            insn(Insn::Var {
                op: Opcode::Aload,
                var: 0,
            }),
            insn(Insn::Var {
                op: Opcode::Astore,
                var: 3,
            }),
            insn(Insn::Var {
                op: Opcode::Aload,
                var: 7,
            }),
            insn(Insn::Var {
                op: Opcode::Aload,
                var: 300,
            }),
            insn(Insn::Iinc { var: 2, delta: 1 }),
            insn(Insn::Iinc { var: 300, delta: 1 }),
        ]);
        let out = assemble(&method, &mut ConstantPool::new()).unwrap();
        assert_eq!(
            out.code,
            vec![
                0x2a, 0x4e, 0x19, 0x07, 0xc4, 0x19, 0x01, 0x2c, 0x84, 0x02, 0x01, 0xc4, 0x84,
                0x01, 0x2c, 0x00, 0x01
            ]
        );
    }

    #[test]
    fn ldc_forms() {
        let method = body(vec![
            insn(Insn::Ldc(Constant::Long(9))),
            insn(Insn::Ldc(Constant::Str("Sample".into()))),
        ]);
        let mut pool = ConstantPool::new();
        let out = assemble(&method, &mut pool).unwrap();
        // long takes indices 1 and 2, utf8 3, string 4
        assert_eq!(out.code, vec![0x14, 0x00, 0x01, 0x12, 0x04]);
        assert_eq!(pool.count(), 5);
    }

    #[test]
    fn pool_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.methodref("R", "get", "()[Z").unwrap();
        let b = pool.methodref("R", "get", "()[Z").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.len(), 6);
        let bytes = pool.to_bytes();
        assert_eq!(&bytes[..2], &pool.count().to_be_bytes());
    }

    #[test]
    fn rejects_unlowered_probe() {
        let method = body(vec![CodeElement::Probe(ProbeId::new(2))]);
        assert_eq!(
            assemble(&method, &mut ConstantPool::new()),
            Err(AssembleError::UnloweredProbe { probe: 2 })
        );
    }

    #[test]
    fn rejects_unbound_label() {
        let target = Label::fresh();
        let method = body(vec![insn(Insn::Jump {
            op: Opcode::Goto,
            target,
        })]);
        assert_eq!(
            assemble(&method, &mut ConstantPool::new()),
            Err(AssembleError::UnresolvedLabel { label: target })
        );
    }

    #[test]
    fn rejects_malformed_and_out_of_range() {
        let simple_bipush = body(vec![insn(Insn::Simple(Opcode::Bipush))]);
        assert!(matches!(
            assemble(&simple_bipush, &mut ConstantPool::new()),
            Err(AssembleError::MalformedInsn { .. })
        ));
        let big_bipush = body(vec![insn(Insn::Int {
            op: Opcode::Bipush,
            operand: 200,
        })]);
        assert!(matches!(
            assemble(&big_bipush, &mut ConstantPool::new()),
            Err(AssembleError::InvalidOperand { .. })
        ));
    }
}
