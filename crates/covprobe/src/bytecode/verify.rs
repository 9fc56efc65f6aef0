//! Type-checking verifier for the supported instruction subset.
//!
//! Checks a method body the way a class file verifier with stack map frames
//! does, in one linear pass:
//!
//! - every branch target and every instruction after an unconditional
//!   transfer carries a frame
//! - the incoming state is assignable to the frame at each merge point
//! - operand stack depth never exceeds `max_stack`
//! - local variable accesses stay below `max_locals`
//! - operand types match each instruction's expectations
//!
//! There is no inference; frames are trusted once checked.

use super::descriptor::{FieldType, MethodDescriptor};
use super::frame::{Frame, VerificationType};
use super::insn::{CodeElement, Constant, Insn};
use super::label::Label;
use super::node::MethodNode;
use super::opcode::{Opcode, T_BOOLEAN, T_BYTE, T_INT};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for verification.
pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

/// Reasons a method body is rejected. `index` counts instructions from 0.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("Invalid descriptor '{descriptor}'")]
    InvalidDescriptor { descriptor: String },

    #[error("Operand stack depth {depth} exceeds max_stack {max} at instruction {index}")]
    StackOverflow {
        index: usize,
        depth: usize,
        max: usize,
    },

    #[error("Operand stack underflow at instruction {index}")]
    StackUnderflow { index: usize },

    #[error("Local {var} out of range (max_locals {max}) at instruction {index}")]
    LocalOutOfRange { index: usize, var: usize, max: usize },

    #[error("Type mismatch at instruction {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Branch target {label} has no frame")]
    MissingFrame { label: Label },

    #[error("Unreachable instruction {index} has no frame")]
    UnreachableWithoutFrame { index: usize },

    #[error("Frame before instruction {index} disagrees with incoming state: {reason}")]
    FrameMismatch { index: usize, reason: String },

    #[error("Label {label} is never bound")]
    UnknownLabel { label: Label },

    #[error("Execution falls off the end of the code")]
    FallsOffEnd,

    #[error("Probe {probe} was not lowered")]
    UnloweredProbe { probe: u32 },

    #[error("Unsupported instruction {insn}")]
    Unsupported { insn: String },
}

/// Local and stack types at one point, locals laid out per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    locals: Vec<VerificationType>,
    stack: Vec<VerificationType>,
}

impl State {
    fn stack_slots(&self) -> usize {
        self.stack.iter().map(VerificationType::slots).sum()
    }
}

/// Verify the body of `method` declared in module `owner`.
///
/// Methods without a body always pass.
pub fn verify(owner: &str, method: &MethodNode) -> VerifyResult<()> {
    if !method.has_code {
        return Ok(());
    }
    let descriptor = MethodDescriptor::parse(&method.decl.descriptor).map_err(|_| {
        VerifyError::InvalidDescriptor {
            descriptor: method.decl.descriptor.clone(),
        }
    })?;

    let mut checker = Checker {
        ret: descriptor.ret.as_ref().map(FieldType::verification_type),
        max_stack: usize::from(method.max_stack),
        max_locals: usize::from(method.max_locals),
        index: 0,
        state: State {
            locals: Vec::new(),
            stack: Vec::new(),
        },
        reachable: true,
    };
    checker.state = checker.entry_state(owner, method, &descriptor)?;
    let targets = checker.frames_at_labels(&method.body)?;

    for element in &method.body {
        match element {
            CodeElement::Frame(frame) => {
                let target = checker.state_from_frame(frame)?;
                if checker.reachable {
                    checker.check_merge(&target)?;
                }
                checker.state = target;
                checker.reachable = true;
            }
            CodeElement::Label(_) => {}
            CodeElement::Probe(probe) => {
                return Err(VerifyError::UnloweredProbe {
                    probe: probe.as_u32(),
                })
            }
            CodeElement::Insn(insn) => {
                if !checker.reachable {
                    return Err(VerifyError::UnreachableWithoutFrame {
                        index: checker.index,
                    });
                }
                checker.execute(insn, &targets)?;
                checker.index += 1;
            }
        }
    }

    if checker.reachable {
        Err(VerifyError::FallsOffEnd)
    } else {
        Ok(())
    }
}

struct Checker {
    ret: Option<VerificationType>,
    max_stack: usize,
    max_locals: usize,
    index: usize,
    state: State,
    /// False after an unconditional transfer until the next frame
    reachable: bool,
}

impl Checker {
    fn entry_state(
        &self,
        owner: &str,
        method: &MethodNode,
        descriptor: &MethodDescriptor,
    ) -> VerifyResult<State> {
        let mut locals = Vec::new();
        if !method.decl.access.is_static() {
            locals.push(VerificationType::object(owner));
        }
        for param in &descriptor.params {
            let ty = param.verification_type();
            let wide = ty.slots() == 2;
            locals.push(ty);
            if wide {
                locals.push(VerificationType::Top);
            }
        }
        self.pad_locals(locals).map(|locals| State {
            locals,
            stack: Vec::new(),
        })
    }

    fn pad_locals(&self, mut locals: Vec<VerificationType>) -> VerifyResult<Vec<VerificationType>> {
        if locals.len() > self.max_locals {
            return Err(VerifyError::LocalOutOfRange {
                index: self.index,
                var: locals.len() - 1,
                max: self.max_locals,
            });
        }
        locals.resize(self.max_locals, VerificationType::Top);
        Ok(locals)
    }

    fn state_from_frame(&self, frame: &Frame) -> VerifyResult<State> {
        let locals = self.pad_locals(frame.locals_by_slot())?;
        let depth = frame.stack_slots();
        if depth > self.max_stack {
            return Err(VerifyError::StackOverflow {
                index: self.index,
                depth,
                max: self.max_stack,
            });
        }
        Ok(State {
            locals,
            stack: frame.stack.clone(),
        })
    }

    /// Frame in effect at each label, `None` when the label has no frame.
    fn frames_at_labels(
        &self,
        body: &[CodeElement],
    ) -> VerifyResult<HashMap<Label, Option<State>>> {
        let mut map = HashMap::new();
        let mut labels = Vec::new();
        let mut frame = None;
        for element in body {
            match element {
                CodeElement::Label(label) => labels.push(*label),
                CodeElement::Frame(f) => frame = Some(self.state_from_frame(f)?),
                CodeElement::Insn(_) => {
                    for label in labels.drain(..) {
                        map.insert(label, frame.clone());
                    }
                    frame = None;
                }
                CodeElement::Probe(_) => {}
            }
        }
        for label in labels {
            map.insert(label, frame.clone());
        }
        Ok(map)
    }

    fn check_merge(&self, target: &State) -> VerifyResult<()> {
        let mismatch = |reason: String| VerifyError::FrameMismatch {
            index: self.index,
            reason,
        };
        if self.state.stack.len() != target.stack.len() {
            return Err(mismatch(format!(
                "stack has {} entries, frame expects {}",
                self.state.stack.len(),
                target.stack.len()
            )));
        }
        for (actual, expected) in self.state.stack.iter().zip(&target.stack) {
            if !actual.is_assignable_to(expected) {
                return Err(mismatch(format!("stack entry {actual} is not {expected}")));
            }
        }
        for (slot, (actual, expected)) in self.state.locals.iter().zip(&target.locals).enumerate() {
            if !actual.is_assignable_to(expected) {
                return Err(mismatch(format!("local {slot} is {actual}, frame expects {expected}")));
            }
        }
        Ok(())
    }

    fn mismatch(&self, expected: impl Into<String>, found: &VerificationType) -> VerifyError {
        VerifyError::TypeMismatch {
            index: self.index,
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    fn push(&mut self, ty: VerificationType) -> VerifyResult<()> {
        self.state.stack.push(ty);
        let depth = self.state.stack_slots();
        if depth > self.max_stack {
            return Err(VerifyError::StackOverflow {
                index: self.index,
                depth,
                max: self.max_stack,
            });
        }
        Ok(())
    }

    fn pop(&mut self) -> VerifyResult<VerificationType> {
        self.state
            .stack
            .pop()
            .ok_or(VerifyError::StackUnderflow { index: self.index })
    }

    fn pop_expect(&mut self, expected: &VerificationType) -> VerifyResult<VerificationType> {
        let value = self.pop()?;
        if value.is_assignable_to(expected) {
            Ok(value)
        } else {
            Err(self.mismatch(expected.to_string(), &value))
        }
    }

    fn pop_int(&mut self) -> VerifyResult<()> {
        self.pop_expect(&VerificationType::Integer).map(drop)
    }

    fn pop_reference(&mut self) -> VerifyResult<VerificationType> {
        let value = self.pop()?;
        if value.is_reference() {
            Ok(value)
        } else {
            Err(self.mismatch("reference", &value))
        }
    }

    fn pop_single(&mut self) -> VerifyResult<VerificationType> {
        let value = self.pop()?;
        if value.slots() == 1 {
            Ok(value)
        } else {
            Err(self.mismatch("single-slot value", &value))
        }
    }

    /// Pop a boolean or byte array (or null).
    fn pop_byte_array(&mut self) -> VerifyResult<()> {
        let value = self.pop()?;
        match &value {
            VerificationType::Null => Ok(()),
            VerificationType::Object(name) if name == "[Z" || name == "[B" => Ok(()),
            _ => Err(self.mismatch("[Z", &value)),
        }
    }

    fn pop_array(&mut self) -> VerifyResult<()> {
        let value = self.pop()?;
        match &value {
            VerificationType::Null => Ok(()),
            VerificationType::Object(name) if name.starts_with('[') => Ok(()),
            _ => Err(self.mismatch("array", &value)),
        }
    }

    fn local(&self, var: usize) -> VerifyResult<&VerificationType> {
        self.state
            .locals
            .get(var)
            .ok_or(VerifyError::LocalOutOfRange {
                index: self.index,
                var,
                max: self.max_locals,
            })
    }

    fn store(&mut self, var: usize, ty: VerificationType) -> VerifyResult<()> {
        let last = var + ty.slots() - 1;
        if last >= self.max_locals {
            return Err(VerifyError::LocalOutOfRange {
                index: self.index,
                var: last,
                max: self.max_locals,
            });
        }
        if var > 0 && self.state.locals[var - 1].slots() == 2 {
            self.state.locals[var - 1] = VerificationType::Top;
        }
        if ty.slots() == 2 {
            self.state.locals[var + 1] = VerificationType::Top;
        }
        self.state.locals[var] = ty;
        Ok(())
    }

    fn branch_to(&self, target: Label, targets: &HashMap<Label, Option<State>>) -> VerifyResult<()> {
        match targets.get(&target) {
            None => Err(VerifyError::UnknownLabel { label: target }),
            Some(None) => Err(VerifyError::MissingFrame { label: target }),
            Some(Some(frame)) => self.check_merge(frame),
        }
    }

    fn field_type(&self, desc: &str) -> VerifyResult<VerificationType> {
        FieldType::parse(desc)
            .map(|ty| ty.verification_type())
            .map_err(|_| VerifyError::InvalidDescriptor {
                descriptor: desc.to_string(),
            })
    }

    fn check_return(&mut self, expected: Option<&VerificationType>) -> VerifyResult<()> {
        match (expected, self.ret.clone()) {
            (None, None) => Ok(()),
            (Some(kind), Some(ret)) => {
                let value = self.pop()?;
                let kind_matches = if kind.is_reference() {
                    ret.is_reference()
                } else {
                    &ret == kind
                };
                if kind_matches && value.is_assignable_to(&ret) {
                    Ok(())
                } else {
                    Err(self.mismatch(ret.to_string(), &value))
                }
            }
            (_, ret) => Err(VerifyError::TypeMismatch {
                index: self.index,
                expected: ret.map_or_else(|| "void".to_string(), |r| r.to_string()),
                found: expected.map_or_else(|| "void".to_string(), ToString::to_string),
            }),
        }
    }

    fn unsupported(insn: &Insn) -> VerifyError {
        VerifyError::Unsupported {
            insn: insn.to_string(),
        }
    }

    fn execute(&mut self, insn: &Insn, targets: &HashMap<Label, Option<State>>) -> VerifyResult<()> {
        use VerificationType as T;
        match insn {
            Insn::Simple(op) => self.execute_simple(*op, insn)?,
            Insn::Int { op, operand } => match op {
                Opcode::Bipush | Opcode::Sipush => self.push(T::Integer)?,
                Opcode::Newarray => {
                    self.pop_int()?;
                    let array = match *operand {
                        T_BOOLEAN => "[Z",
                        T_BYTE => "[B",
                        T_INT => "[I",
                        _ => return Err(Self::unsupported(insn)),
                    };
                    self.push(T::object(array))?;
                }
                _ => return Err(Self::unsupported(insn)),
            },
            Insn::Var { op, var } => {
                let var = usize::from(*var);
                match op {
                    Opcode::Iload => {
                        let ty = self.local(var)?.clone();
                        if ty != T::Integer {
                            return Err(self.mismatch("int", &ty));
                        }
                        self.push(T::Integer)?;
                    }
                    Opcode::Lload => {
                        let ty = self.local(var)?.clone();
                        if ty != T::Long {
                            return Err(self.mismatch("long", &ty));
                        }
                        self.push(T::Long)?;
                    }
                    Opcode::Aload => {
                        let ty = self.local(var)?.clone();
                        if !ty.is_reference() {
                            return Err(self.mismatch("reference", &ty));
                        }
                        self.push(ty)?;
                    }
                    Opcode::Istore => {
                        self.pop_int()?;
                        self.store(var, T::Integer)?;
                    }
                    Opcode::Lstore => {
                        self.pop_expect(&T::Long)?;
                        self.store(var, T::Long)?;
                    }
                    Opcode::Astore => {
                        let ty = self.pop_reference()?;
                        self.store(var, ty)?;
                    }
                    _ => return Err(Self::unsupported(insn)),
                }
            }
            Insn::Iinc { var, .. } => {
                let ty = self.local(usize::from(*var))?.clone();
                if ty != T::Integer {
                    return Err(self.mismatch("int", &ty));
                }
            }
            Insn::Ldc(constant) => self.push(match constant {
                Constant::Int(_) => T::Integer,
                Constant::Long(_) => T::Long,
                Constant::Str(_) => T::object("java/lang/String"),
            })?,
            Insn::Jump { op, target } => {
                match op {
                    Opcode::Ifeq | Opcode::Ifne => self.pop_int()?,
                    Opcode::IfIcmplt | Opcode::IfIcmpge => {
                        self.pop_int()?;
                        self.pop_int()?;
                    }
                    Opcode::Ifnull | Opcode::Ifnonnull => {
                        self.pop_reference()?;
                    }
                    Opcode::Goto => {}
                    _ => return Err(Self::unsupported(insn)),
                }
                self.branch_to(*target, targets)?;
                if op.is_unconditional() {
                    self.reachable = false;
                }
            }
            Insn::Field { op, desc, .. } => {
                let ty = self.field_type(desc)?;
                match op {
                    Opcode::Getstatic => self.push(ty)?,
                    Opcode::Putstatic => {
                        self.pop_expect(&ty)?;
                    }
                    _ => return Err(Self::unsupported(insn)),
                }
            }
            Insn::Method { op, desc, .. } => {
                if *op != Opcode::Invokestatic {
                    return Err(Self::unsupported(insn));
                }
                let descriptor =
                    MethodDescriptor::parse(desc).map_err(|_| VerifyError::InvalidDescriptor {
                        descriptor: desc.clone(),
                    })?;
                for param in descriptor.params.iter().rev() {
                    self.pop_expect(&param.verification_type())?;
                }
                if let Some(ret) = &descriptor.ret {
                    self.push(ret.verification_type())?;
                }
            }
        }
        Ok(())
    }

    fn execute_simple(&mut self, op: Opcode, insn: &Insn) -> VerifyResult<()> {
        use VerificationType as T;
        match op {
            Opcode::Nop => {}
            Opcode::AconstNull => self.push(T::Null)?,
            Opcode::IconstM1
            | Opcode::Iconst0
            | Opcode::Iconst1
            | Opcode::Iconst2
            | Opcode::Iconst3
            | Opcode::Iconst4
            | Opcode::Iconst5 => self.push(T::Integer)?,
            Opcode::Lconst0 | Opcode::Lconst1 => self.push(T::Long)?,
            Opcode::Baload => {
                self.pop_int()?;
                self.pop_byte_array()?;
                self.push(T::Integer)?;
            }
            Opcode::Bastore => {
                self.pop_int()?;
                self.pop_int()?;
                self.pop_byte_array()?;
            }
            Opcode::Pop => {
                self.pop_single()?;
            }
            Opcode::Pop2 => {
                if self.pop()?.slots() == 1 {
                    self.pop_single()?;
                }
            }
            Opcode::Dup => {
                let top = self.pop_single()?;
                self.push(top.clone())?;
                self.push(top)?;
            }
            Opcode::Swap => {
                let a = self.pop_single()?;
                let b = self.pop_single()?;
                self.push(a)?;
                self.push(b)?;
            }
            Opcode::Iadd | Opcode::Isub | Opcode::Imul => {
                self.pop_int()?;
                self.pop_int()?;
                self.push(T::Integer)?;
            }
            Opcode::Arraylength => {
                self.pop_array()?;
                self.push(T::Integer)?;
            }
            Opcode::Ireturn => self.check_return(Some(&T::Integer))?,
            Opcode::Lreturn => self.check_return(Some(&T::Long))?,
            Opcode::Areturn => self.check_return(Some(&T::object("java/lang/Object")))?,
            Opcode::Return => self.check_return(None)?,
            _ => return Err(Self::unsupported(insn)),
        }
        if op.is_unconditional() {
            self.reachable = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::access::AccessFlags;
    use crate::bytecode::node::static_method;
    use crate::bytecode::visitor::MethodDecl;

    fn insn(i: Insn) -> CodeElement {
        CodeElement::Insn(i)
    }

    fn op(o: Opcode) -> CodeElement {
        insn(Insn::Simple(o))
    }

    fn lazy_accessor(frame: Frame, max_stack: u16) -> MethodNode {
        let done = Label::fresh();
        static_method(
            "init",
            "()[Z",
            vec![
                insn(Insn::Field {
                    op: Opcode::Getstatic,
                    owner: "A".into(),
                    name: "f".into(),
                    desc: "[Z".into(),
                }),
                op(Opcode::Dup),
                insn(Insn::Jump {
                    op: Opcode::Ifnonnull,
                    target: done,
                }),
                op(Opcode::Pop),
                op(Opcode::Iconst3),
                insn(Insn::Int {
                    op: Opcode::Newarray,
                    operand: T_BOOLEAN,
                }),
                op(Opcode::Dup),
                insn(Insn::Field {
                    op: Opcode::Putstatic,
                    owner: "A".into(),
                    name: "f".into(),
                    desc: "[Z".into(),
                }),
                CodeElement::Frame(frame),
                CodeElement::Label(done),
                op(Opcode::Areturn),
            ],
            max_stack,
            0,
        )
    }

    #[test]
    fn accepts_lazy_accessor() {
        let frame = Frame::new(vec![], vec![VerificationType::object("[Z")]);
        verify("A", &lazy_accessor(frame, 2)).unwrap();
    }

    #[test]
    fn rejects_excess_depth() {
        let frame = Frame::new(vec![], vec![VerificationType::object("[Z")]);
        assert!(matches!(
            verify("A", &lazy_accessor(frame, 1)),
            Err(VerifyError::StackOverflow { depth: 2, .. })
        ));
    }

    #[test]
    fn rejects_wrong_merge_frame() {
        let frame = Frame::new(vec![], vec![VerificationType::Integer]);
        assert!(matches!(
            verify("A", &lazy_accessor(frame, 2)),
            Err(VerifyError::FrameMismatch { .. })
        ));
    }

    #[test]
    fn branch_target_needs_frame() {
        let target = Label::fresh();
        let method = static_method(
            "m",
            "(I)V",
            vec![
                insn(Insn::Var {
                    op: Opcode::Iload,
                    var: 0,
                }),
                insn(Insn::Jump {
                    op: Opcode::Ifeq,
                    target,
                }),
                CodeElement::Label(target),
                op(Opcode::Return),
            ],
            1,
            1,
        );
        assert_eq!(
            verify("A", &method),
            Err(VerifyError::MissingFrame { label: target })
        );
    }

    #[test]
    fn receiver_occupies_slot_zero() {
        let method = MethodNode::with_body(
            MethodDecl::new(AccessFlags::PUBLIC, "get", "()LA;"),
            vec![
                insn(Insn::Var {
                    op: Opcode::Aload,
                    var: 0,
                }),
                op(Opcode::Areturn),
            ],
            1,
            1,
        );
        verify("A", &method).unwrap();
    }

    #[test]
    fn local_bounds_checked() {
        let method = static_method(
            "m",
            "()V",
            vec![
                op(Opcode::Iconst0),
                insn(Insn::Var {
                    op: Opcode::Istore,
                    var: 1,
                }),
                op(Opcode::Return),
            ],
            1,
            1,
        );
        assert!(matches!(
            verify("A", &method),
            Err(VerifyError::LocalOutOfRange { var: 1, .. })
        ));
    }

    #[test]
    fn falling_off_end_rejected() {
        let method = static_method("m", "()V", vec![op(Opcode::Nop)], 0, 0);
        assert_eq!(verify("A", &method), Err(VerifyError::FallsOffEnd));
    }

    #[test]
    fn return_kind_checked() {
        let method = static_method("m", "()I", vec![op(Opcode::Return)], 0, 0);
        assert!(matches!(
            verify("A", &method),
            Err(VerifyError::TypeMismatch { .. })
        ));
    }
}
