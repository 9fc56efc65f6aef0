//! Module visitation protocol.
//!
//! A module is described by a sequence of events: one header, then fields and
//! methods in declaration order, then an end marker. Method bodies are
//! described by a nested event sequence on a [`MethodVisitor`]. Visitors
//! chain: an adapter receives events, rewrites or forwards them, and passes
//! them on to the next sink.
//!
//! The probe-aware variants carry region markers from upstream analysis and
//! the final probe count of the module.

use super::access::AccessFlags;
use super::frame::Frame;
use super::insn::{Constant, Insn, ProbeId};
use super::label::Label;
use super::opcode::Opcode;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Module header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHeader {
    /// Class file format version
    pub version: u32,
    pub access: AccessFlags,
    /// Qualified internal name, e.g. `org/example/Sample`
    pub name: String,
    pub signature: Option<String>,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
}

impl ModuleHeader {
    /// Header of a public concrete module extending `java/lang/Object`.
    #[must_use]
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            version: 50,
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            name: name.into(),
            signature: None,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
        }
    }

    /// Header of a public interface module.
    #[must_use]
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            version: 50,
            access: AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
            name: name.into(),
            signature: None,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
        }
    }
}

/// Field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    /// Constant initial value
    pub value: Option<Constant>,
}

impl FieldDecl {
    /// Field without signature or initial value.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            value: None,
        }
    }
}

/// Method declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
}

impl MethodDecl {
    /// Method without signature or declared exceptions.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            exceptions: Vec::new(),
        }
    }
}

/// Sink for the events of one method.
///
/// Order: `visit_code` (only for methods with a body), body events
/// (`visit_insn`, `visit_label`, `visit_frame`), `visit_maxs`, `visit_end`.
pub trait MethodVisitor {
    /// Start of the method body.
    fn visit_code(&mut self) -> Result<()>;

    fn visit_insn(&mut self, insn: Insn) -> Result<()>;

    /// Bind `label` to the next instruction.
    fn visit_label(&mut self, label: Label) -> Result<()>;

    /// Stack map frame for the next instruction.
    fn visit_frame(&mut self, frame: Frame) -> Result<()>;

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()>;

    fn visit_end(&mut self) -> Result<()>;

    /// Emit an instruction without operands.
    fn op(&mut self, op: Opcode) -> Result<()> {
        self.visit_insn(Insn::Simple(op))
    }

    /// Emit a local variable load or store.
    fn var_insn(&mut self, op: Opcode, var: u16) -> Result<()> {
        self.visit_insn(Insn::Var { op, var })
    }

    /// Emit a branch.
    fn jump(&mut self, op: Opcode, target: Label) -> Result<()> {
        self.visit_insn(Insn::Jump { op, target })
    }

    /// Emit a field access.
    fn field_insn(&mut self, op: Opcode, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.visit_insn(Insn::Field {
            op,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        })
    }

    /// Emit a method invocation.
    fn method_insn(&mut self, op: Opcode, owner: &str, name: &str, desc: &str) -> Result<()> {
        self.visit_insn(Insn::Method {
            op,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        })
    }

    /// Emit a constant load.
    fn ldc(&mut self, constant: Constant) -> Result<()> {
        self.visit_insn(Insn::Ldc(constant))
    }

    /// Push an int with the shortest encoding.
    fn push_int(&mut self, value: i32) -> Result<()> {
        if let Some(op) = Opcode::iconst(value) {
            self.op(op)
        } else if i8::try_from(value).is_ok() {
            self.visit_insn(Insn::Int {
                op: Opcode::Bipush,
                operand: value,
            })
        } else if i16::try_from(value).is_ok() {
            self.visit_insn(Insn::Int {
                op: Opcode::Sipush,
                operand: value,
            })
        } else {
            self.ldc(Constant::Int(value))
        }
    }
}

/// Sink for module events.
pub trait ModuleVisitor {
    fn visit_header(&mut self, header: &ModuleHeader) -> Result<()>;

    fn visit_field(&mut self, field: &FieldDecl) -> Result<()>;

    /// Returns `None` when the sink elides the method.
    fn visit_method(&mut self, method: &MethodDecl) -> Result<Option<Box<dyn MethodVisitor + '_>>>;

    fn visit_end(&mut self) -> Result<()>;
}

/// Method sink that also receives region markers.
pub trait ProbeMethodVisitor: MethodVisitor {
    /// The region with the given probe starts here.
    fn visit_probe(&mut self, probe: ProbeId) -> Result<()>;
}

/// Module sink that also receives region markers and the total probe count.
///
/// `visit_total_probe_count` is reported exactly once, after the last
/// method and before `visit_end`.
pub trait ProbeModuleVisitor {
    fn visit_header(&mut self, header: &ModuleHeader) -> Result<()>;

    fn visit_field(&mut self, field: &FieldDecl) -> Result<()>;

    /// Returns `None` when no region instrumentation applies to the method.
    fn visit_method(
        &mut self,
        method: &MethodDecl,
    ) -> Result<Option<Box<dyn ProbeMethodVisitor + '_>>>;

    fn visit_total_probe_count(&mut self, count: usize) -> Result<()>;

    fn visit_end(&mut self) -> Result<()>;
}
