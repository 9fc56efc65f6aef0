//! Bytecode model.
//!
//! Instructions, frames, descriptors and the visitor protocol modules are
//! transformed through, plus an in-memory node form, an assembler and a
//! verifier for checking transformation output.

pub mod access;
pub mod assemble;
pub mod descriptor;
pub mod frame;
pub mod insn;
pub mod label;
pub mod node;
pub mod opcode;
pub mod verify;
pub mod visitor;

pub use access::AccessFlags;
pub use assemble::{assemble, AssembleError, AssembledCode, ConstantPool};
pub use descriptor::{FieldType, MethodDescriptor};
pub use frame::{Frame, VerificationType};
pub use insn::{CodeElement, Constant, Insn, ProbeId};
pub use label::Label;
pub use node::{MethodNode, ModuleNode, ModuleWriter};
pub use opcode::Opcode;
pub use verify::{verify, VerifyError};
pub use visitor::{
    FieldDecl, MethodDecl, MethodVisitor, ModuleHeader, ModuleVisitor, ProbeMethodVisitor,
    ProbeModuleVisitor,
};
