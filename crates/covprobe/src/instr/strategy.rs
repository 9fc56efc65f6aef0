//! Probe array storage strategies.
//!
//! How a method gets hold of its module's probe array depends on the kind of
//! module. Concrete modules cache the array in a reserved static field behind
//! a lazily initialising accessor. Interface modules cannot host that
//! accessor, so every method fetches the array from the runtime directly.

use crate::bytecode::access::AccessFlags;
use crate::bytecode::frame::{Frame, VerificationType};
use crate::bytecode::label::Label;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::visitor::{FieldDecl, MethodDecl, MethodVisitor, ModuleVisitor};
use crate::error::{InstrError, Result};
use crate::marker::STORAGE_MARKER;
use crate::runtime::{AccessorGenerator, ModuleId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Kind of module, fixed by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Any non-interface module, abstract ones included
    Concrete,
    Interface,
}

impl ModuleKind {
    /// Kind implied by header access flags.
    #[must_use]
    pub const fn of(access: AccessFlags) -> Self {
        if access.is_interface() {
            Self::Interface
        } else {
            Self::Concrete
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete => f.write_str("concrete"),
            Self::Interface => f.write_str("interface"),
        }
    }
}

/// Where a module keeps its probe array and how methods reach it.
pub trait ProbeArrayStrategy {
    /// Emit code leaving the probe array on top of the operand stack.
    ///
    /// Returns the operand stack depth the emitted code needs.
    fn acquire_array(&self, mv: &mut dyn MethodVisitor) -> Result<usize>;

    /// Emit the module members backing [`acquire_array`](Self::acquire_array)
    /// once the total probe count is known.
    fn declare_storage(&self, module: &mut dyn ModuleVisitor, probe_count: usize) -> Result<()>;
}

/// Select the strategy for a module of the given kind.
#[must_use]
pub fn strategy_for(
    kind: ModuleKind,
    module_name: &str,
    id: ModuleId,
    generator: Arc<dyn AccessorGenerator>,
    placeholder: usize,
) -> Box<dyn ProbeArrayStrategy> {
    match kind {
        ModuleKind::Concrete => Box::new(ClassTypeStrategy::new(module_name, id, generator)),
        ModuleKind::Interface => Box::new(InterfaceTypeStrategy::new(
            module_name,
            id,
            generator,
            placeholder,
        )),
    }
}

/// Static field plus lazily initialising accessor.
pub struct ClassTypeStrategy {
    module_name: String,
    id: ModuleId,
    generator: Arc<dyn AccessorGenerator>,
}

impl fmt::Debug for ClassTypeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassTypeStrategy")
            .field("module_name", &self.module_name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ClassTypeStrategy {
    #[must_use]
    pub fn new(module_name: impl Into<String>, id: ModuleId, generator: Arc<dyn AccessorGenerator>) -> Self {
        Self {
            module_name: module_name.into(),
            id,
            generator,
        }
    }

    /// Accessor body: return the cached array, creating and caching it on
    /// first use. The check and the store are not atomic.
    fn emit_accessor(&self, mv: &mut dyn MethodVisitor, probe_count: usize) -> Result<()> {
        let marker = &STORAGE_MARKER;
        mv.visit_code()?;
        mv.field_insn(
            Opcode::Getstatic,
            &self.module_name,
            marker.field_name,
            marker.field_desc,
        )?;
        mv.op(Opcode::Dup)?;
        let initialised = Label::fresh();
        mv.jump(Opcode::Ifnonnull, initialised)?;
        mv.op(Opcode::Pop)?;
        let size = self
            .generator
            .generate(self.id, &self.module_name, probe_count, mv)?;
        mv.op(Opcode::Dup)?;
        mv.field_insn(
            Opcode::Putstatic,
            &self.module_name,
            marker.field_name,
            marker.field_desc,
        )?;
        mv.visit_frame(Frame::new(
            Vec::new(),
            vec![VerificationType::object(marker.field_desc)],
        ))?;
        mv.visit_label(initialised)?;
        mv.op(Opcode::Areturn)?;
        let max_stack = u16::try_from(size.max(2)).map_err(|_| InstrError::Accessor {
            message: format!("accessor stack size {size} out of range"),
        })?;
        mv.visit_maxs(max_stack, 1)?;
        mv.visit_end()
    }
}

impl ProbeArrayStrategy for ClassTypeStrategy {
    fn acquire_array(&self, mv: &mut dyn MethodVisitor) -> Result<usize> {
        mv.method_insn(
            Opcode::Invokestatic,
            &self.module_name,
            STORAGE_MARKER.accessor_name,
            STORAGE_MARKER.accessor_desc,
        )?;
        Ok(1)
    }

    fn declare_storage(&self, module: &mut dyn ModuleVisitor, probe_count: usize) -> Result<()> {
        let marker = &STORAGE_MARKER;
        module.visit_field(&FieldDecl::new(
            marker.field_access,
            marker.field_name,
            marker.field_desc,
        ))?;
        let decl = MethodDecl::new(marker.accessor_access, marker.accessor_name, marker.accessor_desc);
        let Some(mut mv) = module.visit_method(&decl)? else {
            debug!(module = %self.module_name, "sink elided probe accessor");
            return Ok(());
        };
        self.emit_accessor(mv.as_mut(), probe_count)?;
        debug!(
            module = %self.module_name,
            probe_count,
            field = marker.field_name,
            accessor = marker.accessor_name,
            "declared probe storage"
        );
        Ok(())
    }
}

/// Direct runtime request in every method, sized by a placeholder count.
///
/// The real count is unknown while method bodies are emitted, so arrays are
/// requested with the placeholder. A module with more probes than the
/// placeholder gets an undersized array.
pub struct InterfaceTypeStrategy {
    module_name: String,
    id: ModuleId,
    generator: Arc<dyn AccessorGenerator>,
    placeholder: usize,
}

impl fmt::Debug for InterfaceTypeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceTypeStrategy")
            .field("module_name", &self.module_name)
            .field("id", &self.id)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

impl InterfaceTypeStrategy {
    #[must_use]
    pub fn new(
        module_name: impl Into<String>,
        id: ModuleId,
        generator: Arc<dyn AccessorGenerator>,
        placeholder: usize,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            id,
            generator,
            placeholder,
        }
    }
}

impl ProbeArrayStrategy for InterfaceTypeStrategy {
    fn acquire_array(&self, mv: &mut dyn MethodVisitor) -> Result<usize> {
        self.generator
            .generate(self.id, &self.module_name, self.placeholder, mv)
    }

    fn declare_storage(&self, _module: &mut dyn ModuleVisitor, probe_count: usize) -> Result<()> {
        if probe_count > self.placeholder {
            warn!(
                module = %self.module_name,
                probe_count,
                placeholder = self.placeholder,
                "interface has more probes than its placeholder array holds"
            );
        }
        Ok(())
    }
}
