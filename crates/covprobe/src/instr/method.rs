//! Per-method probe insertion.

use super::strategy::ProbeArrayStrategy;
use crate::bytecode::access::AccessFlags;
use crate::bytecode::descriptor::MethodDescriptor;
use crate::bytecode::frame::{Frame, VerificationType};
use crate::bytecode::insn::{Insn, ProbeId};
use crate::bytecode::label::Label;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::visitor::{MethodVisitor, ProbeMethodVisitor};
use crate::error::{InstrError, Result};
use crate::marker::STORAGE_MARKER;
use std::fmt;

/// Operand stack slots a probe store adds: array, index, value.
const PROBE_STACK: u16 = 3;

/// Lowers region markers into probe array stores.
///
/// On entry the method fetches the probe array into a fresh local placed
/// directly after the arguments; original locals at or above that slot move
/// up by one.
pub struct MethodInstrumenter<'a> {
    next: Box<dyn MethodVisitor + 'a>,
    strategy: &'a dyn ProbeArrayStrategy,
    variable: u16,
    acquire_size: usize,
}

impl fmt::Debug for MethodInstrumenter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInstrumenter")
            .field("variable", &self.variable)
            .field("acquire_size", &self.acquire_size)
            .finish_non_exhaustive()
    }
}

impl<'a> MethodInstrumenter<'a> {
    /// Bind to the downstream sink for a method with the given access flags
    /// and descriptor.
    pub fn new(
        next: Box<dyn MethodVisitor + 'a>,
        access: AccessFlags,
        descriptor: &str,
        strategy: &'a dyn ProbeArrayStrategy,
    ) -> Result<Self> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let receiver = usize::from(!access.is_static());
        let variable = u16::try_from(receiver + parsed.param_slots()).map_err(|_| {
            InstrError::InvalidDescriptor {
                descriptor: descriptor.to_string(),
            }
        })?;
        Ok(Self {
            next,
            strategy,
            variable,
            acquire_size: 0,
        })
    }

    fn shift(&self, var: u16) -> Result<u16> {
        if var < self.variable {
            return Ok(var);
        }
        var.checked_add(1)
            .ok_or_else(|| InstrError::protocol(format!("local {var} cannot be shifted")))
    }
}

impl MethodVisitor for MethodInstrumenter<'_> {
    fn visit_code(&mut self) -> Result<()> {
        self.next.visit_code()?;
        self.acquire_size = self.strategy.acquire_array(self.next.as_mut())?;
        self.next.var_insn(Opcode::Astore, self.variable)
    }

    fn visit_insn(&mut self, insn: Insn) -> Result<()> {
        let insn = match insn {
            Insn::Var { op, var } => Insn::Var {
                op,
                var: self.shift(var)?,
            },
            Insn::Iinc { var, delta } => Insn::Iinc {
                var: self.shift(var)?,
                delta,
            },
            other => other,
        };
        self.next.visit_insn(insn)
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.next.visit_label(label)
    }

    fn visit_frame(&mut self, mut frame: Frame) -> Result<()> {
        let slot = usize::from(self.variable);
        if !frame.insert_local(slot, VerificationType::object(STORAGE_MARKER.field_desc)) {
            return Err(InstrError::protocol(format!(
                "frame splits a two-slot local at probe slot {slot}"
            )));
        }
        self.next.visit_frame(frame)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
        let overflow = || InstrError::protocol("method limits overflow after instrumentation");
        let probe_stack = max_stack.checked_add(PROBE_STACK).ok_or_else(overflow)?;
        let acquire = u16::try_from(self.acquire_size).map_err(|_| overflow())?;
        let locals = max_locals.checked_add(1).ok_or_else(overflow)?;
        self.next.visit_maxs(probe_stack.max(acquire), locals)
    }

    fn visit_end(&mut self) -> Result<()> {
        self.next.visit_end()
    }
}

impl ProbeMethodVisitor for MethodInstrumenter<'_> {
    fn visit_probe(&mut self, probe: ProbeId) -> Result<()> {
        let index = i32::try_from(probe.as_u32())
            .map_err(|_| InstrError::protocol(format!("probe {} out of range", probe.as_u32())))?;
        self.next.var_insn(Opcode::Aload, self.variable)?;
        self.next.push_int(index)?;
        self.next.op(Opcode::Iconst1)?;
        self.next.op(Opcode::Bastore)
    }
}
