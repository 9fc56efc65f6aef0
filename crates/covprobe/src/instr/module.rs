//! Module-level instrumentation.

use super::method::MethodInstrumenter;
use super::strategy::{strategy_for, ModuleKind, ProbeArrayStrategy};
use crate::bytecode::visitor::{
    FieldDecl, MethodDecl, ModuleHeader, ModuleVisitor, ProbeMethodVisitor, ProbeModuleVisitor,
};
use crate::config::DEFAULT_INTERFACE_PROBE_COUNT;
use crate::error::{InstrError, Result};
use crate::marker::STORAGE_MARKER;
use crate::runtime::{AccessorGenerator, ModuleId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Visitation progress of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingHeader,
    /// Header seen; fields and methods may follow
    Members,
    /// Total probe count reported and storage declared
    Counted,
    Ended,
    /// A reserved member was found; nothing more is accepted
    Aborted,
}

/// Instruments one module on its way to the next visitor.
///
/// Declarations are forwarded unchanged. Method bodies are wrapped so region
/// markers become probe stores, and once the total probe count arrives the
/// probe storage members are appended.
///
/// Events must arrive as header, members, total probe count, end. A module
/// that already declares a reserved member is rejected eagerly with
/// [`InstrError::AlreadyInstrumented`], and the instrumenter refuses all
/// further events.
pub struct ModuleInstrumenter<V> {
    id: ModuleId,
    generator: Arc<dyn AccessorGenerator>,
    interface_probe_count: usize,
    next: V,
    strategy: Option<Box<dyn ProbeArrayStrategy>>,
    module_name: Option<String>,
    kind: Option<ModuleKind>,
    phase: Phase,
}

impl<V: fmt::Debug> fmt::Debug for ModuleInstrumenter<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstrumenter")
            .field("id", &self.id)
            .field("module_name", &self.module_name)
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl<V: ModuleVisitor> ModuleInstrumenter<V> {
    /// Instrument the module identified by `id`, emitting into `next`.
    pub fn new(id: ModuleId, generator: Arc<dyn AccessorGenerator>, next: V) -> Self {
        Self {
            id,
            generator,
            interface_probe_count: DEFAULT_INTERFACE_PROBE_COUNT,
            next,
            strategy: None,
            module_name: None,
            kind: None,
            phase: Phase::AwaitingHeader,
        }
    }

    /// Override the placeholder probe count for interface modules; 0 keeps
    /// the default.
    #[must_use]
    pub fn with_interface_probe_count(mut self, count: usize) -> Self {
        if count > 0 {
            self.interface_probe_count = count;
        }
        self
    }

    /// Module name from the header, once seen.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// Module kind from the header, once seen.
    #[must_use]
    pub const fn kind(&self) -> Option<ModuleKind> {
        self.kind
    }

    /// Whether the module was rejected as already instrumented.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    /// The downstream visitor.
    #[must_use]
    pub const fn next(&self) -> &V {
        &self.next
    }

    /// Consume the instrumenter, returning the downstream visitor.
    pub fn into_inner(self) -> V {
        self.next
    }

    fn expect_phase(&self, expected: Phase, event: &str) -> Result<()> {
        if self.phase == expected {
            return Ok(());
        }
        let state = match self.phase {
            Phase::AwaitingHeader => "before the header",
            Phase::Members => "while members are open",
            Phase::Counted => "after the total probe count",
            Phase::Ended => "after visit_end",
            Phase::Aborted => "after the module was rejected",
        };
        Err(InstrError::protocol(format!("{event} reported {state}")))
    }

    /// Reject `member` when `reserved` says it collides with a storage member.
    fn guard(&mut self, member: &str, reserved: bool) -> Result<()> {
        if !reserved {
            return Ok(());
        }
        self.phase = Phase::Aborted;
        let module = self.module_name.clone().unwrap_or_default();
        debug!(module = %module, member, "reserved member present, module already instrumented");
        Err(InstrError::AlreadyInstrumented { module })
    }
}

impl<V: ModuleVisitor> ProbeModuleVisitor for ModuleInstrumenter<V> {
    fn visit_header(&mut self, header: &ModuleHeader) -> Result<()> {
        self.expect_phase(Phase::AwaitingHeader, "header")?;
        let kind = ModuleKind::of(header.access);
        debug!(module = %header.name, %kind, id = %self.id, "selected probe storage strategy");
        self.strategy = Some(strategy_for(
            kind,
            &header.name,
            self.id,
            Arc::clone(&self.generator),
            self.interface_probe_count,
        ));
        self.module_name = Some(header.name.clone());
        self.kind = Some(kind);
        self.phase = Phase::Members;
        self.next.visit_header(header)
    }

    fn visit_field(&mut self, field: &FieldDecl) -> Result<()> {
        self.expect_phase(Phase::Members, "field")?;
        self.guard(&field.name, STORAGE_MARKER.is_field(&field.name))?;
        self.next.visit_field(field)
    }

    fn visit_method(
        &mut self,
        method: &MethodDecl,
    ) -> Result<Option<Box<dyn ProbeMethodVisitor + '_>>> {
        self.expect_phase(Phase::Members, "method")?;
        self.guard(&method.name, STORAGE_MARKER.is_accessor(&method.name))?;
        let strategy = self
            .strategy
            .as_deref()
            .ok_or_else(|| InstrError::protocol("no probe storage strategy selected"))?;
        let Some(mv) = self.next.visit_method(method)? else {
            trace!(method = %method.name, "downstream elided method");
            return Ok(None);
        };
        let instrumenter = MethodInstrumenter::new(mv, method.access, &method.descriptor, strategy)?;
        Ok(Some(Box::new(instrumenter)))
    }

    fn visit_total_probe_count(&mut self, count: usize) -> Result<()> {
        self.expect_phase(Phase::Members, "total probe count")?;
        let strategy = self
            .strategy
            .as_deref()
            .ok_or_else(|| InstrError::protocol("no probe storage strategy selected"))?;
        strategy.declare_storage(&mut self.next, count)?;
        self.phase = Phase::Counted;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        self.expect_phase(Phase::Counted, "end")?;
        self.next.visit_end()?;
        self.phase = Phase::Ended;
        Ok(())
    }
}
