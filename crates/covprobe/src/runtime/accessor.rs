//! Code that obtains a module's probe array from the runtime.

use super::id::ModuleId;
use crate::bytecode::insn::Constant;
use crate::bytecode::opcode::Opcode;
use crate::bytecode::visitor::MethodVisitor;
use crate::config::RuntimeConfig;
use crate::error::{InstrError, Result};

/// Descriptor of the registry entry point: `(id, module name, probe count)`.
pub const REGISTRY_DESC: &str = "(JLjava/lang/String;I)[Z";

/// Emits the instruction sequence that yields a module's probe array.
///
/// Implementations must be shareable across threads so independent modules
/// can be instrumented in parallel.
pub trait AccessorGenerator: Send + Sync {
    /// Emit code into `mv` that leaves a `[Z` of length `probe_count` for
    /// module `id` on top of the operand stack.
    ///
    /// Returns the maximum operand stack depth the emitted code needs.
    fn generate(
        &self,
        id: ModuleId,
        module_name: &str,
        probe_count: usize,
        mv: &mut dyn MethodVisitor,
    ) -> Result<usize>;
}

/// Calls a static registry method keyed by module id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAccessGenerator {
    registry_class: String,
    method_name: String,
}

impl StaticAccessGenerator {
    #[must_use]
    pub fn new(registry_class: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            registry_class: registry_class.into(),
            method_name: method_name.into(),
        }
    }

    #[must_use]
    pub fn from_config(runtime: &RuntimeConfig) -> Self {
        Self::new(runtime.registry_class.clone(), runtime.method_name.clone())
    }

    #[must_use]
    pub fn registry_class(&self) -> &str {
        &self.registry_class
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl Default for StaticAccessGenerator {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl AccessorGenerator for StaticAccessGenerator {
    fn generate(
        &self,
        id: ModuleId,
        module_name: &str,
        probe_count: usize,
        mv: &mut dyn MethodVisitor,
    ) -> Result<usize> {
        let count = i32::try_from(probe_count).map_err(|_| InstrError::Accessor {
            message: format!("probe count {probe_count} of {module_name} does not fit an int"),
        })?;
        mv.ldc(Constant::Long(id.as_i64()))?;
        mv.ldc(Constant::Str(module_name.to_string()))?;
        mv.push_int(count)?;
        mv.method_insn(
            Opcode::Invokestatic,
            &self.registry_class,
            &self.method_name,
            REGISTRY_DESC,
        )?;
        // long id (2) + name + count
        Ok(4)
    }
}
