//! Simulated runtime registry handing out probe arrays.

use super::error::ExecResult;
use super::heap::{ArrayKind, ArrayRef, Heap};
use crate::runtime::ModuleId;
use std::collections::HashMap;
use tracing::trace;

/// How repeated requests for the same module are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryMode {
    /// One array per module id for the registry's lifetime
    #[default]
    Deduplicating,
    /// A new array on every request
    FreshPerCall,
}

/// One request received by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub id: ModuleId,
    pub module_name: String,
    pub probe_count: i32,
}

/// Probe array registry keyed by module id.
#[derive(Debug, Default)]
pub struct ProbeRegistry {
    mode: RegistryMode,
    arrays: HashMap<ModuleId, ArrayRef>,
    requests: Vec<ProbeRequest>,
    allocations: usize,
}

impl ProbeRegistry {
    #[must_use]
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Answer a request, allocating on the heap when needed.
    pub fn get_probes(
        &mut self,
        heap: &mut Heap,
        id: ModuleId,
        module_name: &str,
        probe_count: i32,
    ) -> ExecResult<ArrayRef> {
        self.requests.push(ProbeRequest {
            id,
            module_name: module_name.to_string(),
            probe_count,
        });
        if self.mode == RegistryMode::Deduplicating {
            if let Some(&existing) = self.arrays.get(&id) {
                return Ok(existing);
            }
        }
        let array = heap.alloc(ArrayKind::Boolean, probe_count)?;
        self.allocations += 1;
        self.arrays.insert(id, array);
        trace!(module = module_name, %id, probe_count, "allocated probe array");
        Ok(array)
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> &[ProbeRequest] {
        &self.requests
    }

    /// Number of arrays allocated.
    #[must_use]
    pub const fn allocations(&self) -> usize {
        self.allocations
    }

    /// Most recently allocated array for `id`.
    #[must_use]
    pub fn array_for(&self, id: ModuleId) -> Option<ArrayRef> {
        self.arrays.get(&id).copied()
    }
}
