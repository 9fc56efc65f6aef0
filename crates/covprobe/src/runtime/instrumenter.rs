//! Whole-module instrumentation facade.

use super::accessor::{AccessorGenerator, StaticAccessGenerator};
use super::id::ModuleId;
use crate::bytecode::node::{ModuleNode, ModuleWriter};
use crate::config::InstrumentConfig;
use crate::error::Result;
use crate::instr::ModuleInstrumenter;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Instruments in-memory modules with a fixed configuration and generator.
///
/// Passes share nothing mutable, so one instance may serve many threads.
#[derive(Clone)]
pub struct Instrumenter {
    config: InstrumentConfig,
    generator: Arc<dyn AccessorGenerator>,
}

impl fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumenter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new(InstrumentConfig::default())
    }
}

impl Instrumenter {
    /// Use the static registry call described by `config.runtime`.
    #[must_use]
    pub fn new(config: InstrumentConfig) -> Self {
        let generator = Arc::new(StaticAccessGenerator::from_config(&config.runtime));
        Self { config, generator }
    }

    /// Use a custom accessor generator.
    #[must_use]
    pub fn with_generator(config: InstrumentConfig, generator: Arc<dyn AccessorGenerator>) -> Self {
        Self { config, generator }
    }

    #[must_use]
    pub const fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Instrument one module, returning the rewritten copy.
    pub fn instrument(&self, id: ModuleId, module: &ModuleNode) -> Result<ModuleNode> {
        let mut instrumenter =
            ModuleInstrumenter::new(id, Arc::clone(&self.generator), ModuleWriter::new())
                .with_interface_probe_count(self.config.interface_probe_count);
        module.accept_probes(&mut instrumenter)?;
        instrumenter.into_inner().finish()
    }

    /// Instrument each module independently; one failure does not stop the rest.
    pub fn instrument_all<'m, I>(&self, modules: I) -> Vec<Result<ModuleNode>>
    where
        I: IntoIterator<Item = (ModuleId, &'m ModuleNode)>,
    {
        let results: Vec<_> = modules
            .into_iter()
            .map(|(id, module)| self.instrument(id, module))
            .collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(total = results.len(), failed, "instrumented module batch");
        results
    }
}
