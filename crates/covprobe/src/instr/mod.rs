//! Coverage instrumentation.
//!
//! [`ModuleInstrumenter`] drives one module through the visitor chain,
//! selecting a [`ProbeArrayStrategy`] from the module header and wrapping
//! every method in a [`MethodInstrumenter`].

mod method;
mod module;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use method::MethodInstrumenter;
pub use module::ModuleInstrumenter;
pub use strategy::{ClassTypeStrategy, InterfaceTypeStrategy, ModuleKind, ProbeArrayStrategy};
