//! Runtime binding.
//!
//! Module identity, the code generator that asks the runtime registry for a
//! probe array, and a facade instrumenting whole modules.

mod accessor;
mod id;
mod instrumenter;

pub use accessor::{AccessorGenerator, StaticAccessGenerator, REGISTRY_DESC};
pub use id::ModuleId;
pub use instrumenter::Instrumenter;
