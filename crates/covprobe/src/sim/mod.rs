//! Execution simulator.
//!
//! Interprets instrumented modules against a simulated runtime registry so
//! the injected code can be exercised without a real virtual machine.

mod error;
mod heap;
mod machine;
mod registry;

pub use error::{ExecError, ExecResult};
pub use heap::{ArrayKind, ArrayRef, Heap, Value};
pub use machine::{Machine, Step, Thread, DEFAULT_STEP_LIMIT};
pub use registry::{ProbeRegistry, ProbeRequest, RegistryMode};
