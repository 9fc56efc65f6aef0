//! covprobe: probe-based coverage instrumentation for bytecode modules
//!
//! Rewrites compiled modules (stack-based, verifier-checked code units laid
//! out like JVM class files) so that each records at runtime which of its
//! control-flow regions executed. Every module gets a boolean probe array,
//! one flag per region, and every region sets its flag when it runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────┐
//! │ region       │──►│ ModuleInstrumenter │──►│ ModuleWriter │
//! │ analysis     │   │  ├ strategy        │   │ (or any      │
//! │ (probes)     │   │  └ MethodInstr.    │   │  visitor)    │
//! └──────────────┘   └────────────────────┘   └──────────────┘
//!                             │
//!                             ▼
//!                     AccessorGenerator
//!                     (runtime registry call)
//! ```
//!
//! Concrete modules keep their array in a reserved static field behind a
//! lazily initialising accessor. Interface modules request the array from
//! the runtime in every method, sized by a placeholder count.
//!
//! # Example
//!
//! ```
//! use covprobe::bytecode::{CodeElement, Insn, ModuleHeader, Opcode, ProbeId};
//! use covprobe::bytecode::node::{module, static_method};
//! use covprobe::{Instrumenter, ModuleId};
//!
//! let input = module(
//!     ModuleHeader::concrete("Sample"),
//!     vec![],
//!     vec![static_method(
//!         "run",
//!         "()V",
//!         vec![
//!             CodeElement::Probe(ProbeId::new(0)),
//!             CodeElement::Insn(Insn::Simple(Opcode::Return)),
//!         ],
//!         0,
//!         0,
//!     )],
//! );
//! let output = Instrumenter::default()
//!     .instrument(ModuleId::new(1), &input)
//!     .unwrap();
//! assert!(output.field("$covprobeData").is_some());
//! assert!(output.method("$covprobeInit").is_some());
//! ```

// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod bytecode;
pub mod config;
pub mod error;
pub mod instr;
pub mod marker;
pub mod runtime;
pub mod sim;

pub use config::{InstrumentConfig, InstrumentConfigBuilder, RuntimeConfig};
pub use error::{InstrError, Result};
pub use instr::{
    ClassTypeStrategy, InterfaceTypeStrategy, MethodInstrumenter, ModuleInstrumenter, ModuleKind,
    ProbeArrayStrategy,
};
pub use marker::{StorageMarker, STORAGE_MARKER};
pub use runtime::{AccessorGenerator, Instrumenter, ModuleId, StaticAccessGenerator};
