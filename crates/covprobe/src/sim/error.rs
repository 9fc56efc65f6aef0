//! Simulated execution errors.

use thiserror::Error;

/// Result type alias for simulated execution.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Failures raised by the simulator. Most correspond to a runtime exception
/// or a verifier check the real machine would perform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("No module {name} loaded")]
    NoSuchModule { name: String },

    #[error("No method {owner}.{name}{desc}")]
    NoSuchMethod {
        owner: String,
        name: String,
        desc: String,
    },

    #[error("No field {owner}.{name}")]
    NoSuchField { owner: String, name: String },

    #[error("Array index {index} out of bounds for length {length}")]
    ArrayIndexOutOfBounds { index: i32, length: usize },

    #[error("Negative array size {size}")]
    NegativeArraySize { size: i32 },

    #[error("Null reference at {insn}")]
    NullPointer { insn: String },

    #[error("Operand stack depth {depth} exceeds max_stack {max} in {method}")]
    StackBoundExceeded {
        method: String,
        depth: usize,
        max: usize,
    },

    #[error("Operand stack underflow in {method}")]
    StackUnderflow { method: String },

    #[error("Local {var} out of range (max_locals {max}) in {method}")]
    LocalOutOfRange {
        method: String,
        var: usize,
        max: usize,
    },

    #[error("Type error at {insn}: expected {expected}")]
    TypeError { insn: String, expected: &'static str },

    #[error("Unknown label {label} in {method}")]
    UnknownLabel { method: String, label: String },

    #[error("Execution fell off the end of {method}")]
    FellOffEnd { method: String },

    #[error("Probe marker left in {method}")]
    UnloweredProbe { method: String },

    #[error("Unsupported instruction {insn}")]
    Unsupported { insn: String },

    #[error("Step limit of {steps} reached")]
    StepLimit { steps: usize },

    #[error("Thread already finished")]
    Finished,
}
