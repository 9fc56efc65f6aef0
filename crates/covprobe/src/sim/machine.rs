//! Step-wise interpreter over in-memory modules.
//!
//! A [`Machine`] owns the heap and registry; a [`Thread`] owns a call stack.
//! Threads advance one instruction per [`Machine::step`], so tests can
//! interleave several threads over one heap at instruction granularity and
//! reproduce unsynchronised check-then-store sequences deterministically.

use super::error::{ExecError, ExecResult};
use super::heap::{ArrayKind, ArrayRef, Heap, Value};
use super::registry::ProbeRegistry;
use crate::bytecode::descriptor::MethodDescriptor;
use crate::bytecode::insn::{CodeElement, Constant, Insn};
use crate::bytecode::label::Label;
use crate::bytecode::node::{MethodNode, ModuleNode};
use crate::bytecode::opcode::{Opcode, T_BOOLEAN, T_BYTE, T_INT};
use crate::config::RuntimeConfig;
use crate::runtime::{ModuleId, REGISTRY_DESC};
use std::collections::HashMap;

/// Instructions one thread may execute before [`Machine::run`] gives up.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Running,
    /// The thread's entry method returned
    Returned(Option<Value>),
}

#[derive(Debug)]
struct Activation<'m> {
    owner: &'m str,
    method: &'m MethodNode,
    insns: Vec<&'m Insn>,
    labels: HashMap<Label, usize>,
    pc: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'m> Activation<'m> {
    fn new(owner: &'m str, method: &'m MethodNode, args: Vec<Value>) -> ExecResult<Self> {
        let mut insns = Vec::new();
        let mut labels = HashMap::new();
        for element in &method.body {
            match element {
                CodeElement::Insn(insn) => insns.push(insn),
                CodeElement::Label(label) => {
                    labels.insert(*label, insns.len());
                }
                CodeElement::Frame(_) => {}
                CodeElement::Probe(_) => {
                    return Err(ExecError::UnloweredProbe {
                        method: qualified(owner, method),
                    })
                }
            }
        }
        let max_locals = usize::from(method.max_locals);
        let mut locals = vec![Value::Null; max_locals];
        let mut slot = 0;
        for arg in args {
            let width = arg.slots();
            if slot + width > max_locals {
                return Err(ExecError::LocalOutOfRange {
                    method: qualified(owner, method),
                    var: slot + width - 1,
                    max: max_locals,
                });
            }
            locals[slot] = arg;
            slot += width;
        }
        Ok(Self {
            owner,
            method,
            insns,
            labels,
            pc: 0,
            locals,
            stack: Vec::new(),
        })
    }

    fn name(&self) -> String {
        qualified(self.owner, self.method)
    }

    fn push(&mut self, value: Value) -> ExecResult<()> {
        self.stack.push(value);
        let depth: usize = self.stack.iter().map(Value::slots).sum();
        let max = usize::from(self.method.max_stack);
        if depth > max {
            return Err(ExecError::StackBoundExceeded {
                method: self.name(),
                depth,
                max,
            });
        }
        Ok(())
    }

    fn pop(&mut self) -> ExecResult<Value> {
        self.stack.pop().ok_or_else(|| ExecError::StackUnderflow {
            method: self.name(),
        })
    }

    fn pop_int(&mut self, insn: &Insn) -> ExecResult<i32> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            _ => Err(type_error(insn, "int")),
        }
    }

    fn pop_long(&mut self, insn: &Insn) -> ExecResult<i64> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            _ => Err(type_error(insn, "long")),
        }
    }

    fn pop_str(&mut self, insn: &Insn) -> ExecResult<String> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            _ => Err(type_error(insn, "string")),
        }
    }

    fn pop_array(&mut self, insn: &Insn) -> ExecResult<ArrayRef> {
        match self.pop()? {
            Value::Array(a) => Ok(a),
            Value::Null => Err(ExecError::NullPointer {
                insn: insn.to_string(),
            }),
            _ => Err(type_error(insn, "array")),
        }
    }

    fn pop_reference(&mut self, insn: &Insn) -> ExecResult<Value> {
        let value = self.pop()?;
        if is_reference(&value) {
            Ok(value)
        } else {
            Err(type_error(insn, "reference"))
        }
    }

    fn load(&self, var: u16) -> ExecResult<Value> {
        self.locals
            .get(usize::from(var))
            .cloned()
            .ok_or_else(|| ExecError::LocalOutOfRange {
                method: self.name(),
                var: usize::from(var),
                max: self.locals.len(),
            })
    }

    fn store(&mut self, var: u16, value: Value) -> ExecResult<()> {
        let slot = usize::from(var);
        let last = slot + value.slots() - 1;
        if last >= self.locals.len() {
            return Err(ExecError::LocalOutOfRange {
                method: self.name(),
                var: last,
                max: self.locals.len(),
            });
        }
        if value.slots() == 2 {
            self.locals[slot + 1] = Value::Null;
        }
        self.locals[slot] = value;
        Ok(())
    }

    fn jump(&mut self, label: Label) -> ExecResult<()> {
        self.pc = *self
            .labels
            .get(&label)
            .ok_or_else(|| ExecError::UnknownLabel {
                method: self.name(),
                label: label.to_string(),
            })?;
        Ok(())
    }
}

fn qualified(owner: &str, method: &MethodNode) -> String {
    format!("{owner}.{}{}", method.decl.name, method.decl.descriptor)
}

fn type_error(insn: &Insn, expected: &'static str) -> ExecError {
    ExecError::TypeError {
        insn: insn.to_string(),
        expected,
    }
}

fn unsupported(insn: &Insn) -> ExecError {
    ExecError::Unsupported {
        insn: insn.to_string(),
    }
}

const fn is_reference(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Str(_) | Value::Array(_))
}

/// A call stack executing on a [`Machine`].
#[derive(Debug)]
pub struct Thread<'m> {
    frames: Vec<Activation<'m>>,
    result: Option<Option<Value>>,
    steps: usize,
}

impl Thread<'_> {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Return value of the entry method, once finished.
    #[must_use]
    pub fn result(&self) -> Option<&Option<Value>> {
        self.result.as_ref()
    }

    /// Current call depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Instructions executed so far.
    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }
}

enum Effect<'m> {
    Next,
    Call(Activation<'m>),
    Return(Option<Value>),
}

/// Heap, registry and loaded modules.
#[derive(Debug)]
pub struct Machine<'m> {
    modules: HashMap<&'m str, &'m ModuleNode>,
    heap: Heap,
    registry: ProbeRegistry,
    runtime: RuntimeConfig,
    step_limit: usize,
}

impl<'m> Machine<'m> {
    /// Machine answering registry calls described by `runtime`.
    #[must_use]
    pub fn new(runtime: RuntimeConfig, registry: ProbeRegistry) -> Self {
        Self {
            modules: HashMap::new(),
            heap: Heap::new(),
            registry,
            runtime,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Make a module's methods and fields available.
    pub fn load(&mut self, module: &'m ModuleNode) {
        self.modules.insert(module.name(), module);
    }

    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[must_use]
    pub const fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Start a thread at the given method. `args` include any receiver.
    pub fn spawn(&self, owner: &str, name: &str, desc: &str, args: Vec<Value>) -> ExecResult<Thread<'m>> {
        let (owner, method) = self.find(owner, name, desc)?;
        Ok(Thread {
            frames: vec![Activation::new(owner, method, args)?],
            result: None,
            steps: 0,
        })
    }

    /// Run a thread to completion.
    pub fn run(&mut self, thread: &mut Thread<'m>) -> ExecResult<Option<Value>> {
        loop {
            if thread.steps >= self.step_limit {
                return Err(ExecError::StepLimit {
                    steps: self.step_limit,
                });
            }
            if let Step::Returned(value) = self.step(thread)? {
                return Ok(value);
            }
        }
    }

    /// Spawn and run a thread.
    pub fn invoke(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> ExecResult<Option<Value>> {
        let mut thread = self.spawn(owner, name, desc, args)?;
        self.run(&mut thread)
    }

    /// Execute one instruction of `thread`.
    pub fn step(&mut self, thread: &mut Thread<'m>) -> ExecResult<Step> {
        let frame = thread.frames.last_mut().ok_or(ExecError::Finished)?;
        let insn = frame
            .insns
            .get(frame.pc)
            .copied()
            .ok_or_else(|| ExecError::FellOffEnd {
                method: frame.name(),
            })?;
        frame.pc += 1;
        thread.steps += 1;
        match self.execute(frame, insn)? {
            Effect::Next => Ok(Step::Running),
            Effect::Call(callee) => {
                thread.frames.push(callee);
                Ok(Step::Running)
            }
            Effect::Return(value) => {
                thread.frames.pop();
                if let Some(caller) = thread.frames.last_mut() {
                    if let Some(v) = value {
                        caller.push(v)?;
                    }
                    Ok(Step::Running)
                } else {
                    thread.result = Some(value.clone());
                    Ok(Step::Returned(value))
                }
            }
        }
    }

    fn find(&self, owner: &str, name: &str, desc: &str) -> ExecResult<(&'m str, &'m MethodNode)> {
        let module = self
            .modules
            .get(owner)
            .copied()
            .ok_or_else(|| ExecError::NoSuchModule {
                name: owner.to_string(),
            })?;
        let method = module
            .method_with_desc(name, desc)
            .filter(|m| m.has_code)
            .ok_or_else(|| ExecError::NoSuchMethod {
                owner: owner.to_string(),
                name: name.to_string(),
                desc: desc.to_string(),
            })?;
        Ok((module.name(), method))
    }

    fn check_field(&self, owner: &str, name: &str) -> ExecResult<()> {
        self.modules
            .get(owner)
            .and_then(|m| m.field(name))
            .map(drop)
            .ok_or_else(|| ExecError::NoSuchField {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    fn is_registry_call(&self, owner: &str, name: &str, desc: &str) -> bool {
        owner == self.runtime.registry_class && name == self.runtime.method_name && desc == REGISTRY_DESC
    }

    fn execute(&mut self, frame: &mut Activation<'m>, insn: &'m Insn) -> ExecResult<Effect<'m>> {
        match insn {
            Insn::Simple(op) => return self.execute_simple(frame, *op, insn),
            Insn::Int { op, operand } => match op {
                Opcode::Bipush | Opcode::Sipush => frame.push(Value::Int(*operand))?,
                Opcode::Newarray => {
                    let kind = match *operand {
                        T_BOOLEAN => ArrayKind::Boolean,
                        T_BYTE => ArrayKind::Byte,
                        T_INT => ArrayKind::Int,
                        _ => return Err(unsupported(insn)),
                    };
                    let length = frame.pop_int(insn)?;
                    let array = self.heap.alloc(kind, length)?;
                    frame.push(Value::Array(array))?;
                }
                _ => return Err(unsupported(insn)),
            },
            Insn::Var { op, var } => match op {
                Opcode::Iload => match frame.load(*var)? {
                    v @ Value::Int(_) => frame.push(v)?,
                    _ => return Err(type_error(insn, "int")),
                },
                Opcode::Lload => match frame.load(*var)? {
                    v @ Value::Long(_) => frame.push(v)?,
                    _ => return Err(type_error(insn, "long")),
                },
                Opcode::Aload => {
                    let v = frame.load(*var)?;
                    if !is_reference(&v) {
                        return Err(type_error(insn, "reference"));
                    }
                    frame.push(v)?;
                }
                Opcode::Istore => {
                    let v = frame.pop_int(insn)?;
                    frame.store(*var, Value::Int(v))?;
                }
                Opcode::Lstore => {
                    let v = frame.pop_long(insn)?;
                    frame.store(*var, Value::Long(v))?;
                }
                Opcode::Astore => {
                    let v = frame.pop_reference(insn)?;
                    frame.store(*var, v)?;
                }
                _ => return Err(unsupported(insn)),
            },
            Insn::Iinc { var, delta } => match frame.load(*var)? {
                Value::Int(v) => frame.store(*var, Value::Int(v.wrapping_add(i32::from(*delta))))?,
                _ => return Err(type_error(insn, "int")),
            },
            Insn::Ldc(constant) => frame.push(match constant {
                Constant::Int(v) => Value::Int(*v),
                Constant::Long(v) => Value::Long(*v),
                Constant::Str(s) => Value::Str(s.clone()),
            })?,
            Insn::Jump { op, target } => {
                let taken = match op {
                    Opcode::Goto => true,
                    Opcode::Ifeq => frame.pop_int(insn)? == 0,
                    Opcode::Ifne => frame.pop_int(insn)? != 0,
                    Opcode::IfIcmplt | Opcode::IfIcmpge => {
                        let b = frame.pop_int(insn)?;
                        let a = frame.pop_int(insn)?;
                        if *op == Opcode::IfIcmplt {
                            a < b
                        } else {
                            a >= b
                        }
                    }
                    Opcode::Ifnull => frame.pop_reference(insn)? == Value::Null,
                    Opcode::Ifnonnull => frame.pop_reference(insn)? != Value::Null,
                    _ => return Err(unsupported(insn)),
                };
                if taken {
                    frame.jump(*target)?;
                }
            }
            Insn::Field {
                op,
                owner,
                name,
                desc,
            } => {
                self.check_field(owner, name)?;
                match op {
                    Opcode::Getstatic => frame.push(self.heap.get_static(owner, name, desc))?,
                    Opcode::Putstatic => {
                        let v = frame.pop()?;
                        self.heap.put_static(owner, name, v);
                    }
                    _ => return Err(unsupported(insn)),
                }
            }
            Insn::Method {
                op,
                owner,
                name,
                desc,
            } => {
                if *op != Opcode::Invokestatic {
                    return Err(unsupported(insn));
                }
                if self.is_registry_call(owner, name, desc) {
                    let count = frame.pop_int(insn)?;
                    let module_name = frame.pop_str(insn)?;
                    let id = frame.pop_long(insn)?;
                    let array = self.registry.get_probes(
                        &mut self.heap,
                        ModuleId::from_i64(id),
                        &module_name,
                        count,
                    )?;
                    frame.push(Value::Array(array))?;
                } else {
                    let (callee_owner, callee) = self.find(owner, name, desc)?;
                    let params = MethodDescriptor::parse(desc)
                        .map_err(|_| unsupported(insn))?
                        .params
                        .len();
                    let mut args = Vec::with_capacity(params);
                    for _ in 0..params {
                        args.push(frame.pop()?);
                    }
                    args.reverse();
                    return Ok(Effect::Call(Activation::new(callee_owner, callee, args)?));
                }
            }
        }
        Ok(Effect::Next)
    }

    fn execute_simple(
        &mut self,
        frame: &mut Activation<'m>,
        op: Opcode,
        insn: &Insn,
    ) -> ExecResult<Effect<'m>> {
        match op {
            Opcode::Nop => {}
            Opcode::AconstNull => frame.push(Value::Null)?,
            Opcode::Lconst0 => frame.push(Value::Long(0))?,
            Opcode::Lconst1 => frame.push(Value::Long(1))?,
            Opcode::Baload => {
                let index = frame.pop_int(insn)?;
                let array = frame.pop_array(insn)?;
                frame.push(Value::Int(self.heap.load(array, index)?))?;
            }
            Opcode::Bastore => {
                let value = frame.pop_int(insn)?;
                let index = frame.pop_int(insn)?;
                let array = frame.pop_array(insn)?;
                self.heap.store(array, index, value)?;
            }
            Opcode::Pop => {
                if frame.pop()?.slots() != 1 {
                    return Err(type_error(insn, "single-slot value"));
                }
            }
            Opcode::Pop2 => {
                if frame.pop()?.slots() == 1 {
                    frame.pop()?;
                }
            }
            Opcode::Dup => {
                let v = frame.pop()?;
                if v.slots() != 1 {
                    return Err(type_error(insn, "single-slot value"));
                }
                frame.push(v.clone())?;
                frame.push(v)?;
            }
            Opcode::Swap => {
                let a = frame.pop()?;
                let b = frame.pop()?;
                frame.push(a)?;
                frame.push(b)?;
            }
            Opcode::Iadd | Opcode::Isub | Opcode::Imul => {
                let b = frame.pop_int(insn)?;
                let a = frame.pop_int(insn)?;
                frame.push(Value::Int(match op {
                    Opcode::Iadd => a.wrapping_add(b),
                    Opcode::Isub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                }))?;
            }
            Opcode::Arraylength => {
                let array = frame.pop_array(insn)?;
                let length = i32::try_from(self.heap.length(array)).unwrap_or(i32::MAX);
                frame.push(Value::Int(length))?;
            }
            Opcode::Ireturn => return Ok(Effect::Return(Some(Value::Int(frame.pop_int(insn)?)))),
            Opcode::Lreturn => return Ok(Effect::Return(Some(Value::Long(frame.pop_long(insn)?)))),
            Opcode::Areturn => return Ok(Effect::Return(Some(frame.pop_reference(insn)?))),
            Opcode::Return => return Ok(Effect::Return(None)),
            other => match other.iconst_value() {
                Some(v) => frame.push(Value::Int(v))?,
                None => return Err(unsupported(insn)),
            },
        }
        Ok(Effect::Next)
    }
}
