//! In-memory modules.
//!
//! [`ModuleNode`] holds a complete module; [`ModuleWriter`] is the terminal
//! sink of a visitor chain and records every event it receives into a new
//! `ModuleNode`. Replaying a node into a visitor reproduces the event
//! sequence it was built from.

use super::access::AccessFlags;
use super::frame::Frame;
use super::insn::{CodeElement, Insn, ProbeId};
use super::label::Label;
use super::visitor::{
    FieldDecl, MethodDecl, MethodVisitor, ModuleHeader, ModuleVisitor, ProbeMethodVisitor,
    ProbeModuleVisitor,
};
use crate::error::{InstrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A method and its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodNode {
    pub decl: MethodDecl,
    /// Whether the method has a code body (`visit_code` was reported)
    pub has_code: bool,
    pub body: Vec<CodeElement>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl MethodNode {
    /// Method without a body.
    #[must_use]
    pub fn bodyless(decl: MethodDecl) -> Self {
        Self {
            decl,
            has_code: false,
            body: Vec::new(),
            max_stack: 0,
            max_locals: 0,
        }
    }

    /// Method with the given body and limits.
    #[must_use]
    pub fn with_body(decl: MethodDecl, body: Vec<CodeElement>, max_stack: u16, max_locals: u16) -> Self {
        Self {
            decl,
            has_code: true,
            body,
            max_stack,
            max_locals,
        }
    }

    /// Instructions of the body, skipping labels, frames and probes.
    pub fn insns(&self) -> impl Iterator<Item = &Insn> {
        self.body.iter().filter_map(|el| match el {
            CodeElement::Insn(insn) => Some(insn),
            _ => None,
        })
    }

    /// Frames of the body in order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.body.iter().filter_map(|el| match el {
            CodeElement::Frame(frame) => Some(frame),
            _ => None,
        })
    }

    /// Number of region markers in the body.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.body
            .iter()
            .filter(|el| matches!(el, CodeElement::Probe(_)))
            .count()
    }

    /// Replay into a plain method sink. Probe markers are rejected.
    pub fn accept(&self, mv: &mut dyn MethodVisitor) -> Result<()> {
        if self.has_code {
            mv.visit_code()?;
            for element in &self.body {
                if let CodeElement::Probe(probe) = element {
                    return Err(InstrError::protocol(format!(
                        "probe {} in {} replayed into a sink without probe support",
                        probe.as_u32(),
                        self.decl.name
                    )));
                }
                replay_element(element, mv)?;
            }
            mv.visit_maxs(self.max_stack, self.max_locals)?;
        }
        mv.visit_end()
    }

    /// Replay into a probe-aware method sink.
    pub fn accept_probes(&self, mv: &mut dyn ProbeMethodVisitor) -> Result<()> {
        if self.has_code {
            mv.visit_code()?;
            for element in &self.body {
                if let CodeElement::Probe(probe) = element {
                    mv.visit_probe(*probe)?;
                } else {
                    replay_element(element, mv)?;
                }
            }
            mv.visit_maxs(self.max_stack, self.max_locals)?;
        }
        mv.visit_end()
    }
}

fn replay_element<M: MethodVisitor + ?Sized>(element: &CodeElement, mv: &mut M) -> Result<()> {
    match element {
        CodeElement::Insn(insn) => mv.visit_insn(insn.clone()),
        CodeElement::Label(label) => mv.visit_label(*label),
        CodeElement::Frame(frame) => mv.visit_frame(frame.clone()),
        CodeElement::Probe(_) => Ok(()),
    }
}

/// A complete module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub header: ModuleHeader,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodNode>,
}

impl ModuleNode {
    /// Module with the given header and no members.
    #[must_use]
    pub fn new(header: ModuleHeader) -> Self {
        Self {
            header,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Qualified module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// First field with the given name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First method with the given name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.decl.name == name)
    }

    /// Method with the given name and descriptor.
    #[must_use]
    pub fn method_with_desc(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.decl.name == name && m.decl.descriptor == desc)
    }

    /// Total number of region markers across all methods.
    #[must_use]
    pub fn probe_count(&self) -> usize {
        self.methods.iter().map(MethodNode::probe_count).sum()
    }

    /// Replay into a plain module sink.
    pub fn accept(&self, visitor: &mut dyn ModuleVisitor) -> Result<()> {
        visitor.visit_header(&self.header)?;
        for field in &self.fields {
            visitor.visit_field(field)?;
        }
        for method in &self.methods {
            if let Some(mut mv) = visitor.visit_method(&method.decl)? {
                method.accept(mv.as_mut())?;
            }
        }
        visitor.visit_end()
    }

    /// Replay into a probe-aware module sink, reporting the total probe count
    /// after the last method.
    pub fn accept_probes(&self, visitor: &mut dyn ProbeModuleVisitor) -> Result<()> {
        visitor.visit_header(&self.header)?;
        for field in &self.fields {
            visitor.visit_field(field)?;
        }
        for method in &self.methods {
            if let Some(mut mv) = visitor.visit_method(&method.decl)? {
                method.accept_probes(mv.as_mut())?;
            }
        }
        visitor.visit_total_probe_count(self.probe_count())?;
        visitor.visit_end()
    }
}

/// Predicate selecting methods a [`ModuleWriter`] drops.
pub type ElideFn = Box<dyn Fn(&MethodDecl) -> bool + Send + Sync>;

/// Terminal sink recording events into a [`ModuleNode`].
pub struct ModuleWriter {
    header: Option<ModuleHeader>,
    fields: Vec<FieldDecl>,
    methods: Vec<MethodNode>,
    elide: Option<ElideFn>,
    ended: bool,
}

impl fmt::Debug for ModuleWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleWriter")
            .field("header", &self.header)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .field("eliding", &self.elide.is_some())
            .field("ended", &self.ended)
            .finish()
    }
}

impl Default for ModuleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleWriter {
    /// Create a writer that records every method.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: None,
            fields: Vec::new(),
            methods: Vec::new(),
            elide: None,
            ended: false,
        }
    }

    /// Create a writer that drops every method matching `predicate`.
    #[must_use]
    pub fn eliding(predicate: impl Fn(&MethodDecl) -> bool + Send + Sync + 'static) -> Self {
        Self {
            elide: Some(Box::new(predicate)),
            ..Self::new()
        }
    }

    /// Recorded methods so far.
    #[must_use]
    pub fn methods(&self) -> &[MethodNode] {
        &self.methods
    }

    /// Recorded fields so far.
    #[must_use]
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// The completed module.
    pub fn finish(self) -> Result<ModuleNode> {
        let header = self
            .header
            .ok_or_else(|| InstrError::protocol("module finished without a header"))?;
        if !self.ended {
            return Err(InstrError::protocol(format!(
                "module {} finished before visit_end",
                header.name
            )));
        }
        Ok(ModuleNode {
            header,
            fields: self.fields,
            methods: self.methods,
        })
    }
}

impl ModuleVisitor for ModuleWriter {
    fn visit_header(&mut self, header: &ModuleHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(InstrError::protocol("header reported twice"));
        }
        self.header = Some(header.clone());
        Ok(())
    }

    fn visit_field(&mut self, field: &FieldDecl) -> Result<()> {
        self.fields.push(field.clone());
        Ok(())
    }

    fn visit_method(&mut self, method: &MethodDecl) -> Result<Option<Box<dyn MethodVisitor + '_>>> {
        if self.elide.as_ref().is_some_and(|elide| elide(method)) {
            return Ok(None);
        }
        Ok(Some(Box::new(MethodWriter {
            methods: &mut self.methods,
            node: Some(MethodNode::bodyless(method.clone())),
        })))
    }

    fn visit_end(&mut self) -> Result<()> {
        self.ended = true;
        Ok(())
    }
}

/// Records one method; the node is committed on `visit_end`.
#[derive(Debug)]
struct MethodWriter<'a> {
    methods: &'a mut Vec<MethodNode>,
    node: Option<MethodNode>,
}

impl MethodWriter<'_> {
    fn node(&mut self) -> Result<&mut MethodNode> {
        self.node
            .as_mut()
            .ok_or_else(|| InstrError::protocol("method event after visit_end"))
    }

    fn push(&mut self, element: CodeElement) -> Result<()> {
        self.node()?.body.push(element);
        Ok(())
    }
}

impl MethodVisitor for MethodWriter<'_> {
    fn visit_code(&mut self) -> Result<()> {
        self.node()?.has_code = true;
        Ok(())
    }

    fn visit_insn(&mut self, insn: Insn) -> Result<()> {
        self.push(CodeElement::Insn(insn))
    }

    fn visit_label(&mut self, label: Label) -> Result<()> {
        self.push(CodeElement::Label(label))
    }

    fn visit_frame(&mut self, frame: Frame) -> Result<()> {
        self.push(CodeElement::Frame(frame))
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<()> {
        let node = self.node()?;
        node.max_stack = max_stack;
        node.max_locals = max_locals;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<()> {
        let node = self
            .node
            .take()
            .ok_or_else(|| InstrError::protocol("visit_end reported twice"))?;
        self.methods.push(node);
        Ok(())
    }
}

impl ProbeMethodVisitor for MethodWriter<'_> {
    fn visit_probe(&mut self, probe: ProbeId) -> Result<()> {
        self.push(CodeElement::Probe(probe))
    }
}

/// Module with the given header, fields and methods.
///
/// Shorthand used by tests and benchmarks to build inputs.
#[must_use]
pub fn module(header: ModuleHeader, fields: Vec<FieldDecl>, methods: Vec<MethodNode>) -> ModuleNode {
    ModuleNode {
        header,
        fields,
        methods,
    }
}

/// Public static method `name` with the given body.
#[must_use]
pub fn static_method(
    name: &str,
    desc: &str,
    body: Vec<CodeElement>,
    max_stack: u16,
    max_locals: u16,
) -> MethodNode {
    MethodNode::with_body(
        MethodDecl::new(AccessFlags::PUBLIC | AccessFlags::STATIC, name, desc),
        body,
        max_stack,
        max_locals,
    )
}
