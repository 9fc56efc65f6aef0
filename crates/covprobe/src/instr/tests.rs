//! Tests for module and method instrumentation.

#![allow(clippy::redundant_clone, clippy::similar_names)]

use super::*;
use crate::bytecode::access::AccessFlags;
use crate::bytecode::frame::{Frame, VerificationType};
use crate::bytecode::insn::{CodeElement, Insn, ProbeId};
use crate::bytecode::node::{module, static_method, MethodNode, ModuleNode, ModuleWriter};
use crate::bytecode::opcode::{Opcode, T_BOOLEAN};
use crate::bytecode::visitor::{
    FieldDecl, MethodDecl, MethodVisitor, ModuleHeader, ProbeMethodVisitor, ProbeModuleVisitor,
};
use crate::error::{InstrError, Result};
use crate::marker::STORAGE_MARKER;
use crate::runtime::{AccessorGenerator, ModuleId, StaticAccessGenerator};
use std::sync::{Arc, Mutex};

/// Creates the array inline and records every requested count.
#[derive(Debug, Default)]
struct RecordingGenerator {
    counts: Mutex<Vec<usize>>,
    size: usize,
}

impl RecordingGenerator {
    fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    fn counts(&self) -> Vec<usize> {
        self.counts.lock().unwrap().clone()
    }
}

impl AccessorGenerator for RecordingGenerator {
    fn generate(
        &self,
        _id: ModuleId,
        _module_name: &str,
        probe_count: usize,
        mv: &mut dyn MethodVisitor,
    ) -> Result<usize> {
        self.counts.lock().unwrap().push(probe_count);
        mv.push_int(i32::try_from(probe_count).unwrap())?;
        mv.visit_insn(Insn::Int {
            op: Opcode::Newarray,
            operand: T_BOOLEAN,
        })?;
        Ok(self.size.max(1))
    }
}

struct FailingGenerator;

impl AccessorGenerator for FailingGenerator {
    fn generate(
        &self,
        _id: ModuleId,
        module_name: &str,
        _probe_count: usize,
        _mv: &mut dyn MethodVisitor,
    ) -> Result<usize> {
        Err(InstrError::Accessor {
            message: format!("no runtime for {module_name}"),
        })
    }
}

fn insn(i: Insn) -> CodeElement {
    CodeElement::Insn(i)
}

fn op(o: Opcode) -> CodeElement {
    insn(Insn::Simple(o))
}

fn var(o: Opcode, v: u16) -> CodeElement {
    insn(Insn::Var { op: o, var: v })
}

fn probe(id: u32) -> CodeElement {
    CodeElement::Probe(ProbeId::new(id))
}

fn run_method(probes: u32) -> MethodNode {
    let mut body: Vec<CodeElement> = (0..probes).map(probe).collect();
    body.push(op(Opcode::Return));
    static_method("run", "()V", body, 0, 0)
}

fn sample(header: ModuleHeader, probes: u32) -> ModuleNode {
    module(
        header,
        vec![FieldDecl::new(AccessFlags::PRIVATE, "count", "I")],
        vec![run_method(probes)],
    )
}

fn instrument(node: &ModuleNode, generator: Arc<dyn AccessorGenerator>) -> Result<ModuleNode> {
    let mut instrumenter = ModuleInstrumenter::new(ModuleId::new(7), generator, ModuleWriter::new());
    node.accept_probes(&mut instrumenter)?;
    instrumenter.into_inner().finish()
}

fn accessor(node: &ModuleNode) -> &MethodNode {
    node.method(STORAGE_MARKER.accessor_name).unwrap()
}

mod strategy_selection_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concrete_header_selects_class_strategy() {
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(StaticAccessGenerator::default()),
            ModuleWriter::new(),
        );
        mi.visit_header(&ModuleHeader::concrete("Sample")).unwrap();
        assert_eq!(mi.kind(), Some(ModuleKind::Concrete));
        assert_eq!(mi.module_name(), Some("Sample"));
    }

    #[test]
    fn test_interface_header_selects_interface_strategy() {
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(StaticAccessGenerator::default()),
            ModuleWriter::new(),
        );
        mi.visit_header(&ModuleHeader::interface("Shape")).unwrap();
        assert_eq!(mi.kind(), Some(ModuleKind::Interface));
    }

    #[test]
    fn test_abstract_class_counts_as_concrete() {
        let mut header = ModuleHeader::concrete("Base");
        header.access |= AccessFlags::ABSTRACT;
        assert_eq!(ModuleKind::of(header.access), ModuleKind::Concrete);
    }

    #[test]
    fn test_header_forwarded_unchanged() {
        let mut header = ModuleHeader::concrete("org/example/Sample");
        header.interfaces.push("java/lang/Runnable".into());
        header.signature = Some("<T:Ljava/lang/Object;>".into());
        let input = module(header.clone(), vec![], vec![]);
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        assert_eq!(out.header, header);
    }
}

mod collision_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reserved_field_rejected() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 1);
        input.fields.push(FieldDecl::new(
            STORAGE_MARKER.field_access,
            STORAGE_MARKER.field_name,
            STORAGE_MARKER.field_desc,
        ));
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::new(),
        );
        let err = input.accept_probes(&mut mi).unwrap_err();
        assert!(err.is_already_instrumented());
        assert_eq!(err.to_string(), "Module Sample is already instrumented");
        assert!(mi.is_aborted());
        // only the field before the reserved one reached the sink
        assert_eq!(mi.next().fields().len(), 1);
        assert!(mi.next().methods().is_empty());
    }

    #[test]
    fn test_reserved_method_rejected() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 1);
        input.methods.push(static_method(
            STORAGE_MARKER.accessor_name,
            STORAGE_MARKER.accessor_desc,
            vec![op(Opcode::AconstNull), op(Opcode::Areturn)],
            1,
            0,
        ));
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::new(),
        );
        let err = input.accept_probes(&mut mi).unwrap_err();
        assert!(matches!(err, InstrError::AlreadyInstrumented { ref module } if module == "Sample"));
        assert_eq!(mi.next().methods().len(), 1);
        assert!(mi
            .next()
            .methods()
            .iter()
            .all(|m| m.decl.name != STORAGE_MARKER.accessor_name));
    }

    #[test]
    fn test_reserved_method_rejected_on_interface() {
        let mut input = sample(ModuleHeader::interface("Shape"), 0);
        input.methods.push(MethodNode::bodyless(MethodDecl::new(
            AccessFlags::STATIC,
            STORAGE_MARKER.accessor_name,
            STORAGE_MARKER.accessor_desc,
        )));
        let err = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap_err();
        assert!(err.is_already_instrumented());
    }

    #[test]
    fn test_events_after_abort_are_protocol_errors() {
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::new(),
        );
        mi.visit_header(&ModuleHeader::concrete("Sample")).unwrap();
        let reserved = FieldDecl::new(AccessFlags::STATIC, STORAGE_MARKER.field_name, "[Z");
        assert!(mi.visit_field(&reserved).unwrap_err().is_already_instrumented());
        let again = mi.visit_total_probe_count(1).unwrap_err();
        assert!(matches!(again, InstrError::Protocol { .. }));
        assert!(mi.visit_end().is_err());
    }

    #[test]
    fn test_accessor_name_on_field_is_not_a_collision() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 0);
        input.fields.push(FieldDecl::new(
            AccessFlags::PRIVATE,
            STORAGE_MARKER.accessor_name,
            "I",
        ));
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        assert!(out.field(STORAGE_MARKER.accessor_name).is_some());
    }
}

mod protocol_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fresh() -> ModuleInstrumenter<ModuleWriter> {
        ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::new(),
        )
    }

    #[test]
    fn test_member_before_header_rejected() {
        let mut mi = fresh();
        let err = mi
            .visit_field(&FieldDecl::new(AccessFlags::PRIVATE, "x", "I"))
            .unwrap_err();
        assert!(err.to_string().contains("before the header"));
    }

    #[test]
    fn test_header_twice_rejected() {
        let mut mi = fresh();
        mi.visit_header(&ModuleHeader::concrete("A")).unwrap();
        assert!(mi.visit_header(&ModuleHeader::concrete("A")).is_err());
    }

    #[test]
    fn test_total_count_twice_rejected() {
        let mut mi = fresh();
        mi.visit_header(&ModuleHeader::concrete("A")).unwrap();
        mi.visit_total_probe_count(2).unwrap();
        let err = mi.visit_total_probe_count(2).unwrap_err();
        assert!(matches!(err, InstrError::Protocol { .. }));
        assert_eq!(mi.next().fields().len(), 1, "storage declared once");
    }

    #[test]
    fn test_end_without_count_rejected() {
        let mut mi = fresh();
        mi.visit_header(&ModuleHeader::concrete("A")).unwrap();
        assert!(matches!(mi.visit_end(), Err(InstrError::Protocol { .. })));
    }

    #[test]
    fn test_method_after_count_rejected() {
        let mut mi = fresh();
        mi.visit_header(&ModuleHeader::concrete("A")).unwrap();
        mi.visit_total_probe_count(0).unwrap();
        let decl = MethodDecl::new(AccessFlags::STATIC, "late", "()V");
        assert!(mi.visit_method(&decl).is_err());
    }

    #[test]
    fn test_full_sequence_ends_sink() {
        let mut mi = fresh();
        mi.visit_header(&ModuleHeader::concrete("A")).unwrap();
        mi.visit_total_probe_count(0).unwrap();
        mi.visit_end().unwrap();
        assert!(mi.into_inner().finish().is_ok());
    }
}

mod class_strategy_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_storage_members_declared() {
        let out = instrument(
            &sample(ModuleHeader::concrete("Sample"), 3),
            Arc::new(RecordingGenerator::default()),
        )
        .unwrap();
        let reserved: Vec<_> = out
            .fields
            .iter()
            .filter(|f| f.name == STORAGE_MARKER.field_name)
            .collect();
        assert_eq!(reserved.len(), 1);
        let field = reserved[0];
        assert_eq!(field.descriptor, "[Z");
        assert_eq!(field.access, STORAGE_MARKER.field_access);
        assert_eq!(field.value, None);

        let accessors: Vec<_> = out
            .methods
            .iter()
            .filter(|m| m.decl.name == STORAGE_MARKER.accessor_name)
            .collect();
        assert_eq!(accessors.len(), 1);
        assert_eq!(accessors[0].decl.access, STORAGE_MARKER.accessor_access);
        assert_eq!(accessors[0].decl.descriptor, "()[Z");
    }

    #[test]
    fn test_original_members_forwarded_first() {
        let input = sample(ModuleHeader::concrete("Sample"), 1);
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        assert_eq!(out.fields[0], input.fields[0]);
        assert_eq!(out.methods[0].decl, input.methods[0].decl);
        assert_eq!(out.fields.len(), 2);
        assert_eq!(out.methods.len(), 2);
    }

    #[test]
    fn test_accessor_body() {
        let generator = Arc::new(RecordingGenerator::default());
        let out = instrument(&sample(ModuleHeader::concrete("Sample"), 3), generator.clone()).unwrap();
        let init = accessor(&out);
        let CodeElement::Insn(Insn::Jump { target, .. }) = &init.body[2] else {
            panic!("expected branch at index 2, got {:?}", init.body[2]);
        };
        let field = |o| {
            insn(Insn::Field {
                op: o,
                owner: "Sample".into(),
                name: STORAGE_MARKER.field_name.into(),
                desc: "[Z".into(),
            })
        };
        assert_eq!(
            init.body,
            vec![
                field(Opcode::Getstatic),
                op(Opcode::Dup),
                insn(Insn::Jump {
                    op: Opcode::Ifnonnull,
                    target: *target,
                }),
                op(Opcode::Pop),
                op(Opcode::Iconst3),
                insn(Insn::Int {
                    op: Opcode::Newarray,
                    operand: T_BOOLEAN,
                }),
                op(Opcode::Dup),
                field(Opcode::Putstatic),
                CodeElement::Frame(Frame::new(vec![], vec![VerificationType::object("[Z")])),
                CodeElement::Label(*target),
                op(Opcode::Areturn),
            ]
        );
        assert_eq!((init.max_stack, init.max_locals), (2, 1));
        assert_eq!(generator.counts(), vec![3]);
    }

    #[test]
    fn test_accessor_stack_follows_generator() {
        let out = instrument(
            &sample(ModuleHeader::concrete("Sample"), 1),
            Arc::new(RecordingGenerator::with_size(6)),
        )
        .unwrap();
        assert_eq!(accessor(&out).max_stack, 6);
    }

    #[test]
    fn test_total_count_sums_all_methods() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 2);
        input.methods.push(static_method(
            "other",
            "()V",
            vec![probe(2), probe(3), probe(4), op(Opcode::Return)],
            0,
            0,
        ));
        let generator = Arc::new(RecordingGenerator::default());
        instrument(&input, generator.clone()).unwrap();
        assert_eq!(generator.counts(), vec![5]);
    }

    #[test]
    fn test_elided_accessor_tolerated() {
        let input = sample(ModuleHeader::concrete("Sample"), 1);
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::eliding(|m| m.name == STORAGE_MARKER.accessor_name),
        );
        input.accept_probes(&mut mi).unwrap();
        let out = mi.into_inner().finish().unwrap();
        assert!(out.field(STORAGE_MARKER.field_name).is_some());
        assert!(out.method(STORAGE_MARKER.accessor_name).is_none());
    }

    #[test]
    fn test_generator_failure_propagates() {
        let err = instrument(
            &sample(ModuleHeader::concrete("Sample"), 1),
            Arc::new(FailingGenerator),
        )
        .unwrap_err();
        assert!(matches!(err, InstrError::Accessor { ref message } if message.contains("Sample")));
    }
}

mod interface_strategy_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Log sink shared between the subscriber and the test body.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_no_storage_members() {
        let out = instrument(
            &sample(ModuleHeader::interface("Shape"), 3),
            Arc::new(RecordingGenerator::default()),
        )
        .unwrap();
        assert!(out.field(STORAGE_MARKER.field_name).is_none());
        assert!(out.method(STORAGE_MARKER.accessor_name).is_none());
        assert_eq!(out.fields.len(), 1);
    }

    #[test]
    fn test_acquire_uses_placeholder_before_count() {
        let generator = Arc::new(RecordingGenerator::default());
        let mut mi = ModuleInstrumenter::new(ModuleId::new(1), generator.clone(), ModuleWriter::new());
        mi.visit_header(&ModuleHeader::interface("Shape")).unwrap();
        {
            let decl = MethodDecl::new(AccessFlags::PUBLIC | AccessFlags::STATIC, "<clinit>", "()V");
            let mut mv = mi.visit_method(&decl).unwrap().unwrap();
            mv.visit_code().unwrap();
            mv.visit_probe(ProbeId::new(0)).unwrap();
            mv.op(Opcode::Return).unwrap();
            mv.visit_maxs(0, 0).unwrap();
            mv.visit_end().unwrap();
        }
        assert_eq!(generator.counts(), vec![64]);
        let emitted = &mi.next().methods()[0];
        assert_eq!(
            emitted.body[..3].to_vec(),
            vec![
                insn(Insn::Int {
                    op: Opcode::Bipush,
                    operand: 64,
                }),
                insn(Insn::Int {
                    op: Opcode::Newarray,
                    operand: T_BOOLEAN,
                }),
                var(Opcode::Astore, 0),
            ]
        );
    }

    #[test]
    fn test_configured_placeholder() {
        let generator = Arc::new(RecordingGenerator::default());
        let mut mi = ModuleInstrumenter::new(ModuleId::new(1), generator.clone(), ModuleWriter::new())
            .with_interface_probe_count(10);
        sample(ModuleHeader::interface("Shape"), 2)
            .accept_probes(&mut mi)
            .unwrap();
        assert_eq!(generator.counts(), vec![10]);
    }

    #[test]
    fn test_overflowing_count_still_succeeds() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let generator = Arc::new(RecordingGenerator::default());
        let out = tracing::subscriber::with_default(subscriber, || {
            instrument(&sample(ModuleHeader::interface("Shape"), 70), generator.clone())
        })
        .unwrap();
        assert_eq!(generator.counts(), vec![64]);
        assert_eq!(out.methods.len(), 1);

        let logged = logs.contents();
        assert!(logged.contains("WARN"), "no warning in {logged:?}");
        assert!(logged.contains("module=Shape"), "{logged:?}");
        assert!(logged.contains("probe_count=70"), "{logged:?}");
        assert!(logged.contains("placeholder=64"), "{logged:?}");
    }

    #[test]
    fn test_method_stack_covers_generator() {
        let out = instrument(
            &sample(ModuleHeader::interface("Shape"), 1),
            Arc::new(StaticAccessGenerator::default()),
        )
        .unwrap();
        // registry call needs 4, probe store needs 0 + 3
        assert_eq!(out.methods[0].max_stack, 4);
        assert_eq!(out.methods[0].max_locals, 1);
    }
}

mod method_instrumenter_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_static_method_lowering() {
        let out = instrument(
            &sample(ModuleHeader::concrete("Sample"), 1),
            Arc::new(RecordingGenerator::default()),
        )
        .unwrap();
        let run = out.method("run").unwrap();
        assert_eq!(
            run.body,
            vec![
                insn(Insn::Method {
                    op: Opcode::Invokestatic,
                    owner: "Sample".into(),
                    name: STORAGE_MARKER.accessor_name.into(),
                    desc: STORAGE_MARKER.accessor_desc.into(),
                }),
                var(Opcode::Astore, 0),
                var(Opcode::Aload, 0),
                op(Opcode::Iconst0),
                op(Opcode::Iconst1),
                op(Opcode::Bastore),
                op(Opcode::Return),
            ]
        );
        assert_eq!((run.max_stack, run.max_locals), (3, 1));
        assert_eq!(run.probe_count(), 0);
    }

    #[test]
    fn test_locals_after_arguments_shift() {
        let frame = Frame::new(
            vec![
                VerificationType::object("Sample"),
                VerificationType::Integer,
                VerificationType::Long,
                VerificationType::Integer,
            ],
            vec![],
        );
        let work = MethodNode::with_body(
            MethodDecl::new(AccessFlags::PUBLIC, "work", "(IJ)V"),
            vec![
                var(Opcode::Iload, 1),
                var(Opcode::Istore, 4),
                var(Opcode::Lload, 2),
                var(Opcode::Lstore, 5),
                insn(Insn::Iinc { var: 4, delta: 1 }),
                CodeElement::Frame(frame),
                op(Opcode::Return),
            ],
            2,
            7,
        );
        let input = module(ModuleHeader::concrete("Sample"), vec![], vec![work]);
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        let work = out.method("work").unwrap();
        assert_eq!(
            work.body,
            vec![
                insn(Insn::Method {
                    op: Opcode::Invokestatic,
                    owner: "Sample".into(),
                    name: STORAGE_MARKER.accessor_name.into(),
                    desc: STORAGE_MARKER.accessor_desc.into(),
                }),
                var(Opcode::Astore, 4),
                var(Opcode::Iload, 1),
                var(Opcode::Istore, 5),
                var(Opcode::Lload, 2),
                var(Opcode::Lstore, 6),
                insn(Insn::Iinc { var: 5, delta: 1 }),
                CodeElement::Frame(Frame::new(
                    vec![
                        VerificationType::object("Sample"),
                        VerificationType::Integer,
                        VerificationType::Long,
                        VerificationType::object("[Z"),
                        VerificationType::Integer,
                    ],
                    vec![],
                )),
                op(Opcode::Return),
            ]
        );
        assert_eq!((work.max_stack, work.max_locals), (5, 8));
    }

    #[test]
    fn test_large_probe_ids_use_wider_pushes() {
        let body = vec![probe(200), op(Opcode::Return)];
        let input = module(
            ModuleHeader::concrete("Sample"),
            vec![],
            vec![static_method("run", "()V", body, 0, 0)],
        );
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        assert_eq!(
            out.method("run").unwrap().body[3],
            insn(Insn::Int {
                op: Opcode::Sipush,
                operand: 200,
            })
        );
    }

    #[test]
    fn test_bodyless_methods_untouched() {
        let decl = MethodDecl::new(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "area", "()D");
        let mut header = ModuleHeader::concrete("Base");
        header.access |= AccessFlags::ABSTRACT;
        let input = module(header, vec![], vec![MethodNode::bodyless(decl.clone())]);
        let out = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap();
        assert_eq!(out.methods[0], MethodNode::bodyless(decl));
    }

    #[test]
    fn test_elided_method_skipped() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 1);
        input.methods.push(static_method("skip", "()V", vec![op(Opcode::Return)], 0, 0));
        let mut mi = ModuleInstrumenter::new(
            ModuleId::new(1),
            Arc::new(RecordingGenerator::default()),
            ModuleWriter::eliding(|m| m.name == "skip"),
        );
        mi.visit_header(&input.header).unwrap();
        assert!(mi.visit_method(&input.methods[1].decl).unwrap().is_none());
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let mut input = sample(ModuleHeader::concrete("Sample"), 0);
        input.methods[0].decl.descriptor = "(Q)V".into();
        let err = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap_err();
        assert!(matches!(err, InstrError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_frame_splitting_wide_argument_rejected() {
        // frame claims a long where the argument is an int
        let frame = Frame::new(vec![VerificationType::Long], vec![]);
        let input = module(
            ModuleHeader::concrete("Sample"),
            vec![],
            vec![static_method(
                "f",
                "(I)V",
                vec![CodeElement::Frame(frame), op(Opcode::Return)],
                0,
                1,
            )],
        );
        let err = instrument(&input, Arc::new(RecordingGenerator::default())).unwrap_err();
        assert!(matches!(err, InstrError::Protocol { .. }));
    }
}
