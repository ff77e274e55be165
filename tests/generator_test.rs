//! End-to-end LIR generation tests.
//!
//! Methods are written in the textual tree IR, lowered through the generator, and the
//! resulting block programs, frame and session statistics are checked.

use bumpalo::Bump;
use hashbrown::HashMap;
use lirgen::access::{AccessOptions, AccessProtocol};
use lirgen::arch::{Architecture, ConventionKind, RegisterDesc, ResultRegisters, X64};
use lirgen::config::Config;
use lirgen::core::error::{Bailout, CompileError};
use lirgen::core::session::CompilationSession;
use lirgen::frame_map::Platform;
use lirgen::generator::LirGenerator;
use lirgen::hir::parse_method;
use lirgen::lir::{BasicType, BlockId, BlockProgram, BranchTarget, Opcode, Operand};

/// Counting loop that swaps a pair on every iteration: the back edge copies (a, b) := (b, a).
const SWAP_LOOP: &str = r#"
(method swap (params int int int) (returns int)
  (block 0 (goto 1))
  (block 1
    (phi %0 int (0 (param 0)) (2 %1))
    (phi %1 int (0 (param 1)) (2 %0))
    (phi %2 int (0 (param 2)) (2 %3))
    (if gt %2 (const int 0) 2 3))
  (block 2
    (let %3 (sub int %2 (const int 1)))
    (goto 1))
  (block 3 (return %0)))
"#;

fn opcodes(block: &BlockProgram) -> Vec<Opcode> {
    block.instructions().iter().map(|i| i.opcode()).collect()
}

fn x64() -> Platform<X64> {
    let platform = Platform::new();
    platform.initialize().unwrap();
    platform
}

#[test]
fn test_swap_loop_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(SWAP_LOOP).unwrap();

    let mut lir = generator.generate(&session, &method).unwrap();
    assert_eq!(lir.name(), "swap");
    assert_eq!(lir.blocks().len(), 4);

    let entry = lir.block(BlockId(0)).unwrap();
    assert_eq!(
        opcodes(entry),
        vec![
            Opcode::StdEntry,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Branch
        ]
    );
    assert_eq!(entry.instructions()[7].branch_target(), Some(&BranchTarget::Block(BlockId(1))));

    let header = lir.block(BlockId(1)).unwrap();
    assert_eq!(opcodes(header), vec![Opcode::Cmp, Opcode::Branch, Opcode::Branch]);
    assert_eq!(header.instructions()[1].branch_target(), Some(&BranchTarget::Block(BlockId(2))));
    assert_eq!(header.instructions()[2].branch_target(), Some(&BranchTarget::Block(BlockId(3))));

    // back edge: safepoint, then the swap needs one temporary
    let body = lir.block(BlockId(2)).unwrap();
    assert_eq!(
        opcodes(body),
        vec![
            Opcode::Sub,
            Opcode::Safepoint,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Move,
            Opcode::Branch
        ]
    );
    assert!(body.instructions()[1].info().is_some());

    // replay the back-edge copies and compare with a simultaneous assignment
    let phis = header_phis(entry, 3);
    let mut values: HashMap<Operand, Operand> = HashMap::new();
    for inst in &body.instructions()[2..6] {
        let src = inst.inputs()[0];
        let value = values.get(&src).copied().unwrap_or(src);
        values.insert(inst.result(), value);
    }
    assert_eq!(values[&phis[0]], phis[1]);
    assert_eq!(values[&phis[1]], phis[0]);
    assert_eq!(values[&phis[2]], body.instructions()[0].result());

    let exit = lir.block(BlockId(3)).unwrap();
    assert_eq!(opcodes(exit), vec![Opcode::Move, Opcode::Return]);
    let rax = platform.result_operand(BasicType::Int).unwrap();
    assert_eq!(exit.instructions()[0].result(), rax);
    assert_eq!(exit.instructions()[1].inputs()[0], rax);

    let stats = session.stats();
    assert_eq!(stats.methods_generated, 1);
    assert_eq!(stats.blocks_generated, 4);
    assert_eq!(stats.phi_moves, 7);
    assert_eq!(stats.cycle_temps, 1);
    assert_eq!(stats.instructions_generated, lir.instruction_count());

    let layout = lir.finalize_frame(0).unwrap();
    assert_eq!(layout.argcount, 3);
    assert!(lir.blocks().iter().all(BlockProgram::is_sealed));
    assert!(lir.to_string().contains("method swap"));
}

/// Phi registers of the loop header, found through the entry block's copies out of
/// the parameter registers.
fn header_phis(entry: &BlockProgram, params: usize) -> Vec<Operand> {
    let ops = entry.instructions();
    (1..=params)
        .map(|i| {
            let param = ops[i].result();
            ops[params + 1..]
                .iter()
                .find(|inst| inst.opcode() == Opcode::Move && inst.inputs()[0] == param)
                .map(|inst| inst.result())
                .unwrap()
        })
        .collect()
}

#[test]
fn test_call_grows_outgoing_area_and_copies_result() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(
        "(method caller (params int) (returns long)
           (block 0
             (let %0 (call static 0x1000 long
                        (int (param 0)) (int (param 0)) (int (param 0)) (int (param 0))
                        (int (param 0)) (int (param 0)) (int (param 0)) (int (param 0))))
             (return %0)))",
    )
    .unwrap();

    let mut lir = generator.generate(&session, &method).unwrap();
    assert_eq!(lir.frame_map().reserved_argument_area_size(), 16);

    let entry = lir.block(BlockId(0)).unwrap();
    let call = entry
        .instructions()
        .iter()
        .find(|i| i.opcode() == Opcode::StaticCall)
        .unwrap();
    assert_eq!(call.call_args().len(), 8);
    assert!(call.call_args()[5].is_register());
    assert_eq!(call.call_args()[6].as_address().unwrap().disp(), 0);
    assert_eq!(call.call_args()[7].as_address().unwrap().disp(), 8);
    assert!(call.info().is_some());

    let rax = platform.result_operand(BasicType::Long).unwrap();
    assert_eq!(call.result(), rax);

    let layout = lir.finalize_frame(2).unwrap();
    assert_eq!(layout.reserved_argument_area, 16);
    assert_eq!(layout.spill_count, 2);
}

#[test]
fn test_void_runtime_call_and_monitors() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(
        "(method locked (params object) (returns void) (monitors 1)
           (block 0
             (eval (call runtime monitorenter void (object (param 0))))
             (eval (call runtime monitorexit void (object (param 0))))
             (return)))",
    )
    .unwrap();

    let mut lir = generator.generate(&session, &method).unwrap();
    let entry = lir.block(BlockId(0)).unwrap();
    let calls: Vec<_> = entry
        .instructions()
        .iter()
        .filter(|i| i.opcode() == Opcode::RuntimeCall)
        .collect();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.result().is_illegal()));

    let layout = lir.finalize_frame(0).unwrap();
    assert_eq!(layout.monitor_count, 1);
    assert!(lir.frame_map().sp_offset_for_monitor_object(0).is_ok());
}

#[test]
fn test_stack_arguments_start_in_memory() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(
        "(method wide (params long long long long long long long) (returns long)
           (block 0 (return (param 6))))",
    )
    .unwrap();

    let lir = generator.generate(&session, &method).unwrap();
    let entry = lir.block(BlockId(0)).unwrap();
    let last_arg = &entry.instructions()[7];
    assert!(last_arg.inputs()[0].is_stack());

    let vreg = last_arg.result().vreg().unwrap();
    assert!(lir.vregs().info(vreg).unwrap().must_start_in_memory);
    let first = entry.instructions()[1].result().vreg().unwrap();
    assert!(!lir.vregs().info(first).unwrap().must_start_in_memory);
}

#[test]
fn test_division_carries_state_and_temp() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(
        "(method quot (params long long) (returns long)
           (block 0 (return (rem long (param 0) (param 1)))))",
    )
    .unwrap();

    let lir = generator.generate(&session, &method).unwrap();
    let irem = lir.block(BlockId(0)).unwrap().instructions()[3].clone();
    assert_eq!(irem.opcode(), Opcode::Irem);
    assert!(irem.info().is_some());
    assert!(irem.temps()[0].is_virtual());
}

#[test]
fn test_conditional_edge_into_join_is_rejected() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let method = parse_method(
        "(method f (params int) (returns int)
           (block 0 (if eq (param 0) (const int 0) 1 2))
           (block 1 (goto 2))
           (block 2
             (phi %0 int (0 (const int 1)) (1 (const int 2)))
             (return %0)))",
    )
    .unwrap();

    let err = generator.generate(&session, &method).err().unwrap();
    assert!(matches!(err, CompileError::Invariant { .. }));
    assert_eq!(session.stats().total_bailouts(), 0);
}

#[test]
fn test_undefined_value_and_bad_return_rejected() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let undefined = parse_method("(method f (params) (returns int) (block 0 (return %7)))").unwrap();
    assert!(generator.generate(&session, &undefined).is_err());

    let mismatch = parse_method("(method f (params) (returns int) (block 0 (return)))").unwrap();
    assert!(generator.generate(&session, &mismatch).is_err());

    // the generator stays usable after a failed method
    let fine = parse_method("(method f (params) (returns int) (block 0 (return (const int 3))))").unwrap();
    assert!(generator.generate(&session, &fine).is_ok());
    assert_eq!(session.stats().methods_generated, 1);
}

#[test]
fn test_phi_inputs_must_match_predecessors() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    // block 1 is only reached from block 0, but the phi names block 3 as well
    let extra = parse_method(
        "(method f (params int) (returns int)
           (block 0 (goto 1))
           (block 1
             (phi %0 int (0 (param 0)) (3 (const int 1)))
             (return %0)))",
    )
    .unwrap();
    let err = generator.generate(&session, &extra).err().unwrap();
    assert!(matches!(err, CompileError::Invariant { .. }));

    // right count, wrong predecessor
    let wrong = parse_method(
        "(method f (params int) (returns int)
           (block 0 (goto 1))
           (block 1
             (phi %0 int (2 (param 0)))
             (return %0)))",
    )
    .unwrap();
    assert!(matches!(generator.generate(&session, &wrong), Err(CompileError::Invariant { .. })));
    assert_eq!(session.stats().total_bailouts(), 0);
}

#[test]
fn test_atomics_without_a_lowering_bail_out() {
    let platform = x64();
    let mut generator = LirGenerator::new(&platform, &Config::default()).unwrap();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let float_cas = parse_method(
        "(method f (params object float float) (returns int)
           (block 0 (return (cas float (param 0) (const long 16) (param 1) (param 2)))))",
    )
    .unwrap();
    let err = generator.generate(&session, &float_cas).err().unwrap();
    assert!(matches!(err.as_bailout(), Some(Bailout::Unsupported { .. })));

    let byte_add = parse_method(
        "(method f (params object) (returns byte)
           (block 0 (return (xadd byte (param 0) (const long 16) (const int 1)))))",
    )
    .unwrap();
    assert!(generator.generate(&session, &byte_add).err().unwrap().is_bailout());

    let stats = session.stats();
    assert_eq!(stats.bailouts.get("unsupported"), Some(&2));
    assert_eq!(stats.methods_generated, 0);

    // word-sized atomics still lower
    let int_add = parse_method(
        "(method f (params object) (returns int)
           (block 0 (return (xadd int (param 0) (const long 16) (const int 1)))))",
    )
    .unwrap();
    let lir = generator.generate(&session, &int_add).unwrap();
    let entry = lir.block(BlockId(0)).unwrap();
    assert!(opcodes(entry).contains(&Opcode::Xadd));
}

/// x86-64 with a tiny virtual register budget.
#[derive(Debug, Default, Clone, Copy)]
struct Tiny;

impl Architecture for Tiny {
    const NAME: &'static str = "tiny";
    const WORD_SIZE: u32 = X64::WORD_SIZE;
    const STACK_ALIGNMENT: u32 = X64::STACK_ALIGNMENT;
    const OUT_PRESERVE_STACK_SLOTS: u32 = X64::OUT_PRESERVE_STACK_SLOTS;
    const FIRST_AVAILABLE_SP_IN_FRAME: u32 = X64::FIRST_AVAILABLE_SP_IN_FRAME;
    const FRAME_PAD_BYTES: u32 = X64::FRAME_PAD_BYTES;
    const LONGS_IN_REGISTER_PAIRS: bool = X64::LONGS_IN_REGISTER_PAIRS;
    const SUPPORT_IRIW: bool = X64::SUPPORT_IRIW;
    // 32 physical registers plus 40 virtual
    const MAX_VIRTUAL_REGISTERS: u32 = 72;

    fn registers() -> &'static [RegisterDesc] {
        X64::registers()
    }

    fn stack_pointer() -> u8 {
        X64::stack_pointer()
    }

    fn thread_register() -> u8 {
        X64::thread_register()
    }

    fn int_args(kind: ConventionKind) -> &'static [u8] {
        X64::int_args(kind)
    }

    fn float_args(kind: ConventionKind) -> &'static [u8] {
        X64::float_args(kind)
    }

    fn result_registers() -> ResultRegisters {
        X64::result_registers()
    }

    fn stack_slots_for(ty: BasicType, kind: ConventionKind) -> u32 {
        X64::stack_slots_for(ty, kind)
    }

    fn is_encodable_displacement(disp: i64) -> bool {
        X64::is_encodable_displacement(disp)
    }
}

#[test]
fn test_out_of_virtual_registers_bails_out() {
    let platform = Platform::<Tiny>::new();
    platform.initialize().unwrap();
    let config = Config::default();
    let mut generator = LirGenerator::with_access(
        &platform,
        AccessProtocol::from_config(&config),
        AccessOptions::for_arch::<Tiny>(config.compressed_oops),
    );
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    let mut text = String::from("(method chain (params int) (returns int) (block 0 (let %0 (param 0))");
    for i in 1..40 {
        text.push_str(&format!(" (let %{} (add int %{} (const int 1)))", i, i - 1));
    }
    text.push_str(" (return %39)))");
    let method = parse_method(&text).unwrap();

    let err = generator.generate(&session, &method).err().unwrap();
    assert_eq!(err.as_bailout(), Some(&Bailout::OutOfVirtualRegisters));
    assert!(err.is_bailout());

    let stats = session.stats();
    assert_eq!(stats.bailouts.get("out-of-vregs"), Some(&1));
    assert_eq!(stats.methods_generated, 0);
}

#[test]
fn test_generator_rejects_foreign_architecture_config() {
    let platform = x64();
    let config: Config = Config { arch: "arm64".parse().unwrap(), ..Config::default() };
    assert!(LirGenerator::new(&platform, &config).is_err());
}
