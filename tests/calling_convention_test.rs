//! Calling convention tests.
//!
//! Checks the convention layouts of the three targets: register assignment, register
//! pairs for longs on 32-bit PowerPC, gapless stack placement, and that a convention is
//! a pure function of its signature.

use hashbrown::HashSet;
use lirgen::arch::{Architecture, Arm64, ConventionKind, Ppc32, X64};
use lirgen::core::register_file::{PhysReg, RegisterTable};
use lirgen::frame_map::{compute_calling_convention, CallingConvention, Direction, FrameMap, Platform};
use lirgen::lir::{BasicType, RegId};
use proptest::prelude::*;

fn platform<A: Architecture>() -> Platform<A> {
    let platform = Platform::new();
    platform.initialize().unwrap();
    platform
}

fn table<A: Architecture>() -> RegisterTable {
    RegisterTable::build(A::NAME, A::registers()).unwrap()
}

/// Every register and every stack byte is used by at most one argument.
fn assert_disjoint<A: Architecture>(cc: &CallingConvention, signature: &[BasicType], kind: ConventionKind) {
    let mut registers = HashSet::new();
    let mut stack_bytes = HashSet::new();

    for (i, &ty) in signature.iter().enumerate() {
        let opr = cc.at(i).unwrap();
        match cc.stack_offset(i) {
            Some(offset) => {
                assert!(!opr.is_register(), "argument {} is both in a register and on the stack", i);
                let size = A::stack_slots_for(ty, kind) * A::STACK_SLOT_SIZE;
                for byte in offset..offset + size as i32 {
                    assert!(stack_bytes.insert(byte), "stack byte {} shared", byte);
                }
            }
            None => {
                let reg = opr.as_register().unwrap();
                let ids = match reg.id() {
                    RegId::Cpu(n) => vec![(0, n)],
                    RegId::CpuPair { lo, hi } => vec![(0, lo), (0, hi)],
                    RegId::Fpu(n) => vec![(1, n)],
                    RegId::Virtual(v) => panic!("virtual register {} in a convention", v),
                };
                for id in ids {
                    assert!(registers.insert(id), "register {:?} shared", id);
                }
            }
        }
    }
}

fn check_register_sets<A: Architecture>() {
    let table = table::<A>();
    for kind in [ConventionKind::Managed, ConventionKind::Native] {
        for &encoding in A::int_args(kind) {
            let reg = PhysReg::cpu(table.cpu_rnr(encoding).unwrap());
            assert!(table.caller_saved().contains(reg), "{}: argument register {} survives calls", A::NAME, encoding);
            assert!(table.allocatable().contains(reg));
        }
        for &encoding in A::float_args(kind) {
            let reg = PhysReg::fpu(table.fpu_rnr(encoding).unwrap());
            assert!(table.caller_saved().contains(reg));
        }
    }
    for encoding in [A::stack_pointer(), A::thread_register()] {
        let reg = PhysReg::cpu(table.cpu_rnr(encoding).unwrap());
        assert!(!table.allocatable().contains(reg), "{}: reserved register {} is allocatable", A::NAME, encoding);
    }
}

#[test]
fn test_argument_registers_are_caller_saved() {
    check_register_sets::<X64>();
    check_register_sets::<Arm64>();
    check_register_sets::<Ppc32>();
}

#[test]
fn test_int_long_on_register_pair_target() {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = table::<Ppc32>();
    let sig = [BasicType::Int, BasicType::Long];
    let cc = compute_calling_convention::<Ppc32>(&table, &sig, Direction::Outgoing, ConventionKind::Managed).unwrap();

    assert_eq!(cc.at(0).unwrap().as_register().unwrap().id(), RegId::Cpu(0));
    assert_eq!(cc.at(1).unwrap().as_register().unwrap().id(), RegId::CpuPair { lo: 1, hi: 2 });
    assert_eq!(cc.arg_slot(0), Some(0));
    assert_eq!(cc.arg_slot(1), Some(1));
    assert_eq!(cc.stack_offset(0), None);
    assert_eq!(cc.stack_offset(1), None);
    // only the preserved back chain and LR words
    assert_eq!(cc.reserved_stack_slots(), Ppc32::OUT_PRESERVE_STACK_SLOTS);
}

#[test]
fn test_twelve_ints_on_six_register_target() {
    let _ = env_logger::builder().is_test(true).try_init();

    let platform = platform::<X64>();
    let sig = vec![BasicType::Int; 12];
    let mut fm = FrameMap::new(&platform, &[]).unwrap();
    let cc = fm.outgoing_convention(&sig, ConventionKind::Managed).unwrap();

    for i in 0..6 {
        assert!(cc.at(i).unwrap().is_register(), "argument {} should be in a register", i);
    }
    let displacements: Vec<i32> = (6..12)
        .map(|i| cc.at(i).unwrap().as_address().unwrap().disp())
        .collect();
    assert_eq!(displacements, vec![0, 8, 16, 24, 32, 40]);

    // six words of outgoing arguments
    assert_eq!(fm.reserved_argument_area_size(), 6 * X64::WORD_SIZE);
}

#[test]
fn test_incoming_stack_arguments_are_slots() {
    let platform = platform::<X64>();
    let sig = vec![BasicType::Long; 8];
    let cc = platform.calling_convention(&sig, Direction::Incoming, ConventionKind::Managed).unwrap();

    assert!(cc.at(6).unwrap().is_stack());
    assert_eq!(cc.arg_slot(6), Some(12));
    assert_eq!(cc.stack_offset(6), Some(0));
    assert_eq!(cc.stack_offset(7), Some(8));
}

#[test]
fn test_native_convention_differs_from_managed() {
    let platform = platform::<X64>();
    let sig = [BasicType::Object];
    let managed = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Managed).unwrap();
    let native = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Native).unwrap();
    assert_ne!(managed.at(0), native.at(0));
    assert_eq!(platform.cached_conventions(), 2);
}

#[test]
fn test_cached_convention_is_shared() {
    let platform = platform::<Arm64>();
    let sig = [BasicType::Int, BasicType::Double, BasicType::Object];
    let a = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Managed).unwrap();
    let b = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Managed).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(platform.cached_conventions(), 1);
}

#[test]
fn test_uninitialized_platform_rejected() {
    let platform = Platform::<X64>::new();
    assert!(platform.calling_convention(&[BasicType::Int], Direction::Outgoing, ConventionKind::Managed).is_err());
    platform.initialize().unwrap();
    assert!(platform.initialize().is_err());
}

fn arg_type() -> impl Strategy<Value = BasicType> {
    prop_oneof![
        Just(BasicType::Boolean),
        Just(BasicType::Byte),
        Just(BasicType::Char),
        Just(BasicType::Short),
        Just(BasicType::Int),
        Just(BasicType::Long),
        Just(BasicType::Float),
        Just(BasicType::Double),
        Just(BasicType::Object),
        Just(BasicType::Array),
    ]
}

fn check_signature<A: Architecture>(sig: &[BasicType], kind: ConventionKind) {
    let table = table::<A>();
    for direction in [Direction::Incoming, Direction::Outgoing] {
        let first = compute_calling_convention::<A>(&table, sig, direction, kind).unwrap();
        let second = compute_calling_convention::<A>(&table, sig, direction, kind).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), sig.len());
        assert_disjoint::<A>(&first, sig, kind);

        let slots: u32 = sig.iter().map(|ty| ty.slot_count()).sum();
        let last = sig.len().checked_sub(1);
        if let Some(last) = last {
            assert_eq!(first.arg_slot(last).unwrap() + sig[last].slot_count(), slots);
        }
    }
}

proptest! {
    #[test]
    fn prop_conventions_are_pure_and_disjoint(
        sig in prop::collection::vec(arg_type(), 0..20),
        native in any::<bool>(),
    ) {
        let kind = if native { ConventionKind::Native } else { ConventionKind::Managed };
        check_signature::<X64>(&sig, kind);
        check_signature::<Arm64>(&sig, kind);
        check_signature::<Ppc32>(&sig, kind);
    }
}
