//! Phi move sequencing tests.
//!
//! The resolver turns the parallel copies of a join edge into sequential moves. These
//! tests replay the emitted moves and check that every destination ends up with its
//! source's value as if all copies had happened at once, including copies that form
//! cycles, and that cycles never need more than one temporary at a time.

use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};
use lirgen::lir::{BlockId, BlockProgram, Constant, Operand, OprType, Register, VReg, VirtualRegisters};
use lirgen::phi_resolver::PhiResolver;
use proptest::prelude::*;

/// Temporaries are allocated at and above this number.
const TEMP_BASE: u32 = 1000;

fn v(n: u32) -> Operand {
    Operand::Register(Register::new_virtual(VReg(n), OprType::Int))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Initial(u32),
    Const(i32),
}

/// Replay the moves of `lir`, checking that at most one temporary is live at a time.
fn replay(lir: &BlockProgram) -> HashMap<u32, Value> {
    let mut state: HashMap<u32, Value> = HashMap::new();
    let mut live_temps: HashSet<u32> = HashSet::new();

    for inst in lir.instructions() {
        let src = inst.inputs()[0];
        let dst = inst.result().vreg().expect("phi moves write virtual registers").0;

        let value = match src {
            Operand::Constant(Constant::Int(c)) => Value::Const(c),
            other => {
                let n = other.vreg().expect("phi moves read registers or constants").0;
                if n >= TEMP_BASE {
                    assert!(live_temps.remove(&n), "temporary v{} read before it was written", n);
                }
                state.get(&n).copied().unwrap_or(Value::Initial(n))
            }
        };
        if dst >= TEMP_BASE {
            live_temps.insert(dst);
            assert!(live_temps.len() <= 1, "two cycle temporaries live at once");
        }
        state.insert(dst, value);
    }
    assert!(live_temps.is_empty(), "temporary left unconsumed");
    state
}

fn resolve(moves: &[(Operand, Operand)]) -> (BlockProgram, usize) {
    let arena = Bump::new();
    let mut lir = BlockProgram::new(BlockId(3));
    let mut vregs = VirtualRegisters::new(TEMP_BASE, 100_000);

    let mut resolver = PhiResolver::new(&arena);
    for &(src, dst) in moves {
        resolver.add_move(src, dst).unwrap();
    }
    let stats = resolver.resolve(&mut lir, &mut vregs).unwrap();
    assert_eq!(stats.moves, lir.len());
    (lir, stats.temps)
}

fn pairs(lir: &BlockProgram) -> Vec<(Operand, Operand)> {
    lir.instructions().iter().map(|i| (i.inputs()[0], i.result())).collect()
}

#[test]
fn test_two_cycle_uses_one_temporary() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (p1, p2) = (v(1), v(2));
    // p1 := p2, p2 := p1
    let (lir, temps) = resolve(&[(p2, p1), (p1, p2)]);
    assert_eq!(temps, 1);

    let t = v(TEMP_BASE);
    assert_eq!(pairs(&lir), vec![(p2, t), (p1, p2), (t, p1)]);
}

#[test]
fn test_three_cycle() {
    let (a, b, c) = (v(1), v(2), v(3));
    // a := b, b := c, c := a
    let (lir, temps) = resolve(&[(b, a), (c, b), (a, c)]);
    assert_eq!(temps, 1);
    assert_eq!(lir.len(), 4);

    let state = replay(&lir);
    assert_eq!(state[&1], Value::Initial(2));
    assert_eq!(state[&2], Value::Initial(3));
    assert_eq!(state[&3], Value::Initial(1));
}

#[test]
fn test_cycle_with_tail_and_constant() {
    let (a, b, c, d) = (v(1), v(2), v(3), v(4));
    // a := b, b := a, c := a, d := 5
    let (lir, temps) = resolve(&[(b, a), (a, b), (a, c), (Operand::int_const(5), d)]);
    assert_eq!(temps, 1);

    // the constant is written last
    assert_eq!(pairs(&lir).last(), Some(&(Operand::int_const(5), d)));
    let state = replay(&lir);
    assert_eq!(state[&1], Value::Initial(2));
    assert_eq!(state[&2], Value::Initial(1));
    assert_eq!(state[&3], Value::Initial(1));
    assert_eq!(state[&4], Value::Const(5));
}

#[test]
fn test_fan_out_without_cycle() {
    let (a, b, c) = (v(1), v(2), v(3));
    // b := a, c := a, a := c
    let (lir, temps) = resolve(&[(a, b), (a, c), (c, a)]);
    assert_eq!(temps, 1);
    let state = replay(&lir);
    assert_eq!(state[&1], Value::Initial(3));
    assert_eq!(state[&2], Value::Initial(1));
    assert_eq!(state[&3], Value::Initial(1));
}

#[test]
fn test_two_independent_cycles() {
    let (a, b, c, d) = (v(1), v(2), v(3), v(4));
    let (lir, temps) = resolve(&[(b, a), (a, b), (d, c), (c, d)]);
    assert_eq!(temps, 2);
    assert_eq!(lir.len(), 6);
    let state = replay(&lir);
    assert_eq!(state[&1], Value::Initial(2));
    assert_eq!(state[&3], Value::Initial(4));
}

/// Source of one generated parallel copy.
#[derive(Debug, Clone, Copy)]
enum Source {
    Reg(u32),
    Const(i32),
}

fn assignment() -> impl Strategy<Value = Vec<Option<Source>>> {
    (2usize..10).prop_flat_map(|n| {
        let source = prop_oneof![
            3 => (0..n as u32).prop_map(Source::Reg),
            1 => (-50i32..50).prop_map(Source::Const),
        ];
        prop::collection::vec(prop::option::of(source), n)
    })
}

proptest! {
    #[test]
    fn prop_sequential_moves_match_parallel_copy(sources in assignment()) {
        let mut moves = Vec::new();
        for (dst, source) in sources.iter().enumerate() {
            match source {
                Some(Source::Reg(src)) => moves.push((v(*src), v(dst as u32))),
                Some(Source::Const(c)) => moves.push((Operand::int_const(*c), v(dst as u32))),
                None => {}
            }
        }

        let (lir, temps) = resolve(&moves);
        let state = replay(&lir);

        for (dst, source) in sources.iter().enumerate() {
            let dst = dst as u32;
            let actual = state.get(&dst).copied().unwrap_or(Value::Initial(dst));
            let expected = match source {
                Some(Source::Reg(src)) => Value::Initial(*src),
                Some(Source::Const(c)) => Value::Const(*c),
                None => Value::Initial(dst),
            };
            prop_assert_eq!(actual, expected, "destination v{}", dst);
        }
        prop_assert!(temps <= sources.len() / 2);
    }
}
