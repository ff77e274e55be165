// Barrier policies plug into the access protocol at a handful of fixed points. The
// protocol owns address resolution and the memory move itself; a policy decides whether
// the address must be in a register, what runs before and after the move, and which
// fences bracket a volatile access. NoBarrier is also what AS_RAW accesses use. The card
// table policy dirties the card covering a reference store. The SATB policy adds a
// pre-barrier that hands the overwritten (or weakly loaded) reference to a slow-path stub
// while concurrent marking is active, and reuses the card table for its post-barrier.

use super::{generate_referent_check, DecoratorSet, EmitContext, LirAccess, ReferentCheck};
use crate::core::error::{CompileError, CompileResult};
use crate::lir::{
    Address, BasicType, BranchTarget, CodeStub, Condition, Constant, Opcode, Operand, OprType, Register, StubKind,
};
use std::fmt::Debug;

/// Fences emitted around the memory move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FencePlan {
    pub before: Option<Opcode>,
    pub after: Option<Opcode>,
}

/// Fences for a sequentially consistent access.
pub fn default_fences(access: &LirAccess, support_iriw: bool) -> FencePlan {
    if !access.is_volatile() || (access.is_read() && access.is_write()) {
        return FencePlan::default();
    }
    if access.is_write() {
        FencePlan {
            before: Some(Opcode::MembarRelease),
            after: if support_iriw { None } else { Some(Opcode::Membar) },
        }
    } else {
        FencePlan {
            before: if support_iriw { Some(Opcode::Membar) } else { None },
            after: Some(Opcode::MembarAcquire),
        }
    }
}

/// Collector-specific hooks around memory accesses.
pub trait BarrierPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Whether the resolved address must be materialized in a register.
    fn resolve_in_register(&self, _access: &LirAccess) -> bool {
        false
    }

    /// Runs before a reference store or atomic. `pre_val` is the previous value if
    /// already known, otherwise `Illegal`.
    fn pre_barrier(&self, _cx: &mut EmitContext<'_>, _access: &LirAccess, _pre_val: Operand) -> CompileResult<()> {
        Ok(())
    }

    /// Runs after a reference store or atomic.
    fn post_barrier(&self, _cx: &mut EmitContext<'_>, _access: &LirAccess, _new_value: Operand) -> CompileResult<()> {
        Ok(())
    }

    /// Runs after every load, with the loaded value.
    fn after_load(&self, _cx: &mut EmitContext<'_>, _access: &LirAccess, _result: Operand) -> CompileResult<()> {
        Ok(())
    }

    fn fences(&self, access: &LirAccess, support_iriw: bool) -> FencePlan {
        default_fences(access, support_iriw)
    }
}

/// Plain accesses; no collector barriers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBarrier;

impl BarrierPolicy for NoBarrier {
    fn name(&self) -> &'static str {
        "none"
    }
}

/// Log2 of the card size.
pub const CARD_SHIFT: i32 = 9;

/// Value of a dirty card.
pub const DIRTY_CARD: i32 = 0;

/// Card-marking post-barrier.
#[derive(Debug, Clone, Copy)]
pub struct CardTableBarrier {
    conditional: bool,
    card_shift: i32,
    /// Biased base of the card byte map.
    byte_map_base: i32,
}

impl CardTableBarrier {
    pub fn new(conditional: bool) -> Self {
        Self { conditional, card_shift: CARD_SHIFT, byte_map_base: 0x0040_0000 }
    }

    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    /// Whether the card address comes from the exact element address rather than the
    /// object base.
    fn precise(access: &LirAccess) -> bool {
        access.is_array() || access.decorators().contains(DecoratorSet::ON_UNKNOWN_OOP_REF)
    }

    fn card_mark(&self, cx: &mut EmitContext<'_>, access: &LirAccess) -> CompileResult<()> {
        let target = if Self::precise(access) {
            access.resolved()
        } else {
            access.base_register().map(Operand::from).unwrap_or(access.base())
        };

        let ptr = match target {
            Operand::Address(addr) => {
                let ptr = cx.new_register(OprType::Address);
                if addr.index().is_none() && addr.disp() == 0 {
                    cx.lir.move_(addr.base().into(), ptr);
                } else {
                    cx.lir.leal(target, ptr);
                }
                ptr
            }
            Operand::Register(_) => target,
            other => cx.force_register(other, OprType::Object),
        };

        let tmp = cx.new_register(OprType::Address);
        cx.lir.unsigned_shift_right(ptr, Operand::int_const(self.card_shift), tmp);
        let tmp = tmp
            .as_register()
            .ok_or_else(|| CompileError::invariant("card index is not a register"))?;
        let card: Operand = Address::base_disp(tmp, self.byte_map_base, OprType::Int)?
            .with_mem_type(BasicType::Byte)?
            .into();
        let dirty = Operand::int_const(DIRTY_CARD);

        if self.conditional {
            let current = cx.new_register(OprType::Int);
            cx.lir.move_(card, current);
            let already_dirty = cx.lir.new_label();
            cx.lir.cmp(Condition::Equal, current, dirty);
            cx.lir.branch_to_label(Condition::Equal, already_dirty);
            cx.lir.move_(dirty, card);
            cx.lir.label(already_dirty);
        } else {
            cx.lir.move_(dirty, card);
        }
        Ok(())
    }
}

impl BarrierPolicy for CardTableBarrier {
    fn name(&self) -> &'static str {
        if self.conditional {
            "card-table (conditional)"
        } else {
            "card-table"
        }
    }

    fn resolve_in_register(&self, access: &LirAccess) -> bool {
        access.is_write() && access.is_oop() && !access.needs_patching() && Self::precise(access)
    }

    fn post_barrier(&self, cx: &mut EmitContext<'_>, access: &LirAccess, _new_value: Operand) -> CompileResult<()> {
        self.card_mark(cx, access)
    }
}

/// Snapshot-at-the-beginning pre-barrier with a card-table post-barrier.
#[derive(Debug, Clone, Copy)]
pub struct SatbBarrier {
    card_table: CardTableBarrier,
    /// Offset of the marking-active flag in the thread.
    satb_active_offset: i32,
}

impl SatbBarrier {
    pub fn new(conditional_card_mark: bool) -> Self {
        Self { card_table: CardTableBarrier::new(conditional_card_mark), satb_active_offset: 0x28 }
    }

    fn address_in_register(cx: &mut EmitContext<'_>, access: &LirAccess) -> CompileResult<Operand> {
        match access.resolved() {
            Operand::Address(addr) if addr.index().is_none() && addr.disp() == 0 => Ok(addr.base().into()),
            Operand::Address(_) => {
                let ptr = cx.new_register(OprType::Address);
                cx.lir.leal(access.resolved(), ptr);
                Ok(ptr)
            }
            other => Err(CompileError::invariant(format!("pre-barrier on unresolved access ({})", other))),
        }
    }

    fn thread_flag(&self, thread: Register) -> CompileResult<Operand> {
        Ok(Address::base_disp(thread, self.satb_active_offset, OprType::Int)?
            .with_mem_type(BasicType::Byte)?
            .into())
    }
}

impl BarrierPolicy for SatbBarrier {
    fn name(&self) -> &'static str {
        "satb"
    }

    fn resolve_in_register(&self, access: &LirAccess) -> bool {
        self.card_table.resolve_in_register(access)
    }

    fn pre_barrier(&self, cx: &mut EmitContext<'_>, access: &LirAccess, pre_val: Operand) -> CompileResult<()> {
        // With no known previous value the stub loads it through the address.
        let inputs = if pre_val.is_illegal() {
            let ptr = Self::address_in_register(cx, access)?;
            let pre_val = cx.new_register(OprType::Object);
            vec![ptr, pre_val]
        } else {
            vec![pre_val]
        };

        let flag = cx.new_register(OprType::Int);
        cx.lir.move_(self.thread_flag(cx.thread)?, flag);
        cx.lir.cmp(Condition::NotEqual, flag, Operand::int_const(0));

        let continuation = cx.lir.new_label();
        let stub = CodeStub { kind: StubKind::SatbPreBarrier, inputs, continuation };
        cx.lir.branch(Condition::NotEqual, BranchTarget::Stub(Box::new(stub)));
        cx.lir.label(continuation);
        Ok(())
    }

    fn post_barrier(&self, cx: &mut EmitContext<'_>, access: &LirAccess, new_value: Operand) -> CompileResult<()> {
        if new_value.as_constant() == Some(Constant::Object(None)) {
            return Ok(());
        }
        self.card_table.post_barrier(cx, access, new_value)
    }

    fn after_load(&self, cx: &mut EmitContext<'_>, access: &LirAccess, result: Operand) -> CompileResult<()> {
        let decorators = access.decorators();
        let is_weak = decorators.contains(DecoratorSet::ON_WEAK_OOP_REF);
        let is_unknown = decorators.contains(DecoratorSet::ON_UNKNOWN_OOP_REF);
        if !access.is_oop() || !(is_weak || is_unknown) {
            return Ok(());
        }

        let cont = if is_unknown {
            match generate_referent_check(cx, access)? {
                ReferentCheck::Skip => return Ok(()),
                ReferentCheck::Guarded(label) => Some(label),
            }
        } else {
            None
        };

        self.pre_barrier(cx, access, result)?;
        if let Some(label) = cont {
            cx.lir.label(label);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{BasicType, VReg};

    fn access(decorators: DecoratorSet, ty: BasicType) -> LirAccess {
        let base = Operand::Register(Register::new_virtual(VReg(40), OprType::Object));
        LirAccess::new(decorators, ty, base, Operand::int_const(12))
    }

    #[test]
    fn test_volatile_store_fences() {
        let a = access(DecoratorSet::MO_SEQ_CST | DecoratorSet::ACCESS_WRITE, BasicType::Int);
        let plan = default_fences(&a, false);
        assert_eq!(plan.before, Some(Opcode::MembarRelease));
        assert_eq!(plan.after, Some(Opcode::Membar));
        assert_eq!(default_fences(&a, true).after, None);
    }

    #[test]
    fn test_volatile_load_fences() {
        let a = access(DecoratorSet::MO_SEQ_CST | DecoratorSet::ACCESS_READ, BasicType::Int);
        assert_eq!(default_fences(&a, false), FencePlan { before: None, after: Some(Opcode::MembarAcquire) });
        assert_eq!(default_fences(&a, true).before, Some(Opcode::Membar));
    }

    #[test]
    fn test_plain_and_atomic_accesses_have_no_fences() {
        let plain = access(DecoratorSet::ACCESS_WRITE, BasicType::Int);
        assert_eq!(default_fences(&plain, false), FencePlan::default());
        let atomic = access(
            DecoratorSet::MO_SEQ_CST | DecoratorSet::ACCESS_READ | DecoratorSet::ACCESS_WRITE,
            BasicType::Int,
        );
        assert_eq!(default_fences(&atomic, false), FencePlan::default());
    }

    #[test]
    fn test_card_table_precise_only_for_arrays_and_unknown_refs() {
        let policy = CardTableBarrier::new(false);
        let field = access(DecoratorSet::ACCESS_WRITE | DecoratorSet::IN_HEAP, BasicType::Object);
        assert!(!policy.resolve_in_register(&field));
        let array = access(
            DecoratorSet::ACCESS_WRITE | DecoratorSet::IN_HEAP | DecoratorSet::IS_ARRAY,
            BasicType::Object,
        );
        assert!(policy.resolve_in_register(&array));
        let ints = access(DecoratorSet::ACCESS_WRITE | DecoratorSet::IS_ARRAY, BasicType::Int);
        assert!(!policy.resolve_in_register(&ints));
    }
}
