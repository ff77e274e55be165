// This module computes calling conventions. Given a signature, a direction and a
// convention kind it walks the parameters left to right, handing out argument registers
// from the architecture's integer and floating-point tables (a long on a register-pair
// target takes two consecutive integer registers, or none) and placing the rest on the
// stack. A stack argument's byte offset is (stack slots used so far + out-preserve slots)
// times the slot size. For an outgoing call the stack argument is an SP-relative Address
// the caller stores into; for the incoming side it is a StackSlot named by the
// argument's logical slot index, together with a tentative byte offset that the frame
// map later rebases past its own frame. The computation is a pure function of its
// inputs, which is what makes the per-platform cache sound.

//! Calling convention computation.

use crate::arch::{Architecture, ConventionKind};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::RegisterTable;
use crate::lir::{Address, BasicType, Operand, OprType, Register};

/// Which side of a call a convention describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The method's own parameters.
    Incoming,
    /// Arguments of a call site.
    Outgoing,
}

/// Location of every argument of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingConvention {
    direction: Direction,
    kind: ConventionKind,
    args: Vec<Operand>,
    /// Logical slot index of each argument.
    arg_slots: Vec<u32>,
    /// Byte offset of each stack-passed argument relative to SP at the call.
    stack_offsets: Vec<Option<i32>>,
    reserved_stack_slots: u32,
}

impl CallingConvention {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> ConventionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    pub fn at(&self, i: usize) -> Option<Operand> {
        self.args.get(i).copied()
    }

    pub fn arg_slot(&self, i: usize) -> Option<u32> {
        self.arg_slots.get(i).copied()
    }

    pub fn stack_offset(&self, i: usize) -> Option<i32> {
        self.stack_offsets.get(i).copied().flatten()
    }

    /// Stack slots the caller must reserve below SP for this call.
    pub fn reserved_stack_slots(&self) -> u32 {
        self.reserved_stack_slots
    }
}

fn opr_type_of(ty: BasicType) -> CompileResult<OprType> {
    ty.opr_type()
        .ok_or_else(|| CompileError::invariant(format!("{} cannot be passed as an argument", ty.name())))
}

/// Lay out `signature` for architecture `A`.
pub fn compute_calling_convention<A: Architecture>(
    table: &RegisterTable,
    signature: &[BasicType],
    direction: Direction,
    kind: ConventionKind,
) -> CompileResult<CallingConvention> {
    let int_regs = A::int_args(kind);
    let float_regs = A::float_args(kind);
    let sp = Register::cpu(table.expect_cpu(A::stack_pointer())?, OprType::Address)?;

    let mut next_int = 0usize;
    let mut next_float = 0usize;
    let mut stack_slots = 0u32;
    let mut logical_slot = 0u32;

    let mut args = Vec::with_capacity(signature.len());
    let mut arg_slots = Vec::with_capacity(signature.len());
    let mut stack_offsets = Vec::with_capacity(signature.len());

    for &ty in signature {
        let opr_ty = opr_type_of(ty)?;

        let reg = if ty.is_floating() {
            match float_regs.get(next_float) {
                Some(&enc) => {
                    next_float += 1;
                    Some(Register::fpu(table.expect_fpu(enc)?, opr_ty)?)
                }
                None => None,
            }
        } else if ty == BasicType::Long && A::LONGS_IN_REGISTER_PAIRS {
            match (int_regs.get(next_int), int_regs.get(next_int + 1)) {
                (Some(&lo), Some(&hi)) => {
                    next_int += 2;
                    Some(Register::cpu_pair(table.expect_cpu(lo)?, table.expect_cpu(hi)?, opr_ty)?)
                }
                _ => {
                    // a long never straddles registers and stack
                    next_int = int_regs.len();
                    None
                }
            }
        } else {
            match int_regs.get(next_int) {
                Some(&enc) => {
                    next_int += 1;
                    Some(Register::cpu(table.expect_cpu(enc)?, opr_ty)?)
                }
                None => None,
            }
        };

        match reg {
            Some(reg) => {
                args.push(Operand::Register(reg));
                stack_offsets.push(None);
            }
            None => {
                let disp = ((stack_slots + A::OUT_PRESERVE_STACK_SLOTS) * A::STACK_SLOT_SIZE) as i32;
                stack_slots += A::stack_slots_for(ty, kind);
                let opr = match direction {
                    Direction::Outgoing => Operand::Address(Address::base_disp(sp, disp, opr_ty)?),
                    Direction::Incoming => Operand::stack(logical_slot, opr_ty),
                };
                args.push(opr);
                stack_offsets.push(Some(disp));
            }
        }
        arg_slots.push(logical_slot);
        logical_slot += ty.slot_count();
    }

    let reserved_stack_slots = crate::arch::align_up(stack_slots as u64, 2) as u32 + A::OUT_PRESERVE_STACK_SLOTS;

    log::trace!(
        "{} {:?} {:?} convention for {:?}: {} stack slots",
        A::NAME,
        kind,
        direction,
        signature,
        reserved_stack_slots
    );

    Ok(CallingConvention { direction, kind, args, arg_slots, stack_offsets, reserved_stack_slots })
}
