//! The low-level IR.
//!
//! - [`operand`]: typed operands (constants, stack slots, registers, addresses)
//! - [`vreg`]: virtual register allocation with bailout on exhaustion
//! - [`instruction`]: opcode catalogue and instruction records
//! - [`visit`]: operand-role visitor used by register allocation
//! - [`block`]: append-only per-block instruction lists and insertion buffers

pub mod block;
pub mod instruction;
pub mod operand;
pub mod visit;
pub mod vreg;

pub use block::{BlockProgram, InsertionBuffer};
pub use instruction::{
    BlockId, BranchTarget, CallTarget, CodeStub, Condition, ConvertKind, Instruction, Label, MoveKind,
    Opcode, PatchCode, Payload, StateRef, StubKind,
};
pub use operand::{
    Address, BasicType, Constant, Operand, OprType, RegFlags, RegId, Register, Scale, StackSlot, VReg,
    Width, PATCHED_DISPLACEMENT,
};
pub use visit::{OpVisitState, OperandMode};
pub use vreg::{VRegInfo, VirtualRegisters};
