//! 32-bit PowerPC.
//!
//! The only supported target with 4-byte words: longs travel in two consecutive
//! argument registers, and stack arguments take one slot per word. The argument
//! registers come first in dense order, so R3 is register number 0.

use super::{Architecture, ConventionKind, RegisterDesc, ResultRegisters};
use crate::lir::BasicType;

const R1_SP: u8 = 1;
const R2_THREAD: u8 = 2;

static REGISTERS: [RegisterDesc; 64] = [
    RegisterDesc::cpu("r3", 3, true, true),
    RegisterDesc::cpu("r4", 4, true, true),
    RegisterDesc::cpu("r5", 5, true, true),
    RegisterDesc::cpu("r6", 6, true, true),
    RegisterDesc::cpu("r7", 7, true, true),
    RegisterDesc::cpu("r8", 8, true, true),
    RegisterDesc::cpu("r9", 9, true, true),
    RegisterDesc::cpu("r10", 10, true, true),
    RegisterDesc::cpu("r11", 11, true, true),
    RegisterDesc::cpu("r12", 12, true, true),
    RegisterDesc::cpu("r14", 14, false, true),
    RegisterDesc::cpu("r15", 15, false, true),
    RegisterDesc::cpu("r16", 16, false, true),
    RegisterDesc::cpu("r17", 17, false, true),
    RegisterDesc::cpu("r18", 18, false, true),
    RegisterDesc::cpu("r19", 19, false, true),
    RegisterDesc::cpu("r20", 20, false, true),
    RegisterDesc::cpu("r21", 21, false, true),
    RegisterDesc::cpu("r22", 22, false, true),
    RegisterDesc::cpu("r23", 23, false, true),
    RegisterDesc::cpu("r24", 24, false, true),
    RegisterDesc::cpu("r25", 25, false, true),
    RegisterDesc::cpu("r26", 26, false, true),
    RegisterDesc::cpu("r27", 27, false, true),
    RegisterDesc::cpu("r28", 28, false, true),
    RegisterDesc::cpu("r29", 29, false, true),
    RegisterDesc::cpu("r30", 30, false, true),
    RegisterDesc::cpu("r0", 0, true, false),
    RegisterDesc::cpu("r1", R1_SP, false, false),
    RegisterDesc::cpu("r2", R2_THREAD, false, false),
    RegisterDesc::cpu("r13", 13, false, false),
    RegisterDesc::cpu("r31", 31, false, false),
    RegisterDesc::fpu("f1", 1, true, true),
    RegisterDesc::fpu("f2", 2, true, true),
    RegisterDesc::fpu("f3", 3, true, true),
    RegisterDesc::fpu("f4", 4, true, true),
    RegisterDesc::fpu("f5", 5, true, true),
    RegisterDesc::fpu("f6", 6, true, true),
    RegisterDesc::fpu("f7", 7, true, true),
    RegisterDesc::fpu("f8", 8, true, true),
    RegisterDesc::fpu("f9", 9, true, true),
    RegisterDesc::fpu("f10", 10, true, true),
    RegisterDesc::fpu("f11", 11, true, true),
    RegisterDesc::fpu("f12", 12, true, true),
    RegisterDesc::fpu("f13", 13, true, true),
    RegisterDesc::fpu("f14", 14, false, true),
    RegisterDesc::fpu("f15", 15, false, true),
    RegisterDesc::fpu("f16", 16, false, true),
    RegisterDesc::fpu("f17", 17, false, true),
    RegisterDesc::fpu("f18", 18, false, true),
    RegisterDesc::fpu("f19", 19, false, true),
    RegisterDesc::fpu("f20", 20, false, true),
    RegisterDesc::fpu("f21", 21, false, true),
    RegisterDesc::fpu("f22", 22, false, true),
    RegisterDesc::fpu("f23", 23, false, true),
    RegisterDesc::fpu("f24", 24, false, true),
    RegisterDesc::fpu("f25", 25, false, true),
    RegisterDesc::fpu("f26", 26, false, true),
    RegisterDesc::fpu("f27", 27, false, true),
    RegisterDesc::fpu("f28", 28, false, true),
    RegisterDesc::fpu("f29", 29, false, true),
    RegisterDesc::fpu("f30", 30, false, true),
    RegisterDesc::fpu("f31", 31, false, true),
    RegisterDesc::fpu("f0", 0, true, false),
];

const INT_ARGS: [u8; 8] = [3, 4, 5, 6, 7, 8, 9, 10];
const FLOAT_ARGS: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

#[derive(Debug, Default, Clone, Copy)]
pub struct Ppc32;

impl Architecture for Ppc32 {
    const NAME: &'static str = "ppc32";
    const WORD_SIZE: u32 = 4;
    const STACK_ALIGNMENT: u32 = 16;
    // back chain and LR save word
    const OUT_PRESERVE_STACK_SLOTS: u32 = 2;
    const FIRST_AVAILABLE_SP_IN_FRAME: u32 = 8;
    const FRAME_PAD_BYTES: u32 = 0;
    const LONGS_IN_REGISTER_PAIRS: bool = true;
    const SUPPORT_IRIW: bool = true;
    const MAX_VIRTUAL_REGISTERS: u32 = (1 << 14) - 1;

    fn registers() -> &'static [RegisterDesc] {
        &REGISTERS
    }

    fn stack_pointer() -> u8 {
        R1_SP
    }

    fn thread_register() -> u8 {
        R2_THREAD
    }

    fn int_args(_kind: ConventionKind) -> &'static [u8] {
        &INT_ARGS
    }

    fn float_args(_kind: ConventionKind) -> &'static [u8] {
        &FLOAT_ARGS
    }

    fn result_registers() -> ResultRegisters {
        ResultRegisters { int: 3, int_hi: 4, float: 1 }
    }

    fn stack_slots_for(ty: BasicType, _kind: ConventionKind) -> u32 {
        ty.slot_count()
    }

    /// Signed 16-bit D-form displacement.
    fn is_encodable_displacement(disp: i64) -> bool {
        i16::try_from(disp).is_ok()
    }
}
