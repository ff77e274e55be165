//! AArch64.

use super::{Architecture, ConventionKind, RegisterDesc, ResultRegisters};
use crate::lir::BasicType;

const SP: u8 = 31;
const RTHREAD: u8 = 28;

static REGISTERS: [RegisterDesc; 64] = [
    RegisterDesc::cpu("r0", 0, true, true),
    RegisterDesc::cpu("r1", 1, true, true),
    RegisterDesc::cpu("r2", 2, true, true),
    RegisterDesc::cpu("r3", 3, true, true),
    RegisterDesc::cpu("r4", 4, true, true),
    RegisterDesc::cpu("r5", 5, true, true),
    RegisterDesc::cpu("r6", 6, true, true),
    RegisterDesc::cpu("r7", 7, true, true),
    RegisterDesc::cpu("r8", 8, true, false),
    RegisterDesc::cpu("r9", 9, true, false),
    RegisterDesc::cpu("r10", 10, true, true),
    RegisterDesc::cpu("r11", 11, true, true),
    RegisterDesc::cpu("r12", 12, true, true),
    RegisterDesc::cpu("r13", 13, true, true),
    RegisterDesc::cpu("r14", 14, true, true),
    RegisterDesc::cpu("r15", 15, true, true),
    RegisterDesc::cpu("r16", 16, true, true),
    RegisterDesc::cpu("r17", 17, true, true),
    RegisterDesc::cpu("r18", 18, false, false),
    RegisterDesc::cpu("r19", 19, false, true),
    RegisterDesc::cpu("r20", 20, false, true),
    RegisterDesc::cpu("r21", 21, false, true),
    RegisterDesc::cpu("r22", 22, false, true),
    RegisterDesc::cpu("r23", 23, false, true),
    RegisterDesc::cpu("r24", 24, false, true),
    RegisterDesc::cpu("r25", 25, false, true),
    RegisterDesc::cpu("r26", 26, false, true),
    RegisterDesc::cpu("r27", 27, false, false),
    RegisterDesc::cpu("rthread", RTHREAD, false, false),
    RegisterDesc::cpu("rfp", 29, false, false),
    RegisterDesc::cpu("lr", 30, false, false),
    RegisterDesc::cpu("sp", SP, false, false),
    RegisterDesc::fpu("v0", 0, true, true),
    RegisterDesc::fpu("v1", 1, true, true),
    RegisterDesc::fpu("v2", 2, true, true),
    RegisterDesc::fpu("v3", 3, true, true),
    RegisterDesc::fpu("v4", 4, true, true),
    RegisterDesc::fpu("v5", 5, true, true),
    RegisterDesc::fpu("v6", 6, true, true),
    RegisterDesc::fpu("v7", 7, true, true),
    RegisterDesc::fpu("v8", 8, false, true),
    RegisterDesc::fpu("v9", 9, false, true),
    RegisterDesc::fpu("v10", 10, false, true),
    RegisterDesc::fpu("v11", 11, false, true),
    RegisterDesc::fpu("v12", 12, false, true),
    RegisterDesc::fpu("v13", 13, false, true),
    RegisterDesc::fpu("v14", 14, false, true),
    RegisterDesc::fpu("v15", 15, false, true),
    RegisterDesc::fpu("v16", 16, true, true),
    RegisterDesc::fpu("v17", 17, true, true),
    RegisterDesc::fpu("v18", 18, true, true),
    RegisterDesc::fpu("v19", 19, true, true),
    RegisterDesc::fpu("v20", 20, true, true),
    RegisterDesc::fpu("v21", 21, true, true),
    RegisterDesc::fpu("v22", 22, true, true),
    RegisterDesc::fpu("v23", 23, true, true),
    RegisterDesc::fpu("v24", 24, true, true),
    RegisterDesc::fpu("v25", 25, true, true),
    RegisterDesc::fpu("v26", 26, true, true),
    RegisterDesc::fpu("v27", 27, true, true),
    RegisterDesc::fpu("v28", 28, true, true),
    RegisterDesc::fpu("v29", 29, true, true),
    RegisterDesc::fpu("v30", 30, true, true),
    RegisterDesc::fpu("v31", 31, true, true),
];

// managed calls rotate r0 to the end so the receiver lands in r1
const MANAGED_INT_ARGS: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 0];
const NATIVE_INT_ARGS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
const FLOAT_ARGS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

#[derive(Debug, Default, Clone, Copy)]
pub struct Arm64;

impl Architecture for Arm64 {
    const NAME: &'static str = "aarch64";
    const WORD_SIZE: u32 = 8;
    const STACK_ALIGNMENT: u32 = 16;
    const OUT_PRESERVE_STACK_SLOTS: u32 = 0;
    const FIRST_AVAILABLE_SP_IN_FRAME: u32 = 0;
    // saved fp and lr
    const FRAME_PAD_BYTES: u32 = 16;
    const LONGS_IN_REGISTER_PAIRS: bool = false;
    const SUPPORT_IRIW: bool = false;
    const MAX_VIRTUAL_REGISTERS: u32 = (1 << 20) - 1;

    fn registers() -> &'static [RegisterDesc] {
        &REGISTERS
    }

    fn stack_pointer() -> u8 {
        SP
    }

    fn thread_register() -> u8 {
        RTHREAD
    }

    fn int_args(kind: ConventionKind) -> &'static [u8] {
        match kind {
            ConventionKind::Managed => &MANAGED_INT_ARGS,
            ConventionKind::Native => &NATIVE_INT_ARGS,
        }
    }

    fn float_args(_kind: ConventionKind) -> &'static [u8] {
        &FLOAT_ARGS
    }

    fn result_registers() -> ResultRegisters {
        ResultRegisters { int: 0, int_hi: 0, float: 0 }
    }

    fn stack_slots_for(_ty: BasicType, _kind: ConventionKind) -> u32 {
        2
    }

    /// Unscaled signed 9-bit, or unsigned 12-bit scaled by the 4-byte slot size.
    fn is_encodable_displacement(disp: i64) -> bool {
        (-256..=255).contains(&disp) || ((0..4096 * 4).contains(&disp) && disp % 4 == 0)
    }
}
