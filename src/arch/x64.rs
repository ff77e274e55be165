//! x86-64.
//!
//! Managed calls pass integers in RSI, RDX, RCX, R8, R9, RDI and floats in XMM0-7;
//! native calls follow System V. Every stack-passed argument takes an 8-byte slot.

use super::{Architecture, ConventionKind, RegisterDesc, ResultRegisters};
use crate::lir::BasicType;

const RAX: u8 = 0;
const RCX: u8 = 1;
const RDX: u8 = 2;
const RSP: u8 = 4;
const RSI: u8 = 6;
const RDI: u8 = 7;
const R8: u8 = 8;
const R9: u8 = 9;
const R15: u8 = 15;

static REGISTERS: [RegisterDesc; 32] = [
    RegisterDesc::cpu("rsi", RSI, true, true),
    RegisterDesc::cpu("rdi", RDI, true, true),
    RegisterDesc::cpu("rbx", 3, false, true),
    RegisterDesc::cpu("rax", RAX, true, true),
    RegisterDesc::cpu("rdx", RDX, true, true),
    RegisterDesc::cpu("rcx", RCX, true, true),
    RegisterDesc::cpu("r8", R8, true, true),
    RegisterDesc::cpu("r9", R9, true, true),
    RegisterDesc::cpu("r10", 10, true, true),
    RegisterDesc::cpu("r11", 11, true, true),
    RegisterDesc::cpu("r12", 12, false, true),
    RegisterDesc::cpu("r13", 13, false, true),
    RegisterDesc::cpu("r14", 14, false, true),
    RegisterDesc::cpu("r15", R15, false, false),
    RegisterDesc::cpu("rsp", RSP, false, false),
    RegisterDesc::cpu("rbp", 5, false, false),
    RegisterDesc::fpu("xmm0", 0, true, true),
    RegisterDesc::fpu("xmm1", 1, true, true),
    RegisterDesc::fpu("xmm2", 2, true, true),
    RegisterDesc::fpu("xmm3", 3, true, true),
    RegisterDesc::fpu("xmm4", 4, true, true),
    RegisterDesc::fpu("xmm5", 5, true, true),
    RegisterDesc::fpu("xmm6", 6, true, true),
    RegisterDesc::fpu("xmm7", 7, true, true),
    RegisterDesc::fpu("xmm8", 8, true, true),
    RegisterDesc::fpu("xmm9", 9, true, true),
    RegisterDesc::fpu("xmm10", 10, true, true),
    RegisterDesc::fpu("xmm11", 11, true, true),
    RegisterDesc::fpu("xmm12", 12, true, true),
    RegisterDesc::fpu("xmm13", 13, true, true),
    RegisterDesc::fpu("xmm14", 14, true, true),
    RegisterDesc::fpu("xmm15", 15, true, true),
];

const MANAGED_INT_ARGS: [u8; 6] = [RSI, RDX, RCX, R8, R9, RDI];
const NATIVE_INT_ARGS: [u8; 6] = [RDI, RSI, RDX, RCX, R8, R9];
const FLOAT_ARGS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

#[derive(Debug, Default, Clone, Copy)]
pub struct X64;

impl Architecture for X64 {
    const NAME: &'static str = "x86_64";
    const WORD_SIZE: u32 = 8;
    const STACK_ALIGNMENT: u32 = 16;
    const OUT_PRESERVE_STACK_SLOTS: u32 = 0;
    const FIRST_AVAILABLE_SP_IN_FRAME: u32 = 0;
    // return address and saved rbp
    const FRAME_PAD_BYTES: u32 = 16;
    const LONGS_IN_REGISTER_PAIRS: bool = false;
    const SUPPORT_IRIW: bool = false;
    const MAX_VIRTUAL_REGISTERS: u32 = (1 << 20) - 1;

    fn registers() -> &'static [RegisterDesc] {
        &REGISTERS
    }

    fn stack_pointer() -> u8 {
        RSP
    }

    fn thread_register() -> u8 {
        R15
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
        ResultRegisters { int: RAX, int_hi: RAX, float: 0 }
    }

    fn stack_slots_for(_ty: BasicType, _kind: ConventionKind) -> u32 {
        2
    }

    fn is_encodable_displacement(disp: i64) -> bool {
        i32::try_from(disp).is_ok()
    }
}
