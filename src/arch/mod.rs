// This module defines the Architecture capability that the frame map and the generator
// are generic over. An architecture is described entirely by constants and static
// tables: its register file in dense-number order (each entry tagged with class,
// hardware encoding, caller-saved and allocatable bits), the registers used to pass
// managed and native arguments, the result registers, word size, stack alignment, the
// shape of stack-passed arguments, the displacement range of its load/store forms and
// its virtual register limit. Three targets are provided: x86-64, AArch64 and 32-bit
// PowerPC (the only one passing longs in register pairs).

//! Target architecture descriptions.

pub mod arm64;
pub mod ppc32;
pub mod x64;

use crate::lir::BasicType;

pub use arm64::Arm64;
pub use ppc32::Ppc32;
pub use x64::X64;

/// Register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Cpu,
    Fpu,
}

/// Static description of one physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDesc {
    pub name: &'static str,
    pub class: RegClass,
    /// Hardware encoding.
    pub encoding: u8,
    /// Clobbered across calls.
    pub caller_saved: bool,
    /// Available to the register allocator.
    pub allocatable: bool,
}

impl RegisterDesc {
    pub const fn cpu(name: &'static str, encoding: u8, caller_saved: bool, allocatable: bool) -> Self {
        Self { name, class: RegClass::Cpu, encoding, caller_saved, allocatable }
    }

    pub const fn fpu(name: &'static str, encoding: u8, caller_saved: bool, allocatable: bool) -> Self {
        Self { name, class: RegClass::Fpu, encoding, caller_saved, allocatable }
    }
}

/// Which calling convention a signature is laid out with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConventionKind {
    /// Calls between compiled managed methods.
    Managed,
    /// Calls into native code.
    Native,
}

/// Registers holding a call result, by hardware encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRegisters {
    pub int: u8,
    /// Second half of a long on targets using register pairs.
    pub int_hi: u8,
    pub float: u8,
}

/// Everything the backend needs to know about a target.
pub trait Architecture: Send + Sync + 'static {
    const NAME: &'static str;
    /// Machine word in bytes.
    const WORD_SIZE: u32;
    /// Required stack-pointer alignment in bytes.
    const STACK_ALIGNMENT: u32;
    /// Size of one stack slot in bytes.
    const STACK_SLOT_SIZE: u32 = 4;
    /// Stack slots at the bottom of the outgoing area owned by the callee.
    const OUT_PRESERVE_STACK_SLOTS: u32;
    /// Bytes between SP and the first spill slot, before the reserved argument area.
    const FIRST_AVAILABLE_SP_IN_FRAME: u32;
    /// Extra bytes the frame carries (return address, saved frame pointer).
    const FRAME_PAD_BYTES: u32;
    /// Longs occupy two CPU registers.
    const LONGS_IN_REGISTER_PAIRS: bool;
    /// Volatile loads must be preceded by a full fence (non multiple-copy-atomic targets).
    const SUPPORT_IRIW: bool;
    /// Upper bound on virtual register numbers.
    const MAX_VIRTUAL_REGISTERS: u32;

    /// Register file in dense-number order.
    fn registers() -> &'static [RegisterDesc];

    /// Encoding of the stack pointer.
    fn stack_pointer() -> u8;

    /// Encoding of the register holding the current thread.
    fn thread_register() -> u8;

    /// Integer argument registers, by encoding, in assignment order.
    fn int_args(kind: ConventionKind) -> &'static [u8];

    /// Floating-point argument registers, by encoding, in assignment order.
    fn float_args(kind: ConventionKind) -> &'static [u8];

    fn result_registers() -> ResultRegisters;

    /// Stack slots one stack-passed argument of `ty` occupies.
    fn stack_slots_for(ty: BasicType, kind: ConventionKind) -> u32;

    /// Whether `disp` fits the SP-relative load/store form.
    fn is_encodable_displacement(disp: i64) -> bool;
}

/// Round `value` up to a multiple of `align`, which must be a power of two.
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
