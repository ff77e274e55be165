//! Physical register file description.
//!
//! The [`RegisterTable`] is the bijection between the dense register numbers used inside
//! LIR operands and the architecture's physical registers. It is built exactly once per
//! process by [`crate::frame_map::Platform::initialize`] and is read-only afterwards.

use crate::arch::{RegClass, RegisterDesc};
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;

/// Maximum number of register banks supported (CPU, FPU).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 64;

/// Type for register bank indices.
pub type RegBank = u8;

pub const CPU_BANK: RegBank = 0;
pub const FPU_BANK: RegBank = 1;

/// A physical register named by bank and dense register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysReg {
    pub bank: RegBank,
    pub rnr: u16,
}

impl PhysReg {
    pub const fn cpu(rnr: u16) -> Self {
        Self { bank: CPU_BANK, rnr }
    }

    pub const fn fpu(rnr: u16) -> Self {
        Self { bank: FPU_BANK, rnr }
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegBitSet {
    /// Bit mask for each register bank.
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    /// Create empty register set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if register is set.
    pub fn contains(&self, reg: PhysReg) -> bool {
        if reg.bank as usize >= MAX_REGISTER_BANKS || reg.rnr >= 64 {
            return false;
        }
        (self.banks[reg.bank as usize] & (1u64 << reg.rnr)) != 0
    }

    /// Set a register.
    pub fn set(&mut self, reg: PhysReg) {
        if (reg.bank as usize) < MAX_REGISTER_BANKS && reg.rnr < 64 {
            self.banks[reg.bank as usize] |= 1u64 << reg.rnr;
        }
    }
}

/// Dense-number view of an architecture's register file.
#[derive(Debug, Clone)]
pub struct RegisterTable {
    arch: &'static str,
    cpu: Vec<RegisterDesc>,
    fpu: Vec<RegisterDesc>,
    cpu_rnr_by_encoding: HashMap<u8, u16>,
    fpu_rnr_by_encoding: HashMap<u8, u16>,
    caller_saved: RegBitSet,
    allocatable: RegBitSet,
}

impl RegisterTable {
    /// Build the table from the architecture's register list.
    ///
    /// Dense numbers are assigned per class in list order. Duplicate encodings within a
    /// class, or more registers than a bank can track, are rejected.
    pub fn build(arch: &'static str, registers: &[RegisterDesc]) -> CompileResult<Self> {
        let mut table = Self {
            arch,
            cpu: Vec::new(),
            fpu: Vec::new(),
            cpu_rnr_by_encoding: HashMap::new(),
            fpu_rnr_by_encoding: HashMap::new(),
            caller_saved: RegBitSet::new(),
            allocatable: RegBitSet::new(),
        };

        for desc in registers {
            let (list, by_encoding, bank) = match desc.class {
                RegClass::Cpu => (&mut table.cpu, &mut table.cpu_rnr_by_encoding, CPU_BANK),
                RegClass::Fpu => (&mut table.fpu, &mut table.fpu_rnr_by_encoding, FPU_BANK),
            };
            if list.len() >= MAX_REGISTERS_PER_BANK {
                return Err(CompileError::invariant(format!(
                    "{}: too many {:?} registers",
                    arch, desc.class
                )));
            }
            let rnr = list.len() as u16;
            if by_encoding.insert(desc.encoding, rnr).is_some() {
                return Err(CompileError::invariant(format!(
                    "{}: register {} listed twice",
                    arch, desc.name
                )));
            }
            list.push(*desc);

            let reg = PhysReg { bank, rnr };
            if desc.caller_saved {
                table.caller_saved.set(reg);
            }
            if desc.allocatable {
                table.allocatable.set(reg);
            }
        }

        log::debug!(
            "{}: register table with {} cpu and {} fpu registers",
            arch,
            table.cpu.len(),
            table.fpu.len()
        );
        Ok(table)
    }

    pub fn arch(&self) -> &'static str {
        self.arch
    }

    pub fn nof_cpu_regs(&self) -> u32 {
        self.cpu.len() as u32
    }

    pub fn nof_fpu_regs(&self) -> u32 {
        self.fpu.len() as u32
    }

    /// Total number of physical registers; virtual register numbers start here.
    pub fn nof_registers(&self) -> u32 {
        self.nof_cpu_regs() + self.nof_fpu_regs()
    }

    /// Dense number of a CPU register given its hardware encoding.
    pub fn cpu_rnr(&self, encoding: u8) -> Option<u16> {
        self.cpu_rnr_by_encoding.get(&encoding).copied()
    }

    /// Dense number of an FPU register given its hardware encoding.
    pub fn fpu_rnr(&self, encoding: u8) -> Option<u16> {
        self.fpu_rnr_by_encoding.get(&encoding).copied()
    }

    pub fn cpu_reg(&self, rnr: u16) -> Option<&RegisterDesc> {
        self.cpu.get(rnr as usize)
    }

    pub fn fpu_reg(&self, rnr: u16) -> Option<&RegisterDesc> {
        self.fpu.get(rnr as usize)
    }

    /// Registers clobbered across a call.
    pub fn caller_saved(&self) -> &RegBitSet {
        &self.caller_saved
    }

    /// Registers the allocator may hand out.
    pub fn allocatable(&self) -> &RegBitSet {
        &self.allocatable
    }

    /// Look up a CPU register by encoding, failing with an invariant error.
    pub fn expect_cpu(&self, encoding: u8) -> CompileResult<u16> {
        self.cpu_rnr(encoding).ok_or_else(|| {
            CompileError::invariant(format!("{}: no cpu register with encoding {}", self.arch, encoding))
        })
    }

    /// Look up an FPU register by encoding, failing with an invariant error.
    pub fn expect_fpu(&self, encoding: u8) -> CompileResult<u16> {
        self.fpu_rnr(encoding).ok_or_else(|| {
            CompileError::invariant(format!("{}: no fpu register with encoding {}", self.arch, encoding))
        })
    }
}
