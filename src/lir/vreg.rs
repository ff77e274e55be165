//! Virtual register allocation.
//!
//! Virtual registers are numbered upward from the physical register count. Running
//! out is a recoverable bailout: it is recorded once when the space gets close to the
//! limit, fresh numbers keep coming until the hard margin, and after that every request
//! gets [`VReg::POISON`]. Callers poll [`VirtualRegisters::check`].

use super::operand::{Operand, OprType, Register, VReg};
use crate::core::error::{Bailout, CompileError, CompileResult};

/// Distance from the limit at which the bailout is recorded.
const BAILOUT_MARGIN: u32 = 20;

/// Distance from the limit at which poison is returned.
const POISON_MARGIN: u32 = 2;

/// Per-virtual-register attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VRegInfo {
    pub ty: OprType,
    /// The allocator must keep this value in its stack slot at definition.
    pub must_start_in_memory: bool,
    /// Value must live in a callee-saved location across calls.
    pub callee_saved: bool,
}

/// Virtual register allocator and side table for one method.
#[derive(Debug)]
pub struct VirtualRegisters {
    base: u32,
    max: u32,
    next: u32,
    infos: Vec<VRegInfo>,
    bailout: Option<Bailout>,
}

impl VirtualRegisters {
    /// `base` is the first virtual number (the physical register count), `max` the
    /// architecture's virtual register limit.
    pub fn new(base: u32, max: u32) -> Self {
        Self { base, max, next: base, infos: Vec::new(), bailout: None }
    }

    /// Allocate a fresh virtual register holding `ty`.
    pub fn new_register(&mut self, ty: OprType) -> Operand {
        if self.next.saturating_add(BAILOUT_MARGIN) >= self.max {
            if self.bailout.is_none() {
                log::warn!("out of virtual registers at v{} (limit {})", self.next, self.max);
                self.bailout = Some(Bailout::OutOfVirtualRegisters);
            }
            if self.next.saturating_add(POISON_MARGIN) >= self.max {
                return Operand::Register(Register::new_virtual(VReg::POISON, ty));
            }
        }

        let vreg = VReg(self.next);
        self.next += 1;
        self.infos.push(VRegInfo { ty, must_start_in_memory: false, callee_saved: false });
        Operand::Register(Register::new_virtual(vreg, ty))
    }

    /// Recorded bailout, if the space ran out.
    pub fn check(&self) -> CompileResult<()> {
        match &self.bailout {
            Some(b) => Err(CompileError::Bailout(b.clone())),
            None => Ok(()),
        }
    }

    pub fn bailed_out(&self) -> bool {
        self.bailout.is_some()
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of virtual registers handed out so far.
    pub fn count(&self) -> u32 {
        self.next - self.base
    }

    pub fn info(&self, vreg: VReg) -> Option<&VRegInfo> {
        if vreg.is_poison() || vreg.0 < self.base {
            return None;
        }
        self.infos.get((vreg.0 - self.base) as usize)
    }

    fn info_mut(&mut self, vreg: VReg) -> CompileResult<&mut VRegInfo> {
        let base = self.base;
        if vreg.is_poison() || vreg.0 < base {
            return Err(CompileError::invariant(format!("{} is not an allocated virtual register", vreg)));
        }
        self.infos
            .get_mut((vreg.0 - base) as usize)
            .ok_or_else(|| CompileError::invariant(format!("{} is not an allocated virtual register", vreg)))
    }

    pub fn set_must_start_in_memory(&mut self, vreg: VReg) -> CompileResult<()> {
        self.info_mut(vreg)?.must_start_in_memory = true;
        Ok(())
    }

    pub fn set_callee_saved(&mut self, vreg: VReg) -> CompileResult<()> {
        self.info_mut(vreg)?.callee_saved = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_start_at_base_and_increase() {
        let mut vregs = VirtualRegisters::new(32, 10_000);
        let mut last = None;
        for _ in 0..100 {
            let v = vregs.new_register(OprType::Int).vreg().unwrap();
            assert!(v.0 >= 32);
            if let Some(prev) = last {
                assert!(v > prev);
            }
            last = Some(v);
        }
        assert_eq!(vregs.count(), 100);
        assert!(vregs.check().is_ok());
    }

    #[test]
    fn test_exhaustion_is_recorded_then_poisoned() {
        let mut vregs = VirtualRegisters::new(10, 100);
        for _ in 0..70 {
            vregs.new_register(OprType::Int);
        }
        assert!(vregs.check().is_ok());

        // 80 + 20 reaches the limit
        let v = vregs.new_register(OprType::Int).vreg().unwrap();
        assert_eq!(v, VReg(80));
        let err = vregs.check().unwrap_err();
        assert_eq!(err.as_bailout(), Some(&Bailout::OutOfVirtualRegisters));

        let mut poisoned = false;
        for _ in 0..30 {
            if vregs.new_register(OprType::Long).vreg() == Some(VReg::POISON) {
                poisoned = true;
                break;
            }
        }
        assert!(poisoned);
    }

    #[test]
    fn test_side_table() {
        let mut vregs = VirtualRegisters::new(16, 1000);
        let v = vregs.new_register(OprType::Object).vreg().unwrap();
        vregs.set_must_start_in_memory(v).unwrap();
        let info = vregs.info(v).unwrap();
        assert_eq!(info.ty, OprType::Object);
        assert!(info.must_start_in_memory);
        assert!(!info.callee_saved);
        assert!(vregs.set_callee_saved(VReg(3)).is_err());
        assert!(vregs.info(VReg::POISON).is_none());
    }
}
