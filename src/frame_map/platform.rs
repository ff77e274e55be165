//! Process-wide platform state.
//!
//! A [`Platform`] owns the register table for one architecture and a cache of computed
//! calling conventions. It is initialized once and then shared read-mostly between
//! compiler threads; the cache only ever gains entries, and since a convention is a
//! pure function of its key, racing inserts store identical values.

use super::calling_convention::{compute_calling_convention, CallingConvention, Direction};
use crate::arch::{Architecture, ConventionKind};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::RegisterTable;
use crate::lir::{BasicType, Operand, OprType, Register, VirtualRegisters};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConventionKey {
    signature: Vec<BasicType>,
    direction: Direction,
    kind: ConventionKind,
}

/// Register table and calling-convention cache for architecture `A`.
pub struct Platform<A: Architecture> {
    table: OnceLock<RegisterTable>,
    conventions: RwLock<HashMap<ConventionKey, Arc<CallingConvention>>>,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Architecture> Default for Platform<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Architecture> Platform<A> {
    /// An uninitialized platform. Call [`Platform::initialize`] before use.
    pub fn new() -> Self {
        Self {
            table: OnceLock::new(),
            conventions: RwLock::new(HashMap::new()),
            _arch: PhantomData,
        }
    }

    /// Build the register table. Fails if called more than once.
    pub fn initialize(&self) -> CompileResult<()> {
        if self.table.get().is_some() {
            return Err(CompileError::invariant(format!("{} platform initialized twice", A::NAME)));
        }
        let table = RegisterTable::build(A::NAME, A::registers())?;
        self.table
            .set(table)
            .map_err(|_| CompileError::invariant(format!("{} platform initialized twice", A::NAME)))?;
        log::debug!("{} platform initialized", A::NAME);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn registers(&self) -> CompileResult<&RegisterTable> {
        self.table
            .get()
            .ok_or_else(|| CompileError::invariant(format!("{} platform used before initialize", A::NAME)))
    }

    /// Calling convention for `signature`, computed on first request and cached.
    pub fn calling_convention(
        &self,
        signature: &[BasicType],
        direction: Direction,
        kind: ConventionKind,
    ) -> CompileResult<Arc<CallingConvention>> {
        let table = self.registers()?;
        let key = ConventionKey { signature: signature.to_vec(), direction, kind };

        if let Some(cc) = self.conventions.read().get(&key) {
            return Ok(Arc::clone(cc));
        }

        log::debug!("{}: computing {:?} {:?} convention for {:?}", A::NAME, kind, direction, signature);
        let cc = Arc::new(compute_calling_convention::<A>(table, signature, direction, kind)?);
        let mut cache = self.conventions.write();
        Ok(Arc::clone(cache.entry(key).or_insert(cc)))
    }

    /// Number of cached conventions.
    pub fn cached_conventions(&self) -> usize {
        self.conventions.read().len()
    }

    /// Fresh virtual register space for one method.
    pub fn virtual_registers(&self) -> CompileResult<VirtualRegisters> {
        Ok(VirtualRegisters::new(self.registers()?.nof_registers(), A::MAX_VIRTUAL_REGISTERS))
    }

    pub fn stack_pointer(&self) -> CompileResult<Register> {
        Register::cpu(self.registers()?.expect_cpu(A::stack_pointer())?, OprType::Address)
    }

    pub fn thread_register(&self) -> CompileResult<Register> {
        Register::cpu(self.registers()?.expect_cpu(A::thread_register())?, OprType::Address)
    }

    /// Register a call returns a value of type `ty` in. `Illegal` for void.
    pub fn result_operand(&self, ty: BasicType) -> CompileResult<Operand> {
        let table = self.registers()?;
        let regs = A::result_registers();
        let opr_ty = match ty.opr_type() {
            Some(t) => t,
            None => return Ok(Operand::Illegal),
        };
        let reg = if opr_ty.is_float() {
            Register::fpu(table.expect_fpu(regs.float)?, opr_ty)?
        } else if opr_ty == OprType::Long && A::LONGS_IN_REGISTER_PAIRS {
            Register::cpu_pair(table.expect_cpu(regs.int)?, table.expect_cpu(regs.int_hi)?, opr_ty)?
        } else {
            Register::cpu(table.expect_cpu(regs.int)?, opr_ty)?
        };
        Ok(Operand::Register(reg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Ppc32, X64};
    use crate::lir::RegId;

    #[test]
    fn test_initialize_once() {
        let platform = Platform::<X64>::new();
        assert!(platform.registers().is_err());
        assert!(platform.calling_convention(&[], Direction::Incoming, ConventionKind::Managed).is_err());

        platform.initialize().unwrap();
        assert!(platform.is_initialized());
        assert!(platform.initialize().is_err());
    }

    #[test]
    fn test_cache_returns_same_convention() {
        let platform = Platform::<X64>::new();
        platform.initialize().unwrap();
        let sig = [BasicType::Int, BasicType::Long];
        let a = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Managed).unwrap();
        let b = platform.calling_convention(&sig, Direction::Outgoing, ConventionKind::Managed).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(platform.cached_conventions(), 1);

        platform.calling_convention(&sig, Direction::Incoming, ConventionKind::Managed).unwrap();
        assert_eq!(platform.cached_conventions(), 2);
    }

    #[test]
    fn test_result_operands() {
        let platform = Platform::<Ppc32>::new();
        platform.initialize().unwrap();
        let long = platform.result_operand(BasicType::Long).unwrap().as_register().unwrap();
        assert!(matches!(long.id(), RegId::CpuPair { .. }));
        assert_eq!(platform.result_operand(BasicType::Void).unwrap(), Operand::Illegal);
        let float = platform.result_operand(BasicType::Float).unwrap().as_register().unwrap();
        assert!(matches!(float.id(), RegId::Fpu(_)));
    }

    #[test]
    fn test_virtual_registers_start_after_physical() {
        let platform = Platform::<X64>::new();
        platform.initialize().unwrap();
        let mut vregs = platform.virtual_registers().unwrap();
        assert_eq!(vregs.base(), 32);
        assert_eq!(vregs.new_register(OprType::Int).vreg().unwrap().index(), 32);
    }
}
