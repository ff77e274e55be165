// This module implements the memory access protocol. Every load, store and atomic the
// generator emits goes through one of six entry points (store_at, load_at, load,
// atomic_cmpxchg_at, atomic_xchg_at, atomic_add_at) with a LirAccess descriptor
// carrying the decorators, element type, base and offset. Each entry point first turns
// (base, offset) into a concrete Address operand: the base is forced into a register,
// a constant offset is folded into the displacement, a register offset becomes the
// index, array indices are scaled by the element size and offset by the array header,
// and a field whose offset is still unknown gets the placeholder displacement plus a
// patch record. That resolution is the same for every collector. Only then does the
// installed BarrierPolicy get its say, through a fixed set of hooks (pre-barrier,
// post-barrier, after-load reference check, fence selection). A raw access skips the
// policy entirely.

//! Memory access and GC barrier protocol.

pub mod barrier;
pub mod decorators;

pub use barrier::{default_fences, BarrierPolicy, CardTableBarrier, FencePlan, NoBarrier, SatbBarrier};
pub use decorators::DecoratorSet;

use crate::arch::Architecture;
use crate::config::{CollectorKind, Config};
use crate::core::error::{CompileError, CompileResult};
use crate::lir::{
    Address, BasicType, BlockId, BlockProgram, Condition, Constant, ConvertKind, Instruction, Label, MoveKind, Opcode,
    Operand, OprType, PatchCode, Payload, Register, Scale, StateRef, VirtualRegisters, PATCHED_DISPLACEMENT,
};
use std::sync::Arc;

/// Reference-type byte of classes that are not weak/soft/phantom references.
pub const REF_NONE: i32 = 0;

/// Offset of the reference-type byte inside a class descriptor.
const REFERENCE_TYPE_OFFSET: i32 = 0x11b;

/// Object layout facts the access code depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
    /// Heap references are stored as 32-bit values.
    pub compressed_oops: bool,
    /// The target needs a full fence before volatile loads.
    pub support_iriw: bool,
    pub word_size: u32,
    /// Offset of the class pointer in an object header.
    pub klass_offset: i32,
    /// Offset of the referent field in reference objects.
    pub referent_offset: i32,
    pub reference_type_offset: i32,
}

impl AccessOptions {
    pub fn for_arch<A: Architecture>(compressed_oops: bool) -> Self {
        let compressed = compressed_oops && A::WORD_SIZE == 8;
        let referent_offset = match (A::WORD_SIZE, compressed) {
            (4, _) => 8,
            (_, true) => 12,
            _ => 16,
        };
        Self {
            compressed_oops: compressed,
            support_iriw: A::SUPPORT_IRIW,
            word_size: A::WORD_SIZE,
            klass_offset: A::WORD_SIZE as i32,
            referent_offset,
            reference_type_offset: REFERENCE_TYPE_OFFSET,
        }
    }

    pub fn element_size(&self, elem: BasicType) -> u32 {
        elem.size_in_bytes(self.word_size, self.compressed_oops)
    }

    /// Offset of element 0 of an array of `elem`.
    pub fn array_base_offset(&self, elem: BasicType) -> i32 {
        if self.word_size == 8 || self.element_size(elem) == 8 {
            16
        } else {
            12
        }
    }
}

/// A memory instruction whose displacement must be patched once the field is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRecord {
    pub block: BlockId,
    /// Index of the patched instruction in its block.
    pub index: usize,
    pub info: Option<StateRef>,
}

/// Where access code is emitted.
pub struct EmitContext<'a> {
    pub lir: &'a mut BlockProgram,
    pub vregs: &'a mut VirtualRegisters,
    pub patches: &'a mut Vec<PatchRecord>,
    /// Register holding the current thread.
    pub thread: Register,
    pub options: AccessOptions,
}

impl EmitContext<'_> {
    pub fn new_register(&mut self, ty: OprType) -> Operand {
        self.vregs.new_register(ty)
    }

    /// Record the most recently appended instruction as patchable.
    pub fn record_patch(&mut self, info: Option<StateRef>) {
        let index = self.lir.len().saturating_sub(1);
        self.patches.push(PatchRecord { block: self.lir.block(), index, info });
    }

    /// `opr` itself if it is a register, otherwise a fresh register it is moved into.
    pub fn force_register(&mut self, opr: Operand, ty: OprType) -> Operand {
        if opr.is_register() {
            return opr;
        }
        let reg = self.new_register(ty);
        self.lir.move_(opr, reg);
        reg
    }
}

/// Lifecycle of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessState {
    Unresolved,
    AddressResolved,
    BarrierFraming,
    Emitted,
}

/// Descriptor of one memory access.
#[derive(Debug, Clone)]
pub struct LirAccess {
    decorators: DecoratorSet,
    ty: BasicType,
    base: Operand,
    offset: Operand,
    info: Option<StateRef>,
    base_reg: Option<Register>,
    resolved: Operand,
    state: AccessState,
}

impl LirAccess {
    pub fn new(decorators: DecoratorSet, ty: BasicType, base: Operand, offset: Operand) -> Self {
        Self {
            decorators,
            ty,
            base,
            offset,
            info: None,
            base_reg: None,
            resolved: Operand::Illegal,
            state: AccessState::Unresolved,
        }
    }

    /// Debug state for the implicit null check or the patch site.
    pub fn with_info(mut self, info: Option<StateRef>) -> Self {
        self.info = info;
        self
    }

    pub fn decorators(&self) -> DecoratorSet {
        self.decorators
    }

    pub fn ty(&self) -> BasicType {
        self.ty
    }

    pub fn opr_type(&self) -> OprType {
        self.ty.opr_type().unwrap_or(OprType::Int)
    }

    pub fn base(&self) -> Operand {
        self.base
    }

    pub fn offset(&self) -> Operand {
        self.offset
    }

    pub fn info(&self) -> Option<StateRef> {
        self.info
    }

    /// Register holding the object base once the address is resolved.
    pub fn base_register(&self) -> Option<Register> {
        self.base_reg
    }

    /// The resolved address; `Illegal` until resolution.
    pub fn resolved(&self) -> Operand {
        self.resolved
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn is_oop(&self) -> bool {
        self.ty.is_reference()
    }

    pub fn is_raw(&self) -> bool {
        self.decorators.contains(DecoratorSet::AS_RAW)
    }

    pub fn is_volatile(&self) -> bool {
        self.decorators.contains(DecoratorSet::MO_SEQ_CST)
    }

    pub fn needs_patching(&self) -> bool {
        self.decorators.contains(DecoratorSet::NEEDS_PATCHING)
    }

    pub fn is_array(&self) -> bool {
        self.decorators.contains(DecoratorSet::IS_ARRAY)
    }

    pub fn is_read(&self) -> bool {
        self.decorators.contains(DecoratorSet::ACCESS_READ)
    }

    pub fn is_write(&self) -> bool {
        self.decorators.contains(DecoratorSet::ACCESS_WRITE)
    }

    fn advance(&mut self, to: AccessState) -> CompileResult<()> {
        if to <= self.state {
            return Err(CompileError::invariant(format!(
                "access moved from {:?} back to {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    fn add_decorators(&mut self, extra: DecoratorSet) {
        self.decorators |= extra;
        if !self.decorators.intersects(DecoratorSet::IN_HEAP | DecoratorSet::IN_NATIVE) {
            self.decorators |= DecoratorSet::IN_HEAP;
        }
    }
}

fn displacement(value: i64) -> Option<i32> {
    i32::try_from(value).ok().filter(|&d| d != PATCHED_DISPLACEMENT)
}

/// Turn the access's (base, offset) into an Address operand.
///
/// With `in_register` the address is materialized with `leal` and the result is a
/// zero-displacement address on that register.
pub fn resolve_address(cx: &mut EmitContext<'_>, access: &mut LirAccess, in_register: bool) -> CompileResult<()> {
    if access.state != AccessState::Unresolved {
        return Err(CompileError::invariant(format!(
            "access resolved twice (state {:?})",
            access.state
        )));
    }
    let ty = access.opr_type();
    let base = match access.base {
        Operand::Register(r) => r,
        Operand::Illegal => return Err(CompileError::invariant("access without base")),
        other => {
            let base_ty = other.ty().unwrap_or(OprType::Address);
            match cx.force_register(other, base_ty).as_register() {
                Some(r) => r,
                None => return Err(CompileError::invariant("base did not resolve to a register")),
            }
        }
    };

    access.base_reg = Some(base);

    let mut addr = if access.needs_patching() {
        Address::base_disp(base, PATCHED_DISPLACEMENT, ty)?
    } else if access.is_array() {
        let elem_size = cx.options.element_size(access.ty);
        let header = cx.options.array_base_offset(access.ty) as i64;
        let scale = Scale::from_size(elem_size)
            .ok_or_else(|| CompileError::invariant(format!("no scale for {}-byte elements", elem_size)))?;
        match access.offset {
            Operand::Constant(c) => {
                let index = c
                    .as_displacement()
                    .ok_or_else(|| CompileError::invariant(format!("array index {} is not integral", c)))?;
                match displacement(header + index * elem_size as i64) {
                    Some(disp) => Address::base_disp(base, disp, ty)?,
                    None => {
                        let index_reg = cx.force_register(Operand::long_const(index), OprType::Long);
                        Address::new(base.into(), index_reg, scale, header as i32, ty)?
                    }
                }
            }
            Operand::Register(index) => {
                let index = if cx.options.word_size == 8 && index.ty() == OprType::Int {
                    let wide = cx.new_register(OprType::Long);
                    cx.lir.convert(ConvertKind::I2L, index.into(), wide);
                    wide
                } else {
                    index.into()
                };
                Address::new(base.into(), index, scale, header as i32, ty)?
            }
            other => {
                return Err(CompileError::invariant(format!("array index must be a register or constant, got {}", other)))
            }
        }
    } else {
        match access.offset {
            Operand::Constant(c) => {
                let offset = c
                    .as_displacement()
                    .ok_or_else(|| CompileError::invariant(format!("offset {} is not integral", c)))?;
                match displacement(offset) {
                    Some(disp) => Address::base_disp(base, disp, ty)?,
                    None => {
                        let index = cx.force_register(Operand::long_const(offset), OprType::Long);
                        Address::new(base.into(), index, Scale::Times1, 0, ty)?
                    }
                }
            }
            Operand::Register(index) => Address::new(base.into(), index.into(), Scale::Times1, 0, ty)?,
            other => {
                return Err(CompileError::invariant(format!("offset must be a register or constant, got {}", other)))
            }
        }
    };

    if in_register {
        let ptr = cx.new_register(OprType::Address);
        if access.needs_patching() {
            cx.lir.append(
                Instruction::new(Opcode::Leal, &[addr.into()], ptr)
                    .with_payload(Payload::Move { kind: MoveKind::Normal, patch: PatchCode::Normal })
                    .with_info(access.info),
            );
            cx.record_patch(access.info);
            access.decorators = access.decorators.without(DecoratorSet::NEEDS_PATCHING);
        } else {
            cx.lir.leal(addr.into(), ptr);
        }
        let ptr = ptr
            .as_register()
            .ok_or_else(|| CompileError::invariant("leal target is not a register"))?;
        addr = Address::base_disp(ptr, 0, ty)?;
    }
    let addr = addr.with_mem_type(access.ty)?;

    log::trace!("resolved {:?} {} access to {}", access.decorators, access.ty.name(), addr);
    access.resolved = Operand::Address(addr);
    access.advance(AccessState::AddressResolved)
}

/// Outcome of the reference-check guard for unknown-strength reference loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentCheck {
    /// The load cannot be a referent read; no barrier needed.
    Skip,
    /// Guards branch to the label when the load is not a referent read.
    Guarded(Label),
}

/// Emit the runtime checks that decide whether an unsafe reference load reads the
/// referent of a reference object: the offset is the referent offset, the base is
/// non-null, and the base's class is a reference type.
pub fn generate_referent_check(cx: &mut EmitContext<'_>, access: &LirAccess) -> CompileResult<ReferentCheck> {
    let referent_offset = cx.options.referent_offset;
    let mut offset_check = true;
    let mut source_check = true;

    if let Some(c) = access.offset.as_constant() {
        match c.as_displacement() {
            Some(off) if off == referent_offset as i64 => offset_check = false,
            _ => return Ok(ReferentCheck::Skip),
        }
    }
    if access.is_array() {
        return Ok(ReferentCheck::Skip);
    }
    if let Some(c) = access.base.as_constant() {
        if c == Constant::Object(None) {
            return Ok(ReferentCheck::Skip);
        }
        source_check = false;
    }

    let cont = cx.lir.new_label();
    let base_reg = cx.new_register(OprType::Object);
    cx.lir.move_(access.base, base_reg);

    if offset_check {
        let referent = match access.offset.ty() {
            Some(OprType::Long) => cx.force_register(Operand::long_const(referent_offset as i64), OprType::Long),
            _ => Operand::int_const(referent_offset),
        };
        cx.lir.cmp(Condition::NotEqual, access.offset, referent);
        cx.lir.branch_to_label(Condition::NotEqual, cont);
    }
    if source_check {
        cx.lir.cmp(Condition::Equal, base_reg, Operand::null());
        cx.lir.branch_to_label(Condition::Equal, cont);
    }

    let base = base_reg
        .as_register()
        .ok_or_else(|| CompileError::invariant("referent check base is not a register"))?;
    let klass = cx.new_register(OprType::Metadata);
    cx.lir.move_(Address::base_disp(base, cx.options.klass_offset, OprType::Metadata)?.into(), klass);
    let klass = klass
        .as_register()
        .ok_or_else(|| CompileError::invariant("class pointer is not a register"))?;
    let reference_type = cx.new_register(OprType::Int);
    cx.lir.move_(
        Address::base_disp(klass, cx.options.reference_type_offset, OprType::Int)?
            .with_mem_type(BasicType::Byte)?
            .into(),
        reference_type,
    );
    cx.lir.cmp(Condition::Equal, reference_type, Operand::int_const(REF_NONE));
    cx.lir.branch_to_label(Condition::Equal, cont);

    Ok(ReferentCheck::Guarded(cont))
}

/// Entry points for every memory access, dispatching barriers to the installed policy.
#[derive(Debug, Clone)]
pub struct AccessProtocol {
    policy: Arc<dyn BarrierPolicy>,
    raw: NoBarrier,
}

impl AccessProtocol {
    pub fn new(policy: Arc<dyn BarrierPolicy>) -> Self {
        Self { policy, raw: NoBarrier }
    }

    /// Protocol with the barrier policy selected by `config`.
    pub fn from_config(config: &Config) -> Self {
        let policy: Arc<dyn BarrierPolicy> = match config.collector {
            CollectorKind::None => Arc::new(NoBarrier),
            CollectorKind::CardTable => Arc::new(CardTableBarrier::new(config.cond_card_mark)),
            CollectorKind::Satb => Arc::new(SatbBarrier::new(config.cond_card_mark)),
        };
        log::debug!("barrier policy: {}", policy.name());
        Self::new(policy)
    }

    pub fn policy(&self) -> &dyn BarrierPolicy {
        &*self.policy
    }

    fn policy_for(&self, access: &LirAccess) -> &dyn BarrierPolicy {
        if access.is_raw() {
            &self.raw
        } else {
            &*self.policy
        }
    }

    /// Store `value` to `base + offset`.
    pub fn store_at(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, value: Operand) -> CompileResult<()> {
        access.add_decorators(DecoratorSet::ACCESS_WRITE);
        let policy = self.policy_for(access);
        resolve_address(cx, access, policy.resolve_in_register(access))?;
        access.advance(AccessState::BarrierFraming)?;

        if access.is_oop() {
            policy.pre_barrier(cx, access, Operand::Illegal)?;
        }
        let value = if access.decorators.contains(DecoratorSet::MASK_BOOLEAN) {
            let masked = cx.new_register(OprType::Int);
            cx.lir.logical_and(value, Operand::int_const(1), masked);
            masked
        } else {
            value
        };

        let fences = policy.fences(access, cx.options.support_iriw);
        if let Some(fence) = fences.before {
            cx.lir.append(Instruction::op0(fence));
        }
        let (kind, patch) = move_shape(access);
        cx.lir.move_with(value, access.resolved, kind, patch, access.info);
        if patch == PatchCode::Normal {
            cx.record_patch(access.info);
        }
        if let Some(fence) = fences.after {
            cx.lir.append(Instruction::op0(fence));
        }

        if access.is_oop() {
            policy.post_barrier(cx, access, value)?;
        }
        access.advance(AccessState::Emitted)
    }

    /// Load from `base + offset` into `result`.
    pub fn load_at(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, result: Operand) -> CompileResult<()> {
        access.add_decorators(DecoratorSet::ACCESS_READ);
        let policy = self.policy_for(access);
        resolve_address(cx, access, policy.resolve_in_register(access))?;
        self.load_resolved(cx, access, result)
    }

    /// Load through an already resolved address.
    pub fn load(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, addr: Operand, result: Operand) -> CompileResult<()> {
        if !addr.is_address() {
            return Err(CompileError::invariant(format!("pre-resolved load needs an address, got {}", addr)));
        }
        access.add_decorators(DecoratorSet::ACCESS_READ);
        access.resolved = addr;
        access.advance(AccessState::AddressResolved)?;
        self.load_resolved(cx, access, result)
    }

    fn load_resolved(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, result: Operand) -> CompileResult<()> {
        let policy = self.policy_for(access);
        access.advance(AccessState::BarrierFraming)?;

        let fences = policy.fences(access, cx.options.support_iriw);
        if let Some(fence) = fences.before {
            cx.lir.append(Instruction::op0(fence));
        }
        let (kind, patch) = move_shape(access);
        cx.lir.move_with(access.resolved, result, kind, patch, access.info);
        if patch == PatchCode::Normal {
            cx.record_patch(access.info);
        }
        if let Some(fence) = fences.after {
            cx.lir.append(Instruction::op0(fence));
        }

        if access.decorators.contains(DecoratorSet::MASK_BOOLEAN) {
            let is_zero = cx.lir.new_label();
            cx.lir.cmp(Condition::Equal, result, Operand::int_const(0));
            cx.lir.branch_to_label(Condition::Equal, is_zero);
            cx.lir.move_(Operand::int_const(1), result);
            cx.lir.label(is_zero);
        }

        policy.after_load(cx, access, result)?;
        access.advance(AccessState::Emitted)
    }

    fn prepare_atomic(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess) -> CompileResult<()> {
        access.add_decorators(DecoratorSet::ACCESS_READ | DecoratorSet::ACCESS_WRITE);
        if !access.decorators.has_memory_order() {
            access.decorators |= DecoratorSet::MO_SEQ_CST;
        }
        resolve_address(cx, access, true)?;
        access.advance(AccessState::BarrierFraming)?;
        if access.is_oop() {
            self.policy_for(access).pre_barrier(cx, access, Operand::Illegal)?;
        }
        Ok(())
    }

    fn finish_atomic(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, new_value: Operand) -> CompileResult<()> {
        if access.is_oop() {
            self.policy_for(access).post_barrier(cx, access, new_value)?;
        }
        access.advance(AccessState::Emitted)
    }

    /// Compare-and-swap; returns an int register holding 1 on success.
    pub fn atomic_cmpxchg_at(
        &self,
        cx: &mut EmitContext<'_>,
        access: &mut LirAccess,
        cmp_value: Operand,
        new_value: Operand,
    ) -> CompileResult<Operand> {
        self.prepare_atomic(cx, access)?;
        let ty = access.opr_type();
        let cmp_value = cx.force_register(cmp_value, ty);
        let new_value = cx.force_register(new_value, ty);
        let opcode = match ty {
            OprType::Long => Opcode::CasLong,
            OprType::Object => Opcode::CasObj,
            _ => Opcode::CasInt,
        };
        let result = cx.new_register(OprType::Int);
        cx.lir.cas(opcode, access.resolved, cmp_value, new_value, result, &[]);
        self.finish_atomic(cx, access, new_value)?;
        Ok(result)
    }

    /// Atomic exchange; returns the previous value.
    pub fn atomic_xchg_at(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, value: Operand) -> CompileResult<Operand> {
        self.prepare_atomic(cx, access)?;
        let ty = access.opr_type();
        let value = cx.force_register(value, ty);
        let result = cx.new_register(ty);
        cx.lir.xchg(access.resolved, value, result, Operand::Illegal);
        self.finish_atomic(cx, access, value)?;
        Ok(result)
    }

    /// Atomic fetch-and-add; returns the previous value.
    pub fn atomic_add_at(&self, cx: &mut EmitContext<'_>, access: &mut LirAccess, value: Operand) -> CompileResult<Operand> {
        if access.is_oop() {
            return Err(CompileError::invariant("atomic add on a reference"));
        }
        self.prepare_atomic(cx, access)?;
        let ty = access.opr_type();
        let result = cx.new_register(ty);
        cx.lir.xadd(access.resolved, value, result, Operand::Illegal);
        self.finish_atomic(cx, access, value)?;
        Ok(result)
    }
}

fn move_shape(access: &LirAccess) -> (MoveKind, PatchCode) {
    if access.needs_patching() {
        (MoveKind::Normal, PatchCode::Normal)
    } else if access.is_volatile() {
        (MoveKind::Volatile, PatchCode::None)
    } else {
        (MoveKind::Normal, PatchCode::None)
    }
}
