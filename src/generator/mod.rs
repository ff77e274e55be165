// This module implements the LIR generator, the orchestrator that turns one tree-IR
// method into one BlockProgram per basic block. It makes a single pass over the blocks in
// the order the method lists them. Before the walk every phi gets its virtual register,
// so a predecessor can feed a phi whose block has not been generated yet. The entry block
// starts with StdEntry and copies each incoming argument out of its calling-convention
// location into a fresh virtual register. Expressions are lowered bottom-up into virtual
// registers. Every load, store and atomic goes through the AccessProtocol and so picks up
// whatever barriers the configured collector needs. Calls ask the frame map for the
// outgoing convention, which also grows the reserved argument area, and copy the result
// out of the architecture's result register. A goto into a block with phis hands the
// parallel copies to a PhiResolver whose nodes live in a scratch arena reset per edge. The
// virtual-register bailout is polled after every statement so an exhausted method stops
// early rather than running on with poisoned registers.

//! Tree IR to LIR generation.

use crate::access::{AccessOptions, AccessProtocol, DecoratorSet, EmitContext, LirAccess, PatchRecord};
use crate::arch::{Architecture, ConventionKind};
use crate::config::Config;
use crate::core::error::{Bailout, CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::frame_map::{FrameLayout, FrameMap, Platform};
use crate::hir::{AtomicOp, BinaryOp, Block, Call, CallKind, Expr, Field, Method, RefStrength, Stmt, Terminator, ValueId};
use crate::lir::{
    BasicType, BlockId, BlockProgram, BranchTarget, Constant, Opcode, Operand, Register, StateRef, VirtualRegisters,
};
use crate::phi_resolver::PhiResolver;
use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};
use std::fmt;

/// Generated LIR of one method.
pub struct LirMethod<'p, A: Architecture> {
    name: String,
    blocks: Vec<BlockProgram>,
    frame_map: FrameMap<'p, A>,
    vregs: VirtualRegisters,
    patches: Vec<PatchRecord>,
}

impl<'p, A: Architecture> LirMethod<'p, A> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[BlockProgram] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockProgram> {
        self.blocks.iter().find(|b| b.block() == id)
    }

    pub fn frame_map(&self) -> &FrameMap<'p, A> {
        &self.frame_map
    }

    pub fn vregs(&self) -> &VirtualRegisters {
        &self.vregs
    }

    /// Instructions whose displacement is patched at runtime.
    pub fn patches(&self) -> &[PatchRecord] {
        &self.patches
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BlockProgram::len).sum()
    }

    /// Seal every block and fix the frame once the allocator knows its spill count.
    pub fn finalize_frame(&mut self, spill_count: u32) -> CompileResult<FrameLayout> {
        for block in &mut self.blocks {
            block.seal();
        }
        self.frame_map.finalize_frame(spill_count).copied()
    }
}

impl<A: Architecture> fmt::Display for LirMethod<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {} ({})", self.name, A::NAME)?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        for patch in &self.patches {
            writeln!(f, "patch {}[{}]", patch.block, patch.index)?;
        }
        match self.frame_map.layout() {
            Some(layout) => writeln!(
                f,
                "frame: {} bytes ({} words), {} spills, {} monitors, {} bytes outgoing",
                layout.frame_size_bytes,
                layout.frame_size_words,
                layout.spill_count,
                layout.monitor_count,
                layout.reserved_argument_area
            ),
            None => writeln!(f, "frame: not finalized, {} bytes outgoing", self.frame_map.reserved_argument_area_size()),
        }
    }
}

/// Generates LIR for methods of one architecture.
pub struct LirGenerator<'p, A: Architecture> {
    platform: &'p Platform<A>,
    access: AccessProtocol,
    options: AccessOptions,
    scratch: Bump,
}

impl<'p, A: Architecture> LirGenerator<'p, A> {
    /// Generator with the barrier policy and reference layout selected by `config`.
    pub fn new(platform: &'p Platform<A>, config: &Config) -> CompileResult<Self> {
        if config.arch.target_name() != A::NAME {
            return Err(CompileError::invariant(format!(
                "configured for {} but generating for {}",
                config.arch.target_name(),
                A::NAME
            )));
        }
        Ok(Self::with_access(
            platform,
            AccessProtocol::from_config(config),
            AccessOptions::for_arch::<A>(config.compressed_oops),
        ))
    }

    pub fn with_access(platform: &'p Platform<A>, access: AccessProtocol, options: AccessOptions) -> Self {
        Self { platform, access, options, scratch: Bump::new() }
    }

    pub fn access(&self) -> &AccessProtocol {
        &self.access
    }

    /// Generate LIR for `method`, recording the outcome in `session`.
    pub fn generate(&mut self, session: &CompilationSession<'_>, method: &Method) -> CompileResult<LirMethod<'p, A>> {
        session.set_current_method(&method.name);
        let mut gen = MethodGen::new(self.platform, &self.access, self.options, &mut self.scratch, method)?;
        let result = gen.run();
        session.record_phi_moves(gen.phi_moves, gen.cycle_temps);

        match result {
            Ok(()) => {
                let lir = gen.finish();
                session.record_method_generated(&lir.blocks);
                Ok(lir)
            }
            Err(CompileError::Bailout(bailout)) => {
                session.record_bailout(&bailout);
                Err(bailout.into())
            }
            Err(err) => Err(err),
        }
    }
}

struct MethodGen<'g, 'm, 'p, A: Architecture> {
    method: &'m Method,
    platform: &'p Platform<A>,
    access: &'g AccessProtocol,
    options: AccessOptions,
    scratch: &'g mut Bump,
    thread: Register,

    frame_map: FrameMap<'p, A>,
    vregs: VirtualRegisters,
    patches: Vec<PatchRecord>,
    blocks: Vec<BlockProgram>,

    values: HashMap<ValueId, Operand>,
    phi_values: HashSet<ValueId>,
    params: Vec<Operand>,
    next_state: u32,

    phi_moves: usize,
    cycle_temps: usize,
}

impl<'g, 'm, 'p, A: Architecture> MethodGen<'g, 'm, 'p, A> {
    fn new(
        platform: &'p Platform<A>,
        access: &'g AccessProtocol,
        options: AccessOptions,
        scratch: &'g mut Bump,
        method: &'m Method,
    ) -> CompileResult<Self> {
        let mut frame_map = FrameMap::new(platform, &method.params)?;
        frame_map.set_monitor_count(method.monitor_count)?;

        Ok(Self {
            method,
            platform,
            access,
            options,
            scratch,
            thread: platform.thread_register()?,
            frame_map,
            vregs: platform.virtual_registers()?,
            patches: Vec::new(),
            blocks: Vec::with_capacity(method.blocks.len()),
            values: HashMap::new(),
            phi_values: HashSet::new(),
            params: Vec::with_capacity(method.params.len()),
            next_state: 0,
            phi_moves: 0,
            cycle_temps: 0,
        })
    }

    fn run(&mut self) -> CompileResult<()> {
        log::debug!("{}: {} blocks", self.method.name, self.method.blocks.len());
        self.allocate_phis()?;
        let method = self.method;
        for block in &method.blocks {
            let lir = self.block(block)?;
            self.blocks.push(lir);
        }
        self.vregs.check()
    }

    fn finish(self) -> LirMethod<'p, A> {
        LirMethod {
            name: self.method.name.clone(),
            blocks: self.blocks,
            frame_map: self.frame_map,
            vregs: self.vregs,
            patches: self.patches,
        }
    }

    fn allocate_phis(&mut self) -> CompileResult<()> {
        let method = self.method;
        for (block, preds) in method.blocks.iter().zip(method.predecessors()) {
            if !block.phis.is_empty() && block.id == BlockId(0) {
                return Err(CompileError::invariant("the entry block cannot have phis"));
            }
            for phi in &block.phis {
                let unmatched = preds.iter().find(|pred| phi.input_from(**pred).is_none());
                if phi.incoming.len() != preds.len() || unmatched.is_some() {
                    return Err(CompileError::invariant(format!(
                        "phi {} in {} has {} inputs for {} predecessors",
                        phi.value,
                        block.id,
                        phi.incoming.len(),
                        preds.len()
                    )));
                }
                let ty = phi
                    .ty
                    .opr_type()
                    .ok_or_else(|| CompileError::invariant(format!("phi {} has type void", phi.value)))?;
                let opr = self.vregs.new_register(ty);
                self.define(phi.value, opr)?;
                self.phi_values.insert(phi.value);
            }
        }
        self.vregs.check()
    }

    fn define(&mut self, value: ValueId, opr: Operand) -> CompileResult<()> {
        if self.values.insert(value, opr).is_some() {
            return Err(CompileError::invariant(format!("{} defined twice", value)));
        }
        Ok(())
    }

    fn state(&mut self) -> Option<StateRef> {
        let state = StateRef(self.next_state);
        self.next_state += 1;
        Some(state)
    }

    fn new_register(&mut self, ty: BasicType) -> CompileResult<Operand> {
        let ty = ty
            .opr_type()
            .ok_or_else(|| CompileError::invariant("register of type void"))?;
        Ok(self.vregs.new_register(ty))
    }

    fn force_register(&mut self, lir: &mut BlockProgram, opr: Operand) -> CompileResult<Operand> {
        if opr.is_register() {
            return Ok(opr);
        }
        let ty = opr
            .ty()
            .ok_or_else(|| CompileError::invariant(format!("cannot load {} into a register", opr)))?;
        let reg = self.vregs.new_register(ty);
        lir.move_(opr, reg);
        Ok(reg)
    }

    /// Operand stored to memory as is: registers and constants the move can encode.
    fn store_operand(&mut self, lir: &mut BlockProgram, opr: Operand) -> CompileResult<Operand> {
        match opr.as_constant() {
            Some(Constant::Int(_) | Constant::Long(_) | Constant::Object(None)) | None => Ok(opr),
            Some(_) => self.force_register(lir, opr),
        }
    }

    fn with_access<T>(
        &mut self,
        lir: &mut BlockProgram,
        f: impl FnOnce(&AccessProtocol, &mut EmitContext<'_>) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let mut cx = EmitContext {
            lir,
            vregs: &mut self.vregs,
            patches: &mut self.patches,
            thread: self.thread,
            options: self.options,
        };
        f(self.access, &mut cx)
    }

    fn block(&mut self, block: &'m Block) -> CompileResult<BlockProgram> {
        let mut lir = BlockProgram::new(block.id);
        log::debug!("{}: generating {}", self.method.name, block.id);

        if block.id == BlockId(0) {
            self.entry(&mut lir)?;
        }
        for stmt in &block.stmts {
            self.stmt(&mut lir, stmt)?;
            self.vregs.check()?;
        }
        self.terminator(&mut lir, block)?;
        self.vregs.check()?;
        Ok(lir)
    }

    fn entry(&mut self, lir: &mut BlockProgram) -> CompileResult<()> {
        lir.std_entry();
        let method = self.method;
        let incoming = self.frame_map.incoming_arguments().to_vec();
        for (&ty, location) in method.params.iter().zip(incoming) {
            let dest = self.new_register(ty)?;
            lir.move_(location, dest);
            if location.is_stack() {
                if let Some(vreg) = dest.vreg() {
                    self.vregs.set_must_start_in_memory(vreg)?;
                }
            }
            self.params.push(dest);
        }
        Ok(())
    }

    fn stmt(&mut self, lir: &mut BlockProgram, stmt: &'m Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let(value, expr) => {
                if self.phi_values.contains(value) {
                    return Err(CompileError::invariant(format!("{} is a phi and cannot be redefined", value)));
                }
                let opr = self.expr(lir, expr)?;
                self.define(*value, opr)
            }
            Stmt::Eval(expr) => self.expr(lir, expr).map(|_| ()),
            Stmt::StoreField { object, field, value } => {
                let object = self.value(lir, object)?;
                let value = self.value(lir, value)?;
                let value = self.store_operand(lir, value)?;
                let (decorators, offset, info) = self.field_access(lir, object, field)?;
                self.with_access(lir, |access, cx| {
                    let mut a = LirAccess::new(decorators, field.ty, object, offset).with_info(info);
                    access.store_at(cx, &mut a, value)
                })
            }
            Stmt::StoreArray { elem, array, index, value } => {
                let array = self.value(lir, array)?;
                let index = self.value(lir, index)?;
                let value = self.value(lir, value)?;
                let value = self.store_operand(lir, value)?;
                let mut decorators = DecoratorSet::IN_HEAP | DecoratorSet::IS_ARRAY;
                if *elem == BasicType::Boolean {
                    decorators |= DecoratorSet::MASK_BOOLEAN;
                }
                let info = self.state();
                self.with_access(lir, |access, cx| {
                    let mut a = LirAccess::new(decorators, *elem, array, index).with_info(info);
                    access.store_at(cx, &mut a, value)
                })
            }
        }
    }

    /// Decorators, offset operand and debug state of a field access. An unresolved field
    /// gets an explicit null check since the patched access cannot fault usefully.
    fn field_access(
        &mut self,
        lir: &mut BlockProgram,
        object: Operand,
        field: &Field,
    ) -> CompileResult<(DecoratorSet, Operand, Option<StateRef>)> {
        let mut decorators = DecoratorSet::IN_HEAP;
        if field.volatile {
            decorators |= DecoratorSet::MO_SEQ_CST;
        }
        if field.strength == RefStrength::Weak {
            decorators |= DecoratorSet::ON_WEAK_OOP_REF;
        }
        let info = self.state();
        let offset = match field.offset {
            Some(offset) => Operand::int_const(offset),
            None => {
                decorators |= DecoratorSet::NEEDS_PATCHING;
                lir.null_check(object, info);
                Operand::int_const(0)
            }
        };
        Ok((decorators, offset, info))
    }

    /// Lower an expression that must produce a value.
    fn value(&mut self, lir: &mut BlockProgram, expr: &'m Expr) -> CompileResult<Operand> {
        let opr = self.expr(lir, expr)?;
        if opr.is_illegal() {
            return Err(CompileError::invariant(format!("expression {:?} has no value", expr)));
        }
        Ok(opr)
    }

    fn expr(&mut self, lir: &mut BlockProgram, expr: &'m Expr) -> CompileResult<Operand> {
        match expr {
            Expr::Const(c) => Ok(Operand::Constant(*c)),
            Expr::Param(i) => self
                .params
                .get(*i as usize)
                .copied()
                .ok_or_else(|| CompileError::invariant(format!("parameter {} out of range", i))),
            Expr::Local(v) => self
                .values
                .get(v)
                .copied()
                .ok_or_else(|| CompileError::invariant(format!("use of undefined value {}", v))),
            Expr::Binary { op, ty, left, right } => {
                let left = self.value(lir, left)?;
                let right = self.value(lir, right)?;
                self.binary(lir, *op, *ty, left, right)
            }
            Expr::Negate { ty, value } => {
                let value = self.value(lir, value)?;
                let value = self.force_register(lir, value)?;
                let dst = self.new_register(*ty)?;
                lir.negate(value, dst);
                Ok(dst)
            }
            Expr::Convert { kind, value } => {
                let value = self.value(lir, value)?;
                let dst = self.vregs.new_register(kind.result_type());
                lir.convert(*kind, value, dst);
                Ok(dst)
            }
            Expr::LoadField { object, field } => {
                let object = self.value(lir, object)?;
                let (decorators, offset, info) = self.field_access(lir, object, field)?;
                let result = self.new_register(field.ty)?;
                self.with_access(lir, |access, cx| {
                    let mut a = LirAccess::new(decorators, field.ty, object, offset).with_info(info);
                    access.load_at(cx, &mut a, result)
                })?;
                Ok(result)
            }
            Expr::LoadArray { elem, array, index } => {
                let array = self.value(lir, array)?;
                let index = self.value(lir, index)?;
                let result = self.new_register(*elem)?;
                let info = self.state();
                self.with_access(lir, |access, cx| {
                    let mut a = LirAccess::new(DecoratorSet::IN_HEAP | DecoratorSet::IS_ARRAY, *elem, array, index)
                        .with_info(info);
                    access.load_at(cx, &mut a, result)
                })?;
                Ok(result)
            }
            Expr::UnsafeLoad { ty, object, offset, volatile } => {
                let object = self.value(lir, object)?;
                let offset = self.value(lir, offset)?;
                let offset = match offset {
                    Operand::Constant(_) | Operand::Register(_) => offset,
                    other => self.force_register(lir, other)?,
                };
                let mut decorators = unsafe_decorators(*ty);
                if *volatile {
                    decorators |= DecoratorSet::MO_SEQ_CST;
                }
                if *ty == BasicType::Boolean {
                    decorators |= DecoratorSet::MASK_BOOLEAN;
                }
                let result = self.new_register(*ty)?;
                self.with_access(lir, |access, cx| {
                    let mut a = LirAccess::new(decorators, *ty, object, offset);
                    access.load_at(cx, &mut a, result)
                })?;
                Ok(result)
            }
            Expr::Atomic { op, ty, object, offset, operands } => {
                let object = self.value(lir, object)?;
                let offset = self.value(lir, offset)?;
                let mut values = Vec::with_capacity(operands.len());
                for operand in operands {
                    values.push(self.value(lir, operand)?);
                }
                self.atomic(lir, *op, *ty, object, offset, &values)
            }
            Expr::Call(call) => self.call(lir, call),
        }
    }

    fn binary(
        &mut self,
        lir: &mut BlockProgram,
        op: BinaryOp,
        ty: BasicType,
        left: Operand,
        right: Operand,
    ) -> CompileResult<Operand> {
        let left = self.force_register(lir, left)?;
        let dst = self.new_register(ty)?;
        if op.is_division() && !ty.is_floating() {
            let opcode = if op == BinaryOp::Div { Opcode::Idiv } else { Opcode::Irem };
            let tmp = self.new_register(ty)?;
            let info = self.state();
            lir.idiv(opcode, left, right, dst, tmp, info);
        } else {
            lir.arith(op.opcode(), left, right, dst, Operand::Illegal);
        }
        Ok(dst)
    }

    fn atomic(
        &mut self,
        lir: &mut BlockProgram,
        op: AtomicOp,
        ty: BasicType,
        object: Operand,
        offset: Operand,
        values: &[Operand],
    ) -> CompileResult<Operand> {
        let word_or_reference = matches!(ty, BasicType::Int | BasicType::Long) || ty.is_reference();
        if !word_or_reference || (op == AtomicOp::Add && ty.is_reference()) {
            return Err(Bailout::Unsupported { what: format!("{:?} on {}", op, ty.name()) }.into());
        }
        let decorators = unsafe_decorators(ty) | DecoratorSet::MO_SEQ_CST;
        self.with_access(lir, |access, cx| {
            let mut a = LirAccess::new(decorators, ty, object, offset);
            match (op, values) {
                (AtomicOp::CompareAndSwap, [expected, new_value]) => {
                    access.atomic_cmpxchg_at(cx, &mut a, *expected, *new_value)
                }
                (AtomicOp::Exchange, [value]) => access.atomic_xchg_at(cx, &mut a, *value),
                (AtomicOp::Add, [value]) => access.atomic_add_at(cx, &mut a, *value),
                _ => Err(CompileError::invariant(format!("{:?} with {} operands", op, values.len()))),
            }
        })
    }

    fn call(&mut self, lir: &mut BlockProgram, call: &'m Call) -> CompileResult<Operand> {
        let mut signature = Vec::with_capacity(call.args.len());
        let mut values = Vec::with_capacity(call.args.len());
        for (ty, arg) in &call.args {
            signature.push(*ty);
            values.push(self.value(lir, arg)?);
        }

        let kind = match call.kind {
            CallKind::Native | CallKind::Runtime => ConventionKind::Native,
            CallKind::Static | CallKind::Virtual => ConventionKind::Managed,
        };
        let cc = self.frame_map.outgoing_convention(&signature, kind)?;

        let mut locations = Vec::with_capacity(values.len());
        for (i, value) in values.into_iter().enumerate() {
            let location = cc
                .at(i)
                .ok_or_else(|| CompileError::invariant(format!("no location for argument {}", i)))?;
            lir.move_(value, location);
            locations.push(location);
        }

        let opcode = match call.kind {
            CallKind::Static => Opcode::StaticCall,
            CallKind::Virtual => Opcode::IcVirtualCall,
            CallKind::Native | CallKind::Runtime => Opcode::RuntimeCall,
        };
        let result_reg = self.platform.result_operand(call.return_type)?;
        let info = self.state();
        lir.call(opcode, call.target, locations, result_reg, info);

        if result_reg.is_illegal() {
            return Ok(Operand::Illegal);
        }
        let result = self.new_register(call.return_type)?;
        lir.move_(result_reg, result);
        Ok(result)
    }

    fn terminator(&mut self, lir: &mut BlockProgram, block: &'m Block) -> CompileResult<()> {
        let method = self.method;
        match &block.end {
            Terminator::Goto(target) => {
                let target_block = method
                    .block(*target)
                    .ok_or_else(|| CompileError::invariant(format!("goto to unknown block {}", target)))?;
                if target.0 <= block.id.0 {
                    let info = self.state();
                    lir.safepoint(Operand::Illegal, info);
                }
                self.move_to_phis(lir, block.id, target_block)?;
                lir.jump(*target);
                Ok(())
            }
            Terminator::If { cond, left, right, then_block, else_block } => {
                for succ in [then_block, else_block] {
                    let succ_block = method
                        .block(*succ)
                        .ok_or_else(|| CompileError::invariant(format!("branch to unknown block {}", succ)))?;
                    if !succ_block.phis.is_empty() {
                        return Err(CompileError::invariant(format!(
                            "{} has phis but is reached by a conditional branch from {}; split the edge",
                            succ, block.id
                        )));
                    }
                }
                let left = self.value(lir, left)?;
                let left = self.force_register(lir, left)?;
                let right = self.value(lir, right)?;
                lir.cmp(*cond, left, right);
                lir.branch(*cond, BranchTarget::Block(*then_block));
                lir.jump(*else_block);
                Ok(())
            }
            Terminator::Return(value) => {
                let result = match (value, method.return_type) {
                    (None, BasicType::Void) => Operand::Illegal,
                    (Some(value), ty) if ty != BasicType::Void => {
                        let value = self.value(lir, value)?;
                        let reg = self.platform.result_operand(ty)?;
                        lir.move_(value, reg);
                        reg
                    }
                    (_, ty) => {
                        return Err(CompileError::invariant(format!(
                            "return in {} does not match return type {}",
                            block.id,
                            ty.name()
                        )))
                    }
                };
                lir.return_op(result);
                Ok(())
            }
        }
    }

    /// Emit the parallel copies feeding `target`'s phis from `from`.
    fn move_to_phis(&mut self, lir: &mut BlockProgram, from: BlockId, target: &'m Block) -> CompileResult<()> {
        if target.phis.is_empty() {
            return Ok(());
        }
        log::trace!("{} -> {}: {} phis", from, target.id, target.phis.len());

        let mut moves = Vec::with_capacity(target.phis.len());
        for phi in &target.phis {
            let input = phi.input_from(from).ok_or_else(|| {
                CompileError::invariant(format!("phi {} in {} has no input from {}", phi.value, target.id, from))
            })?;
            let src = self.expr(lir, input)?;
            if src.is_illegal() {
                log::warn!("{}: illegal input for phi {} from {}", target.id, phi.value, from);
                return Err(Bailout::IllegalPhi { block: target.id.0 }.into());
            }
            let dest = self
                .values
                .get(&phi.value)
                .copied()
                .ok_or_else(|| CompileError::invariant(format!("phi {} has no register", phi.value)))?;
            moves.push((src, dest));
        }

        self.scratch.reset();
        let mut resolver = PhiResolver::new(&*self.scratch);
        for (src, dest) in moves {
            resolver.add_move(src, dest)?;
        }
        let stats = resolver.resolve(lir, &mut self.vregs)?;
        self.phi_moves += stats.moves;
        self.cycle_temps += stats.temps;
        Ok(())
    }
}

fn unsafe_decorators(ty: BasicType) -> DecoratorSet {
    let mut decorators = DecoratorSet::IN_HEAP | DecoratorSet::UNSAFE_ACCESS;
    if ty.is_reference() {
        decorators |= DecoratorSet::ON_UNKNOWN_OOP_REF;
    }
    decorators
}
