// This module provides the per-block instruction list. A BlockProgram is append-only:
// instructions go in through append (directly or through the typed emit helpers, which
// mirror the instruction catalogue one helper per shape) and stay in insertion order.
// Once the generator hands a block to the allocator it is sealed and further appends are
// refused. The only way to put instructions anywhere but the end is an InsertionBuffer,
// which collects (index, instructions) pairs in ascending index order and splices them
// into the list in one pass.

//! Per-block instruction lists.

use super::instruction::{
    BlockId, BranchTarget, CallTarget, Condition, ConvertKind, Instruction, Label, MoveKind, Opcode,
    PatchCode, Payload, StateRef,
};
use super::operand::Operand;
use crate::core::error::{CompileError, CompileResult};
use std::fmt;

/// Ordered instruction list of one basic block.
#[derive(Debug, Clone)]
pub struct BlockProgram {
    block: BlockId,
    ops: Vec<Instruction>,
    sealed: bool,
    next_label: u32,
}

impl BlockProgram {
    pub fn new(block: BlockId) -> Self {
        Self { block, ops: Vec::new(), sealed: false, next_label: 0 }
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.ops
    }

    pub fn last_mut(&mut self) -> Option<&mut Instruction> {
        self.ops.last_mut()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Hand the block over to the allocator. No further appends are accepted.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Append an instruction.
    pub fn append(&mut self, inst: Instruction) {
        debug_assert!(!self.sealed, "append to sealed block {}", self.block);
        if self.sealed {
            log::error!("dropping {} appended to sealed block {}", inst.opcode().name(), self.block);
            return;
        }
        log::trace!("{}: {}", self.block, inst);
        self.ops.push(inst);
    }

    /// Fresh block-local label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Splice the contents of `buffer` into this block.
    pub fn apply_insertion_buffer(&mut self, buffer: InsertionBuffer) -> CompileResult<()> {
        if buffer.block != Some(self.block) {
            return Err(CompileError::invariant(format!(
                "insertion buffer for {:?} applied to {}",
                buffer.block, self.block
            )));
        }
        if let Some(&(index, _)) = buffer.points.last() {
            if index > self.ops.len() {
                return Err(CompileError::invariant(format!(
                    "insertion point {} beyond end of {} ({} instructions)",
                    index,
                    self.block,
                    self.ops.len()
                )));
            }
        }

        let old = std::mem::take(&mut self.ops);
        let mut out = Vec::with_capacity(old.len() + buffer.ops.len());
        let mut pending = buffer.ops.into_iter();
        let mut points = buffer.points.into_iter().peekable();
        let old_len = old.len();

        for (i, inst) in old.into_iter().enumerate() {
            if let Some(&(index, count)) = points.peek() {
                if index == i {
                    out.extend(pending.by_ref().take(count));
                    points.next();
                }
            }
            out.push(inst);
        }
        if let Some((index, count)) = points.next() {
            debug_assert_eq!(index, old_len);
            out.extend(pending.by_ref().take(count));
        }

        self.ops = out;
        Ok(())
    }

    // Emit helpers. Each appends one instruction.

    pub fn label(&mut self, label: Label) {
        self.append(Instruction::op0(Opcode::Label).with_payload(Payload::Label(label)));
    }

    pub fn std_entry(&mut self) {
        self.append(Instruction::op0(Opcode::StdEntry));
    }

    pub fn nop(&mut self) {
        self.append(Instruction::op0(Opcode::Nop));
    }

    pub fn move_(&mut self, src: Operand, dst: Operand) {
        self.move_with(src, dst, MoveKind::Normal, PatchCode::None, None);
    }

    pub fn move_with(
        &mut self,
        src: Operand,
        dst: Operand,
        kind: MoveKind,
        patch: PatchCode,
        info: Option<StateRef>,
    ) {
        self.append(
            Instruction::new(Opcode::Move, &[src], dst)
                .with_payload(Payload::Move { kind, patch })
                .with_info(info),
        );
    }

    pub fn membar(&mut self) {
        self.append(Instruction::op0(Opcode::Membar));
    }

    pub fn membar_acquire(&mut self) {
        self.append(Instruction::op0(Opcode::MembarAcquire));
    }

    pub fn membar_release(&mut self) {
        self.append(Instruction::op0(Opcode::MembarRelease));
    }

    pub fn membar_storestore(&mut self) {
        self.append(Instruction::op0(Opcode::MembarStoreStore));
    }

    pub fn get_thread(&mut self, dst: Operand) {
        self.append(Instruction::new(Opcode::GetThread, &[], dst));
    }

    pub fn leal(&mut self, addr: Operand, dst: Operand) {
        self.append(Instruction::new(Opcode::Leal, &[addr], dst));
    }

    pub fn null_check(&mut self, opr: Operand, info: Option<StateRef>) {
        self.append(Instruction::new(Opcode::NullCheck, &[opr], Operand::Illegal).with_info(info));
    }

    pub fn safepoint(&mut self, tmp: Operand, info: Option<StateRef>) {
        self.append(Instruction::new(Opcode::Safepoint, &[], Operand::Illegal).with_temps(&[tmp]).with_info(info));
    }

    pub fn cmp(&mut self, cond: Condition, left: Operand, right: Operand) {
        self.append(Instruction::new(Opcode::Cmp, &[left, right], Operand::Illegal).with_payload(Payload::Condition(cond)));
    }

    pub fn cmove(&mut self, cond: Condition, left: Operand, right: Operand, dst: Operand) {
        self.append(Instruction::new(Opcode::CMove, &[left, right], dst).with_payload(Payload::Condition(cond)));
    }

    pub fn branch(&mut self, cond: Condition, target: BranchTarget) {
        self.append(Instruction::op0(Opcode::Branch).with_payload(Payload::Branch { cond, target }));
    }

    pub fn branch_to_label(&mut self, cond: Condition, label: Label) {
        self.branch(cond, BranchTarget::Label(label));
    }

    pub fn jump(&mut self, block: BlockId) {
        self.branch(Condition::Always, BranchTarget::Block(block));
    }

    /// Two-operand arithmetic or logic.
    pub fn arith(&mut self, opcode: Opcode, left: Operand, right: Operand, dst: Operand, tmp: Operand) {
        self.append(Instruction::new(opcode, &[left, right], dst).with_temps(&[tmp]));
    }

    pub fn add(&mut self, left: Operand, right: Operand, dst: Operand) {
        self.arith(Opcode::Add, left, right, dst, Operand::Illegal);
    }

    pub fn sub(&mut self, left: Operand, right: Operand, dst: Operand) {
        self.arith(Opcode::Sub, left, right, dst, Operand::Illegal);
    }

    pub fn logical_and(&mut self, left: Operand, right: Operand, dst: Operand) {
        self.arith(Opcode::And, left, right, dst, Operand::Illegal);
    }

    pub fn unsigned_shift_right(&mut self, value: Operand, count: Operand, dst: Operand) {
        self.arith(Opcode::Ushr, value, count, dst, Operand::Illegal);
    }

    pub fn negate(&mut self, value: Operand, dst: Operand) {
        self.append(Instruction::new(Opcode::Neg, &[value], dst));
    }

    pub fn convert(&mut self, kind: ConvertKind, src: Operand, dst: Operand) {
        self.append(Instruction::new(Opcode::Convert, &[src], dst).with_payload(Payload::Convert(kind)));
    }

    /// Integer division or remainder with an implicit zero check.
    pub fn idiv(&mut self, opcode: Opcode, left: Operand, right: Operand, dst: Operand, tmp: Operand, info: Option<StateRef>) {
        self.append(Instruction::new(opcode, &[left, right], dst).with_temps(&[tmp]).with_info(info));
    }

    pub fn call(
        &mut self,
        opcode: Opcode,
        target: CallTarget,
        args: Vec<Operand>,
        result: Operand,
        info: Option<StateRef>,
    ) {
        self.append(
            Instruction::new(opcode, &[], result)
                .with_payload(Payload::Call { target, args })
                .with_info(info),
        );
    }

    /// Compare-and-swap at `addr`. `result` receives 1 on success.
    pub fn cas(&mut self, opcode: Opcode, addr: Operand, cmp: Operand, new_value: Operand, result: Operand, temps: &[Operand]) {
        self.append(Instruction::new(opcode, &[addr, cmp, new_value], result).with_temps(temps));
    }

    pub fn xchg(&mut self, addr: Operand, value: Operand, dst: Operand, tmp: Operand) {
        self.append(Instruction::new(Opcode::Xchg, &[addr, value], dst).with_temps(&[tmp]));
    }

    pub fn xadd(&mut self, addr: Operand, value: Operand, dst: Operand, tmp: Operand) {
        self.append(Instruction::new(Opcode::Xadd, &[addr, value], dst).with_temps(&[tmp]));
    }

    pub fn return_op(&mut self, result: Operand) {
        self.append(Instruction::new(Opcode::Return, &[result], Operand::Illegal));
    }
}

impl fmt::Display for BlockProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.block)?;
        for (i, inst) in self.ops.iter().enumerate() {
            writeln!(f, "  {:>3}  {}", i, inst)?;
        }
        Ok(())
    }
}

/// Deferred instructions to splice into a block before given indices.
#[derive(Debug, Default)]
pub struct InsertionBuffer {
    block: Option<BlockId>,
    /// (index, count) pairs, strictly ascending by index.
    points: Vec<(usize, usize)>,
    ops: Vec<Instruction>,
}

impl InsertionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the buffer to a block. Must not already be bound.
    pub fn init(&mut self, block: BlockId) -> CompileResult<()> {
        if let Some(current) = self.block {
            return Err(CompileError::invariant(format!(
                "insertion buffer already bound to {}",
                current
            )));
        }
        self.block = Some(block);
        self.points.clear();
        self.ops.clear();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.block.is_some()
    }

    pub fn number_of_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn number_of_insertion_points(&self) -> usize {
        self.points.len()
    }

    /// Queue `inst` to be placed before the instruction currently at `index`.
    /// Indices must be non-decreasing across calls.
    pub fn append(&mut self, index: usize, inst: Instruction) -> CompileResult<()> {
        if self.block.is_none() {
            return Err(CompileError::invariant("insertion buffer used before init"));
        }
        match self.points.last().map(|&(last, _)| last) {
            Some(last) if last == index => {
                if let Some(point) = self.points.last_mut() {
                    point.1 += 1;
                }
            }
            Some(last) if last > index => {
                return Err(CompileError::invariant(format!(
                    "insertion index {} after {}: indices must ascend",
                    index, last
                )))
            }
            _ => self.points.push((index, 1)),
        }
        self.ops.push(inst);
        Ok(())
    }

    pub fn move_(&mut self, index: usize, src: Operand, dst: Operand) -> CompileResult<()> {
        self.append(
            index,
            Instruction::new(Opcode::Move, &[src], dst)
                .with_payload(Payload::Move { kind: MoveKind::Normal, patch: PatchCode::None }),
        )
    }
}
