// This module sequences the parallel copies that implement phi functions at a join. All
// moves on one edge conceptually happen at once, so a naive in-order emission can
// overwrite a source before it is read. The resolver builds a small graph with one node
// per virtual operand and one per non-virtual source (constants, stack slots, physical
// registers), with an edge from each source to every destination it feeds. Sources that
// are virtual are walked depth first in reverse insertion order and moves are emitted in
// post-order, so every destination is written only after everything that still reads it
// has been copied out. Reaching a node that is already on the current walk closes a
// cycle: the value flowing into it is parked in a fresh temporary, the rest of the chain
// is emitted, and the temporary is copied into the cycle's entry at the end. Each
// destination has a single source, so a walk closes at most one cycle and at most one
// temporary is live at any time. Moves out of non-virtual sources cannot be clobbered by
// anything else on the edge and are emitted last. Nodes live in a bump arena that the
// generator resets between joins.

//! Phi move sequencing.

use crate::core::error::{CompileError, CompileResult};
use crate::lir::{BlockProgram, Operand, VReg, VirtualRegisters};
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::HashMap;

struct ResolveNode<'a> {
    operand: Operand,
    destinations: BumpVec<'a, usize>,
    visited: bool,
    start_node: bool,
    assigned: bool,
    /// Already the target of a move on this edge.
    has_source: bool,
    /// Listed in `virtual_operands`.
    listed: bool,
}

/// Moves emitted by one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub moves: usize,
    /// Temporaries introduced to break cycles.
    pub temps: usize,
}

/// Collects the moves of one join edge and emits them in a safe order.
pub struct PhiResolver<'a> {
    nodes: BumpVec<'a, ResolveNode<'a>>,
    arena: &'a Bump,
    vreg_table: HashMap<VReg, usize>,
    virtual_operands: BumpVec<'a, usize>,
    other_operands: BumpVec<'a, usize>,
    loop_node: Option<usize>,
    temp: Operand,
    stats: ResolveStats,
}

impl<'a> PhiResolver<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            nodes: BumpVec::new_in(arena),
            arena,
            vreg_table: HashMap::new(),
            virtual_operands: BumpVec::new_in(arena),
            other_operands: BumpVec::new_in(arena),
            loop_node: None,
            temp: Operand::Illegal,
            stats: ResolveStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_operands.is_empty() && self.other_operands.is_empty()
    }

    fn new_node(&mut self, operand: Operand) -> usize {
        self.nodes.push(ResolveNode {
            operand,
            destinations: BumpVec::new_in(self.arena),
            visited: false,
            start_node: false,
            assigned: false,
            has_source: false,
            listed: false,
        });
        self.nodes.len() - 1
    }

    fn create_node(&mut self, operand: Operand, source: bool) -> CompileResult<usize> {
        match operand.vreg() {
            Some(vreg) => {
                let idx = match self.vreg_table.get(&vreg) {
                    Some(&idx) => idx,
                    None => {
                        let idx = self.new_node(operand);
                        self.vreg_table.insert(vreg, idx);
                        idx
                    }
                };
                // every virtual source must show up as a walk root
                if source && !self.nodes[idx].listed {
                    self.nodes[idx].listed = true;
                    self.virtual_operands.push(idx);
                }
                Ok(idx)
            }
            None if source => {
                let idx = self.new_node(operand);
                self.other_operands.push(idx);
                Ok(idx)
            }
            None => Err(CompileError::invariant(format!("phi destination {} is not virtual", operand))),
        }
    }

    /// Record the parallel copy `dest := src`.
    pub fn add_move(&mut self, src: Operand, dest: Operand) -> CompileResult<()> {
        if !src.is_valid() || !dest.is_valid() {
            return Err(CompileError::invariant(format!("phi move {} -> {} has an illegal side", src, dest)));
        }
        if !dest.is_virtual() {
            return Err(CompileError::invariant(format!("phi destination {} is not virtual", dest)));
        }
        if src.vreg().is_some() && src.vreg() == dest.vreg() {
            log::trace!("phi move {} -> {} is a no-op", src, dest);
            return Ok(());
        }

        let source = self.create_node(src, true)?;
        let destination = self.create_node(dest, false)?;
        if self.nodes[destination].has_source {
            return Err(CompileError::invariant(format!("{} is assigned twice on one edge", dest)));
        }
        self.nodes[destination].has_source = true;
        self.nodes[source].destinations.push(destination);
        Ok(())
    }

    /// Emit all recorded moves into `lir`.
    pub fn resolve(mut self, lir: &mut BlockProgram, vregs: &mut VirtualRegisters) -> CompileResult<ResolveStats> {
        for i in (0..self.virtual_operands.len()).rev() {
            let node = self.virtual_operands[i];
            if !self.nodes[node].visited {
                self.loop_node = None;
                self.walk(None, node, lir, vregs)?;
                self.nodes[node].start_node = true;
                if self.temp.is_valid() {
                    return Err(CompileError::invariant("phi cycle temporary was never consumed"));
                }
            }
        }

        for i in (0..self.other_operands.len()).rev() {
            let node = self.other_operands[i];
            let src = self.nodes[node].operand;
            for j in (0..self.nodes[node].destinations.len()).rev() {
                let dest = self.nodes[node].destinations[j];
                let dest = self.nodes[dest].operand;
                self.emit_move(lir, src, dest);
            }
        }

        log::debug!("{}: {} phi moves, {} cycle temporaries", lir.block(), self.stats.moves, self.stats.temps);
        Ok(self.stats)
    }

    fn walk(
        &mut self,
        src: Option<usize>,
        dest: usize,
        lir: &mut BlockProgram,
        vregs: &mut VirtualRegisters,
    ) -> CompileResult<()> {
        if !self.nodes[dest].visited {
            self.nodes[dest].visited = true;
            for i in (0..self.nodes[dest].destinations.len()).rev() {
                let next = self.nodes[dest].destinations[i];
                self.walk(Some(dest), next, lir, vregs)?;
            }
        } else if !self.nodes[dest].start_node {
            // cycle closes at dest
            if self.loop_node.is_some() {
                return Err(CompileError::invariant("more than one phi cycle in a single walk"));
            }
            let src = src.ok_or_else(|| CompileError::invariant("phi cycle without a source"))?;
            self.loop_node = Some(dest);
            self.move_to_temp(lir, vregs, self.nodes[src].operand)?;
            return Ok(());
        }

        if !self.nodes[dest].assigned {
            if self.loop_node == Some(dest) {
                self.move_temp_to(lir, self.nodes[dest].operand)?;
                self.nodes[dest].assigned = true;
            } else if let Some(src) = src {
                self.emit_move(lir, self.nodes[src].operand, self.nodes[dest].operand);
                self.nodes[dest].assigned = true;
            }
        }
        Ok(())
    }

    fn move_to_temp(&mut self, lir: &mut BlockProgram, vregs: &mut VirtualRegisters, src: Operand) -> CompileResult<()> {
        if self.temp.is_valid() {
            return Err(CompileError::invariant("second phi cycle temporary while one is live"));
        }
        let ty = src
            .ty()
            .ok_or_else(|| CompileError::invariant(format!("untyped phi source {}", src)))?;
        self.temp = vregs.new_register(ty);
        self.stats.temps += 1;
        self.emit_move(lir, src, self.temp);
        Ok(())
    }

    fn move_temp_to(&mut self, lir: &mut BlockProgram, dest: Operand) -> CompileResult<()> {
        if !self.temp.is_valid() {
            return Err(CompileError::invariant("phi cycle temporary consumed before it was set"));
        }
        let temp = std::mem::take(&mut self.temp);
        self.emit_move(lir, temp, dest);
        Ok(())
    }

    fn emit_move(&mut self, lir: &mut BlockProgram, src: Operand, dest: Operand) {
        log::trace!("phi move {} -> {}", src, dest);
        self.stats.moves += 1;
        lir.move_(src, dest);
    }
}
