// This module provides the compilation session that outlives individual methods. A
// CompilationSession borrows a bumpalo arena for data that must live as long as the
// session (interned method names) and accumulates SessionStats across every method
// generated through it: methods, blocks and instructions emitted, phi moves and cycle
// temporaries produced by the phi resolver, and bailouts grouped by their reason code.
// Per-method state (the LIR itself, virtual registers, the frame map) is owned by the
// generator and the resulting LirMethod, not by the session. Interior mutability through
// RefCell keeps the recording API callable through shared references, since a session is
// single-threaded like the methods it compiles.

//! Arena-backed compilation session and statistics.

use crate::core::error::Bailout;
use crate::lir::{BlockProgram, Opcode};
use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

/// Compilation session shared by every method generated in it.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
    interned_strings: RefCell<HashMap<&'arena str, ()>>,
    current_method: RefCell<Option<&'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_method: RefCell::new(None),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some((&interned, _)) = strings.get_key_value(s) {
            return interned;
        }
        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(interned, ());
        interned
    }

    pub fn set_current_method(&self, name: &str) {
        let name = self.intern_str(name);
        log::debug!("generating {}", name);
        *self.current_method.borrow_mut() = Some(name);
    }

    pub fn current_method(&self) -> Option<&'arena str> {
        *self.current_method.borrow()
    }

    /// Record a successfully generated method and count its instructions.
    pub fn record_method_generated(&self, blocks: &[BlockProgram]) {
        let mut stats = self.stats.borrow_mut();
        stats.methods_generated += 1;
        stats.blocks_generated += blocks.len();
        for inst in blocks.iter().flat_map(|b| b.instructions()) {
            stats.instructions_generated += 1;
            *stats.instruction_counts.entry(inst.opcode()).or_insert(0) += 1;
        }
        *self.current_method.borrow_mut() = None;
    }

    /// Record the moves emitted for one join edge.
    pub fn record_phi_moves(&self, moves: usize, cycle_temps: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.phi_moves += moves;
        stats.cycle_temps += cycle_temps;
    }

    pub fn record_bailout(&self, bailout: &Bailout) {
        let method = self.current_method().unwrap_or("<unknown>");
        log::warn!("{}: {}", method, bailout);
        *self.stats.borrow_mut().bailouts.entry(bailout.code()).or_insert(0) += 1;
        *self.current_method.borrow_mut() = None;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Counters accumulated over a session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub methods_generated: usize,
    pub blocks_generated: usize,
    pub instructions_generated: usize,
    pub instruction_counts: HashMap<Opcode, usize>,
    /// Moves emitted by the phi resolver, temporaries included.
    pub phi_moves: usize,
    /// Temporaries introduced to break phi cycles.
    pub cycle_temps: usize,
    /// Bailouts by reason code.
    pub bailouts: BTreeMap<&'static str, usize>,
}

impl SessionStats {
    pub fn total_bailouts(&self) -> usize {
        self.bailouts.values().sum()
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session statistics:")?;
        writeln!(f, "  Methods generated: {}", self.methods_generated)?;
        writeln!(f, "  Blocks: {}", self.blocks_generated)?;
        writeln!(f, "  Instructions: {}", self.instructions_generated)?;
        writeln!(f, "  Phi moves: {} ({} cycle temporaries)", self.phi_moves, self.cycle_temps)?;

        if !self.bailouts.is_empty() {
            writeln!(f, "  Bailouts:")?;
            for (code, count) in &self.bailouts {
                writeln!(f, "    {}: {}", code, count)?;
            }
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by_key(|(op, count)| (std::cmp::Reverse(**count), op.name()));
            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode.name(), count)?;
            }
        }

        Ok(())
    }
}
