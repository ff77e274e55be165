// This module implements the per-method frame map. It starts from the method's incoming
// calling convention (stack arguments become logical stack slots with tentative
// offsets), tracks the largest outgoing argument area any call site in the method needs,
// takes the monitor count, and finally, once the register allocator knows how many spill
// slots it used, computes the frame geometry: spills above the reserved argument area,
// monitors above the spills, one word for the deoptimization return address, the
// architecture's frame pad, all rounded to the stack alignment. Finalization rebases
// every incoming stack argument past the new frame and validates that every offset the
// frame can produce is encodable on the target; anything else is a bailout. A frame is
// finalized exactly once.

//! Frame maps: calling conventions and stack frame layout.

pub mod calling_convention;
pub mod platform;

pub use calling_convention::{compute_calling_convention, CallingConvention, Direction};
pub use platform::Platform;

use crate::arch::{align_up, Architecture, ConventionKind};
use crate::core::error::{Bailout, CompileError, CompileResult};
use crate::lir::{Address, BasicType, Operand, OprType};
use std::sync::Arc;

/// Final frame geometry of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Logical argument slots.
    pub argcount: u32,
    pub monitor_count: u32,
    pub spill_count: u32,
    /// Outgoing argument area in bytes.
    pub reserved_argument_area: u32,
    pub frame_size_bytes: u32,
    pub frame_size_words: u32,
}

/// Frame map of one method.
pub struct FrameMap<'p, A: Architecture> {
    platform: &'p Platform<A>,
    incoming: Arc<CallingConvention>,
    incoming_arguments: Vec<Operand>,
    argcount: u32,
    /// Byte offset of each stack-passed argument, by logical slot.
    argument_locations: Vec<Option<i32>>,
    reserved_argument_area: u32,
    monitor_count: Option<u32>,
    layout: Option<FrameLayout>,
}

impl<'p, A: Architecture> FrameMap<'p, A> {
    /// Frame map for a method with the given parameter types.
    pub fn new(platform: &'p Platform<A>, signature: &[BasicType]) -> CompileResult<Self> {
        let incoming = platform.calling_convention(signature, Direction::Incoming, ConventionKind::Managed)?;
        let argcount: u32 = signature.iter().map(|ty| ty.slot_count()).sum();

        let mut argument_locations = vec![None; argcount as usize];
        for i in 0..incoming.len() {
            if let (Some(slot), Some(offset)) = (incoming.arg_slot(i), incoming.stack_offset(i)) {
                argument_locations[slot as usize] = Some(offset);
            }
        }

        Ok(Self {
            platform,
            incoming_arguments: incoming.args().to_vec(),
            incoming,
            argcount,
            argument_locations,
            reserved_argument_area: 0,
            monitor_count: None,
            layout: None,
        })
    }

    pub fn platform(&self) -> &'p Platform<A> {
        self.platform
    }

    /// Where each parameter arrives: a register or a logical stack slot.
    pub fn incoming_arguments(&self) -> &[Operand] {
        &self.incoming_arguments
    }

    pub fn incoming_convention(&self) -> &CallingConvention {
        &self.incoming
    }

    /// Logical argument slots of the method.
    pub fn argcount(&self) -> u32 {
        self.argcount
    }

    fn ensure_not_finalized(&self, what: &str) -> CompileResult<()> {
        if self.layout.is_some() {
            return Err(CompileError::invariant(format!("{} after frame finalization", what)));
        }
        Ok(())
    }

    /// Convention of an outgoing call. Grows the reserved argument area as needed.
    pub fn outgoing_convention(
        &mut self,
        signature: &[BasicType],
        kind: ConventionKind,
    ) -> CompileResult<Arc<CallingConvention>> {
        let cc = self.platform.calling_convention(signature, Direction::Outgoing, kind)?;
        self.update_reserved_argument_area_size(cc.reserved_stack_slots() * A::STACK_SLOT_SIZE)?;
        Ok(cc)
    }

    /// Grow the outgoing argument area to at least `bytes`. Never shrinks.
    pub fn update_reserved_argument_area_size(&mut self, bytes: u32) -> CompileResult<()> {
        self.ensure_not_finalized("reserving argument area")?;
        self.reserved_argument_area = self.reserved_argument_area.max(bytes);
        Ok(())
    }

    pub fn reserved_argument_area_size(&self) -> u32 {
        self.reserved_argument_area
    }

    /// Set the number of monitors. May be called once, before finalization.
    pub fn set_monitor_count(&mut self, count: u32) -> CompileResult<()> {
        self.ensure_not_finalized("setting monitor count")?;
        if let Some(existing) = self.monitor_count {
            return Err(CompileError::invariant(format!(
                "monitor count already set to {}",
                existing
            )));
        }
        self.monitor_count = Some(count);
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> Option<&FrameLayout> {
        self.layout.as_ref()
    }

    fn spill_base(&self) -> u64 {
        align_up((A::FIRST_AVAILABLE_SP_IN_FRAME + self.reserved_argument_area) as u64, 8)
    }

    fn monitor_base(&self, spill_count: u32) -> u64 {
        let end_of_spills = self.spill_base() + spill_count as u64 * A::STACK_SLOT_SIZE as u64;
        align_up(end_of_spills, A::WORD_SIZE as u64)
    }

    fn monitor_size() -> u64 {
        // lock word and owner object
        2 * A::WORD_SIZE as u64
    }

    /// Compute the final frame for `spill_count` spill slots. May be called once.
    pub fn finalize_frame(&mut self, spill_count: u32) -> CompileResult<&FrameLayout> {
        self.ensure_not_finalized("finalize_frame")?;

        let monitor_count = self.monitor_count.unwrap_or(0);
        let monitors_end = self.monitor_base(spill_count) + monitor_count as u64 * Self::monitor_size();
        // deoptimization return address
        let unaligned = monitors_end + A::WORD_SIZE as u64 + A::FRAME_PAD_BYTES as u64;
        let frame_size = align_up(unaligned, A::STACK_ALIGNMENT as u64);

        if frame_size > i32::MAX as u64 {
            log::warn!("{}: frame of {} bytes is too large", A::NAME, frame_size);
            return Err(Bailout::FrameTooLarge { requested: frame_size }.into());
        }

        self.validate_frame(frame_size as i64)?;
        for location in self.argument_locations.iter_mut().flatten() {
            *location += frame_size as i32;
        }

        let layout = FrameLayout {
            argcount: self.argcount,
            monitor_count,
            spill_count,
            reserved_argument_area: self.reserved_argument_area,
            frame_size_bytes: frame_size as u32,
            frame_size_words: (frame_size / A::WORD_SIZE as u64) as u32,
        };

        log::debug!(
            "{}: frame {} bytes ({} spills, {} monitors, {} bytes outgoing)",
            A::NAME,
            layout.frame_size_bytes,
            spill_count,
            monitor_count,
            layout.reserved_argument_area
        );
        Ok(self.layout.insert(layout))
    }

    /// Check the largest offset the frame will produce, with incoming arguments rebased
    /// past a frame of `frame_size` bytes.
    fn validate_frame(&self, frame_size: i64) -> CompileResult<()> {
        let max_offset = self
            .argument_locations
            .iter()
            .flatten()
            .map(|&offset| offset as i64 + frame_size)
            .fold(frame_size, i64::max);

        if !A::is_encodable_displacement(max_offset) {
            log::warn!("{}: stack offset {} not encodable", A::NAME, max_offset);
            return Err(Bailout::DisplacementNotEncodable { offset: max_offset, arch: A::NAME }.into());
        }
        Ok(())
    }

    fn finalized_layout(&self) -> CompileResult<&FrameLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| CompileError::invariant("frame offsets queried before finalization"))
    }

    /// SP-relative byte offset of logical slot `index`: an incoming stack argument below
    /// `argcount`, a spill slot above it.
    pub fn sp_offset_for_slot(&self, index: u32) -> CompileResult<i32> {
        self.finalized_layout()?;
        if index < self.argcount {
            return self.argument_locations[index as usize].ok_or_else(|| {
                CompileError::invariant(format!("argument slot {} is not passed in memory", index))
            });
        }
        self.sp_offset_for_spill(index - self.argcount)
    }

    pub fn sp_offset_for_spill(&self, index: u32) -> CompileResult<i32> {
        let layout = self.finalized_layout()?;
        if index >= layout.spill_count {
            return Err(CompileError::invariant(format!(
                "spill slot {} out of range ({} spills)",
                index, layout.spill_count
            )));
        }
        Ok((self.spill_base() + index as u64 * A::STACK_SLOT_SIZE as u64) as i32)
    }

    fn sp_offset_for_monitor_base(&self, index: u32) -> CompileResult<u64> {
        let layout = self.finalized_layout()?;
        if index >= layout.monitor_count {
            return Err(CompileError::invariant(format!(
                "monitor {} out of range ({} monitors)",
                index, layout.monitor_count
            )));
        }
        Ok(self.monitor_base(layout.spill_count) + index as u64 * Self::monitor_size())
    }

    pub fn sp_offset_for_monitor_lock(&self, index: u32) -> CompileResult<i32> {
        Ok(self.sp_offset_for_monitor_base(index)? as i32)
    }

    pub fn sp_offset_for_monitor_object(&self, index: u32) -> CompileResult<i32> {
        Ok((self.sp_offset_for_monitor_base(index)? + A::WORD_SIZE as u64) as i32)
    }

    /// SP-relative address of logical slot `index`.
    pub fn slot_address(&self, index: u32, ty: OprType) -> CompileResult<Operand> {
        let offset = self.sp_offset_for_slot(index)?;
        let sp = self.platform.stack_pointer()?;
        Ok(Operand::Address(Address::base_disp(sp, offset, ty)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Ppc32, X64};

    fn platform<A: Architecture>() -> Platform<A> {
        let p = Platform::new();
        p.initialize().unwrap();
        p
    }

    #[test]
    fn test_minimal_x64_frame() {
        let p = platform::<X64>();
        let mut fm = FrameMap::new(&p, &[BasicType::Int]).unwrap();
        let layout = *fm.finalize_frame(0).unwrap();
        // deopt pc + return address + rbp, rounded to 16
        assert_eq!(layout.frame_size_bytes, 32);
        assert_eq!(layout.frame_size_words, 4);
    }

    #[test]
    fn test_spills_sit_above_outgoing_area() {
        let p = platform::<X64>();
        let mut fm = FrameMap::new(&p, &[]).unwrap();
        fm.outgoing_convention(&[BasicType::Int; 8], ConventionKind::Managed).unwrap();
        assert_eq!(fm.reserved_argument_area_size(), 16);
        fm.set_monitor_count(1).unwrap();
        fm.finalize_frame(3).unwrap();

        assert_eq!(fm.sp_offset_for_spill(0).unwrap(), 16);
        assert_eq!(fm.sp_offset_for_spill(2).unwrap(), 24);
        assert!(fm.sp_offset_for_spill(3).is_err());
        assert_eq!(fm.sp_offset_for_monitor_lock(0).unwrap(), 32);
        assert_eq!(fm.sp_offset_for_monitor_object(0).unwrap(), 40);
        // 48 + 8 + 16 = 72 -> 80
        assert_eq!(fm.layout().unwrap().frame_size_bytes, 80);
    }

    #[test]
    fn test_finalize_twice_is_invariant_error() {
        let p = platform::<X64>();
        let mut fm = FrameMap::new(&p, &[]).unwrap();
        fm.finalize_frame(0).unwrap();
        let err = fm.finalize_frame(0).unwrap_err();
        assert!(!err.is_bailout());
        assert!(fm.set_monitor_count(0).is_err());
        assert!(fm.update_reserved_argument_area_size(8).is_err());
    }

    #[test]
    fn test_monitor_count_set_once() {
        let p = platform::<X64>();
        let mut fm = FrameMap::new(&p, &[]).unwrap();
        fm.set_monitor_count(2).unwrap();
        assert!(fm.set_monitor_count(3).is_err());
    }

    #[test]
    fn test_offsets_require_finalization() {
        let p = platform::<X64>();
        let fm = FrameMap::new(&p, &[]).unwrap();
        assert!(fm.sp_offset_for_spill(0).is_err());
    }

    #[test]
    fn test_ppc32_large_frame_bails_out() {
        let p = platform::<Ppc32>();
        let mut fm = FrameMap::new(&p, &[BasicType::Int]).unwrap();
        let err = fm.finalize_frame(20_000).unwrap_err();
        assert!(matches!(err.as_bailout(), Some(Bailout::DisplacementNotEncodable { .. })));
    }

    #[test]
    fn test_huge_spill_count_bails_out() {
        let p = platform::<X64>();
        let mut fm = FrameMap::new(&p, &[]).unwrap();
        let err = fm.finalize_frame(u32::MAX).unwrap_err();
        assert!(matches!(err.as_bailout(), Some(Bailout::FrameTooLarge { .. })));
    }
}
