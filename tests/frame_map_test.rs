//! Frame map tests.
//!
//! Covers the outgoing argument area across call sites, one-shot finalization, and the
//! rebasing of incoming stack arguments past the finished frame.

use lirgen::arch::{Arm64, ConventionKind, X64};
use lirgen::frame_map::{FrameMap, Platform};
use lirgen::lir::{BasicType, OprType};
use proptest::prelude::*;

fn platform<A: lirgen::arch::Architecture>() -> Platform<A> {
    let platform = Platform::new();
    platform.initialize().unwrap();
    platform
}

#[test]
fn test_reserved_area_keeps_largest_call() {
    let _ = env_logger::builder().is_test(true).try_init();

    let platform = platform::<X64>();
    let mut fm = FrameMap::new(&platform, &[BasicType::Object]).unwrap();

    fm.outgoing_convention(&[BasicType::Int; 10], ConventionKind::Managed).unwrap();
    assert_eq!(fm.reserved_argument_area_size(), 32);

    // a smaller call later does not shrink the area
    fm.outgoing_convention(&[BasicType::Int; 7], ConventionKind::Managed).unwrap();
    assert_eq!(fm.reserved_argument_area_size(), 32);

    fm.outgoing_convention(&[BasicType::Long; 9], ConventionKind::Managed).unwrap();
    assert_eq!(fm.reserved_argument_area_size(), 32);

    let layout = *fm.finalize_frame(0).unwrap();
    assert_eq!(layout.reserved_argument_area, 32);
    assert_eq!(layout.argcount, 1);
}

#[test]
fn test_incoming_stack_arguments_rebased_past_frame() {
    let platform = platform::<X64>();
    let sig = vec![BasicType::Long; 8];
    let mut fm = FrameMap::new(&platform, &sig).unwrap();
    assert_eq!(fm.argcount(), 16);
    assert!(fm.incoming_arguments()[6].is_stack());
    assert!(fm.sp_offset_for_slot(12).is_err());

    let layout = *fm.finalize_frame(0).unwrap();
    assert_eq!(layout.frame_size_bytes, 32);
    assert_eq!(fm.sp_offset_for_slot(12).unwrap(), 32);
    assert_eq!(fm.sp_offset_for_slot(14).unwrap(), 40);
    // the upper half of a long has no location of its own
    assert!(fm.sp_offset_for_slot(13).is_err());
    // register arguments are not in memory
    assert!(fm.sp_offset_for_slot(0).is_err());

    let addr = fm.slot_address(12, OprType::Long).unwrap().as_address().unwrap();
    assert_eq!(addr.disp(), 32);
    assert_eq!(addr.base(), platform.stack_pointer().unwrap());
}

#[test]
fn test_finalize_frame_exactly_once() {
    let platform = platform::<Arm64>();
    let mut fm = FrameMap::new(&platform, &[]).unwrap();
    let first = *fm.finalize_frame(4).unwrap();
    assert!(fm.is_finalized());

    let err = fm.finalize_frame(4).unwrap_err();
    assert!(!err.is_bailout());
    // the first layout is kept
    assert_eq!(fm.layout(), Some(&first));
    assert!(fm.outgoing_convention(&[BasicType::Int], ConventionKind::Managed).is_err());
}

#[test]
fn test_frame_is_stack_aligned() {
    let platform = platform::<X64>();
    for spills in 0..40 {
        let mut fm = FrameMap::new(&platform, &[BasicType::Int, BasicType::Double]).unwrap();
        fm.set_monitor_count(spills % 3).unwrap();
        let layout = *fm.finalize_frame(spills).unwrap();
        assert_eq!(layout.frame_size_bytes % 16, 0);
        assert_eq!(layout.frame_size_words * 8, layout.frame_size_bytes);
        if spills > 0 {
            let last = fm.sp_offset_for_spill(spills - 1).unwrap() as u32;
            assert!(last + 4 <= layout.frame_size_bytes);
        }
    }
}

fn call_signature() -> impl Strategy<Value = Vec<BasicType>> {
    prop::collection::vec(
        prop_oneof![Just(BasicType::Int), Just(BasicType::Long), Just(BasicType::Double), Just(BasicType::Object)],
        0..24,
    )
}

proptest! {
    #[test]
    fn prop_reserved_area_is_running_maximum(
        calls in prop::collection::vec((call_signature(), any::<bool>()), 1..12),
    ) {
        let platform = platform::<X64>();
        let mut fm = FrameMap::new(&platform, &[]).unwrap();
        let mut previous = 0;
        let mut expected = 0;

        for (sig, native) in &calls {
            let kind = if *native { ConventionKind::Native } else { ConventionKind::Managed };
            let cc = fm.outgoing_convention(sig, kind).unwrap();
            expected = expected.max(cc.reserved_stack_slots() * 4);

            let current = fm.reserved_argument_area_size();
            prop_assert!(current >= previous);
            prop_assert_eq!(current, expected);
            previous = current;
        }
    }
}
