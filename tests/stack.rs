//! §4.I's frame stack: reserve/commit discipline and the root set it
//! exposes to the collector, driven entirely through the public `Stack`
//! API (no VM needed).
use emojicodec::vm::{Something, Stack, StackError};

#[test]
fn reserved_frame_is_invisible_to_roots_until_committed() {
    let mut stack = Stack::new(64);
    stack.reserve_frame(Something::NOTHINGNESS, 2).unwrap();
    stack.reserved_slots_mut()[0] = Something::Integer(7);
    assert!(stack.roots_mut().is_empty());

    stack.commit_reserved_frame();
    assert_eq!(stack.depth(), 1);
    // `this_context` plus the 2 reserved slots.
    assert_eq!(stack.roots_mut().len(), 3);
}

#[test]
fn cancel_reserved_frame_leaves_stack_unchanged() {
    let mut stack = Stack::new(64);
    stack.reserve_frame(Something::NOTHINGNESS, 3).unwrap();
    stack.cancel_reserved_frame();
    assert_eq!(stack.depth(), 0);
    assert!(stack.roots_mut().is_empty());
}

#[test]
fn store_and_restore_state_unwinds_nested_frames() {
    let mut stack = Stack::new(64);
    stack.reserve_frame(Something::NOTHINGNESS, 0).unwrap();
    stack.commit_reserved_frame();
    let checkpoint = stack.store_state();

    stack.reserve_frame(Something::NOTHINGNESS, 0).unwrap();
    stack.commit_reserved_frame();
    stack.reserve_frame(Something::NOTHINGNESS, 0).unwrap();
    stack.commit_reserved_frame();
    assert_eq!(stack.depth(), 3);

    stack.restore_state(checkpoint);
    assert_eq!(stack.depth(), 1);
}

#[test]
fn reserving_past_the_slot_limit_overflows() {
    let mut stack = Stack::new(4);
    stack.reserve_frame(Something::NOTHINGNESS, 2).unwrap();
    stack.commit_reserved_frame();
    let err = stack.reserve_frame(Something::NOTHINGNESS, 10).unwrap_err();
    assert_eq!(err, StackError::Overflow);
}
