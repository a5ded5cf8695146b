//! §4.H's Cheney-style copying cycle and §5's cooperative safepoint
//! protocol. The two are split the way the spec frames them: the copy
//! itself is a pure function over a [`Heap`] and a set of roots, while
//! [`SafepointCoordinator`] is the cross-thread synchronization that
//! decides *when* it is safe to run it — the only synchronization this
//! runtime needs, since built-in data structures are not internally
//! synchronized (§5).
use std::sync::{Condvar, Mutex};

use super::object::{Heap, Object};
use super::something::{ObjectRef, Something};

#[derive(Default)]
struct SafepointState {
    pause_requested: bool,
    paused: usize,
    total_threads: usize,
}

/// Coordinates the global "pause-requested" flag, the "paused-threads"
/// counter and the condition variable of §5. Every allocation and every
/// blocking call (I/O, mutex acquisition) passes through here.
pub struct SafepointCoordinator {
    state: Mutex<SafepointState>,
    condvar: Condvar,
}

impl Default for SafepointCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SafepointCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SafepointState::default()),
            condvar: Condvar::new(),
        }
    }

    pub fn register_thread(&self) {
        let mut state = self.state.lock().unwrap();
        state.total_threads += 1;
    }

    pub fn unregister_thread(&self) {
        let mut state = self.state.lock().unwrap();
        state.total_threads = state.total_threads.saturating_sub(1);
        self.condvar.notify_all();
    }

    /// Called before every allocation. If a cycle has been requested,
    /// parks this thread (counted among the paused) until it clears.
    pub fn check_safepoint(&self) {
        let mut state = self.state.lock().unwrap();
        while state.pause_requested {
            state.paused += 1;
            self.condvar.notify_all();
            state = self.condvar.wait(state).unwrap();
            state.paused -= 1;
        }
    }

    /// Brackets a blocking call (I/O, native mutex acquisition, thread
    /// join) so the GC can proceed while this thread is parked off-heap.
    /// Between this call and [`Self::disallow_gc_or_pause_if_needed`] the
    /// thread must not allocate or dereference heap pointers (§5).
    pub fn allow_gc(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused += 1;
        self.condvar.notify_all();
    }

    /// Resumes after a blocking call: if a cycle is in progress, waits
    /// for it to finish before rejoining as an active (unpaused) thread.
    pub fn disallow_gc_or_pause_if_needed(&self) {
        let mut state = self.state.lock().unwrap();
        state = self
            .condvar
            .wait_while(state, |s| s.pause_requested)
            .unwrap();
        state.paused -= 1;
    }

    /// Requests a cycle, waits until every *other* registered thread is
    /// parked, runs `cycle`, then clears the request and wakes everyone.
    pub fn run_exclusive<R>(&self, cycle: impl FnOnce() -> R) -> R {
        {
            let mut state = self.state.lock().unwrap();
            state.pause_requested = true;
        }
        {
            let mut state = self.state.lock().unwrap();
            state = self
                .condvar
                .wait_while(state, |s| s.paused < s.total_threads.saturating_sub(1))
                .unwrap();
            drop(state);
        }

        let result = cycle();

        let mut state = self.state.lock().unwrap();
        state.pause_requested = false;
        self.condvar.notify_all();
        result
    }
}

/// Trace one reference from the old (post-swap `inactive`) space into the
/// new (`active`) space, following §4.H's two-rule Cheney copy exactly:
/// if already forwarded, reuse the forwarding address; otherwise copy,
/// forward, and let the caller's scan loop visit the copy's own
/// references later.
fn trace(heap: &mut Heap, old_ref: ObjectRef) -> ObjectRef {
    if let Some(forwarded) = heap.inactive.get(old_ref).forwarding {
        return forwarded;
    }
    let mut copied = heap.inactive.get(old_ref).clone();
    copied.forwarding = None;
    let new_ref = heap.active.bump(copied);
    heap.inactive.get_mut(old_ref).forwarding = Some(new_ref);
    new_ref
}

fn retrace(heap: &mut Heap, value: Something) -> Something {
    match value {
        Something::Object(old_ref) if !value.is_nothingness() => {
            Something::Object(trace(heap, old_ref))
        }
        other => other,
    }
}

/// Runs one full cycle: swaps spaces, traces every root (and
/// transitively everything reachable from them) with a classical
/// Cheney scan pointer over the freshly-populated active space, then
/// drains the dead (unforwarded) objects out of the old space for the
/// caller to run deinitializers over.
///
/// `roots` must include every thread's stack slots, the permanent
/// string-pool objects, and nothing else — §3's liveness invariant.
pub fn collect(heap: &mut Heap, roots: &mut [&mut Something]) -> Vec<(usize, Object)> {
    std::mem::swap(&mut heap.active, &mut heap.inactive);
    heap.active.clear();

    for root in roots.iter_mut() {
        if let Something::Object(old_ref) = **root {
            if !root.is_nothingness() {
                **root = Something::Object(trace(heap, old_ref));
            }
        }
    }

    let mut scan = 0;
    while scan < heap.active.objects.len() {
        let refs = heap.active.objects[scan].traced_references();
        let updated: Vec<Something> = refs.into_iter().map(|r| retrace(heap, r)).collect();
        let object = &mut heap.active.objects[scan];
        for (slot, value) in object.traced_references_mut().into_iter().zip(updated) {
            *slot = value;
        }
        scan += 1;
    }

    let dead: Vec<(usize, Object)> = heap
        .inactive
        .objects
        .drain(..)
        .filter(|o| o.forwarding.is_none())
        .map(|o| (o.class_index, o))
        .collect();
    heap.inactive.used = 0;

    dead
}

/// Whether a just-finished cycle actually reclaimed anything; per §4.H,
/// if `used` did not decrease relative to the pre-cycle total the heap is
/// exhausted and the runtime must abort.
pub fn made_progress(pre_cycle_used: u32, heap: &Heap) -> bool {
    heap.active.used < pre_cycle_used
}
