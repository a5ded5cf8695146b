//! §4.H: object layout and the guarded-bump allocator over a semi-space.
//! The moving Cheney-style copy itself lives in [`crate::vm::gc`]; this
//! module owns the shape of an `Object`, the raw-array resize fast path,
//! and the single semi-space's bump-pointer bookkeeping.
use crate::vti::SOMETHING_SIZE;

use super::something::{ObjectRef, Something};

/// Conservative stand-in for the fixed per-object header (class pointer +
/// size + forwarding slot) in the real byte-addressed layout of §3.
pub const HEADER_SIZE: u32 = 12;

/// The payload an `Object` owns. A plain user-declared class gets
/// `Instance`; the built-in collection/byte primitives of §4.K get their
/// own variant rather than being expressed as ordinary instance variables
/// over a generic raw array, since their element representation (UTF-32
/// characters, raw bytes, hash buckets) differs from a `Vec<Something>`
/// slot list. This mirrors §4.H's framing that raw arrays are "opaque to
/// the GC except when explicitly registered containers" — here the
/// registration is simply which `ObjectKind` variant they are.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// An ordinary instance: one `Something` per declared instance
    /// variable (including inherited ones), in inheritance order.
    Instance(Vec<Something>),
    /// A raw array of Somethings — the backing store for `List` and
    /// `Dictionary` (§4.H "raw arrays"); the GC's marker walks its
    /// elements since it is a registered container.
    RawArray(Vec<Something>),
    /// `String`'s UTF-32 character buffer (§4.K). Opaque to the GC.
    StringChars(Vec<char>),
    /// `Data`'s raw byte buffer (§4.K). Opaque to the GC.
    Bytes(Vec<u8>),
    /// `Dictionary`'s open-addressed bucket array (§4.K); each bucket may
    /// be empty, a tombstone, or hold a key/value pair. The GC's marker
    /// walks live values (and, since keys are always `String` objects,
    /// the key references too).
    DictionaryBuckets(Vec<super::super::builtins::dictionary::Bucket>),
    Range {
        start: i64,
        stop: i64,
        step: i64,
    },
    Error {
        message: Something,
        code: i64,
    },
    Mutex(super::super::builtins::mutex::MutexState),
    Thread(super::super::builtins::thread::ThreadState),
    /// A materialized closure (§4.E/§4.J "Closure build"): the nested
    /// instruction block plus the captured `Something`s copied out of the
    /// enclosing scope at the point of capture. The block is behind `Arc`
    /// so cloning a closure object (as every GC copy does) stays O(1).
    Closure {
        variable_count: u16,
        argument_count: u8,
        /// The enclosing frame's receiver at the point the closure was
        /// built, snapshotted here since `captured` only carries
        /// explicitly free *local* variables (§4.E's free-variable scan
        /// never needs to list `self` itself). Nothingness when the
        /// closure does not reference `self`.
        captured_self: Something,
        body: std::sync::Arc<Vec<crate::bytecode::Instruction>>,
        captured: Vec<Something>,
    },
    /// A captured method value (§4.E "Captured method call"): a receiver
    /// bound to a method VTI, not yet invoked.
    CapturedFunctionCall { receiver: Something, vti: u16 },
}

#[derive(Debug, Clone)]
pub struct Object {
    pub class_index: usize,
    pub kind: ObjectKind,
    /// Set by the GC the moment this object is copied to the new space;
    /// `None` means "not yet traced" and is the condition the Cheney
    /// copy's first rule checks. Doubles as §3's "exactly one forwarding
    /// pointer slot, used exclusively by the GC".
    pub forwarding: Option<ObjectRef>,
}

impl Object {
    pub fn new_instance(class_index: usize, instance_variable_count: usize) -> Self {
        Self {
            class_index,
            kind: ObjectKind::Instance(vec![Something::default(); instance_variable_count]),
            forwarding: None,
        }
    }

    pub fn new_raw_array(class_index: usize, contents: Vec<Something>) -> Self {
        Self {
            class_index,
            kind: ObjectKind::RawArray(contents),
            forwarding: None,
        }
    }

    /// Approximate byte footprint used for the allocation-threshold
    /// accounting of §4.H; real Emojicode measures exact header+payload
    /// bytes, which this mirrors in spirit since every `Something` slot
    /// here occupies the same fixed `SOMETHING_SIZE` as the byte layout
    /// VTI assignment (`vti::SOMETHING_SIZE`) already assumes.
    pub fn approx_size(&self) -> u32 {
        HEADER_SIZE
            + match &self.kind {
                ObjectKind::Instance(vars) => vars.len() as u32 * SOMETHING_SIZE,
                ObjectKind::RawArray(items) => items.len() as u32 * SOMETHING_SIZE,
                ObjectKind::StringChars(chars) => chars.len() as u32 * 4,
                ObjectKind::Bytes(bytes) => bytes.len() as u32,
                ObjectKind::DictionaryBuckets(buckets) => buckets.len() as u32 * (SOMETHING_SIZE * 2),
                ObjectKind::Range { .. } => 24,
                ObjectKind::Error { .. } => SOMETHING_SIZE + 8,
                ObjectKind::Mutex(_) => 8,
                ObjectKind::Thread(_) => 8,
                ObjectKind::Closure { captured, .. } => SOMETHING_SIZE * (2 + captured.len() as u32),
                ObjectKind::CapturedFunctionCall { .. } => SOMETHING_SIZE * 2,
            }
    }

    pub fn as_instance_variables(&self) -> Option<&[Something]> {
        match &self.kind {
            ObjectKind::Instance(vars) => Some(vars),
            _ => None,
        }
    }

    pub fn as_instance_variables_mut(&mut self) -> Option<&mut Vec<Something>> {
        match &mut self.kind {
            ObjectKind::Instance(vars) => Some(vars),
            _ => None,
        }
    }

    /// Every `Something` this object directly references, for the GC's
    /// marker walk. Instances trace all ivars; raw arrays and dictionary
    /// buckets trace their elements since they are registered containers;
    /// opaque byte/char payloads trace nothing.
    pub fn traced_references(&self) -> Vec<Something> {
        match &self.kind {
            ObjectKind::Instance(vars) => vars.clone(),
            ObjectKind::RawArray(items) => items.clone(),
            ObjectKind::DictionaryBuckets(buckets) => buckets
                .iter()
                .flat_map(|b| b.traced_references())
                .collect(),
            ObjectKind::Error { message, .. } => vec![*message],
            ObjectKind::Closure { captured, captured_self, .. } => {
                let mut refs = captured.clone();
                refs.push(*captured_self);
                refs
            }
            ObjectKind::CapturedFunctionCall { receiver, .. } => vec![*receiver],
            ObjectKind::StringChars(_)
            | ObjectKind::Bytes(_)
            | ObjectKind::Range { .. }
            | ObjectKind::Mutex(_)
            | ObjectKind::Thread(_) => Vec::new(),
        }
    }

    pub fn traced_references_mut(&mut self) -> Vec<&mut Something> {
        match &mut self.kind {
            ObjectKind::Instance(vars) => vars.iter_mut().collect(),
            ObjectKind::RawArray(items) => items.iter_mut().collect(),
            ObjectKind::DictionaryBuckets(buckets) => {
                buckets.iter_mut().flat_map(|b| b.traced_references_mut()).collect()
            }
            ObjectKind::Error { message, .. } => vec![message],
            ObjectKind::Closure { captured, captured_self, .. } => {
                captured.iter_mut().chain(std::iter::once(captured_self)).collect()
            }
            ObjectKind::CapturedFunctionCall { receiver, .. } => vec![receiver],
            ObjectKind::StringChars(_)
            | ObjectKind::Bytes(_)
            | ObjectKind::Range { .. }
            | ObjectKind::Mutex(_)
            | ObjectKind::Thread(_) => Vec::new(),
        }
    }
}

/// One semi-space: a bump-allocated object table plus the running byte
/// total used for threshold accounting. Exactly one of a `Heap`'s two
/// spaces is active at a time (§4.H).
#[derive(Debug, Default)]
pub struct Space {
    pub objects: Vec<Object>,
    pub used: u32,
}

impl Space {
    pub fn clear(&mut self) {
        self.objects.clear();
        self.used = 0;
    }

    pub fn bump(&mut self, object: Object) -> ObjectRef {
        self.used += object.approx_size();
        self.objects.push(object);
        ObjectRef(self.objects.len() - 1)
    }

    pub fn get(&self, r: ObjectRef) -> &Object {
        &self.objects[r.0]
    }

    pub fn get_mut(&mut self, r: ObjectRef) -> &mut Object {
        &mut self.objects[r.0]
    }

    /// The shrink-safe reallocator of §4.H: if `r` is the most recently
    /// bump-allocated object in this space, grow or shrink it in place by
    /// adjusting the tracked `used` total instead of copying. Otherwise
    /// the caller must allocate a fresh array and copy.
    pub fn is_last_allocated(&self, r: ObjectRef) -> bool {
        !self.objects.is_empty() && r.0 == self.objects.len() - 1
    }

    pub fn resize_last_raw_array(&mut self, r: ObjectRef, new_contents: Vec<Something>) {
        debug_assert!(self.is_last_allocated(r));
        let old_size = self.objects[r.0].approx_size();
        self.objects[r.0].kind = ObjectKind::RawArray(new_contents);
        let new_size = self.objects[r.0].approx_size();
        self.used = self.used + new_size - old_size;
    }
}

/// The two semi-spaces of §4.H. Exactly one (`active`) is ever allocated
/// into; `inactive` is the collector's copy target until the spaces swap
/// at the start of the next cycle.
#[derive(Debug)]
pub struct Heap {
    pub active: Space,
    pub inactive: Space,
    /// Per-space byte budget; a cycle runs when `active.used + size` would
    /// exceed it. A single allocation request larger than this is fatal
    /// (`AllocationTooLarge`), never merely an early cycle — pinned from
    /// the original implementation per `SPEC_FULL.md` §2.
    pub threshold: u32,
}

impl Heap {
    pub fn new(threshold: u32) -> Self {
        Self {
            active: Space::default(),
            inactive: Space::default(),
            threshold,
        }
    }

    pub fn would_overflow(&self, size: u32) -> bool {
        self.active.used + size > self.threshold
    }
}
