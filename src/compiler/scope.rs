//! The variable-tracking half of §4.E: a linked stack of scopes mapping
//! name to (type, slot, initialized-counter, frozen), plus the narrower
//! definite-initialization tracker used only inside initializer bodies.
use std::collections::HashMap;

use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub slot: u16,
    pub frozen: bool,
}

/// A linked stack of block scopes. Declaring a local always supplies its
/// initial value in the same statement (the grammar has no uninitialized
/// `var`), so once a binding exists it is unconditionally initialized —
/// unlike instance variables inside an initializer, locals need no
/// definite-assignment tracking at all.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, Binding>>,
    next_slot: u16,
    max_slot: u16,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
            next_slot: 0,
            max_slot: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        let frame = self.frames.pop().expect("unbalanced scope pop");
        self.next_slot -= frame.len() as u16;
    }

    pub fn declare(&mut self, name: String, ty: Type, frozen: bool) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.max_slot = self.max_slot.max(self.next_slot);
        self.frames
            .last_mut()
            .expect("at least one scope is always live")
            .insert(name, Binding { ty, slot, frozen });
        slot
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// High-water mark of concurrently-live slots; becomes the compiled
    /// function's `variable_count`.
    pub fn variable_count(&self) -> u16 {
        self.max_slot
    }
}

/// Definite-assignment tracking for instance variables across an
/// initializer body's control flow, matching §4.E's "initialized-counter
/// incremented on entering a conditional branch, decremented on leaving
/// it": each branch of an `if`/`else if`/`else` chain explores from its
/// own copy of the counters; a variable only carries its assignment past
/// the whole chain if every branch — including a mandatory `else` —
/// assigned it. Loop bodies (`while`/`for`) may run zero times, so
/// assignments inside them never propagate outward.
#[derive(Debug, Clone, Default)]
pub struct IvarInit {
    counters: HashMap<String, u32>,
}

impl IvarInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_assigned(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.counters.get(name).is_some_and(|c| *c > 0)
    }

    /// Snapshot before speculatively exploring a branch.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Merges an `if`/`else-if`/.../`else` chain's per-branch outcomes
    /// back into `self`: a variable is initialized afterward only if it
    /// was initialized along every branch, and only if the chain has an
    /// `else` (otherwise the "no branch taken" path — equal to `self`
    /// before the chain — also has to count, and it didn't assign
    /// anything).
    pub fn merge_branches(&mut self, branches: &[IvarInit], has_else: bool) {
        if !has_else || branches.is_empty() {
            return;
        }
        let mut names: std::collections::HashSet<&String> = std::collections::HashSet::new();
        for b in branches {
            names.extend(b.counters.keys());
        }
        for name in names {
            if branches.iter().all(|b| b.is_initialized(name)) {
                self.mark_assigned(name);
            }
        }
    }
}
