//! The placeholder/patch emission mechanism of §4.E. Because the in-memory
//! [`Instruction`] already addresses jump targets by instruction *index*
//! (see `bytecode::opcode`'s module doc) rather than by byte offset, "write
//! a placeholder word, emit the block, patch the placeholder" becomes
//! "push a throwaway jump, remember its position, overwrite its target
//! once the block's length is known" — the Writer does the index-to-word
//! arithmetic the original placeholder scheme describes.
use crate::bytecode::Instruction;

#[derive(Debug, Default)]
pub struct Emitter {
    instructions: Vec<Instruction>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    pub fn push(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    /// Reserves a slot for a forward jump whose target isn't known yet.
    pub fn push_placeholder_jump(&mut self) -> usize {
        self.push(Instruction::Jump(usize::MAX))
    }

    pub fn push_placeholder_jump_if_false(&mut self) -> usize {
        self.push(Instruction::JumpIfFalse(usize::MAX))
    }

    pub fn patch_jump(&mut self, at: usize, target: usize) {
        match &mut self.instructions[at] {
            Instruction::Jump(t) | Instruction::JumpIfFalse(t) => *t = target,
            other => unreachable!("patch_jump called on non-jump instruction {other:?}"),
        }
    }

    /// Backfills a `SafeDispatch`'s `skip_to` once the argument list and
    /// the trailing plain `Dispatch` it guards have been emitted.
    pub fn patch_safe_dispatch(&mut self, at: usize, skip_to: usize) {
        match &mut self.instructions[at] {
            Instruction::SafeDispatch { skip_to: t, .. } => *t = skip_to,
            other => unreachable!("patch_safe_dispatch called on {other:?}"),
        }
    }

    /// Backfills a `BuildClosure`'s `body_end` once its nested instruction
    /// block has been appended inline after it.
    pub fn patch_closure_body_end(&mut self, at: usize, body_end: usize) {
        match &mut self.instructions[at] {
            Instruction::BuildClosure { body_end: t, .. } => *t = body_end,
            other => unreachable!("patch_closure_body_end called on {other:?}"),
        }
    }

    /// Backfills a loop-exit `body_end` shared by all three `ForEach*Next`
    /// instructions.
    pub fn patch_for_each_body_end(&mut self, at: usize, body_end: usize) {
        match &mut self.instructions[at] {
            Instruction::ForEachListNext { body_end: t }
            | Instruction::ForEachEnumerableNext { body_end: t }
            | Instruction::ForEachRangeNext { body_end: t } => *t = body_end,
            other => unreachable!("patch_for_each_body_end called on {other:?}"),
        }
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

/// Program-wide deduplicated string literal pool; every `StringLiteral`
/// literal segment is interned here and referenced by index from
/// `PushStringFromPool`/`GetStringFromPool`.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<String>,
    index: std::collections::HashMap<String, u32>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn into_vec(self) -> Vec<String> {
        self.strings
    }
}
