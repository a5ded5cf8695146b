//! Shared fixtures for the integration tests: every test drives the
//! library the same way the CLI does (`parse_source` → `vti::assign` →
//! `compiler::compile`), just without going through the `emojicodec`
//! binary, so assertions can inspect typed `Something` values the CLI
//! itself never observes.
use std::sync::Arc;

use emojicodec::vm::{Runtime, Vm};
use emojicodec::{bytecode, compiler, parser, prelude, vti};

/// Parses `prelude::SOURCE` followed by `body`, runs VTI assignment and
/// compiles it. Panics with the underlying error on any stage failure —
/// acceptable in test fixtures, where a pipeline failure is itself the
/// bug being reported.
pub fn compile_with(body: &str) -> bytecode::BytecodeFile {
    let full = format!("{}{}", prelude::SOURCE, body);
    let (mut program, _warnings) = parser::parse_source(&full).expect("fixture source parses");
    vti::assign(&mut program).expect("fixture vti assignment");
    compiler::compile(&program).expect("fixture compiles")
}

/// Compiles the bare prelude (no user class) and bootstraps a runtime
/// from it, for tests that only need the built-in classes (String, List,
/// Dictionary, ...) and drive them directly via `builtins::resolve_method`.
pub fn bootstrap_prelude(heap_threshold: u32) -> (Arc<Runtime>, Vm) {
    let file = compile_with("");
    Runtime::bootstrap(&file, heap_threshold).expect("bootstrap from bare prelude")
}

/// Compiles `prelude::SOURCE` + `body`, writes it through the byte-exact
/// writer and back through the reader, then bootstraps a runtime from the
/// round-tripped file — exercising property 1 (round-trip) on every test
/// that uses it rather than just the property test dedicated to it.
pub fn bootstrap_with(body: &str, heap_threshold: u32) -> (Arc<Runtime>, Vm) {
    let file = compile_with(body);
    let bytes = bytecode::Writer::write(&file).expect("fixture writes");
    let read_back = bytecode::Reader::read(&bytes).expect("fixture reads back");
    Runtime::bootstrap(&read_back, heap_threshold).expect("bootstrap from round-tripped file")
}
