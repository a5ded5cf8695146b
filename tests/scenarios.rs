//! The literal walkthroughs from §8, driven through the public library
//! surface: each test bootstraps a runtime from the bare prelude (or a
//! prelude plus a small user program) and exercises the native providers
//! and compiler checks directly, since the `emojicodec` binary itself
//! only compiles — it never prints anything a subprocess test could
//! observe.
mod support;

use emojicodec::ast::ProcedureKind;
use emojicodec::builtins;
use emojicodec::compiler::CompileError;
use emojicodec::prelude;
use emojicodec::vm::Something;

/// Scenario 1: two String literals concatenated, with the result's
/// `count` matching the combined length — the runtime-level shape of
/// "ab" interpolated with "cd".
#[test]
fn string_concat_matches_interpolation_semantics() {
    let (_runtime, mut vm) = support::bootstrap_prelude(1 << 16);
    let concat = builtins::resolve_method(prelude::STRING, prelude::STRING_CONCAT, ProcedureKind::Method)
        .expect("String must provide 🔗");
    let count = builtins::resolve_method(prelude::STRING, prelude::COUNT, ProcedureKind::Method)
        .expect("String must provide 📏");

    let ab = vm.new_string("ab").unwrap();
    let cd = vm.new_string("cd").unwrap();
    let joined = concat(&mut vm, ab, &[cd]).unwrap();

    assert_eq!(count(&mut vm, joined, &[]).unwrap(), Something::Integer(4));
    assert_eq!(vm.stringify_value(joined).unwrap(), "abcd");
}

/// List mutation through the native providers: append, count, get and
/// set all agree with each other and with `copy`'s independence from the
/// original backing array.
#[test]
fn list_append_count_and_copy_stay_consistent() {
    let (_runtime, mut vm) = support::bootstrap_prelude(1 << 16);
    let append = builtins::resolve_method(prelude::LIST, prelude::APPEND, ProcedureKind::Method).unwrap();
    let count = builtins::resolve_method(prelude::LIST, prelude::COUNT, ProcedureKind::Method).unwrap();
    let get = builtins::resolve_method(prelude::LIST, prelude::GET, ProcedureKind::Method).unwrap();
    let copy = builtins::resolve_method(prelude::LIST, prelude::COPY, ProcedureKind::Method).unwrap();

    let list = vm.new_list(vec![]).unwrap();
    append(&mut vm, list, &[Something::Integer(1)]).unwrap();
    append(&mut vm, list, &[Something::Integer(2)]).unwrap();
    append(&mut vm, list, &[Something::Integer(3)]).unwrap();
    assert_eq!(count(&mut vm, list, &[]).unwrap(), Something::Integer(3));
    assert_eq!(get(&mut vm, list, &[Something::Integer(1)]).unwrap(), Something::Integer(2));

    let duplicate = copy(&mut vm, list, &[]).unwrap();
    append(&mut vm, duplicate, &[Something::Integer(4)]).unwrap();
    assert_eq!(count(&mut vm, list, &[]).unwrap(), Something::Integer(3));
    assert_eq!(count(&mut vm, duplicate, &[]).unwrap(), Something::Integer(4));
}

/// Dictionary get/set round-trip through the open-addressing buckets,
/// including a grow past the initial capacity so the 0.75 load-factor
/// rehash is exercised, not just a few inserts that never trigger it.
#[test]
fn dictionary_survives_growth_past_initial_capacity() {
    let (_runtime, mut vm) = support::bootstrap_prelude(1 << 20);
    let set = builtins::resolve_method(prelude::DICTIONARY, prelude::SET, ProcedureKind::Method).unwrap();
    let get = builtins::resolve_method(prelude::DICTIONARY, prelude::GET, ProcedureKind::Method).unwrap();
    let count = builtins::resolve_method(prelude::DICTIONARY, prelude::COUNT, ProcedureKind::Method).unwrap();

    let dict = builtins::dictionary::new_dictionary(&mut vm, &[]).unwrap();
    for i in 0..64 {
        let key = vm.new_string(&format!("key{i}")).unwrap();
        set(&mut vm, dict, &[key, Something::Integer(i)]).unwrap();
    }
    assert_eq!(count(&mut vm, dict, &[]).unwrap(), Something::Integer(64));
    for i in 0..64 {
        let key = vm.new_string(&format!("key{i}")).unwrap();
        assert_eq!(get(&mut vm, dict, &[key]).unwrap(), Something::Integer(i));
    }
}

/// JSON round-trips a nested list/dictionary value: `stringify` then
/// `parse` must reproduce an equivalent structure.
#[test]
fn json_round_trips_a_nested_structure() {
    let (_runtime, mut vm) = support::bootstrap_prelude(1 << 16);
    let stringify = builtins::resolve_method(prelude::JSON, prelude::JSON_STRINGIFY, ProcedureKind::TypeMethod).unwrap();
    let parse = builtins::resolve_method(prelude::JSON, prelude::JSON_PARSE, ProcedureKind::TypeMethod).unwrap();

    let name = vm.new_string("name").unwrap();
    let value = vm.new_string("lantern").unwrap();
    let nested = vm.new_list(vec![Something::Integer(1), Something::Integer(2)]).unwrap();
    let dict = builtins::dictionary::new_dictionary(&mut vm, &[name, value]).unwrap();

    let wrapper = vm.new_list(vec![dict, nested]).unwrap();
    let text = stringify(&mut vm, Something::NOTHINGNESS, &[wrapper]).unwrap();
    let rendered = vm.stringify_value(text).unwrap();
    assert!(rendered.contains("lantern"));

    let parsed = parse(&mut vm, Something::NOTHINGNESS, &[text]).unwrap();
    let round_tripped = stringify(&mut vm, Something::NOTHINGNESS, &[parsed]).unwrap();
    assert_eq!(vm.stringify_value(round_tripped).unwrap(), rendered);
}

/// GC survival: a String rooted on the eval stack (via `push`) must come
/// back unchanged after enough allocations to force several collections.
#[test]
fn gc_preserves_a_rooted_string_across_many_collections() {
    let (_runtime, mut vm) = support::bootstrap_prelude(1 << 12);
    let rooted = vm.new_string("keep me").unwrap();
    vm.push(rooted);

    for i in 0..5_000 {
        vm.new_string(&format!("garbage-{i}")).unwrap();
    }

    let survivor = vm.pop();
    assert_eq!(vm.stringify_value(survivor).unwrap(), "keep me");
}

/// Protocol conformance parses and compiles: a class declaring `🐕` on a
/// protocol with a matching method builds a dispatch row rather than
/// failing as an unknown member.
#[test]
fn protocol_conformance_compiles_successfully() {
    let body = "🐊🐾🍇🐖🏃🔢🍉🐇🐶🍇🐕🐾🐖🏃🔢🍇🍎1🍉🍉";
    let file = support::compile_with(body);
    assert!(!file.classes.is_empty());
}

/// A dead-code statement after an unconditional return is rejected at
/// compile time rather than silently accepted.
#[test]
fn dead_code_after_return_is_rejected() {
    let body = "🐇🐶🍇🐖🏃🔢🍇🍎1🍎2🍉🍉🍉";
    let full = format!("{}{}", prelude::SOURCE, body);
    let (mut program, _warnings) = emojicodec::parser::parse_source(&full).expect("parses");
    emojicodec::vti::assign(&mut program).expect("vti assigns");
    let err = emojicodec::compiler::compile(&program).unwrap_err();
    assert!(matches!(err, CompileError::DeadCode(_)));
}
