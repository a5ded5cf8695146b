//! Subprocess-level smoke tests for the `emojicodec` binary itself,
//! through the `test-utils` helpers — the only level at which the CLI's
//! argument parsing, exit codes and output path actually get exercised.
use test_utils::{check_compilation, check_failing_compilation, fixture_dir};

#[test]
fn a_minimal_startup_program_compiles_to_nonempty_bytecode() {
    let dir = fixture_dir().join("cli_minimal_startup");
    let source = "🐇🐶🍇🏁🐅🐖🏃🔢🍇🍎1🍉🍉";
    let bytes = check_compilation(&dir, "minimal_startup", source).unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn an_empty_class_compiles() {
    let dir = fixture_dir().join("cli_empty_class");
    let bytes = check_compilation(&dir, "empty_class", "🐇🐶🍇🍉").unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn a_program_with_a_stray_unopened_block_fails_to_compile() {
    let dir = fixture_dir().join("cli_malformed");
    let stderr = check_failing_compilation(&dir, "malformed", "🐇🐶🍇").unwrap();
    assert!(!stderr.is_empty());
}

#[test]
fn overriding_a_final_method_fails_to_compile() {
    let dir = fixture_dir().join("cli_override_final");
    let source = "🐇🐶🍇🔏🐖🏃🔢🍇🍎1🍉🍉🐇🐕🦒🐶🍇🐿🐖🏃🔢🍇🍎2🍉🍉";
    let stderr = check_failing_compilation(&dir, "override_final", source).unwrap();
    assert!(!stderr.is_empty());
}
