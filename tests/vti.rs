//! VTI assignment driven through the public `parser`/`vti` API rather
//! than the crate's own internal test helper, to catch any drift
//! between the two entry points.
use emojicodec::parser::parse_source;
use emojicodec::vti::{self, VtiError};

fn parse(src: &str) -> emojicodec::ast::Program {
    parse_source(src).expect("fixture parses").0
}

#[test]
fn methods_on_one_class_get_sequential_vtis() {
    let mut program = parse("🐇🐶🍇🐖🏃🔢🍇🍎1🍉🐖🐕🔢🍇🍎2🍉🍉");
    vti::assign(&mut program).unwrap();
    let class = &program.classes[0];
    let mut vtis: Vec<u16> = class.methods.values().map(|p| p.vti.unwrap()).collect();
    vtis.sort_unstable();
    assert_eq!(vtis, vec![0, 1]);
}

#[test]
fn overriding_a_final_method_is_rejected() {
    let mut program = parse("🐇🐶🍇🔏🐖🏃🔢🍇🍎1🍉🍉🐇🐕🦒🐶🍇🐿🐖🏃🔢🍇🍎2🍉🍉");
    let err = vti::assign(&mut program).unwrap_err();
    assert!(matches!(err, VtiError::OverrideFinal(..)));
}

#[test]
fn instance_variable_offsets_account_for_inheritance() {
    let mut program = parse("🐇🐶🍇🍦x🔢🍉🐇🐕🦒🐶🍇🍦y🔢🍉");
    vti::assign(&mut program).unwrap();
    // Each class lists only its own instance variables; the subclass'
    // single ivar `y` starts past the inherited `x` slot, not at 0.
    assert_eq!(program.classes[0].instance_variable_offsets, vec![0]);
    assert!(program.classes[1].instance_variable_offsets[0] > 0);
}

#[test]
fn protocol_conformance_builds_a_dispatch_row() {
    let mut program = parse("🐊🐾🍇🐖🏃🔢🍉🐇🐶🍇🐕🐾🐖🏃🔢🍇🍎1🍉🍉");
    vti::assign(&mut program).unwrap();
    let class = &program.classes[0];
    let method_vti = class.methods[&'🏃'].vti.unwrap();
    assert_eq!(class.protocol_dispatch.lookup(0, 0), Some(method_vti));
}
