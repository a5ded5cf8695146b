//! Native providers for `🚨`/Error (§4.K). The only standard-library
//! primitive with a native initializer (`🏗`): it builds an
//! `ObjectKind::Error` directly rather than the generic `Instance` a
//! compiled initializer's pre-allocated receiver would be.
use crate::packages::{NativeInitializer, NativeMethod};
use crate::prelude;
use crate::vm::{InterpreterError, Object, ObjectKind, Something, Vm};

fn init(vm: &mut Vm, class_index: usize, args: &[Something]) -> Result<Something, InterpreterError> {
    let message = args[0];
    let code = args[1].as_integer().expect("Error code must be an integer");
    let object = Object {
        class_index,
        kind: ObjectKind::Error { message, code },
        forwarding: None,
    };
    let r = vm.allocate(object)?;
    Ok(Something::Object(r))
}

fn message(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Error receiver must be an object");
    Ok(vm.with_object(r, |o| match &o.kind {
        ObjectKind::Error { message, .. } => *message,
        _ => panic!("expected an Error object"),
    }))
}

fn code(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Error receiver must be an object");
    Ok(Something::Integer(vm.with_object(r, |o| match &o.kind {
        ObjectKind::Error { code, .. } => *code,
        _ => panic!("expected an Error object"),
    })))
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::MESSAGE => Some(message),
        prelude::CODE => Some(code),
        _ => None,
    }
}

pub fn resolve_initializer(member: char) -> Option<NativeInitializer> {
    match member {
        prelude::ERROR_INIT => Some(init),
        _ => None,
    }
}
