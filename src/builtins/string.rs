//! Native providers for `📝`/String (§4.K).
use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, Something, Vm};

fn chars_of(vm: &Vm, value: Something) -> Vec<char> {
    let r = value.as_object().expect("String receiver must be an object");
    vm.with_object(r, |o| match &o.kind {
        crate::vm::ObjectKind::StringChars(chars) => chars.clone(),
        _ => panic!("expected a String object"),
    })
}

fn count(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    Ok(Something::Integer(chars_of(vm, receiver).len() as i64))
}

fn concat(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let mut joined = chars_of(vm, receiver);
    joined.extend(chars_of(vm, args[0]));
    vm.new_string(&joined.into_iter().collect::<String>())
}

fn equals(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    Ok(Something::Boolean(chars_of(vm, receiver) == chars_of(vm, args[0])))
}

fn index_of(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let haystack = chars_of(vm, receiver);
    let needle = chars_of(vm, args[0]);
    if needle.is_empty() {
        return Ok(Something::Integer(0));
    }
    let found = haystack
        .windows(needle.len())
        .position(|window| window == needle.as_slice())
        .map(|i| i as i64)
        .unwrap_or(-1);
    Ok(Something::Integer(found))
}

fn substring(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let chars = chars_of(vm, receiver);
    let start = args[0].as_integer().expect("substring start must be an integer").max(0) as usize;
    let length = args[1].as_integer().expect("substring length must be an integer").max(0) as usize;
    let end = (start + length).min(chars.len());
    let start = start.min(end);
    vm.new_string(&chars[start..end].iter().collect::<String>())
}

fn to_integer(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let s: String = chars_of(vm, receiver).into_iter().collect();
    Ok(Something::Integer(s.trim().parse().unwrap_or(0)))
}

fn from_integer(vm: &mut Vm, _receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let v = args[0].as_integer().expect("fromInteger argument must be an integer");
    vm.new_string(&v.to_string())
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::COUNT => Some(count),
        prelude::STRING_CONCAT => Some(concat),
        prelude::EQUALS => Some(equals),
        prelude::INDEX_OF => Some(index_of),
        prelude::SUBSTRING => Some(substring),
        prelude::TO_INTEGER => Some(to_integer),
        _ => None,
    }
}

pub fn resolve_type_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::FROM_INTEGER => Some(from_integer),
        _ => None,
    }
}
