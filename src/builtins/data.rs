//! Native providers for `💾`/Data (§4.K). Backed by `ObjectKind::Bytes`.
use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, ObjectKind, Something, Vm};

fn bytes_of(vm: &Vm, value: Something) -> Vec<u8> {
    let r = value.as_object().expect("Data receiver must be an object");
    vm.with_object(r, |o| match &o.kind {
        ObjectKind::Bytes(bytes) => bytes.clone(),
        _ => panic!("expected a Data object"),
    })
}

fn count(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    Ok(Something::Integer(bytes_of(vm, receiver).len() as i64))
}

fn get_byte(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let index = args[0].as_integer().expect("getByte index must be an integer") as usize;
    Ok(Something::Integer(bytes_of(vm, receiver)[index] as i64))
}

fn set_byte(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Data receiver must be an object");
    let index = args[0].as_integer().expect("setByte index must be an integer") as usize;
    let value = args[1].as_integer().expect("setByte value must be an integer") as u8;
    vm.with_object_mut(r, |o| match &mut o.kind {
        ObjectKind::Bytes(bytes) => bytes[index] = value,
        _ => panic!("expected a Data object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn append(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let mut joined = bytes_of(vm, receiver);
    joined.extend(bytes_of(vm, args[0]));
    vm.new_data(joined)
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::COUNT => Some(count),
        prelude::GET_BYTE => Some(get_byte),
        prelude::SET_BYTE => Some(set_byte),
        prelude::DATA_APPEND => Some(append),
        _ => None,
    }
}
