//! Native providers for `🎒`/List (§4.K). Backed by `ObjectKind::RawArray`.
use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, ObjectKind, Something, Vm};

fn elements_of(vm: &Vm, value: Something) -> Vec<Something> {
    let r = value.as_object().expect("List receiver must be an object");
    vm.with_object(r, |o| match &o.kind {
        ObjectKind::RawArray(items) => items.clone(),
        _ => panic!("expected a List object"),
    })
}

fn count(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    Ok(Something::Integer(elements_of(vm, receiver).len() as i64))
}

fn append(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    vm.mutate_sized(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.push(args[0]),
        _ => panic!("expected a List object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn pop(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let popped = vm.mutate_sized(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.pop(),
        _ => panic!("expected a List object"),
    });
    Ok(popped.unwrap_or(Something::NOTHINGNESS))
}

fn get(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let index = args[0].as_integer().expect("List index must be an integer") as usize;
    Ok(elements_of(vm, receiver)[index])
}

fn set(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let index = args[0].as_integer().expect("List index must be an integer") as usize;
    vm.with_object_mut(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items[index] = args[1],
        _ => panic!("expected a List object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn remove_at(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let index = args[0].as_integer().expect("List index must be an integer") as usize;
    let removed = vm.mutate_sized(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.remove(index),
        _ => panic!("expected a List object"),
    });
    Ok(removed)
}

fn insert(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let index = args[0].as_integer().expect("List index must be an integer") as usize;
    vm.mutate_sized(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.insert(index, args[1]),
        _ => panic!("expected a List object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn shuffle(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    use rand::seq::SliceRandom;
    let r = receiver.as_object().expect("List receiver must be an object");
    vm.with_object_mut(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.shuffle(&mut rand::thread_rng()),
        _ => panic!("expected a List object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn copy(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let elements = elements_of(vm, receiver);
    vm.new_list(elements)
}

/// Insertion sort rather than `Vec::sort_by`: the comparator is a closure
/// invocation that can itself allocate and trigger a collection, which
/// `slice::sort_by`'s comparator (an infallible `Fn`) has no room for.
fn sort(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let comparator = args[0].as_object().expect("sort comparator must be a Closure");
    let mut items = elements_of(vm, receiver);
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let precedes = vm
                .call_closure(comparator, &[items[j], items[j - 1]])?
                .as_boolean()
                .expect("sort comparator must return a Boolean");
            if precedes {
                items.swap(j, j - 1);
                j -= 1;
            } else {
                break;
            }
        }
    }
    vm.mutate_sized(r, |o| o.kind = ObjectKind::RawArray(items));
    Ok(Something::NOTHINGNESS)
}

fn ensure_capacity(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("List receiver must be an object");
    let n = args[0].as_integer().expect("ensureCapacity argument must be an integer").max(0) as usize;
    vm.with_object_mut(r, |o| match &mut o.kind {
        ObjectKind::RawArray(items) => items.reserve(n),
        _ => panic!("expected a List object"),
    });
    Ok(Something::NOTHINGNESS)
}

fn contains(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    Ok(Something::Boolean(elements_of(vm, receiver).contains(&args[0])))
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::COUNT => Some(count),
        prelude::APPEND => Some(append),
        prelude::POP => Some(pop),
        prelude::GET => Some(get),
        prelude::SET => Some(set),
        prelude::REMOVE_AT => Some(remove_at),
        prelude::INSERT => Some(insert),
        prelude::SHUFFLE => Some(shuffle),
        prelude::COPY => Some(copy),
        prelude::SORT => Some(sort),
        prelude::ENSURE_CAPACITY => Some(ensure_capacity),
        prelude::CONTAINS => Some(contains),
        _ => None,
    }
}
