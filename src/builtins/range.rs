//! Native providers for `🎢`/Range (§4.K). Backed by `ObjectKind::Range`;
//! bounds are already normalized to half-open (see `BuildRange`'s handling
//! of an inclusive range), so `count`/`contains` share the same bound
//! check `ForEachRangeNext` uses.
use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, ObjectKind, Something, Vm};

fn fields_of(vm: &Vm, value: Something) -> (i64, i64, i64) {
    let r = value.as_object().expect("Range receiver must be an object");
    vm.with_object(r, |o| match &o.kind {
        ObjectKind::Range { start, stop, step } => (*start, *stop, *step),
        _ => panic!("expected a Range object"),
    })
}

fn count_of(start: i64, stop: i64, step: i64) -> i64 {
    if step == 0 {
        return 0;
    }
    let diff = stop - start;
    if (step > 0 && diff <= 0) || (step < 0 && diff >= 0) {
        return 0;
    }
    let abs_diff = diff.unsigned_abs();
    let abs_step = step.unsigned_abs();
    ((abs_diff + abs_step - 1) / abs_step) as i64
}

fn in_bounds(start: i64, stop: i64, step: i64, value: i64) -> bool {
    if step == 0 {
        return false;
    }
    let within = if step > 0 { value >= start && value < stop } else { value <= start && value > stop };
    within && (value - start) % step == 0
}

fn count(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let (start, stop, step) = fields_of(vm, receiver);
    Ok(Something::Integer(count_of(start, stop, step)))
}

fn contains(vm: &mut Vm, receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let (start, stop, step) = fields_of(vm, receiver);
    let value = args[0].as_integer().expect("Range contains argument must be an integer");
    Ok(Something::Boolean(in_bounds(start, stop, step, value)))
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::COUNT => Some(count),
        prelude::CONTAINS => Some(contains),
        _ => None,
    }
}
