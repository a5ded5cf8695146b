//! Native providers for `🧵`/Thread (§4.K/§5). `🧶`/spawn is the only
//! entry point that ever creates a `Thread` object — there is no
//! initializer, matching the prelude's declaration, which gives `Thread`
//! a type-method constructor instead of an ordinary one.
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, Object, ObjectKind, Something, Vm};

pub struct ThreadState {
    handle: Arc<Mutex<Option<JoinHandle<Result<Something, InterpreterError>>>>>,
}

impl ThreadState {
    pub fn new(handle: JoinHandle<Result<Something, InterpreterError>>) -> Self {
        Self { handle: Arc::new(Mutex::new(Some(handle))) }
    }

    pub fn take(&self) -> Option<JoinHandle<Result<Something, InterpreterError>>> {
        self.handle.lock().unwrap().take()
    }
}

impl Clone for ThreadState {
    fn clone(&self) -> Self {
        Self { handle: Arc::clone(&self.handle) }
    }
}

impl std::fmt::Debug for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadState")
    }
}

fn spawn(vm: &mut Vm, _receiver: Something, args: &[Something]) -> Result<Something, InterpreterError> {
    let closure_ref = args[0].as_object().expect("Thread spawn body must be a Closure");
    let (variable_count, captured_self, body, captured) = vm.with_object(closure_ref, |object| match &object.kind {
        ObjectKind::Closure {
            variable_count,
            captured_self,
            body,
            captured,
            ..
        } => (*variable_count as usize, *captured_self, Arc::clone(body), captured.clone()),
        _ => panic!("Thread spawn argument is not a Closure"),
    });

    let runtime = Arc::clone(&vm.runtime);
    let handle = Vm::spawn(runtime, move |thread_vm| {
        thread_vm.invoke_closure_parts(variable_count, captured_self, &body, &captured, &[])
    });

    let class_index = vm.class_index_for(prelude::THREAD);
    let object = Object {
        class_index,
        kind: ObjectKind::Thread(ThreadState::new(handle)),
        forwarding: None,
    };
    let r = vm.allocate(object)?;
    Ok(Something::Object(r))
}

fn join(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Thread receiver must be an object");
    let state = vm.with_object(r, |o| match &o.kind {
        ObjectKind::Thread(state) => state.clone(),
        _ => panic!("expected a Thread object"),
    });
    let Some(handle) = state.take() else {
        return Ok(Something::NOTHINGNESS);
    };
    match vm.blocking(|| handle.join()) {
        Ok(result) => result,
        Err(_) => Err(InterpreterError::ThreadJoinFailure),
    }
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::JOIN => Some(join),
        _ => None,
    }
}

pub fn resolve_type_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::SPAWN => Some(spawn),
        _ => None,
    }
}
