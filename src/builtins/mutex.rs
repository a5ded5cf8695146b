//! Native providers for `🔧`/Mutex (§4.K/§5). A flag-and-condvar pair
//! rather than `std::sync::Mutex`'s own guard: `🗝`/lock and `🧯`/unlock
//! are separate native calls with no Rust-level scope to hold a
//! `MutexGuard` across, so the locked/unlocked state has to be tracked by
//! hand instead of borrowed from the stdlib primitive.
use std::sync::{Arc, Condvar, Mutex};

use crate::packages::NativeMethod;
use crate::prelude;
use crate::vm::{InterpreterError, ObjectKind, Something, Vm};

pub struct MutexState {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl MutexState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn lock(&self) {
        let (locked, parked) = &*self.inner;
        let mut guard = locked.lock().unwrap();
        while *guard {
            guard = parked.wait(guard).unwrap();
        }
        *guard = true;
    }

    pub fn unlock(&self) {
        let (locked, parked) = &*self.inner;
        let mut guard = locked.lock().unwrap();
        *guard = false;
        parked.notify_one();
    }

    pub fn try_lock(&self) -> bool {
        let (locked, _parked) = &*self.inner;
        let mut guard = locked.lock().unwrap();
        if *guard {
            false
        } else {
            *guard = true;
            true
        }
    }
}

impl Default for MutexState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MutexState {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl std::fmt::Debug for MutexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MutexState")
    }
}

fn init(vm: &mut Vm, class_index: usize, _args: &[Something]) -> Result<Something, InterpreterError> {
    let object = crate::vm::Object {
        class_index,
        kind: ObjectKind::Mutex(MutexState::new()),
        forwarding: None,
    };
    let r = vm.allocate(object)?;
    Ok(Something::Object(r))
}

fn lock(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Mutex receiver must be an object");
    let state = vm.with_object(r, |o| match &o.kind {
        ObjectKind::Mutex(state) => state.clone(),
        _ => panic!("expected a Mutex object"),
    });
    vm.blocking(|| state.lock());
    Ok(Something::NOTHINGNESS)
}

fn unlock(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Mutex receiver must be an object");
    let state = vm.with_object(r, |o| match &o.kind {
        ObjectKind::Mutex(state) => state.clone(),
        _ => panic!("expected a Mutex object"),
    });
    state.unlock();
    Ok(Something::NOTHINGNESS)
}

fn try_lock(vm: &mut Vm, receiver: Something, _args: &[Something]) -> Result<Something, InterpreterError> {
    let r = receiver.as_object().expect("Mutex receiver must be an object");
    let state = vm.with_object(r, |o| match &o.kind {
        ObjectKind::Mutex(state) => state.clone(),
        _ => panic!("expected a Mutex object"),
    });
    Ok(Something::Boolean(state.try_lock()))
}

pub fn resolve_method(member: char) -> Option<NativeMethod> {
    match member {
        prelude::LOCK => Some(lock),
        prelude::UNLOCK => Some(unlock),
        prelude::TRY_LOCK => Some(try_lock),
        _ => None,
    }
}

pub fn resolve_initializer(member: char) -> Option<crate::packages::NativeInitializer> {
    match member {
        prelude::MUTEX_INIT => Some(init),
        _ => None,
    }
}
