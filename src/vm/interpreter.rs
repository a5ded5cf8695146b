//! §4.J: the bytecode interpreter loop, the thread/heap wiring that makes
//! it runnable, and the safepoint-coordinated GC trigger of §5. A [`Vm`]
//! is one thread's view onto a shared [`Runtime`]; [`Runtime::bootstrap`]
//! loads a [`crate::bytecode::BytecodeFile`], resolves native packages,
//! and hands back the main thread's `Vm`.
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::bytecode::{Instruction, RUNTIME_CLASS_SENTINEL};
use crate::packages::{InitializerImpl, MethodImpl, PackageError, PackageRegistry};

use super::gc::{self, SafepointCoordinator};
use super::object::{Heap, Object, ObjectKind};
use super::something::{ObjectRef, Something};
use super::stack::{Stack, StackError};
use super::{LoadError, LoadedProgram};

#[derive(Debug)]
pub enum InterpreterError {
    HeapExhausted,
    StackOverflow,
    /// `🍭?`/`OptionalUnwrap` hit nothingness.
    NothingnessUnwrapped,
    IllegalInstruction(String),
    /// A single allocation request exceeded the heap's per-space
    /// threshold outright (never just an early collection, per §4.H).
    AllocationTooLarge(u32, u32),
    ThreadJoinFailure,
}

impl std::fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpreterError::HeapExhausted => write!(f, "heap exhausted: collection made no progress"),
            InterpreterError::StackOverflow => write!(f, "stack overflow"),
            InterpreterError::NothingnessUnwrapped => write!(f, "unwrapped an absent optional value"),
            InterpreterError::IllegalInstruction(msg) => write!(f, "illegal instruction: {msg}"),
            InterpreterError::AllocationTooLarge(wanted, threshold) => write!(
                f,
                "allocation of {wanted} bytes exceeds the heap threshold of {threshold} bytes"
            ),
            InterpreterError::ThreadJoinFailure => write!(f, "thread join failed"),
        }
    }
}

impl std::error::Error for InterpreterError {}

impl From<StackError> for InterpreterError {
    fn from(e: StackError) -> Self {
        match e {
            StackError::Overflow => InterpreterError::StackOverflow,
        }
    }
}

#[derive(Debug)]
pub enum BootstrapError {
    Load(LoadError),
    Package(PackageError),
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::Load(e) => write!(f, "{e}"),
            BootstrapError::Package(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BootstrapError {}

impl From<LoadError> for BootstrapError {
    fn from(e: LoadError) -> Self {
        BootstrapError::Load(e)
    }
}

impl From<PackageError> for BootstrapError {
    fn from(e: PackageError) -> Self {
        BootstrapError::Package(e)
    }
}

/// One thread's GC roots, published where [`Vm::collect`] can reach them
/// while this thread might be off running native code. See [`Vm::publish`].
#[derive(Debug, Default, Clone)]
struct ThreadRoots {
    stack: Stack,
    eval: Vec<Something>,
}

/// Shared state across every thread of one running program: the loaded
/// class tables, the native-package registry, the single heap (behind a
/// mutex — allocation itself is not the hot path this runtime optimizes
/// for), the safepoint coordinator, and every live thread's published
/// roots.
pub struct Runtime {
    pub program: LoadedProgram,
    pub registry: PackageRegistry,
    heap: Mutex<Heap>,
    safepoint: SafepointCoordinator,
    threads: Mutex<Vec<Arc<Mutex<ThreadRoots>>>>,
}

/// Default per-thread frame-stack budget, in `Something` slots.
const DEFAULT_STACK_SLOTS: usize = 64 * 1024;

impl Runtime {
    /// Loads `file`, resolves its packages, and returns a `Runtime` plus
    /// the main thread's `Vm` ready to invoke the startup type-method.
    pub fn bootstrap(
        file: &crate::bytecode::BytecodeFile,
        heap_threshold: u32,
    ) -> Result<(Arc<Runtime>, Vm), BootstrapError> {
        let registry = PackageRegistry::load(&file.packages)?;
        let program = LoadedProgram::load(file, &registry)?;

        let runtime = Arc::new(Runtime {
            program,
            registry,
            heap: Mutex::new(Heap::new(heap_threshold)),
            safepoint: SafepointCoordinator::new(),
            threads: Mutex::new(Vec::new()),
        });

        let vm = Vm::new_thread(Arc::clone(&runtime));
        Ok((runtime, vm))
    }
}

/// One thread's interpreter. `stack`/`eval` are this thread's working
/// copies; `published` is the snapshot other threads' GC cycles actually
/// trace, kept current via [`Vm::publish`] at every safepoint-observing
/// boundary (allocation, blocking call, explicit checkpoint).
pub struct Vm {
    pub runtime: Arc<Runtime>,
    stack: Stack,
    eval: Vec<Something>,
    published: Arc<Mutex<ThreadRoots>>,
}

impl Vm {
    fn new_thread(runtime: Arc<Runtime>) -> Self {
        runtime.safepoint.register_thread();
        let published = Arc::new(Mutex::new(ThreadRoots::default()));
        runtime.threads.lock().unwrap().push(Arc::clone(&published));
        Self {
            runtime,
            stack: Stack::new(DEFAULT_STACK_SLOTS),
            eval: Vec::new(),
            published,
        }
    }

    /// Spawns a new interpreter thread sharing this `Vm`'s runtime —
    /// backing `🧵🧶` (§4.K). The caller runs `body` to completion and the
    /// thread deregisters itself (and drops its published roots) on exit,
    /// matching §5's "total_threads" bookkeeping.
    pub fn spawn<F>(runtime: Arc<Runtime>, body: F) -> std::thread::JoinHandle<Result<Something, InterpreterError>>
    where
        F: FnOnce(&mut Vm) -> Result<Something, InterpreterError> + Send + 'static,
    {
        std::thread::spawn(move || {
            let mut vm = Vm::new_thread(runtime);
            body(&mut vm)
        })
    }

    /// Copies this thread's current stack/eval into the shared snapshot
    /// other threads' collections trace. Must be called before any point
    /// this thread might block or before triggering a collection itself.
    fn publish(&mut self) {
        let mut published = self.published.lock().unwrap();
        published.stack = self.stack.clone();
        published.eval = self.eval.clone();
    }

    /// After a collection this thread didn't initiate (or one it did),
    /// copies the possibly-rewritten roots back out of the shared
    /// snapshot so local evaluation resumes against live object refs.
    fn sync_from_published(&mut self) {
        let published = self.published.lock().unwrap();
        self.stack = published.stack.clone();
        self.eval = published.eval.clone();
    }

    /// Observes the safepoint protocol without allocating or blocking:
    /// publishes roots, parks if a cycle is in progress, then resyncs.
    /// Called at loop back-edges so a long-running `for`/`while` body
    /// with no allocations still cooperates with the collector.
    fn checkpoint(&mut self) {
        self.publish();
        self.runtime.safepoint.check_safepoint();
        self.sync_from_published();
    }

    /// Ensures `size` more bytes fit in the active heap space, running a
    /// collection first if not. Fails hard if even a fresh collection
    /// can't make room — `size` itself exceeding the threshold is
    /// reported separately, since that can never be fixed by collecting.
    fn ensure_capacity(&mut self, size: u32) -> Result<(), InterpreterError> {
        let threshold = {
            let heap = self.runtime.heap.lock().unwrap();
            heap.threshold
        };
        if size > threshold {
            return Err(InterpreterError::AllocationTooLarge(size, threshold));
        }
        let would_overflow = {
            let heap = self.runtime.heap.lock().unwrap();
            heap.would_overflow(size)
        };
        if would_overflow {
            self.runtime.safepoint.check_safepoint();
            let made_progress = self.collect()?;
            let still_overflows = {
                let heap = self.runtime.heap.lock().unwrap();
                heap.would_overflow(size)
            };
            if still_overflows && !made_progress {
                return Err(InterpreterError::HeapExhausted);
            }
        }
        Ok(())
    }

    /// Runs one stop-the-world collection: publishes this thread's roots,
    /// pauses every other thread, copies every reachable object, then
    /// runs deinitializers for whatever didn't survive.
    fn collect(&mut self) -> Result<bool, InterpreterError> {
        self.publish();
        let runtime = Arc::clone(&self.runtime);
        let (made_progress, dead) = runtime.safepoint.run_exclusive(|| {
            let mut heap = runtime.heap.lock().unwrap();
            let pre_cycle_used = heap.active.used;
            let threads = runtime.threads.lock().unwrap();
            let mut guards: Vec<_> = threads.iter().map(|t| t.lock().unwrap()).collect();
            let mut roots: Vec<&mut Something> = Vec::new();
            for g in guards.iter_mut() {
                roots.extend(g.stack.roots_mut());
                roots.extend(g.eval.iter_mut());
            }
            let dead = gc::collect(&mut heap, &mut roots);
            let made_progress = gc::made_progress(pre_cycle_used, &heap);
            (made_progress, dead)
        });
        self.sync_from_published();
        debug!("collection complete: {} objects reclaimed, progress={made_progress}", dead.len());
        for (class_index, object) in dead {
            self.run_deinitializer(class_index, object)?;
        }
        Ok(made_progress)
    }

    /// Runs a dead object's deinitializer, if it (or an ancestor) has
    /// one. The object has already been dropped from the heap by the
    /// time this runs, but its deinitializer body may still dereference
    /// `self` via ordinary `LoadSelf`/`LoadInstanceVariable` — so it is
    /// bumped back into the active space just long enough to run through
    /// the normal `invoke_compiled` path, then left to be swept as
    /// garbage again on the *next* cycle (it is no longer reachable from
    /// any root, so nothing keeps it alive past that).
    fn run_deinitializer(&mut self, class_index: usize, object: Object) -> Result<(), InterpreterError> {
        let Some(function) = self.runtime.program.find_deinitializer(class_index) else {
            return Ok(());
        };
        let object_ref = {
            let mut heap = self.runtime.heap.lock().unwrap();
            heap.active.bump(object)
        };
        self.invoke_compiled(&function, Something::Object(object_ref), &[])?;
        Ok(())
    }

    /// Allocates `object` in the active space, collecting first if
    /// needed. Callers must keep any `Something`s the new object's
    /// construction depends on rooted (on `eval` or a committed frame)
    /// across this call, since it may trigger a collection.
    pub fn allocate(&mut self, object: Object) -> Result<ObjectRef, InterpreterError> {
        let size = object.approx_size();
        self.ensure_capacity(size)?;
        let mut heap = self.runtime.heap.lock().unwrap();
        Ok(heap.active.bump(object))
    }

    pub fn allocate_instance(&mut self, class_index: usize) -> Result<Something, InterpreterError> {
        let count = self.runtime.program.classes[class_index].total_instance_variables;
        let object = Object::new_instance(class_index, count);
        let r = self.allocate(object)?;
        Ok(Something::Object(r))
    }

    /// Looks up `r` in the active space. `r`'s object must be one the
    /// caller knows is currently rooted — the only refs a `Vm` ever
    /// holds onto across an allocation are on `eval`/the frame stack,
    /// which `collect` rewrites in lockstep with every object's move.
    pub fn heap_get(&self, r: ObjectRef) -> Object {
        let heap = self.runtime.heap.lock().unwrap();
        heap.active.get(r).clone()
    }

    pub fn with_object<R>(&self, r: ObjectRef, f: impl FnOnce(&Object) -> R) -> R {
        let heap = self.runtime.heap.lock().unwrap();
        f(heap.active.get(r))
    }

    pub fn with_object_mut<R>(&mut self, r: ObjectRef, f: impl FnOnce(&mut Object) -> R) -> R {
        let mut heap = self.runtime.heap.lock().unwrap();
        f(heap.active.get_mut(r))
    }

    /// Like [`Self::with_object_mut`], but for a mutation that may change
    /// `r`'s `approx_size` (growing a `List`/`Dictionary`'s backing
    /// store) — recomputes the size delta and folds it into the active
    /// space's `used` total so the threshold accounting in
    /// [`Self::ensure_capacity`] stays honest. Callers that grow a
    /// container should call [`Self::ensure_capacity`] for the expected
    /// growth first; this only keeps the ledger correct after the fact.
    pub fn mutate_sized<R>(&mut self, r: ObjectRef, f: impl FnOnce(&mut Object) -> R) -> R {
        let mut heap = self.runtime.heap.lock().unwrap();
        let old_size = heap.active.get(r).approx_size();
        let result = f(heap.active.get_mut(r));
        let new_size = heap.active.get(r).approx_size();
        heap.active.used = heap.active.used + new_size - old_size;
        result
    }

    pub fn string_pool(&self, index: u32) -> String {
        self.runtime.program.string_pool[index as usize].clone()
    }

    pub fn push(&mut self, value: Something) {
        self.eval.push(value);
    }

    /// Brackets a blocking native call (mutex acquisition, thread join)
    /// per §5: publish roots and mark this thread parked before
    /// blocking, then resync after. `body` must not allocate or
    /// dereference heap pointers while running.
    pub fn blocking<R>(&mut self, body: impl FnOnce() -> R) -> R {
        self.publish();
        self.runtime.safepoint.allow_gc();
        let result = body();
        self.runtime.safepoint.disallow_gc_or_pause_if_needed();
        self.sync_from_published();
        result
    }

    pub fn pop(&mut self) -> Something {
        self.eval.pop().expect("eval stack underflow")
    }

    /// Invokes the startup type-method, as decided by §4.B's entry point.
    pub fn run_startup(&mut self) -> Result<Something, InterpreterError> {
        let class_index = self.runtime.program.startup_class_index;
        let vti = self.runtime.program.startup_type_method_vti as usize;
        let implementation = self.runtime.program.classes[class_index]
            .type_methods
            .get(vti)
            .and_then(|slot| slot.clone())
            .expect("startup type-method must resolve");
        match implementation {
            MethodImpl::Compiled(f) => self.invoke_compiled(&f, Something::Class(class_index), &[]),
            MethodImpl::Native(native) => native(self, Something::Class(class_index), &[]),
        }
    }

    /// Invokes a compiled function against `receiver` with `arguments`
    /// already evaluated, via the reserve/commit frame discipline of
    /// §4.I: arguments are copied into the reserved frame's slots (not
    /// yet GC-visible) before the frame is committed.
    pub fn invoke_compiled(
        &mut self,
        function: &crate::bytecode::CompiledFunction,
        receiver: Something,
        arguments: &[Something],
    ) -> Result<Something, InterpreterError> {
        let variable_count = function.variable_count.unwrap_or(0) as usize;
        self.stack.reserve_frame(receiver, variable_count)?;
        {
            let slots = self.stack.reserved_slots_mut();
            for (slot, arg) in slots.iter_mut().zip(arguments.iter()) {
                *slot = *arg;
            }
        }
        self.stack.commit_reserved_frame();
        let eval_base = self.eval.len();
        let result = self.run(&function.instructions);
        self.eval.truncate(eval_base);
        self.stack.pop_frame();
        result
    }

    /// Invokes a [`ObjectKind::Closure`] by value: populates a fresh
    /// frame with `[captured...][arguments...]` in that order (§4.E's
    /// slot layout) and runs the closure's own body with the enclosing
    /// frame's snapshotted receiver restored as `this_context`.
    pub fn call_closure(&mut self, closure_ref: ObjectRef, arguments: &[Something]) -> Result<Something, InterpreterError> {
        let (variable_count, captured_self, body, captured) =
            self.with_object(closure_ref, |object| match &object.kind {
                ObjectKind::Closure {
                    variable_count,
                    captured_self,
                    body,
                    captured,
                    ..
                } => (
                    *variable_count as usize,
                    *captured_self,
                    std::sync::Arc::clone(body),
                    captured.clone(),
                ),
                _ => panic!("call_closure on a non-Closure object"),
            });
        self.invoke_closure_parts(variable_count, captured_self, &body, &captured, arguments)
    }

    /// The part of [`Self::call_closure`] that doesn't need the closure
    /// object itself, split out so [`crate::builtins::thread`]'s `🧶` can
    /// extract a closure's fields on the spawning thread (while its
    /// `ObjectRef` is still known-rooted) and hand the extracted, `Send`
    /// fields to the new thread rather than an `ObjectRef` into a heap
    /// space the spawning thread no longer controls.
    pub fn invoke_closure_parts(
        &mut self,
        variable_count: usize,
        captured_self: Something,
        body: &[Instruction],
        captured: &[Something],
        arguments: &[Something],
    ) -> Result<Something, InterpreterError> {
        self.stack.reserve_frame(captured_self, variable_count)?;
        {
            let slots = self.stack.reserved_slots_mut();
            for (slot, value) in slots.iter_mut().zip(captured.iter().chain(arguments.iter())) {
                *slot = *value;
            }
        }
        self.stack.commit_reserved_frame();
        let eval_base = self.eval.len();
        let result = self.run(body);
        self.eval.truncate(eval_base);
        self.stack.pop_frame();
        result
    }

    /// Invokes a [`ObjectKind::CapturedFunctionCall`] value: resolves the
    /// bound `(receiver, vti)` pair against the receiver's actual class
    /// (exactly like a plain `Dispatch`) and calls through.
    pub fn call_captured(&mut self, captured_ref: ObjectRef, arguments: &[Something]) -> Result<Something, InterpreterError> {
        let (receiver, vti) = self.with_object(captured_ref, |object| match &object.kind {
            ObjectKind::CapturedFunctionCall { receiver, vti } => (*receiver, *vti),
            _ => panic!("call_captured on a non-CapturedFunctionCall object"),
        });
        self.dispatch(receiver, vti, arguments)
    }

    /// Resolves `receiver`'s dynamic class and dispatches `vti` against
    /// its flattened method table — the shared resolution logic behind
    /// `Dispatch`, `SafeDispatch`'s fallthrough, and captured-method
    /// invocation.
    fn dispatch(&mut self, receiver: Something, vti: u16, arguments: &[Something]) -> Result<Something, InterpreterError> {
        let class_index = self.class_of(receiver);
        let implementation = self.runtime.program.classes[class_index]
            .methods
            .get(vti as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| InterpreterError::IllegalInstruction(format!("unresolved vti {vti} on class {class_index}")))?;
        match implementation {
            MethodImpl::Compiled(f) => self.invoke_compiled(&f, receiver, arguments),
            MethodImpl::Native(native) => native(self, receiver, arguments),
        }
    }

    /// The dynamic class of any runtime value, including primitives
    /// (which are boxed as ordinary objects in this representation —
    /// see [`ObjectKind::Instance`]'s framing note).
    fn class_of(&self, value: Something) -> usize {
        match value {
            Something::Object(r) => self.heap_get(r).class_index,
            Something::Class(idx) => idx,
            Something::Integer(_) | Something::Boolean(_) | Something::Symbol(_) | Something::Double(_) => {
                unreachable!("primitives dispatch through CastDynamic, never a raw receiver")
            }
        }
    }

    /// Runs one function's (or closure body's) instruction stream against
    /// the currently-committed frame, returning its `Return` value.
    pub fn run(&mut self, instructions: &[Instruction]) -> Result<Something, InterpreterError> {
        let mut ip = 0usize;
        loop {
            let instr = &instructions[ip];
            trace!("ip={ip} eval_depth={} {:?}", self.eval.len(), instr);
            match instr {
                Instruction::PushInteger(v) => self.push(Something::Integer(*v)),
                Instruction::PushDouble(v) => self.push(Something::Double(*v)),
                Instruction::PushBoolean(b) => self.push(Something::Boolean(*b)),
                Instruction::PushSymbol(c) => self.push(Something::Symbol(*c)),
                Instruction::PushStringFromPool(i) => {
                    let s = self.string_pool(*i);
                    let value = self.make_string(&s)?;
                    self.push(value);
                }
                Instruction::BuildInterpolatedString(n) => {
                    let n = *n as usize;
                    let pieces = self.eval.split_off(self.eval.len() - n);
                    let mut joined = String::new();
                    for piece in pieces {
                        joined.push_str(&self.stringify(piece)?);
                    }
                    let value = self.make_string(&joined)?;
                    self.push(value);
                }

                Instruction::LoadLocal(slot) => {
                    let v = self.stack.current_frame().slots[*slot as usize];
                    self.push(v);
                }
                Instruction::StoreLocal(slot) => {
                    let v = self.pop();
                    self.stack.current_frame_mut().slots[*slot as usize] = v;
                }
                Instruction::LoadInstanceVariable(slot) => {
                    let this_context = self.stack.current_frame().this_context;
                    let r = this_context.as_object().expect("LoadInstanceVariable without an object receiver");
                    let v = self.with_object(r, |o| o.as_instance_variables().expect("ivar load on non-instance")[*slot as usize]);
                    self.push(v);
                }
                Instruction::StoreInstanceVariable(slot) => {
                    let v = self.pop();
                    let this_context = self.stack.current_frame().this_context;
                    let r = this_context.as_object().expect("StoreInstanceVariable without an object receiver");
                    self.with_object_mut(r, |o| {
                        o.as_instance_variables_mut().expect("ivar store on non-instance")[*slot as usize] = v;
                    });
                }
                Instruction::LoadSelf => {
                    let this_context = self.stack.current_frame().this_context;
                    self.push(this_context);
                }

                Instruction::Dispatch { vti, argument_count } => {
                    let argument_count = *argument_count as usize;
                    let arguments = self.eval.split_off(self.eval.len() - argument_count);
                    let receiver = self.pop();
                    let result = self.dispatch(receiver, *vti, &arguments)?;
                    self.push(result);
                }
                Instruction::DispatchTypeMethod { class_index, vti } => {
                    // Arity for a type-method dispatch is always statically
                    // known at compile time (the class is fixed), so unlike
                    // `Dispatch` no separate argument_count operand is
                    // carried; it is recovered from the resolved
                    // implementation's own declared signature instead.
                    let implementation = self.runtime.program.classes[*class_index as usize]
                        .type_methods
                        .get(*vti as usize)
                        .and_then(|slot| slot.clone())
                        .ok_or_else(|| {
                            InterpreterError::IllegalInstruction(format!(
                                "unresolved type-method vti {vti} on class {class_index}"
                            ))
                        })?;
                    let argument_count = match &implementation {
                        MethodImpl::Compiled(f) => f.argument_count as usize,
                        MethodImpl::Native(_) => self.pending_type_method_arity(*class_index as usize, *vti),
                    };
                    let arguments = self.eval.split_off(self.eval.len() - argument_count);
                    let result = match implementation {
                        MethodImpl::Compiled(f) => {
                            self.invoke_compiled(&f, Something::Class(*class_index as usize), &arguments)?
                        }
                        MethodImpl::Native(native) => native(self, Something::Class(*class_index as usize), &arguments)?,
                    };
                    self.push(result);
                }
                Instruction::DispatchProtocol {
                    protocol_index,
                    vti,
                    argument_count,
                } => {
                    let argument_count = *argument_count as usize;
                    let arguments = self.eval.split_off(self.eval.len() - argument_count);
                    let receiver = self.pop();
                    let class_index = self.class_of(receiver);
                    let resolved_vti = self.runtime.program.classes[class_index]
                        .protocol_method_vti(*protocol_index, *vti as usize)
                        .ok_or_else(|| {
                            InterpreterError::IllegalInstruction(format!(
                                "class {class_index} does not implement protocol {protocol_index} offset {vti}"
                            ))
                        })?;
                    let result = self.dispatch(receiver, resolved_vti, &arguments)?;
                    self.push(result);
                }
                Instruction::SafeDispatch { skip_to, .. } => {
                    // Only the receiver is on eval at this point (§4.J's
                    // emission order: receiver, then SafeDispatch, then
                    // arguments, then the matching plain Dispatch).
                    let receiver = *self.eval.last().expect("SafeDispatch with empty eval");
                    if receiver.is_nothingness() {
                        self.pop();
                        self.push(Something::NOTHINGNESS);
                        ip = *skip_to;
                        continue;
                    }
                    // Otherwise fall through: receiver stays on eval for the
                    // arguments and the following Dispatch to consume.
                }

                Instruction::CallInitializer { class_index, vti } => {
                    let resolved_class = if *class_index == RUNTIME_CLASS_SENTINEL {
                        match self.stack.current_frame().this_context {
                            Something::Class(idx) => idx,
                            other => {
                                return Err(InterpreterError::IllegalInstruction(format!(
                                    "dynamic initializer call outside a type-method context: {other:?}"
                                )))
                            }
                        }
                    } else {
                        *class_index as usize
                    };
                    let implementation = self.runtime.program.classes[resolved_class]
                        .initializers
                        .get(*vti as usize)
                        .and_then(|slot| slot.clone())
                        .ok_or_else(|| {
                            InterpreterError::IllegalInstruction(format!(
                                "unresolved initializer vti {vti} on class {resolved_class}"
                            ))
                        })?;
                    let argument_count = match &implementation {
                        InitializerImpl::Compiled(f) => f.argument_count as usize,
                        InitializerImpl::Native(_) => self.pending_initializer_arity(resolved_class, *vti),
                    };
                    let arguments = self.eval.split_off(self.eval.len() - argument_count);
                    // A native initializer builds its own object (it may
                    // need an `ObjectKind` other than a plain `Instance` —
                    // see `NativeInitializer`'s doc comment); only the
                    // compiled path needs a generic instance reserved for
                    // it up front.
                    let result = match implementation {
                        InitializerImpl::Compiled(f) => {
                            let receiver = self.allocate_instance(resolved_class)?;
                            self.invoke_compiled(&f, receiver, &arguments)?
                        }
                        InitializerImpl::Native(native) => native(self, resolved_class, &arguments)?,
                    };
                    self.push(result);
                }
                Instruction::SuperInitializerCall { vti } => {
                    let this_context = self.stack.current_frame().this_context;
                    let object_ref = this_context.as_object().expect("super initializer call outside an initializer");
                    let class_index = self.heap_get(object_ref).class_index;
                    let superclass_index = self.runtime.program.classes[class_index].superclass_index;
                    let implementation = self.runtime.program.classes[superclass_index]
                        .initializers
                        .get(*vti as usize)
                        .and_then(|slot| slot.clone())
                        .ok_or_else(|| {
                            InterpreterError::IllegalInstruction(format!(
                                "unresolved super initializer vti {vti} on class {superclass_index}"
                            ))
                        })?;
                    let argument_count = match &implementation {
                        InitializerImpl::Compiled(f) => f.argument_count as usize,
                        InitializerImpl::Native(_) => self.pending_initializer_arity(superclass_index, *vti),
                    };
                    let arguments = self.eval.split_off(self.eval.len() - argument_count);
                    match implementation {
                        InitializerImpl::Compiled(f) => {
                            self.invoke_compiled(&f, this_context, &arguments)?;
                        }
                        InitializerImpl::Native(_) => {
                            // A user class inheriting directly from a native
                            // primitive and calling its super-initializer
                            // would need the native side to initialize an
                            // already-allocated `self` in place, which
                            // `NativeInitializer`'s build-your-own-object
                            // contract does not support; the standard
                            // library's primitives are final roots, so this
                            // path is unreachable for any program the
                            // semantic analyzer accepts.
                            return Err(InterpreterError::IllegalInstruction(
                                "cannot call a native initializer as a super-initializer".to_string(),
                            ));
                        }
                    }
                }

                Instruction::CastClass(idx) => {
                    let value = self.pop();
                    let class_index = self.class_of(value);
                    let matches = self.is_subclass_of(class_index, *idx as usize);
                    self.push(if matches { value } else { Something::NOTHINGNESS });
                }
                Instruction::CastProtocol(protocol_index) => {
                    let value = self.pop();
                    let class_index = self.class_of(value);
                    let conforms = self.runtime.program.classes[class_index]
                        .protocol_table
                        .as_ref()
                        .is_some_and(|t| t.entries.iter().any(|e| e.protocol_index == *protocol_index));
                    self.push(if conforms { value } else { Something::NOTHINGNESS });
                }
                Instruction::CastPrimitive(kind) | Instruction::CastDynamic(kind) => {
                    let value = self.pop();
                    let matches = matches!(
                        (kind, value),
                        (crate::bytecode::PrimitiveKind::Integer, Something::Integer(_))
                            | (crate::bytecode::PrimitiveKind::Double, Something::Double(_))
                            | (crate::bytecode::PrimitiveKind::Boolean, Something::Boolean(_))
                            | (crate::bytecode::PrimitiveKind::Symbol, Something::Symbol(_))
                    );
                    self.push(if matches { value } else { Something::NOTHINGNESS });
                }
                Instruction::OptionalUnwrap => {
                    let value = self.pop();
                    if value.is_nothingness() {
                        return Err(InterpreterError::NothingnessUnwrapped);
                    }
                    self.push(value);
                }

                Instruction::BuildList(n) => {
                    let n = *n as usize;
                    let elements = self.eval.split_off(self.eval.len() - n);
                    let list_class = self.list_class_index();
                    let object = Object::new_raw_array(list_class, elements);
                    let r = self.allocate(object)?;
                    self.push(Something::Object(r));
                }
                Instruction::BuildDictionary(n) => {
                    let n = *n as usize;
                    let kvs = self.eval.split_off(self.eval.len() - 2 * n);
                    let buckets = crate::builtins::dictionary::build_from_pairs(self, &kvs);
                    let dict_class = self.dictionary_class_index();
                    let object = Object {
                        class_index: dict_class,
                        kind: ObjectKind::DictionaryBuckets(buckets),
                        forwarding: None,
                    };
                    let r = self.allocate(object)?;
                    self.push(Something::Object(r));
                }
                Instruction::BuildRange { with_step, inclusive } => {
                    let (start, stop, step) = if *with_step {
                        let step = self.pop().as_integer().expect("range step must be an integer");
                        let stop = self.pop().as_integer().expect("range stop must be an integer");
                        let start = self.pop().as_integer().expect("range start must be an integer");
                        (start, stop, step)
                    } else {
                        let stop = self.pop().as_integer().expect("range stop must be an integer");
                        let start = self.pop().as_integer().expect("range start must be an integer");
                        (start, stop, if start <= stop { 1 } else { -1 })
                    };
                    let stop = if *inclusive { stop + step.signum() } else { stop };
                    let range_class = self.range_class_index();
                    let object = Object {
                        class_index: range_class,
                        kind: ObjectKind::Range { start, stop, step },
                        forwarding: None,
                    };
                    let r = self.allocate(object)?;
                    self.push(Something::Object(r));
                }

                Instruction::Jump(target) => {
                    ip = *target;
                    self.checkpoint();
                    continue;
                }
                Instruction::JumpIfFalse(target) => {
                    let cond = self.pop().as_boolean().expect("JumpIfFalse on a non-boolean");
                    if !cond {
                        ip = *target;
                        continue;
                    }
                }

                Instruction::ForEachListNext { body_end } => {
                    let index = self.pop().as_integer().expect("for-each-list index must be an integer");
                    let source = *self.eval.last().expect("for-each-list source missing");
                    let r = source.as_object().expect("for-each-list source must be a List");
                    let len = self.with_object(r, |o| match &o.kind {
                        ObjectKind::RawArray(items) => items.len() as i64,
                        _ => panic!("for-each-list source is not a RawArray"),
                    });
                    if index >= len {
                        ip = *body_end;
                        continue;
                    }
                    let element = self.with_object(r, |o| match &o.kind {
                        ObjectKind::RawArray(items) => items[index as usize],
                        _ => unreachable!(),
                    });
                    self.push(element);
                    self.push(Something::Integer(index + 1));
                }
                Instruction::ForEachEnumerableNext { body_end } => {
                    let has_more = self.pop().as_boolean().expect("hasMore must return a boolean");
                    if !has_more {
                        ip = *body_end;
                        continue;
                    }
                }
                Instruction::ForEachRangeNext { body_end } => {
                    let index = self.pop().as_integer().expect("for-each-range index must be an integer");
                    let source = *self.eval.last().expect("for-each-range source missing");
                    let r = source.as_object().expect("for-each-range source must be a Range");
                    let (start, stop, step) = self.with_object(r, |o| match &o.kind {
                        ObjectKind::Range { start, stop, step } => (*start, *stop, *step),
                        _ => panic!("for-each-range source is not a Range"),
                    });
                    let current = start + index * step;
                    let in_bounds = if step >= 0 { current < stop } else { current > stop };
                    if !in_bounds {
                        ip = *body_end;
                        continue;
                    }
                    self.push(Something::Integer(current));
                    self.push(Something::Integer(index + 1));
                }

                Instruction::BuildClosure {
                    variable_count,
                    argument_count,
                    captures_self,
                    captured_slots,
                    body_end,
                } => {
                    let captured: Vec<Something> = captured_slots
                        .iter()
                        .map(|slot| self.stack.current_frame().slots[*slot as usize])
                        .collect();
                    let captured_self = if *captures_self {
                        self.stack.current_frame().this_context
                    } else {
                        Something::NOTHINGNESS
                    };
                    let body = std::sync::Arc::new(instructions[ip + 1..*body_end].to_vec());
                    let closure_class = self.closure_class_index();
                    let object = Object {
                        class_index: closure_class,
                        kind: ObjectKind::Closure {
                            variable_count: *variable_count,
                            argument_count: *argument_count,
                            captured_self,
                            body,
                            captured,
                        },
                        forwarding: None,
                    };
                    let r = self.allocate(object)?;
                    self.push(Something::Object(r));
                    ip = *body_end;
                    continue;
                }
                Instruction::BuildCapturedMethod { vti, protocol_index } => {
                    let receiver = self.pop();
                    let resolved_vti = if *protocol_index == u16::MAX {
                        *vti
                    } else {
                        let class_index = self.class_of(receiver);
                        self.runtime.program.classes[class_index]
                            .protocol_method_vti(*protocol_index, *vti as usize)
                            .ok_or_else(|| {
                                InterpreterError::IllegalInstruction(format!(
                                    "captured method: class {class_index} does not implement protocol {protocol_index} offset {vti}"
                                ))
                            })?
                    };
                    let captured_class = self.captured_function_call_class_index();
                    let object = Object {
                        class_index: captured_class,
                        kind: ObjectKind::CapturedFunctionCall {
                            receiver,
                            vti: resolved_vti,
                        },
                        forwarding: None,
                    };
                    let r = self.allocate(object)?;
                    self.push(Something::Object(r));
                }

                Instruction::Primitive(op) => self.run_primitive(*op)?,

                Instruction::GetStringFromPool(i) => {
                    let s = self.string_pool(*i);
                    let value = self.make_string(&s)?;
                    self.push(value);
                }
                Instruction::GetClassByIndex(idx) => self.push(Something::Class(*idx as usize)),

                Instruction::Pop => {
                    self.pop();
                }
                Instruction::Return => {
                    return Ok(self.eval.pop().unwrap_or(Something::NOTHINGNESS));
                }
            }
            ip += 1;
        }
    }

    fn is_subclass_of(&self, mut class_index: usize, ancestor: usize) -> bool {
        loop {
            if class_index == ancestor {
                return true;
            }
            let superclass_index = self.runtime.program.classes[class_index].superclass_index;
            if superclass_index == class_index {
                return false;
            }
            class_index = superclass_index;
        }
    }

    /// A type-method dispatch's native arity is not carried in the
    /// instruction (unlike instance dispatch's explicit operand) since
    /// the class is already statically known; [`LoadedClass::type_method_arities`]
    /// is populated straight from the bytecode file's own declared arity
    /// regardless of whether the slot ended up native or compiled.
    fn pending_type_method_arity(&self, class_index: usize, vti: u16) -> usize {
        self.runtime.program.classes[class_index].type_method_arities[vti as usize] as usize
    }

    fn pending_initializer_arity(&self, class_index: usize, vti: u16) -> usize {
        self.runtime.program.classes[class_index].initializer_arities[vti as usize] as usize
    }

    fn make_string(&mut self, s: &str) -> Result<Something, InterpreterError> {
        self.new_string(s)
    }

    /// Allocates a `String` object over `s`'s characters — the
    /// constructor natives reach for whenever a built-in method returns
    /// a freshly-built string (`substring`, `fromInteger`, ...).
    pub fn new_string(&mut self, s: &str) -> Result<Something, InterpreterError> {
        let chars: Vec<char> = s.chars().collect();
        let class_index = self.string_class_index();
        let object = Object {
            class_index,
            kind: ObjectKind::StringChars(chars),
            forwarding: None,
        };
        let r = self.allocate(object)?;
        Ok(Something::Object(r))
    }

    pub fn new_list(&mut self, elements: Vec<Something>) -> Result<Something, InterpreterError> {
        let class_index = self.list_class_index();
        let r = self.allocate(Object::new_raw_array(class_index, elements))?;
        Ok(Something::Object(r))
    }

    pub fn new_data(&mut self, bytes: Vec<u8>) -> Result<Something, InterpreterError> {
        let class_index = self.class_index_named(crate::prelude::DATA);
        let object = Object {
            class_index,
            kind: ObjectKind::Bytes(bytes),
            forwarding: None,
        };
        let r = self.allocate(object)?;
        Ok(Something::Object(r))
    }

    pub fn new_error(&mut self, message: Something, code: i64) -> Result<Something, InterpreterError> {
        let class_index = self.class_index_named(crate::prelude::ERROR);
        let object = Object {
            class_index,
            kind: ObjectKind::Error { message, code },
            forwarding: None,
        };
        let r = self.allocate(object)?;
        Ok(Something::Object(r))
    }

    /// Resolves the loaded class index for a standard-library primitive
    /// by its declared name, for builtins that allocate objects of a
    /// kind besides the one the instruction stream already created one
    /// of (e.g. `Error`'s native initializer, `String::fromInteger`).
    pub fn class_index_for(&self, name: char) -> usize {
        self.class_index_named(name)
    }

    pub fn stringify_value(&mut self, value: Something) -> Result<String, InterpreterError> {
        self.stringify(value)
    }

    fn stringify(&mut self, value: Something) -> Result<String, InterpreterError> {
        Ok(match value {
            Something::Integer(i) => i.to_string(),
            Something::Double(d) => d.to_string(),
            Something::Boolean(b) => b.to_string(),
            Something::Symbol(c) => c.to_string(),
            Something::Class(idx) => self.runtime.program.classes[idx].name.to_string(),
            Something::Object(_) if value.is_nothingness() => String::new(),
            Something::Object(r) => self.with_object(r, |o| match &o.kind {
                ObjectKind::StringChars(chars) => chars.iter().collect(),
                _ => String::new(),
            }),
        })
    }

    fn class_index_named(&self, name: char) -> usize {
        self.runtime
            .program
            .classes
            .iter()
            .position(|c| c.name == name)
            .unwrap_or_else(|| panic!("standard class {name} missing from loaded program"))
    }

    fn string_class_index(&self) -> usize {
        self.class_index_named(crate::prelude::STRING)
    }
    fn list_class_index(&self) -> usize {
        self.class_index_named(crate::prelude::LIST)
    }
    fn dictionary_class_index(&self) -> usize {
        self.class_index_named(crate::prelude::DICTIONARY)
    }
    fn range_class_index(&self) -> usize {
        self.class_index_named(crate::prelude::RANGE)
    }
    fn closure_class_index(&self) -> usize {
        self.runtime.program.closure_class_index
    }
    fn captured_function_call_class_index(&self) -> usize {
        self.runtime.program.captured_function_class_index
    }

    fn run_primitive(&mut self, op: crate::bytecode::PrimitiveOp) -> Result<(), InterpreterError> {
        use crate::bytecode::PrimitiveOp::*;
        match op {
            BoolNot => {
                let v = self.pop().as_boolean().expect("BoolNot on a non-boolean");
                self.push(Something::Boolean(!v));
            }
            _ => {
                let rhs = self.pop();
                let lhs = self.pop();
                let result = match op {
                    IntAdd => Something::Integer(lhs.as_integer().unwrap() + rhs.as_integer().unwrap()),
                    IntSub => Something::Integer(lhs.as_integer().unwrap() - rhs.as_integer().unwrap()),
                    IntMul => Something::Integer(lhs.as_integer().unwrap() * rhs.as_integer().unwrap()),
                    IntDiv => Something::Integer(lhs.as_integer().unwrap() / rhs.as_integer().unwrap()),
                    IntRem => Something::Integer(lhs.as_integer().unwrap() % rhs.as_integer().unwrap()),
                    IntEq => Something::Boolean(lhs.as_integer().unwrap() == rhs.as_integer().unwrap()),
                    IntLt => Something::Boolean(lhs.as_integer().unwrap() < rhs.as_integer().unwrap()),
                    IntLte => Something::Boolean(lhs.as_integer().unwrap() <= rhs.as_integer().unwrap()),
                    IntGt => Something::Boolean(lhs.as_integer().unwrap() > rhs.as_integer().unwrap()),
                    IntGte => Something::Boolean(lhs.as_integer().unwrap() >= rhs.as_integer().unwrap()),
                    IntShl => Something::Integer(lhs.as_integer().unwrap() << rhs.as_integer().unwrap()),
                    IntShr => Something::Integer(lhs.as_integer().unwrap() >> rhs.as_integer().unwrap()),
                    IntBitAnd => Something::Integer(lhs.as_integer().unwrap() & rhs.as_integer().unwrap()),
                    IntBitOr => Something::Integer(lhs.as_integer().unwrap() | rhs.as_integer().unwrap()),
                    IntBitXor => Something::Integer(lhs.as_integer().unwrap() ^ rhs.as_integer().unwrap()),
                    DoubleAdd => Something::Double(lhs.as_double().unwrap() + rhs.as_double().unwrap()),
                    DoubleSub => Something::Double(lhs.as_double().unwrap() - rhs.as_double().unwrap()),
                    DoubleMul => Something::Double(lhs.as_double().unwrap() * rhs.as_double().unwrap()),
                    DoubleDiv => Something::Double(lhs.as_double().unwrap() / rhs.as_double().unwrap()),
                    DoubleEq => Something::Boolean(lhs.as_double().unwrap() == rhs.as_double().unwrap()),
                    DoubleLt => Something::Boolean(lhs.as_double().unwrap() < rhs.as_double().unwrap()),
                    DoubleLte => Something::Boolean(lhs.as_double().unwrap() <= rhs.as_double().unwrap()),
                    DoubleGt => Something::Boolean(lhs.as_double().unwrap() > rhs.as_double().unwrap()),
                    DoubleGte => Something::Boolean(lhs.as_double().unwrap() >= rhs.as_double().unwrap()),
                    BoolAnd => Something::Boolean(lhs.as_boolean().unwrap() && rhs.as_boolean().unwrap()),
                    BoolOr => Something::Boolean(lhs.as_boolean().unwrap() || rhs.as_boolean().unwrap()),
                    SymbolEq => Something::Boolean(lhs.as_symbol().unwrap() == rhs.as_symbol().unwrap()),
                    BoolNot => unreachable!("handled above"),
                };
                self.push(result);
            }
        }
        Ok(())
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.runtime.safepoint.unregister_thread();
        self.runtime.threads.lock().unwrap().retain(|t| !Arc::ptr_eq(t, &self.published));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_int_add_pops_rhs_then_lhs() {
        // lhs pushed first (bottom), rhs second (top): 3 - 10 must read as
        // lhs=3, rhs=10, giving -7, not 7.
        let heap = Heap::new(1 << 20);
        let runtime = Runtime {
            program: LoadedProgram::empty(),
            registry: PackageRegistry::new(),
            heap: Mutex::new(heap),
            safepoint: SafepointCoordinator::new(),
            threads: Mutex::new(Vec::new()),
        };
        let runtime = Arc::new(runtime);
        let mut vm = Vm::new_thread(runtime);
        vm.push(Something::Integer(3));
        vm.push(Something::Integer(10));
        vm.run_primitive(crate::bytecode::PrimitiveOp::IntSub).unwrap();
        assert_eq!(vm.pop().as_integer(), Some(-7));
    }

    #[test]
    fn bool_not_pops_one_value() {
        let heap = Heap::new(1 << 20);
        let runtime = Arc::new(Runtime {
            program: LoadedProgram::empty(),
            registry: PackageRegistry::new(),
            heap: Mutex::new(heap),
            safepoint: SafepointCoordinator::new(),
            threads: Mutex::new(Vec::new()),
        });
        let mut vm = Vm::new_thread(runtime);
        vm.push(Something::Boolean(false));
        vm.run_primitive(crate::bytecode::PrimitiveOp::BoolNot).unwrap();
        assert_eq!(vm.pop().as_boolean(), Some(true));
    }
}
