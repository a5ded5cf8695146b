//! §4.H/§4.I/§4.J: wires the heap, the per-thread frame stack and the
//! instruction interpreter into a runnable program. [`LoadedProgram`] is
//! the interpreter's view of a [`crate::bytecode::BytecodeFile`]: every
//! class' method/type-method/initializer vtables flattened across the
//! superclass chain once, up front, so dispatch is a single vector index
//! rather than a walk up the inheritance chain on every call (§9 "linked
//! type graphs via stable indices").
pub mod gc;
pub mod interpreter;
pub mod object;
pub mod something;
pub mod stack;

pub use gc::SafepointCoordinator;
pub use interpreter::{InterpreterError, Runtime, Vm};
pub use object::{Heap, Object, ObjectKind, Space};
pub use something::{ObjectRef, Something};
pub use stack::{Frame, Stack, StackError, StackState};

use std::sync::Arc;

use crate::bytecode::{BytecodeFile, ClassProtocolTable, CompiledFunction};
use crate::packages::{InitializerImpl, MethodImpl, PackageRegistry};

/// A class flattened for dispatch, combining the bytecode-compiled
/// vtables with whatever native implementations [`PackageRegistry`]
/// resolved for this class' `🔩`-marked members.
pub struct LoadedClass {
    pub name: char,
    pub superclass_index: usize,
    pub total_instance_variables: usize,
    pub methods: Vec<Option<MethodImpl>>,
    pub type_methods: Vec<Option<MethodImpl>>,
    pub initializers: Vec<Option<InitializerImpl>>,
    /// `argument_count` alongside `type_methods`, by vti. A compiled
    /// type-method's own `CompiledFunction` already carries this, but a
    /// native one doesn't — and `DispatchTypeMethod`, unlike `Dispatch`,
    /// carries no argument_count operand of its own (the class is already
    /// statically known, so the compiler never needed to redundantly
    /// stage it). Populated straight from the bytecode file's
    /// `CompiledFunction::argument_count`, which is present regardless of
    /// the `native` flag (§6).
    pub type_method_arities: Vec<u8>,
    pub initializer_arities: Vec<u8>,
    pub protocol_table: Option<ClassProtocolTable>,
    pub deinitializer: Option<Arc<CompiledFunction>>,
}

impl LoadedClass {
    pub fn protocol_method_vti(&self, protocol_index: u16, method_offset: usize) -> Option<u16> {
        let table = self.protocol_table.as_ref()?;
        let entry = table.entries.iter().find(|e| e.protocol_index == protocol_index)?;
        entry.method_vtis.get(method_offset).copied()
    }
}

fn flatten_methods(
    parent: Option<&Vec<Option<MethodImpl>>>,
    size: usize,
    own: &[CompiledFunction],
    class_name: char,
    registry: &PackageRegistry,
    kind: crate::ast::ProcedureKind,
) -> Result<Vec<Option<MethodImpl>>, LoadError> {
    let mut table: Vec<Option<MethodImpl>> = match parent {
        Some(p) => {
            let mut v: Vec<Option<MethodImpl>> = p.iter().map(|slot| slot.as_ref().map(MethodImpl::share)).collect();
            v.resize_with(size, || None);
            v
        }
        None => (0..size).map(|_| None).collect(),
    };
    for f in own {
        let vti = f.vti as usize;
        let implementation = if f.native {
            let member = char::from_u32(f.name).unwrap_or('\u{FFFD}');
            let native = registry
                .resolve_method(class_name, member, kind)
                .ok_or(LoadError::UnresolvedNative(class_name, member))?;
            MethodImpl::Native(native)
        } else {
            MethodImpl::Compiled(Arc::new(f.clone()))
        };
        if vti < table.len() {
            table[vti] = Some(implementation);
        }
    }
    Ok(table)
}

fn flatten_arities(parent: Option<&Vec<u8>>, size: usize, own: &[CompiledFunction]) -> Vec<u8> {
    let mut table: Vec<u8> = match parent {
        Some(p) => {
            let mut v = p.clone();
            v.resize(size, 0);
            v
        }
        None => vec![0; size],
    };
    for f in own {
        let vti = f.vti as usize;
        if vti < table.len() {
            table[vti] = f.argument_count;
        }
    }
    table
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    UnresolvedNative(char, char),
    UnresolvedInitializer(char, char),
    Package(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::UnresolvedNative(class, member) => {
                write!(f, "no native provider for {class}{member}")
            }
            LoadError::UnresolvedInitializer(class, member) => {
                write!(f, "no native initializer provider for {class}{member}")
            }
            LoadError::Package(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// The program loaded from a [`BytecodeFile`], ready for execution.
pub struct LoadedProgram {
    pub classes: Vec<LoadedClass>,
    pub string_pool: Vec<String>,
    pub startup_class_index: usize,
    pub startup_type_method_vti: u16,
    /// Synthetic class slots for the two host-internal object kinds that
    /// have no declaration of their own anywhere in `.emojic` source —
    /// [`ObjectKind::Closure`][crate::vm::ObjectKind::Closure] and
    /// [`ObjectKind::CapturedFunctionCall`][crate::vm::ObjectKind::CapturedFunctionCall].
    /// Appended after every compiled class so dispatch's usual
    /// `class_index` bookkeeping (GC copying, `is_subclass_of`) applies
    /// to them uniformly, even though neither ever receives a `Dispatch`.
    pub closure_class_index: usize,
    pub captured_function_class_index: usize,
}

impl LoadedProgram {
    pub fn load(file: &BytecodeFile, registry: &PackageRegistry) -> Result<Self, LoadError> {
        use crate::ast::ProcedureKind;

        let mut classes: Vec<LoadedClass> = Vec::with_capacity(file.classes.len());
        for (index, c) in file.classes.iter().enumerate() {
            let superclass_index = c.superclass_index as usize;
            let is_root = superclass_index == index;
            let name = char::from_u32(c.name).unwrap_or('\u{FFFD}');

            let methods = flatten_methods(
                (!is_root).then(|| &classes[superclass_index].methods),
                c.method_vtable_size as usize,
                &c.methods,
                name,
                registry,
                ProcedureKind::Method,
            )?;
            let type_methods = flatten_methods(
                (!is_root).then(|| &classes[superclass_index].type_methods),
                c.type_method_vtable_size as usize,
                &c.type_methods,
                name,
                registry,
                ProcedureKind::TypeMethod,
            )?;
            let type_method_arities = flatten_arities(
                (!is_root).then(|| &classes[superclass_index].type_method_arities),
                c.type_method_vtable_size as usize,
                &c.type_methods,
            );

            let initializers = if !c.initializers.is_empty() {
                let mut table: Vec<Option<InitializerImpl>> =
                    (0..c.initializer_vtable_size as usize).map(|_| None).collect();
                for f in &c.initializers {
                    let implementation = if f.native {
                        let member = char::from_u32(f.name).unwrap_or('\u{FFFD}');
                        let native = registry
                            .resolve_initializer(name, member)
                            .ok_or(LoadError::UnresolvedInitializer(name, member))?;
                        InitializerImpl::Native(native)
                    } else {
                        InitializerImpl::Compiled(Arc::new(f.clone()))
                    };
                    let vti = f.vti as usize;
                    if vti < table.len() {
                        table[vti] = Some(implementation);
                    }
                }
                table
            } else if !is_root {
                let mut v: Vec<Option<InitializerImpl>> = classes[superclass_index]
                    .initializers
                    .iter()
                    .map(|slot| slot.as_ref().map(InitializerImpl::share))
                    .collect();
                v.resize_with(c.initializer_vtable_size as usize, || None);
                v
            } else {
                (0..c.initializer_vtable_size as usize).map(|_| None).collect()
            };
            let initializer_arities = if !c.initializers.is_empty() {
                flatten_arities(None, c.initializer_vtable_size as usize, &c.initializers)
            } else if !is_root {
                let mut v = classes[superclass_index].initializer_arities.clone();
                v.resize(c.initializer_vtable_size as usize, 0);
                v
            } else {
                vec![0; c.initializer_vtable_size as usize]
            };

            classes.push(LoadedClass {
                name,
                superclass_index,
                total_instance_variables: c.instance_variable_count as usize,
                methods,
                type_methods,
                initializers,
                type_method_arities,
                initializer_arities,
                protocol_table: c.protocol_table.clone(),
                deinitializer: c.deinitializer.as_ref().map(|f| Arc::new(f.clone())),
            });
        }

        let closure_class_index = classes.len();
        classes.push(LoadedClass {
            name: '\u{F0000}',
            superclass_index: closure_class_index,
            total_instance_variables: 0,
            methods: Vec::new(),
            type_methods: Vec::new(),
            initializers: Vec::new(),
            type_method_arities: Vec::new(),
            initializer_arities: Vec::new(),
            protocol_table: None,
            deinitializer: None,
        });
        let captured_function_class_index = classes.len();
        classes.push(LoadedClass {
            name: '\u{F0001}',
            superclass_index: captured_function_class_index,
            total_instance_variables: 0,
            methods: Vec::new(),
            type_methods: Vec::new(),
            initializers: Vec::new(),
            type_method_arities: Vec::new(),
            initializer_arities: Vec::new(),
            protocol_table: None,
            deinitializer: None,
        });

        Ok(Self {
            classes,
            string_pool: file.string_pool.clone(),
            startup_class_index: file.startup_class_index as usize,
            startup_type_method_vti: file.startup_type_method_vti,
            closure_class_index,
            captured_function_class_index,
        })
    }

    /// An empty program with only the two synthetic classes, for
    /// interpreter unit tests that don't need a real compiled program.
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            classes: vec![
                LoadedClass {
                    name: '\u{F0000}',
                    superclass_index: 0,
                    total_instance_variables: 0,
                    methods: Vec::new(),
                    type_methods: Vec::new(),
                    initializers: Vec::new(),
                    type_method_arities: Vec::new(),
                    initializer_arities: Vec::new(),
                    protocol_table: None,
                    deinitializer: None,
                },
                LoadedClass {
                    name: '\u{F0001}',
                    superclass_index: 1,
                    total_instance_variables: 0,
                    methods: Vec::new(),
                    type_methods: Vec::new(),
                    initializers: Vec::new(),
                    type_method_arities: Vec::new(),
                    initializer_arities: Vec::new(),
                    protocol_table: None,
                    deinitializer: None,
                },
            ],
            string_pool: Vec::new(),
            startup_class_index: 0,
            startup_type_method_vti: 0,
            closure_class_index: 0,
            captured_function_class_index: 1,
        }
    }

    /// Walks up from `class_index` to find the nearest ancestor (including
    /// itself) that declares a deinitializer; finalizers are not VTI-slotted
    /// so this mirrors method dispatch's inheritance walk by hand.
    pub fn find_deinitializer(&self, mut class_index: usize) -> Option<Arc<CompiledFunction>> {
        loop {
            let class = &self.classes[class_index];
            if let Some(d) = &class.deinitializer {
                return Some(Arc::clone(d));
            }
            if class.superclass_index == class_index {
                return None;
            }
            class_index = class.superclass_index;
        }
    }
}
