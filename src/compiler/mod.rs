//! §4.E: the expression/statement bytecode compiler, run after §4.D's VTI
//! assignment has finalized every `Procedure::vti` and `Class`'s protocol
//! dispatch table.
mod emitter;
mod error;
mod expression;
mod scope;
mod statement;

pub use emitter::{Emitter, StringPool};
pub use error::{CompileError, CompileResult};
pub use scope::{Binding, IvarInit, ScopeStack};

use std::collections::HashMap;

use crate::ast::{Class, Procedure, ProcedureKind, Program};
use crate::bytecode::{
    BytecodeFile, ClassProtocolTable, CompiledClass, CompiledFunction, PackageSection,
    ProtocolTableEntry,
};
use crate::types::Type;

/// Per-function compilation state threaded through `expression.rs` and
/// `statement.rs`: the scope stack, the in-progress instruction stream,
/// and (inside initializers only) the definite-initialization tracker.
pub struct FnCtx<'p> {
    pub program: &'p Program,
    pub class_index: usize,
    pub is_initializer: bool,
    pub return_type: Type,
    pub can_return_nothingness: bool,
    pub scopes: ScopeStack,
    pub ivar_init: Option<IvarInit>,
    pub emitter: Emitter,
    pub returned: bool,
    pub super_init_called: bool,
    pub flow_depth: u32,
}

impl<'p> FnCtx<'p> {
    fn new(program: &'p Program, class_index: usize, proc: &Procedure) -> Self {
        let is_initializer = proc.kind == ProcedureKind::Initializer;
        Self {
            program,
            class_index,
            is_initializer,
            return_type: proc.return_type.clone(),
            can_return_nothingness: proc.flags.can_return_nothingness,
            scopes: ScopeStack::new(),
            ivar_init: is_initializer.then(IvarInit::new),
            emitter: Emitter::new(),
            returned: false,
            super_init_called: false,
            flow_depth: 0,
        }
    }

    pub fn class(&self) -> &'p Class {
        &self.program.classes[self.class_index]
    }

    pub fn self_type(&self) -> Type {
        Type::class(self.class_index, vec![])
    }
}

/// Walks the superclass chain starting at `class_index` for a member of
/// `name` selected by `table`; returns it together with the class index
/// that actually declares it.
pub(crate) fn resolve_member<'p>(
    program: &'p Program,
    class_index: usize,
    name: char,
    table: impl Fn(&'p Class) -> &'p HashMap<char, Procedure>,
) -> Option<(&'p Procedure, usize)> {
    for idx in program.superclass_chain(class_index) {
        if let Some(proc) = table(&program.classes[idx]).get(&name) {
            return Some((proc, idx));
        }
    }
    None
}

/// Per §4.E: a method marked `🐿` (override) must actually shadow an
/// inherited member of the same name, and one that does must carry the
/// marker — VTI assignment only checks signature compatibility, not the
/// marker's presence, so this runs as its own pass over every class.
fn check_override_markers(program: &Program) -> CompileResult<()> {
    for (index, class) in program.classes.iter().enumerate() {
        let Some(superclass) = class.superclass else {
            continue;
        };
        for (name, proc) in class.methods.iter().chain(class.type_methods.iter()) {
            let inherited = program
                .superclass_chain(superclass)
                .iter()
                .any(|idx| class_member_table_contains(&program.classes[*idx], *name, proc.kind));
            match (proc.flags.is_override, inherited) {
                (true, false) => return Err(CompileError::OverrideWithoutMarker(proc.position, *name)),
                (false, true) => return Err(CompileError::MarkerWithoutOverride(proc.position, *name)),
                _ => {}
            }
        }
    }
    Ok(())
}

fn class_member_table_contains(class: &Class, name: char, kind: ProcedureKind) -> bool {
    match kind {
        ProcedureKind::Method => class.methods.contains_key(&name),
        ProcedureKind::TypeMethod => class.type_methods.contains_key(&name),
        ProcedureKind::Initializer => class.initializers.contains_key(&name),
    }
}

pub fn compile(program: &Program) -> CompileResult<BytecodeFile> {
    check_override_markers(program)?;

    let mut pool = StringPool::new();
    let mut classes = Vec::with_capacity(program.classes.len());
    for index in 0..program.classes.len() {
        classes.push(compile_class(program, index, &mut pool)?);
    }

    let mut packages: Vec<PackageSection> = program
        .packages
        .iter()
        .map(|p| PackageSection {
            standard: p.is_standard(),
            name: p.name.clone(),
            major: p.version.major,
            minor: p.version.minor,
            requires_native_binary: p.requires_native_binary,
        })
        .collect();
    if let Some(version) = &program.own_version {
        packages.push(PackageSection {
            standard: true,
            name: String::new(),
            major: version.major,
            minor: version.minor,
            requires_native_binary: program.own_requires_native_binary,
        });
    }

    Ok(BytecodeFile {
        version: crate::bytecode::FORMAT_VERSION,
        packages,
        classes,
        string_pool: pool.into_vec(),
        startup_class_index: program.startup_class.unwrap_or(0) as u16,
        startup_type_method_vti: program.startup_type_method_vti.unwrap_or(0),
    })
}

fn compile_class(program: &Program, index: usize, pool: &mut StringPool) -> CompileResult<CompiledClass> {
    let class = &program.classes[index];

    let mut names: Vec<char> = class.methods.keys().copied().collect();
    names.sort_unstable();
    let methods = names
        .into_iter()
        .map(|n| compile_function(program, index, &class.methods[&n], pool))
        .collect::<CompileResult<Vec<_>>>()?;

    let mut names: Vec<char> = class.initializers.keys().copied().collect();
    names.sort_unstable();
    let initializers = names
        .into_iter()
        .map(|n| compile_function(program, index, &class.initializers[&n], pool))
        .collect::<CompileResult<Vec<_>>>()?;

    let mut names: Vec<char> = class.type_methods.keys().copied().collect();
    names.sort_unstable();
    let type_methods = names
        .into_iter()
        .map(|n| compile_function(program, index, &class.type_methods[&n], pool))
        .collect::<CompileResult<Vec<_>>>()?;

    let protocol_table = if class.protocol_dispatch.table.is_empty() {
        None
    } else {
        let offset = class.protocol_dispatch.offset as u16;
        let entries = class
            .protocol_dispatch
            .table
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_empty())
            .map(|(i, row)| ProtocolTableEntry {
                protocol_index: offset + i as u16,
                method_vtis: row.clone(),
            })
            .collect::<Vec<_>>();
        let max_index = offset + class.protocol_dispatch.table.len() as u16 - 1;
        Some(ClassProtocolTable {
            min_index: offset,
            max_index,
            entries,
        })
    };

    let superclass_index = class.superclass.unwrap_or(index) as u16;
    let instance_variable_count =
        (program.inherited_instance_variable_count(index) + class.instance_variables.len()) as u16;

    // A deinitializer is never dispatched by VTI (the GC invokes it
    // directly by class), so it carries no real slot in any vtable; `0`
    // is just a placeholder satisfying `compile_function`'s expectation
    // that every procedure has been through VTI assignment.
    let deinitializer = class
        .deinitializer
        .as_ref()
        .map(|proc| {
            let mut proc = proc.clone();
            proc.vti.get_or_insert(0);
            compile_function(program, index, &proc, pool)
        })
        .transpose()?;

    Ok(CompiledClass {
        name: class.name as u32,
        superclass_index,
        instance_variable_count,
        method_vtable_size: class.next_method_vti,
        type_method_vtable_size: class.next_type_method_vti,
        inherits_initializers: class.inherits_initializers,
        initializer_vtable_size: class.next_initializer_vti,
        methods,
        initializers,
        type_methods,
        protocol_table,
        deinitializer,
    })
}

fn compile_function(
    program: &Program,
    class_index: usize,
    proc: &Procedure,
    pool: &mut StringPool,
) -> CompileResult<CompiledFunction> {
    let vti = proc.vti.expect("VTI assignment runs before compilation");

    if proc.flags.is_native {
        return Ok(CompiledFunction {
            name: proc.name as u32,
            vti,
            argument_count: proc.params.len() as u8,
            native: true,
            variable_count: None,
            instructions: Vec::new(),
        });
    }

    let mut ctx = FnCtx::new(program, class_index, proc);
    for param in &proc.params {
        ctx.scopes.declare(param.name.clone(), param.ty.clone(), false);
    }

    let body = proc
        .body
        .as_ref()
        .expect("non-native procedures always carry a body");
    statement::compile_block(body, &mut ctx, pool)?;

    if ctx.is_initializer {
        for ivar in &ctx.class().instance_variables {
            if !ivar.ty.optional && !ctx.ivar_init.as_ref().unwrap().is_initialized(&ivar.name) {
                return Err(CompileError::UseBeforeInit(proc.position, ivar.name.clone()));
            }
        }
    } else if !matches!(ctx.return_type.kind, crate::types::TypeKind::Nothingness)
        && !ctx.return_type.optional
        && !ctx.returned
    {
        return Err(CompileError::MissingExplicitReturn(proc.position));
    }

    ctx.emitter.push(crate::bytecode::Instruction::Return);

    Ok(CompiledFunction {
        name: proc.name as u32,
        vti,
        argument_count: proc.params.len() as u8,
        native: false,
        variable_count: Some(ctx.scopes.variable_count() as u8),
        instructions: ctx.emitter.into_instructions(),
    })
}
