//! §4.D: VTI (virtual-table index) assignment and protocol agreement.
//! Runs once over a fully-parsed `Program`, in declaration (topological)
//! order, before any bytecode is emitted — the compiler (§4.E) treats
//! every `Procedure::vti` and `Class::protocol_dispatch` as already
//! final by the time it runs.
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

use crate::ast::{Program, Protocol};
use crate::lexer::Position;
use crate::types::Type;

/// Conservative stand-in for `sizeof(Something)` in the runtime object
/// layout; the VM's object module (`vm::object`) imports this same
/// constant so instance-variable offsets computed here stay byte-exact
/// with the layout the GC actually walks.
pub const SOMETHING_SIZE: u32 = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum VtiError {
    /// An override targets a method/type-method the superclass marked final.
    OverrideFinal(Position, char),
    ReturnTypeMismatch(Position, char),
    WrongArgCount(Position, char),
    ArgTypeMismatch(Position, char),
    /// A `🏁` startup type-method never resolved to a declared member.
    UnresolvedStartupMethod(usize, char),
}

impl Display for VtiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VtiError::OverrideFinal(pos, name) => write!(
                f,
                "{}:{}: {name} overrides a member its superclass marked final",
                pos.line, pos.column
            ),
            VtiError::ReturnTypeMismatch(pos, name) => write!(
                f,
                "{}:{}: {name}'s return type is not compatible with the member it overrides",
                pos.line, pos.column
            ),
            VtiError::WrongArgCount(pos, name) => write!(
                f,
                "{}:{}: {name} overrides a member with a different argument count",
                pos.line, pos.column
            ),
            VtiError::ArgTypeMismatch(pos, name) => write!(
                f,
                "{}:{}: {name}'s argument types are not compatible with the member it overrides",
                pos.line, pos.column
            ),
            VtiError::UnresolvedStartupMethod(class_index, name) => write!(
                f,
                "startup type-method {name} on class #{class_index} was never declared"
            ),
        }
    }
}

impl std::error::Error for VtiError {}

pub type VtiResult<T> = Result<T, VtiError>;

#[derive(Default)]
struct Assigned {
    method_vti: HashMap<(usize, char), u16>,
    type_method_vti: HashMap<(usize, char), u16>,
    initializer_vti: HashMap<(usize, char), u16>,
    next_method: Vec<u16>,
    next_type_method: Vec<u16>,
    next_initializer: Vec<u16>,
}

/// Entry point: assigns every method/type-method/initializer VTI, builds
/// each class's protocol dispatch table, computes instance-variable byte
/// offsets, and resolves the pending `🏁` startup method, all in place.
pub fn assign(program: &mut Program) -> VtiResult<()> {
    let assigned = compute_vtis(program)?;
    apply_vtis(program, &assigned);
    compute_instance_variable_offsets(program);
    build_protocol_dispatch_tables(program)?;
    resolve_startup(program)?;
    Ok(())
}

fn compute_vtis(program: &Program) -> VtiResult<Assigned> {
    let n = program.classes.len();
    let mut assigned = Assigned {
        next_method: vec![0; n],
        next_type_method: vec![0; n],
        next_initializer: vec![0; n],
        ..Assigned::default()
    };

    for index in 0..n {
        let class = &program.classes[index];
        let superclass = class.superclass;

        let mut next_method = superclass.map(|s| assigned.next_method[s]).unwrap_or(0);
        let mut next_type_method = superclass.map(|s| assigned.next_type_method[s]).unwrap_or(0);
        let mut next_initializer = if class.inherits_initializers {
            superclass.map(|s| assigned.next_initializer[s]).unwrap_or(0)
        } else {
            0
        };

        // Own class's own type as far as generics are concerned, for
        // resolving the rare override whose signature mentions a generic
        // parameter; see the note on `promise_check` below.
        let parent = Type::class(index, vec![]);
        let chain: Vec<usize> = superclass.map(|s| program.superclass_chain(s)).unwrap_or_default();

        assign_table(
            program,
            &chain,
            &class.methods,
            &assigned.method_vti,
            index,
            &parent,
            &mut next_method,
            |assigned| &mut assigned.method_vti,
            &mut assigned,
            |c| &c.methods,
        )?;

        assign_table(
            program,
            &chain,
            &class.type_methods,
            &assigned.type_method_vti,
            index,
            &parent,
            &mut next_type_method,
            |assigned| &mut assigned.type_method_vti,
            &mut assigned,
            |c| &c.type_methods,
        )?;

        // Initializers never inherit a VTI: each is assigned fresh,
        // regardless of whether a same-named initializer exists above.
        let mut names: Vec<char> = class.initializers.keys().copied().collect();
        names.sort_unstable();
        for name in names {
            assigned.initializer_vti.insert((index, name), next_initializer);
            next_initializer += 1;
        }

        assigned.next_method[index] = next_method;
        assigned.next_type_method[index] = next_type_method;
        assigned.next_initializer[index] = next_initializer;
    }

    Ok(assigned)
}

/// Shared logic for the method and type-method tables: own members whose
/// name matches one in the superclass chain inherit that VTI (after
/// `promise_check`); everything else gets the next free counter value.
#[allow(clippy::too_many_arguments)]
fn assign_table(
    program: &Program,
    chain: &[usize],
    own: &HashMap<char, crate::ast::Procedure>,
    vti_so_far: &HashMap<(usize, char), u16>,
    index: usize,
    parent: &Type,
    next_vti: &mut u16,
    select: impl Fn(&mut Assigned) -> &mut HashMap<(usize, char), u16>,
    assigned: &mut Assigned,
    member_table: impl Fn(&crate::ast::Class) -> &HashMap<char, crate::ast::Procedure>,
) -> VtiResult<()> {
    let mut names: Vec<char> = own.keys().copied().collect();
    names.sort_unstable();

    for name in names {
        let sub_proc = &own[&name];
        let inherited = chain
            .iter()
            .find_map(|idx| member_table(&program.classes[*idx]).get(&name).map(|p| (*idx, p)));

        if let Some((sup_idx, sup_proc)) = inherited {
            let vti = *vti_so_far
                .get(&(sup_idx, name))
                .expect("ancestor classes are fully assigned before their descendants");
            promise_check(program, sub_proc, sup_proc, parent)?;
            select(assigned).insert((index, name), vti);
        } else {
            select(assigned).insert((index, name), *next_vti);
            *next_vti += 1;
        }
    }
    Ok(())
}

/// Per §4.D: the overridden member must not be final; return types must
/// be compatible covariantly, argument types contravariantly.
///
/// Generic-parameter references inside either signature are resolved
/// against an argument-less `Type::class(index, vec![])`, matching the
/// same simplification the declaration parser already makes for bare
/// initializer return types — exact generic-aware override checking
/// would additionally need to thread the subclass's `super_generic_arguments`
/// mapping through every overridden ancestor, which the spec does not
/// otherwise require.
fn promise_check(
    program: &Program,
    sub: &crate::ast::Procedure,
    sup: &crate::ast::Procedure,
    parent: &Type,
) -> VtiResult<()> {
    if !sup.signature_compatible_override() {
        return Err(VtiError::OverrideFinal(sub.position, sub.name));
    }
    if !program.types_compatible(&sub.return_type, &sup.return_type, parent) {
        return Err(VtiError::ReturnTypeMismatch(sub.position, sub.name));
    }
    if sub.params.len() != sup.params.len() {
        return Err(VtiError::WrongArgCount(sub.position, sub.name));
    }
    for (sub_param, sup_param) in sub.params.iter().zip(sup.params.iter()) {
        if !program.types_compatible(&sup_param.ty, &sub_param.ty, parent) {
            return Err(VtiError::ArgTypeMismatch(sub.position, sub.name));
        }
    }
    Ok(())
}

fn apply_vtis(program: &mut Program, assigned: &Assigned) {
    for (index, class) in program.classes.iter_mut().enumerate() {
        for (name, proc) in class.methods.iter_mut() {
            proc.vti = assigned.method_vti.get(&(index, *name)).copied();
        }
        for (name, proc) in class.type_methods.iter_mut() {
            proc.vti = assigned.type_method_vti.get(&(index, *name)).copied();
        }
        for (name, proc) in class.initializers.iter_mut() {
            proc.vti = assigned.initializer_vti.get(&(index, *name)).copied();
        }
        class.next_method_vti = assigned.next_method[index];
        class.next_type_method_vti = assigned.next_type_method[index];
        class.next_initializer_vti = assigned.next_initializer[index];
    }
}

fn compute_instance_variable_offsets(program: &mut Program) {
    for index in 0..program.classes.len() {
        let inherited = program.inherited_instance_variable_count(index) as u32;
        let class = &mut program.classes[index];
        class.instance_variable_offsets = (0..class.instance_variables.len() as u32)
            .map(|i| (inherited + i) * SOMETHING_SIZE)
            .collect();
    }
}

fn effective_method_vti(program: &Program, class_index: usize, name: char) -> Option<u16> {
    if let Some(proc) = program.classes[class_index].methods.get(&name) {
        return proc.vti;
    }
    for idx in program.superclass_chain(class_index).into_iter().skip(1) {
        if let Some(proc) = program.classes[idx].methods.get(&name) {
            return proc.vti;
        }
    }
    None
}

fn build_protocol_dispatch_tables(program: &mut Program) -> VtiResult<()> {
    for index in 0..program.classes.len() {
        let chain = program.superclass_chain(index);
        let mut conformed: BTreeSet<usize> = BTreeSet::new();
        for idx in &chain {
            conformed.extend(program.classes[*idx].protocols.iter().copied());
        }

        if conformed.is_empty() {
            program.classes[index].protocol_dispatch = Default::default();
            continue;
        }

        let min = *conformed.iter().next().unwrap();
        let max = *conformed.iter().next_back().unwrap();
        let mut table: Vec<Vec<u16>> = vec![Vec::new(); max - min + 1];

        for &p in &conformed {
            let protocol: &Protocol = &program.protocols[p];
            let row: Vec<u16> = protocol
                .methods
                .iter()
                .map(|m| effective_method_vti(program, index, m.name))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    // A class's own declared conformance is only valid once
                    // every protocol method resolves; the parser doesn't
                    // check this eagerly so it surfaces here instead.
                    VtiError::UnresolvedStartupMethod(index, protocol.name)
                })?;
            table[p - min] = row;
        }

        program.classes[index].protocol_dispatch = crate::ast::ProtocolDispatchTable {
            offset: min,
            table,
        };
    }
    Ok(())
}

fn resolve_startup(program: &mut Program) -> VtiResult<()> {
    let Some((class_index, name)) = program.startup_pending.take() else {
        return Ok(());
    };
    let vti = program.classes[class_index]
        .type_methods
        .get(&name)
        .and_then(|p| p.vti)
        .ok_or(VtiError::UnresolvedStartupMethod(class_index, name))?;
    program.startup_class = Some(class_index);
    program.startup_type_method_vti = Some(vti);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn parse(src: &str) -> Program {
        parse_source(src).unwrap().0
    }

    #[test]
    fn own_methods_get_sequential_vtis() {
        let mut program = parse("🐇🐶🍇🐖🏃🔢🍇🍎1🍉🐖🐕🔢🍇🍎2🍉🍉");
        assign(&mut program).unwrap();
        let class = &program.classes[0];
        let mut vtis: Vec<u16> = class.methods.values().map(|p| p.vti.unwrap()).collect();
        vtis.sort_unstable();
        assert_eq!(vtis, vec![0, 1]);
        assert_eq!(class.next_method_vti, 2);
    }

    #[test]
    fn override_inherits_superclass_vti() {
        let src = "🐇🐶🍇🐖🏃🔢🍇🍎1🍉🍉🐇🐕🦒🐶🍇🐿🐖🏃🔢🍇🍎2🍉🍉";
        let mut program = parse(src);
        assign(&mut program).unwrap();
        let base_vti = program.classes[0].methods[&'🏃'].vti.unwrap();
        let sub_vti = program.classes[1].methods[&'🏃'].vti.unwrap();
        assert_eq!(base_vti, sub_vti);
        // The override did not consume a fresh slot in the subclass table.
        assert_eq!(program.classes[1].next_method_vti, program.classes[0].next_method_vti);
    }

    #[test]
    fn overriding_final_method_is_rejected() {
        let src = "🐇🐶🍇🔏🐖🏃🔢🍇🍎1🍉🍉🐇🐕🦒🐶🍇🐿🐖🏃🔢🍇🍎2🍉🍉";
        let mut program = parse(src);
        let err = assign(&mut program).unwrap_err();
        assert!(matches!(err, VtiError::OverrideFinal(..)));
    }

    #[test]
    fn initializers_never_inherit_a_vti() {
        let src = "🐇🐶🍇🍦x🔢🆕🆕🔢🍇🍉🍉🐇🐕🦒🐶🍇🍦y🔢🆕🆕🔢🍇🍉🍉";
        let mut program = parse(src);
        assign(&mut program).unwrap();
        // Both declare an initializer named 🆕; they must not collide.
        let base = program.classes[0].initializers[&'🆕'].vti.unwrap();
        let sub = program.classes[1].initializers[&'🆕'].vti.unwrap();
        assert_eq!(base, 0);
        assert_eq!(sub, 0); // subclass restarts its own fresh counter at 0
    }

    #[test]
    fn protocol_conformance_builds_dispatch_row() {
        let src = "🐊🐾🍇🐖🏃🔢🍉🐇🐶🍇🐕🐾🐖🏃🔢🍇🍎1🍉🍉";
        let mut program = parse(src);
        assign(&mut program).unwrap();
        let class = &program.classes[0];
        let method_vti = class.methods[&'🏃'].vti.unwrap();
        assert_eq!(class.protocol_dispatch.lookup(0, 0), Some(method_vti));
    }

    #[test]
    fn instance_variable_offsets_account_for_inheritance() {
        let src = "🐇🐶🍇🍦x🔢🍉🐇🐕🦒🐶🍇🍦y🔢🍉";
        let mut program = parse(src);
        assign(&mut program).unwrap();
        assert_eq!(program.classes[0].instance_variable_offsets, vec![0]);
        assert_eq!(program.classes[1].instance_variable_offsets, vec![SOMETHING_SIZE]);
    }
}
