use crate::types::{compatible, CompatibilityContext, Type, TypeKind};

use super::{Class, EnumDecl, Package, PackageVersion, Protocol};

/// The full program type graph built by the declaration parser (§4.C),
/// indexed by stable, topologically-ordered positions — classes always
/// appear after their superclass, per the Data Model invariant in §3.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub classes: Vec<Class>,
    pub protocols: Vec<Protocol>,
    pub enums: Vec<EnumDecl>,
    /// Packages this compiled unit depends on (`📻` imports) — written
    /// into the bytecode file's package manifest (§6) and resolved by the
    /// loader (§4.G) against the native package store.
    pub packages: Vec<Package>,
    /// This compiled unit's own `(major, minor)`, set by a `🎚` version
    /// declaration; purely descriptive metadata, not load-bearing at
    /// runtime.
    pub own_version: Option<PackageVersion>,
    /// Set by a top-level `📦` marker: this program itself requires a
    /// native binary component to run (distinct from depending on a
    /// native *package*).
    pub own_requires_native_binary: bool,
    /// Recorded by the parser when a `🏁`-flagged type-method is declared;
    /// resolved into `startup_class`/`startup_type_method_vti` once VTI
    /// assignment (§4.D) has run.
    pub startup_pending: Option<(usize, char)>,
    pub startup_class: Option<usize>,
    pub startup_type_method_vti: Option<u16>,
}

impl Program {
    pub fn class_index_by_name(&self, namespace: char, name: char) -> Option<usize> {
        self.classes
            .iter()
            .position(|c| c.namespace == namespace && c.name == name)
    }

    pub fn protocol_index_by_name(&self, namespace: char, name: char) -> Option<usize> {
        self.protocols
            .iter()
            .position(|p| p.namespace == namespace && p.name == name)
    }

    /// Walks from `index` up through superclasses, yielding each index in
    /// order (including `index` itself).
    pub fn superclass_chain(&self, mut index: usize) -> Vec<usize> {
        let mut chain = vec![index];
        while let Some(sup) = self.classes[index].superclass {
            if sup == index {
                break; // root class: self-referential per §6 bytecode layout
            }
            chain.push(sup);
            index = sup;
        }
        chain
    }

    pub fn inherited_instance_variable_count(&self, index: usize) -> usize {
        match self.classes[index].superclass {
            Some(sup) if sup != index => {
                self.inherited_instance_variable_count(sup) + self.classes[sup].instance_variables.len()
            }
            _ => 0,
        }
    }
}

impl CompatibilityContext for Program {
    fn class_inherits(&self, sub: usize, sup: usize) -> bool {
        self.superclass_chain(sub).contains(&sup)
    }

    fn class_conforms(&self, class_index: usize, protocol_index: usize) -> bool {
        self.superclass_chain(class_index)
            .iter()
            .any(|idx| self.classes[*idx].protocols.contains(&protocol_index))
    }

    fn resolve_generic(&self, owner: &Type, index: usize) -> Option<Type> {
        match &owner.kind {
            TypeKind::Class {
                index: class_index,
                generic_arguments,
            } => {
                if let Some(ty) = generic_arguments.get(index) {
                    return Some(ty.clone());
                }
                // Walk up through the superclass' generic-argument vector,
                // per §4.B's "possibly via the superclass chain".
                let class = &self.classes[*class_index];
                class.super_generic_arguments.get(index).cloned()
            }
            _ => None,
        }
    }
}

impl Program {
    pub fn types_compatible(&self, a: &Type, to: &Type, parent: &Type) -> bool {
        compatible(a, to, parent, self)
    }
}
