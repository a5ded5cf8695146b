use super::{Type, TypeKind};

/// Everything the compatibility relation needs to know about the program's
/// type graph. Implemented by `ast::Program` (kept decoupled here so the
/// type model does not depend on the declaration-parser crate module).
pub trait CompatibilityContext {
    /// Whether class `sub` inherits from (or is) class `sup`.
    fn class_inherits(&self, sub: usize, sup: usize) -> bool;
    /// Whether class `class_index` conforms to protocol `protocol_index`.
    fn class_conforms(&self, class_index: usize, protocol_index: usize) -> bool;
    /// Whether `a` and `b` name the same protocol (always true when equal
    /// here, kept as a hook for future protocol aliasing).
    fn same_protocol(&self, a: usize, b: usize) -> bool {
        a == b
    }
    fn same_enum(&self, a: usize, b: usize) -> bool {
        a == b
    }
    /// Resolves a `GenericReference(index)` appearing in the context of
    /// `owner` (a class-kind type) to a concrete `Type`, walking the
    /// superclass chain if `index` refers to an inherited generic slot.
    fn resolve_generic(&self, owner: &Type, index: usize) -> Option<Type>;
}

/// `compatible(a -> to, parent)` exactly per §4.B. `parent` supplies the
/// generic-argument vector used to resolve `GenericReference` types
/// encountered in either operand.
pub fn compatible(a: &Type, to: &Type, parent: &Type, ctx: &dyn CompatibilityContext) -> bool {
    // An optional `to` accepts any non-optional-incompatible `a` of
    // otherwise-compatible kind; nothingness is handled by its own rule
    // below so this only short-circuits the "carrier" flag.
    if let TypeKind::GenericReference(index) = a.kind {
        if let Some(resolved) = ctx.resolve_generic(parent, index) {
            let resolved = carry_optional(resolved, a.optional);
            return compatible(&resolved, to, parent, ctx);
        }
        return false;
    }
    if let TypeKind::GenericReference(index) = to.kind {
        if let Some(resolved) = ctx.resolve_generic(parent, index) {
            let resolved = carry_optional(resolved, to.optional);
            return compatible(a, &resolved, parent, ctx);
        }
        return false;
    }

    if matches!(to.kind, TypeKind::Something) {
        return true;
    }

    if matches!(a.kind, TypeKind::Nothingness) {
        return to.optional || matches!(to.kind, TypeKind::Nothingness);
    }

    if a.optional && !to.optional && !matches!(to.kind, TypeKind::Something) {
        // A non-optional destination never accepts an optional source,
        // regardless of the underlying kind match below.
        return false;
    }

    if matches!(to.kind, TypeKind::SomeObject) {
        return matches!(
            a.kind,
            TypeKind::Class { .. } | TypeKind::Protocol(_) | TypeKind::SomeObject
        );
    }

    match (&a.kind, &to.kind) {
        (
            TypeKind::Class {
                index: a_index,
                generic_arguments: a_args,
            },
            TypeKind::Class {
                index: to_index,
                generic_arguments: to_args,
            },
        ) => {
            ctx.class_inherits(*a_index, *to_index)
                && a_args.len() == to_args.len()
                && a_args
                    .iter()
                    .zip(to_args.iter())
                    .all(|(a_arg, to_arg)| {
                        compatible(a_arg, to_arg, a, ctx) && compatible(to_arg, a_arg, to, ctx)
                    })
        }
        (TypeKind::Class { index, .. }, TypeKind::Protocol(protocol_index)) => {
            ctx.class_conforms(*index, *protocol_index)
        }
        (TypeKind::Protocol(a_index), TypeKind::Protocol(to_index)) => {
            ctx.same_protocol(*a_index, *to_index)
        }
        (TypeKind::Enum(a_index), TypeKind::Enum(to_index)) => ctx.same_enum(*a_index, *to_index),
        (
            TypeKind::Callable {
                arguments: a_args,
                return_type: a_ret,
            },
            TypeKind::Callable {
                arguments: to_args,
                return_type: to_ret,
            },
        ) => {
            a_args.len() == to_args.len()
                && compatible(a_ret, to_ret, parent, ctx)
                // contravariant: callers of `a` must be satisfiable by `to`'s
                // arguments, so we check `to`'s argument compatible into `a`'s.
                && a_args
                    .iter()
                    .zip(to_args.iter())
                    .all(|(a_arg, to_arg)| compatible(to_arg, a_arg, parent, ctx))
        }
        _ => a.same_kind(to),
    }
}

fn carry_optional(mut ty: Type, optional: bool) -> Type {
    ty.optional = ty.optional || optional;
    ty
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat;

    impl CompatibilityContext for Flat {
        fn class_inherits(&self, sub: usize, sup: usize) -> bool {
            sub == sup
        }
        fn class_conforms(&self, _class_index: usize, _protocol_index: usize) -> bool {
            false
        }
        fn resolve_generic(&self, _owner: &Type, _index: usize) -> Option<Type> {
            None
        }
    }

    #[test]
    fn reflexive_for_primitives() {
        let ctx = Flat;
        let placeholder = Type::something();
        for ty in [Type::integer(), Type::double(), Type::boolean(), Type::symbol()] {
            assert!(compatible(&ty, &ty, &placeholder, &ctx));
        }
    }

    #[test]
    fn something_accepts_everything() {
        let ctx = Flat;
        let placeholder = Type::something();
        assert!(compatible(&Type::integer(), &Type::something(), &placeholder, &ctx));
        assert!(compatible(&Type::class(0, vec![]), &Type::something(), &placeholder, &ctx));
    }

    #[test]
    fn nothingness_requires_optional_destination() {
        let ctx = Flat;
        let placeholder = Type::something();
        assert!(compatible(&Type::nothingness(), &Type::integer().optional(), &placeholder, &ctx));
        assert!(!compatible(&Type::nothingness(), &Type::integer(), &placeholder, &ctx));
    }

    #[test]
    fn callable_is_contravariant_in_arguments() {
        let ctx = Flat;
        let placeholder = Type::something();

        // (SomeObject) -> Integer  compatible-to  (Integer) -> Integer ?
        // requires Integer -> SomeObject (true) and return Integer -> Integer (true)
        let wide = Type::new(TypeKind::Callable {
            arguments: vec![Type::someobject()],
            return_type: Box::new(Type::integer()),
        });
        let narrow = Type::new(TypeKind::Callable {
            arguments: vec![Type::class(0, vec![])],
            return_type: Box::new(Type::integer()),
        });
        assert!(compatible(&wide, &narrow, &placeholder, &ctx));
    }

    #[test]
    fn transitivity_holds_for_class_chain() {
        struct Chain;
        impl CompatibilityContext for Chain {
            fn class_inherits(&self, sub: usize, sup: usize) -> bool {
                // 2 -> 1 -> 0
                sub == sup || (sub == 2 && sup <= 2) || (sub == 1 && sup <= 1) || sub == sup
            }
            fn class_conforms(&self, _c: usize, _p: usize) -> bool {
                false
            }
            fn resolve_generic(&self, _owner: &Type, _index: usize) -> Option<Type> {
                None
            }
        }
        let ctx = Chain;
        let placeholder = Type::something();
        let a = Type::class(2, vec![]);
        let mid = Type::class(1, vec![]);
        let top = Type::class(0, vec![]);
        assert!(compatible(&a, &mid, &placeholder, &ctx));
        assert!(compatible(&mid, &top, &placeholder, &ctx));
        assert!(compatible(&a, &top, &placeholder, &ctx));
    }
}
