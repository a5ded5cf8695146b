//! Property 7 (§8): `compatible` is reflexive and respects the class
//! hierarchy it's handed, exercised against a fake three-deep chain the
//! same way `types::compatibility`'s own unit tests do internally.
use emojicodec::types::{compatible, CompatibilityContext, Type};

/// `2 -> 1 -> 0`, with 2 also conforming to protocol 0.
struct Chain;

impl CompatibilityContext for Chain {
    fn class_inherits(&self, sub: usize, sup: usize) -> bool {
        sub == sup || (sub == 2 && sup <= 2) || (sub == 1 && sup <= 1)
    }

    fn class_conforms(&self, class_index: usize, protocol_index: usize) -> bool {
        class_index == 2 && protocol_index == 0
    }

    fn resolve_generic(&self, _owner: &Type, _index: usize) -> Option<Type> {
        None
    }
}

#[test]
fn every_type_is_compatible_with_itself() {
    let ctx = Chain;
    let placeholder = Type::something();
    for ty in [
        Type::integer(),
        Type::double(),
        Type::boolean(),
        Type::symbol(),
        Type::class(0, vec![]),
        Type::class(1, vec![]),
        Type::class(2, vec![]),
    ] {
        assert!(compatible(&ty, &ty, &placeholder, &ctx));
    }
}

#[test]
fn compatibility_is_transitive_across_the_whole_chain() {
    let ctx = Chain;
    let placeholder = Type::something();
    let base = Type::class(0, vec![]);
    let middle = Type::class(1, vec![]);
    let leaf = Type::class(2, vec![]);

    assert!(compatible(&leaf, &middle, &placeholder, &ctx));
    assert!(compatible(&middle, &base, &placeholder, &ctx));
    assert!(compatible(&leaf, &base, &placeholder, &ctx));

    // The chain runs one way only.
    assert!(!compatible(&base, &leaf, &placeholder, &ctx));
    assert!(!compatible(&middle, &leaf, &placeholder, &ctx));
}

#[test]
fn optional_destination_accepts_its_non_optional_counterpart() {
    let ctx = Chain;
    let placeholder = Type::something();
    let optional_base = Type::class(0, vec![]).optional();
    assert!(compatible(&Type::class(2, vec![]), &optional_base, &placeholder, &ctx));
    assert!(compatible(&Type::nothingness(), &optional_base, &placeholder, &ctx));
    assert!(!compatible(&Type::nothingness(), &Type::class(0, vec![]), &placeholder, &ctx));
}

#[test]
fn something_is_the_universal_supertype() {
    let ctx = Chain;
    let placeholder = Type::something();
    for ty in [Type::integer(), Type::class(2, vec![]), Type::class(0, vec![])] {
        assert!(compatible(&ty, &Type::something(), &placeholder, &ctx));
    }
}
