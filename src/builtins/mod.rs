//! §4.K: the native providers behind every `🔩`-marked member the
//! [`crate::prelude::SOURCE`] declarations stage. Resolution is by
//! (class name, member name, kind) rather than by vti — the same pair
//! [`crate::packages::PackageRegistry::resolve_method`] hands a
//! non-standard package's `methodFor` symbol, so the standard sentinel
//! package (§4.G) and a real dynamically-loaded one share one lookup
//! shape.
pub mod data;
pub mod dictionary;
pub mod error;
pub mod json;
pub mod list;
pub mod mutex;
pub mod range;
pub mod string;
pub mod thread;

use crate::ast::ProcedureKind;
use crate::packages::{NativeInitializer, NativeMethod};
use crate::prelude;

pub fn resolve_method(class_name: char, member_name: char, kind: ProcedureKind) -> Option<NativeMethod> {
    match (class_name, kind) {
        (prelude::STRING, ProcedureKind::Method) => string::resolve_method(member_name),
        (prelude::LIST, ProcedureKind::Method) => list::resolve_method(member_name),
        (prelude::DICTIONARY, ProcedureKind::Method) => dictionary::resolve_method(member_name),
        (prelude::DATA, ProcedureKind::Method) => data::resolve_method(member_name),
        (prelude::RANGE, ProcedureKind::Method) => range::resolve_method(member_name),
        (prelude::ERROR, ProcedureKind::Method) => error::resolve_method(member_name),
        (prelude::THREAD, ProcedureKind::Method) => thread::resolve_method(member_name),
        (prelude::MUTEX, ProcedureKind::Method) => mutex::resolve_method(member_name),
        (prelude::STRING, ProcedureKind::TypeMethod) => string::resolve_type_method(member_name),
        (prelude::THREAD, ProcedureKind::TypeMethod) => thread::resolve_type_method(member_name),
        (prelude::JSON, ProcedureKind::TypeMethod) => json::resolve_type_method(member_name),
        _ => None,
    }
}

pub fn resolve_initializer(class_name: char, member_name: char) -> Option<NativeInitializer> {
    match class_name {
        prelude::ERROR => error::resolve_initializer(member_name),
        prelude::MUTEX => mutex::resolve_initializer(member_name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_native_member_the_prelude_declares() {
        assert!(resolve_method(prelude::STRING, prelude::COUNT, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::LIST, prelude::APPEND, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::DICTIONARY, prelude::GET, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::DATA, prelude::GET_BYTE, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::RANGE, prelude::COUNT, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::THREAD, prelude::JOIN, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::MUTEX, prelude::LOCK, ProcedureKind::Method).is_some());
        assert!(resolve_method(prelude::STRING, prelude::FROM_INTEGER, ProcedureKind::TypeMethod).is_some());
        assert!(resolve_method(prelude::THREAD, prelude::SPAWN, ProcedureKind::TypeMethod).is_some());
        assert!(resolve_method(prelude::JSON, prelude::JSON_PARSE, ProcedureKind::TypeMethod).is_some());
        assert!(resolve_initializer(prelude::ERROR, prelude::ERROR_INIT).is_some());
        assert!(resolve_initializer(prelude::MUTEX, prelude::MUTEX_INIT).is_some());
        assert!(resolve_method('🙈', 'x', ProcedureKind::Method).is_none());
    }
}
