//! §4.K: the built-in primitive classes (String, List, Dictionary, Data,
//! Range, Error, Thread, Mutex, JSON) and the `Iterable` protocol used by
//! generic `for`-loops, expressed the same way any other Emojicode class
//! or protocol is — ordinary declarations, parsed by §4.C. Their method
//! bodies are `native` (no bytecode): the VM resolves them against
//! [`crate::builtins`] by (class name, member name) once the program's
//! string pool is available (§4.G's "host's built-in providers" sentinel
//! package).
//!
//! [`SOURCE`] is prepended to every compiled unit's own source before
//! lexing, so the declaration parser's forward-reference name table sees
//! these classes and the `Iterable` protocol before anything user-written
//! can reference them. Being textual, ordinary declarations rather than
//! synthesized `ast` nodes keeps them going through exactly the same
//! parse/VTI/compile path as user code, including generic parameters and
//! protocol conformance.
#![allow(dead_code)]

pub const STRING: char = '📝';
pub const LIST: char = '🎒';
pub const LIST_ELEMENT: char = '🔶';
pub const DICTIONARY: char = '📇';
pub const DICTIONARY_VALUE: char = '🔷';
pub const DATA: char = '💾';
pub const RANGE: char = '🎢';
pub const ERROR: char = '🚨';
pub const THREAD: char = '🧵';
pub const MUTEX: char = '🔧';
pub const JSON: char = '🗒';

pub const ITERABLE: char = '🐾';
pub const HAS_MORE: char = '❓';
pub const NEXT: char = '🔜';

pub const COUNT: char = '📏';
pub const APPEND: char = '🧲';
pub const POP: char = '🪂';
pub const GET: char = '🔍';
pub const SET: char = '🖊';
pub const REMOVE_AT: char = '🧹';
pub const INSERT: char = '🪡';
pub const SHUFFLE: char = '🎲';
pub const COPY: char = '🧬';
pub const SORT: char = '🧮';
pub const ENSURE_CAPACITY: char = '📐';
pub const CONTAINS: char = '🧺';
pub const REMOVE: char = '🧹';

pub const STRING_CONCAT: char = '🔗';
pub const EQUALS: char = '🔂';
pub const INDEX_OF: char = '🔎';
pub const SUBSTRING: char = '🪓';
pub const TO_INTEGER: char = '🧭';
pub const FROM_INTEGER: char = '🪄';

pub const GET_BYTE: char = '🧰';
pub const SET_BYTE: char = '🧱';
pub const DATA_APPEND: char = '🔗';

pub const MESSAGE: char = '💬';
pub const CODE: char = '🔖';
pub const ERROR_INIT: char = '🏗';
pub const MUTEX_INIT: char = '🔨';

pub const SPAWN: char = '🧶';
pub const JOIN: char = '🧷';

pub const LOCK: char = '🗝';
pub const UNLOCK: char = '🧯';
pub const TRY_LOCK: char = '🧪';

pub const JSON_PARSE: char = '🧾';
pub const JSON_STRINGIFY: char = '🖨';

/// Hand-written rather than generated, matching the declaration style of
/// every `.emojic`-shaped example in this language: one class per
/// primitive, `native` methods carrying only a signature.
pub const SOURCE: &str = "\
🐇📝🍇\
🔩🐖📏🔢\
🔩🐖🔗🍦o📝📝\
🔩🐖🔂🍦o📝👌\
🔩🐖🔎🍦n📝🔢\
🔩🐖🪓🍦s🔢🍦l🔢📝\
🔩🐖🧭🔢\
🐅🔩🐖🪄🍦v🔢📝\
🍉\
🐇🎒🐚🔶⬛🐌🍇\
🔩🐖📏🔢\
🔩🐖🧲🍦v🔶🤷\
🔩🐖🪂🍬🔶\
🔩🐖🔍🍦i🔢🔶\
🔩🐖🖊🍦i🔢🍦v🔶🤷\
🔩🐖🧹🍦i🔢🔶\
🔩🐖🪡🍦i🔢🍦v🔶🤷\
🔩🐖🎲🤷\
🔩🐖🧬🎒🐚🔶🐌\
🔩🐖🧮🍦c🐚🐚🔶🔶🐌➜👌🐌🤷\
🔩🐖📐🍦n🔢🤷\
🔩🐖🧺🍦v🔶👌\
🍉\
🐇📇🐚🔷⬛🐌🍇\
🔩🐖📏🔢\
🔩🐖🖊🍦k📝🍦v🔷🤷\
🔩🐖🔍🍦k📝🍬🔷\
🔩🐖🧹🍦k📝🤷\
🔩🐖🧺🍦k📝👌\
🍉\
🐇💾🍇\
🔩🐖📏🔢\
🔩🐖🧰🍦i🔢🔢\
🔩🐖🧱🍦i🔢🍦v🔢🤷\
🔩🐖🔗🍦o💾💾\
🍉\
🐇🎢🍇\
🔩🐖📏🔢\
🔩🐖🧺🍦v🔢👌\
🍉\
🐇🚨🍇\
🔩🆕🏗🍦m📝🍦c🔢\
🔩🐖💬📝\
🔩🐖🔖🔢\
🍉\
🐇🧵🍇\
🐅🔩🐖🧶🍦b🐚🐌➜🤷🐌🧵\
🔩🐖🧷🤷\
🍉\
🐇🔧🍇\
🔩🆕🔨\
🔩🐖🗝🤷\
🔩🐖🧯🤷\
🔩🐖🧪👌\
🍉\
🐇🗒🍇\
🐅🔩🐖🧾🍦t📝🍬⬛\
🐅🔩🐖🖨🍦v⬛📝\
🍉\
🐊🐾🍇\
🐖❓👌\
🐖🔜⬛\
🍉\
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn prelude_parses_on_its_own() {
        let (program, _warnings) = parse_source(SOURCE).expect("prelude must be valid Emojicode source");
        assert_eq!(program.protocols.len(), 1);
        assert!(program.class_index_by_name(crate::parser::DEFAULT_NAMESPACE, LIST).is_some());
        assert!(program.class_index_by_name(crate::parser::DEFAULT_NAMESPACE, STRING).is_some());
        assert!(program.class_index_by_name(crate::parser::DEFAULT_NAMESPACE, DICTIONARY).is_some());
    }
}
