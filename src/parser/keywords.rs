//! The fixed set of reserved identifier code points recognized by the
//! declaration parser (§4.C). Everything else that lexes as an
//! `Identifier` token names a class, protocol, enum or member.
#![allow(dead_code)]

pub const PACKAGE_IMPORT: char = '📻';
pub const PROTOCOL: char = '🐊';
pub const ENUM: char = '🦃';
pub const NATIVE_BINARY_MARKER: char = '📦';
pub const VERSION_DECLARATION: char = '🎚';
pub const CLASS_EXTENSION: char = '🐋';
pub const CLASS: char = '🐇';

pub const FINAL: char = '🔏';
pub const OVERRIDE: char = '🐿';
pub const CLASS_SIDE: char = '🐅';
pub const REQUIRED: char = '🔑';
pub const ACCESS_PUBLIC: char = '🔓';
pub const ACCESS_PROTECTED: char = '🔒';
pub const ACCESS_PRIVATE: char = '🔐';

pub const INITIALIZER: char = '🆕';
pub const METHOD: char = '🐖';
pub const DEINITIALIZER: char = '🗑';

pub const BLOCK_START: char = '🍇';
pub const BLOCK_END: char = '🍉';

pub const IF: char = '🍊';
pub const ELSE: char = '🍋';
pub const WHILE: char = '🔁';
pub const FOR_EACH: char = '🍨';
pub const RETURN: char = '🍎';
pub const VAR: char = '🍰';
pub const FROZEN_VAR: char = '🍯';
pub const ASSIGN: char = '➡';
pub const SELF: char = '🍭';
pub const SUPER_INITIALIZER: char = '🆙';
pub const SAFE_CALL: char = '🍀';
pub const CAST: char = '🍺';
pub const NOT: char = '🙅';
pub const LIST_LITERAL: char = '🍪';
pub const DICTIONARY_LITERAL: char = '🍮';
pub const CLOSURE: char = '🌶';
pub const CAPTURED_METHOD: char = '🎣';
pub const GENERIC_OPEN: char = '🐚';
pub const GENERIC_CLOSE: char = '🐌';
pub const CONFORMS_TO: char = '🐕';
pub const OPTIONAL_MARKER: char = '🍬';
pub const STARTUP_FLAG: char = '🏁';

pub const INTEGER_TYPE: char = '🔢';
pub const DOUBLE_TYPE: char = '🌊';
pub const BOOLEAN_TYPE: char = '👌';
pub const SYMBOL_TYPE: char = '🔡';
pub const SOMETHING_TYPE: char = '⬛';
pub const SOMEOBJECT_TYPE: char = '⬜';
pub const CALLABLE_ARROW: char = '➜';

pub const OP_ADD: char = '➕';
pub const OP_SUB: char = '➖';
pub const OP_MUL: char = '✖';
pub const OP_DIV: char = '➗';
pub const OP_REM: char = '🌀';
pub const OP_EQ: char = '🙌';
pub const OP_NEQ: char = '🙆';
pub const OP_LT: char = '🐗';
pub const OP_LTE: char = '🐏';
pub const OP_GT: char = '🐃';
pub const OP_GTE: char = '🐆';
pub const OP_AND: char = '🤝';
pub const OP_OR: char = '🤞';
pub const OP_SHL: char = '👈';
pub const OP_SHR: char = '👉';
pub const OP_BITAND: char = '🤜';
pub const OP_BITOR: char = '🤛';
pub const OP_BITXOR: char = '🤚';

pub const LIST_END: char = '🍱';
pub const DICT_SEPARATOR: char = '➡';
pub const DICT_END: char = '🍲';
pub const RANGE_INCLUSIVE: char = '⛓';
pub const RANGE_EXCLUSIVE: char = '⛷';
pub const RANGE_STEP: char = '🪜';
pub const CAST_DYNAMIC: char = '🦎';

/// Introduces a class's superclass reference inside a class header.
pub const EXTENDS: char = '🦒';
/// Marks a method/initializer as resolved at link time by a native
/// package instead of carrying a bytecode body.
pub const NATIVE: char = '🔩';
/// Initializer-only modifier: the initializer may abort construction and
/// yield nothingness instead of `self`.
pub const CAN_RETURN_NOTHINGNESS: char = '🚫';

/// A fixed set of emoji names that *look* like keywords but are still
/// accepted as ordinary method/type-method/initializer names — declaring
/// one only emits a `ReservedName` warning (§4.C).
pub const RESERVED_NAMES: &[char] = &[CLASS, PROTOCOL, ENUM, METHOD, INITIALIZER, DEINITIALIZER];

