use std::fmt::Display;

use crate::lexer::Position;

/// The emit-time error kinds of §4.E, one variant per named failure mode.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    TypeMismatch(Position, String),
    UnknownMember(Position, char),
    DeadCode(Position),
    UseBeforeInit(Position, String),
    FrozenWrite(Position, String),
    WrongArgCount(Position, char, usize, usize),
    BadSuperInit(Position, String),
    BadCast(Position, String),
    /// `🐿` declared but no inherited member of the same name exists.
    OverrideWithoutMarker(Position, char),
    /// An inherited member of the same name exists but `🐿` was omitted.
    MarkerWithoutOverride(Position, char),
    MissingExplicitReturn(Position),
    /// A `private` member called from outside its declaring class, or a
    /// `protected` member called from a non-subclass context.
    AccessViolation(Position, char),
    /// A generic class type's arguments did not satisfy its own
    /// constraints (cast or construction site).
    GenericMismatch(Position, char),
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::TypeMismatch(pos, msg) => {
                write!(f, "{}:{}: type mismatch: {msg}", pos.line, pos.column)
            }
            CompileError::UnknownMember(pos, name) => write!(
                f,
                "{}:{}: {name} is not a member of the receiver's type",
                pos.line, pos.column
            ),
            CompileError::DeadCode(pos) => write!(
                f,
                "{}:{}: unreachable statement after a return",
                pos.line, pos.column
            ),
            CompileError::UseBeforeInit(pos, name) => write!(
                f,
                "{}:{}: {name} is used before every path initializes it",
                pos.line, pos.column
            ),
            CompileError::FrozenWrite(pos, name) => {
                write!(f, "{}:{}: {name} is frozen and cannot be reassigned", pos.line, pos.column)
            }
            CompileError::WrongArgCount(pos, name, expected, got) => write!(
                f,
                "{}:{}: {name} expects {expected} argument(s), got {got}",
                pos.line, pos.column
            ),
            CompileError::BadSuperInit(pos, why) => {
                write!(f, "{}:{}: invalid super-initializer call: {why}", pos.line, pos.column)
            }
            CompileError::BadCast(pos, why) => {
                write!(f, "{}:{}: invalid cast: {why}", pos.line, pos.column)
            }
            CompileError::OverrideWithoutMarker(pos, name) => write!(
                f,
                "{}:{}: {name} is marked override but no inherited member matches it",
                pos.line, pos.column
            ),
            CompileError::MarkerWithoutOverride(pos, name) => write!(
                f,
                "{}:{}: {name} overrides an inherited member but is missing the override marker",
                pos.line, pos.column
            ),
            CompileError::MissingExplicitReturn(pos) => write!(
                f,
                "{}:{}: not every path returns a value",
                pos.line, pos.column
            ),
            CompileError::AccessViolation(pos, name) => write!(
                f,
                "{}:{}: {name} is not accessible from this context",
                pos.line, pos.column
            ),
            CompileError::GenericMismatch(pos, name) => write!(
                f,
                "{}:{}: {name}'s generic arguments do not satisfy its constraints",
                pos.line, pos.column
            ),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
