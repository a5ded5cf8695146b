use crate::bytecode::Instruction;
use crate::lexer::{Position, Span};
use crate::types::Type;

use super::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AccessLevel {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcedureFlags {
    pub is_final: bool,
    pub is_override: bool,
    pub is_native: bool,
    /// Initializer-only: this initializer must be invoked on every subclass.
    pub required: bool,
    /// Initializer-only: the initializer may abort construction and yield
    /// nothingness instead of `self`.
    pub can_return_nothingness: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcedureKind {
    Method,
    TypeMethod,
    Initializer,
}

/// Common shape of method, type-method and initializer declarations, per
/// §3's Data Model "Procedure" entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Procedure {
    pub kind: ProcedureKind,
    pub name: char,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub access: AccessLevel,
    pub flags: ProcedureFlags,
    /// Assigned by §4.D; `None` until VTI assignment has run.
    pub vti: Option<u16>,
    pub doc_comment: Option<String>,
    pub body: Option<Block>,
    pub position: Position,
    pub span: Span,
    /// Populated by §4.E: the bytecode span (index range into the owning
    /// function's instruction vector) once emitted.
    #[serde(skip)]
    pub compiled: Option<Vec<Instruction>>,
}

impl Procedure {
    pub fn signature_compatible_override(&self) -> bool {
        !self.flags.is_final
    }
}
