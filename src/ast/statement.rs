use crate::lexer::Span;
use crate::types::Type;

use super::Expression;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfBranch {
    pub condition: Expression,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfChain {
    pub branches: Vec<IfBranch>,
    pub else_block: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WhileLoop {
    pub condition: Expression,
    pub block: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ForEachSource {
    List(Expression),
    Range(Expression),
    /// Any other protocol-conforming iterable; the emitter falls back to
    /// the generic enumeration instruction (`getEnumerator`/`next`/`hasMore`).
    Iterable(Expression),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForEach {
    pub binding: String,
    pub source: ForEachSource,
    pub block: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: Option<Type>,
    pub value: Expression,
    pub frozen: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Assignment {
    pub target: AssignmentTarget,
    pub value: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AssignmentTarget {
    Variable(String),
    InstanceVariable(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Return {
    pub value: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Statement {
    Expression(Expression),
    VariableDeclaration(VariableDeclaration),
    Assignment(Assignment),
    If(IfChain),
    While(WhileLoop),
    ForEach(ForEach),
    Return(Return),
}
