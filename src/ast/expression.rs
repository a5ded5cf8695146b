use crate::lexer::{Position, Span};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CastKind {
    Class(usize),
    Protocol(usize),
    Primitive(Type),
    /// Dynamic `something` -> primitive narrowing used by the VM's
    /// generic-unwrap instruction family.
    Dynamic(Type),
}

/// An argument list attached to a dispatch-shaped expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Arguments {
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expression {
    IntegerLiteral(i64, Span),
    DoubleLiteral(f64, Span),
    BooleanLiteral(bool, Span),
    SymbolLiteral(char, Span),
    /// A (possibly interpolated) string literal; interpolation segments
    /// are pre-split by the parser into literal/expression pieces that the
    /// emitter concatenates under a single length pre-computation.
    StringLiteral(Vec<StringSegment>, Span),
    ListLiteral(Vec<Expression>, Span),
    DictionaryLiteral(Vec<(Expression, Expression)>, Span),
    VariableLoad(String, Span),
    InstanceVariableLoad(String, Span),
    /// Method/type-method/protocol dispatch: `receiver 🍭 name args…`.
    Dispatch {
        receiver: Box<Expression>,
        name: char,
        arguments: Arguments,
        /// Set when the call is a protocol dispatch; carries the
        /// protocol's dense program index so the compiler can also emit it
        /// for O(1) VM lookup.
        protocol_index: Option<usize>,
        safe: bool,
        span: Span,
    },
    /// `🆕` initializer invocation.
    InitializerCall {
        class_index: Option<usize>,
        initializer_name: char,
        arguments: Arguments,
        /// `required`-initializer "dynamic" form: the runtime class of the
        /// receiver is substituted for `class_index` at call time.
        dynamic: bool,
        span: Span,
    },
    /// `🔝` super-initializer call; only legal inside an initializer body.
    SuperInitializerCall {
        initializer_name: char,
        arguments: Arguments,
        span: Span,
    },
    Cast {
        value: Box<Expression>,
        kind: CastKind,
        span: Span,
    },
    Closure(Closure, Span),
    /// `🎯` captures a bound method as a first-class value without
    /// invoking it.
    CapturedMethod {
        receiver: Box<Expression>,
        name: char,
        span: Span,
    },
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, Span),
    Not(Box<Expression>, Span),
    /// `🍭self`, `this`-analogue.
    SelfExpr(Span),
    /// `start ⛓ stop [🪜 step]` (inclusive) or `start ⛷ stop [🪜 step]`
    /// (exclusive).
    RangeLiteral {
        start: Box<Expression>,
        stop: Box<Expression>,
        step: Option<Box<Expression>>,
        inclusive: bool,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StringSegment {
    Literal(String),
    Interpolated(Expression),
}

impl Expression {
    pub fn position(&self) -> Span {
        match self {
            Expression::IntegerLiteral(_, s)
            | Expression::DoubleLiteral(_, s)
            | Expression::BooleanLiteral(_, s)
            | Expression::SymbolLiteral(_, s)
            | Expression::StringLiteral(_, s)
            | Expression::ListLiteral(_, s)
            | Expression::DictionaryLiteral(_, s)
            | Expression::VariableLoad(_, s)
            | Expression::InstanceVariableLoad(_, s)
            | Expression::Closure(_, s)
            | Expression::Binary(_, _, _, s)
            | Expression::Not(_, s)
            | Expression::SelfExpr(s) => s.clone(),
            Expression::Dispatch { span, .. }
            | Expression::InitializerCall { span, .. }
            | Expression::SuperInitializerCall { span, .. }
            | Expression::Cast { span, .. }
            | Expression::CapturedMethod { span, .. }
            | Expression::RangeLiteral { span, .. } => span.clone(),
        }
    }

    pub fn start(&self) -> Position {
        self.position().start
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Closure {
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    pub captures_self: bool,
    pub body: Box<super::Block>,
}
