//! §7's CLI-facing error reporting: every fallible front-end stage
//! (lexer, parser, compiler, bytecode loader, interpreter) already
//! carries its own line/column in its `Display` impl; this module only
//! adds the colored severity prefix and, where the offending source is
//! at hand, the underlined source line the teacher's own CLI tooling
//! favors over a bare message.
use colored::Colorize;

use crate::bytecode::ReadError;
use crate::compiler::CompileError;
use crate::lexer::{LexError, Position};
use crate::packages::PackageError;
use crate::parser::{ParseError, ParseFailure, ParseWarning};
use crate::vm::{InterpreterError, LoadError};
use crate::vti::VtiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One reportable condition: a rendered message plus, when the failure
/// carries one, the source position it points at. `kind` is the stable
/// stage tag the `-j` JSON array's `type` field surfaces — which front-end
/// or back-end stage raised it, not the full error variant name.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Option<Position>,
    pub message: String,
    pub kind: &'static str,
}

/// Row shape of the `-j` JSON diagnostic array (§6): `{type, file, line,
/// character, message}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonDiagnostic {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub file: Option<String>,
    pub line: usize,
    pub character: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, position: None, message: message.into(), kind: "Compile" }
    }

    /// An `IO`-kind diagnostic, for a source file that couldn't be read or
    /// an output path that couldn't be written — the CLI's own failures
    /// rather than anything the compiler pipeline raised.
    pub fn io_error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, position: None, message: message.into(), kind: "IO" }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, position: None, message: message.into(), kind: "Compile" }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Projects into the `-j` JSON row shape, resolving `file` against
    /// whichever of `files` this diagnostic's line falls within.
    pub fn to_json(&self, file: Option<String>) -> JsonDiagnostic {
        let position = self.position.unwrap_or_default();
        JsonDiagnostic {
            kind: self.kind,
            file,
            line: position.line,
            character: position.column,
            message: self.message.clone(),
        }
    }

    /// Renders to one line, colored by severity, with the source line and
    /// a caret underneath when `source` has one at `self.position`.
    pub fn render(&self, source: Option<&str>) -> String {
        let prefix = match self.severity {
            Severity::Error => "error".red().bold(),
            Severity::Warning => "warning".yellow().bold(),
        };
        let mut rendered = format!("{prefix}: {}", self.message);
        if let (Some(position), Some(source)) = (self.position, source) {
            if let Some(line) = source.lines().nth(position.line.saturating_sub(1)) {
                let caret_column = position.column.saturating_sub(1);
                let caret = " ".repeat(caret_column) + "^";
                rendered.push('\n');
                rendered.push_str(&format!("  {line}\n  {}", caret.cyan()));
            }
        }
        rendered
    }
}

pub fn report(diagnostics: &[Diagnostic], source: Option<&str>) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic.render(source));
    }
}

impl From<LexError> for Diagnostic {
    fn from(e: LexError) -> Self {
        let position = match &e {
            LexError::UnterminatedString(pos)
            | LexError::UnterminatedSymbol(pos)
            | LexError::MalformedEscape(pos, _)
            | LexError::InvalidNumber(pos, _)
            | LexError::UnexpectedByte(pos, _) => *pos,
        };
        Diagnostic::error(e.to_string()).with_position(position).with_kind("LexicalSyntax")
    }
}

impl From<ParseError> for Diagnostic {
    fn from(e: ParseError) -> Self {
        let position = match &e {
            ParseError::DuplicateType(pos, ..)
            | ParseError::DuplicateMember(pos, ..)
            | ParseError::UnknownType(pos, ..)
            | ParseError::BadSuperclass(pos, ..)
            | ParseError::OptionalAsSuperclass(pos)
            | ParseError::NotAProtocol(pos, ..)
            | ParseError::UnexpectedToken(pos, ..)
            | ParseError::TooManyProtocols(pos, ..)
            | ParseError::TooManyInstanceVariables(pos, ..) => Some(*pos),
            ParseError::UnexpectedEndOfInput => None,
        };
        let kind = match &e {
            ParseError::UnexpectedToken(..) | ParseError::UnexpectedEndOfInput => "UnexpectedToken",
            ParseError::DuplicateType(..) | ParseError::DuplicateMember(..) => "DuplicateDeclaration",
            _ => "Parse",
        };
        let mut diagnostic = Diagnostic::error(e.to_string()).with_kind(kind);
        diagnostic.position = position;
        diagnostic
    }
}

impl From<ParseWarning> for Diagnostic {
    fn from(w: ParseWarning) -> Self {
        let ParseWarning::ReservedName(pos, _) = w;
        Diagnostic::warning(w.to_string()).with_position(pos).with_kind("ReservedName")
    }
}

impl From<ParseFailure> for Diagnostic {
    fn from(f: ParseFailure) -> Self {
        match f {
            ParseFailure::Lex(e) => e.into(),
            ParseFailure::Parse(e) => e.into(),
        }
    }
}

impl From<CompileError> for Diagnostic {
    fn from(e: CompileError) -> Self {
        let position = match &e {
            CompileError::TypeMismatch(pos, ..)
            | CompileError::UnknownMember(pos, ..)
            | CompileError::DeadCode(pos)
            | CompileError::UseBeforeInit(pos, ..)
            | CompileError::FrozenWrite(pos, ..)
            | CompileError::WrongArgCount(pos, ..)
            | CompileError::BadSuperInit(pos, ..)
            | CompileError::BadCast(pos, ..)
            | CompileError::OverrideWithoutMarker(pos, ..)
            | CompileError::MarkerWithoutOverride(pos, ..)
            | CompileError::MissingExplicitReturn(pos)
            | CompileError::AccessViolation(pos, ..)
            | CompileError::GenericMismatch(pos, ..) => *pos,
        };
        let kind = match &e {
            CompileError::TypeMismatch(..) => "TypeMismatch",
            CompileError::UnknownMember(..) => "UnknownMember",
            CompileError::DeadCode(..) => "DeadCode",
            CompileError::AccessViolation(..) => "AccessViolation",
            CompileError::OverrideWithoutMarker(..) | CompileError::MarkerWithoutOverride(..) => "OverrideDiscipline",
            CompileError::GenericMismatch(..) => "GenericMismatch",
            CompileError::BadSuperInit(..) => "BadSuperInit",
            _ => "Compile",
        };
        Diagnostic::error(e.to_string()).with_position(position).with_kind(kind)
    }
}

impl From<ReadError> for Diagnostic {
    fn from(e: ReadError) -> Self {
        Diagnostic::error(e.to_string()).with_kind("Bytecode")
    }
}

impl From<LoadError> for Diagnostic {
    fn from(e: LoadError) -> Self {
        Diagnostic::error(e.to_string()).with_kind("Bytecode")
    }
}

impl From<PackageError> for Diagnostic {
    fn from(e: PackageError) -> Self {
        Diagnostic::error(e.to_string()).with_kind("Package")
    }
}

impl From<InterpreterError> for Diagnostic {
    fn from(e: InterpreterError) -> Self {
        Diagnostic::error(e.to_string()).with_kind("Runtime")
    }
}

impl From<VtiError> for Diagnostic {
    fn from(e: VtiError) -> Self {
        let position = match &e {
            VtiError::OverrideFinal(pos, ..)
            | VtiError::ReturnTypeMismatch(pos, ..)
            | VtiError::WrongArgCount(pos, ..)
            | VtiError::ArgTypeMismatch(pos, ..) => Some(*pos),
            VtiError::UnresolvedStartupMethod(..) => None,
        };
        let mut diagnostic = Diagnostic::error(e.to_string()).with_kind("Vti");
        diagnostic.position = position;
        diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_the_offending_source_line() {
        let diagnostic = Diagnostic::error("unknown type").with_position(Position::new(2, 3));
        let rendered = diagnostic.render(Some("🆕\n🤔🍇🍉"));
        assert!(rendered.contains("🤔🍇🍉"));
    }

    #[test]
    fn render_without_source_omits_the_caret_line() {
        let diagnostic = Diagnostic::error("boom");
        let rendered = diagnostic.render(None);
        assert_eq!(rendered.lines().count(), 1);
    }
}
