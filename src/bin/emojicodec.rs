//! The `emojicodec` compiler CLI: `compile [-v] [-j] [-r | -R pkg]
//! [-o outPath] inputs…`, grounded in `src/bin/why/main.rs` +
//! `src/bin/why/cli.rs`'s `clap` derive pattern. Unlike `why`, there is
//! only one command — no subcommand enum is needed.
use std::fs;
use std::ops::Range;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use emojicodec::diagnostics::{self, Diagnostic, JsonDiagnostic};
use emojicodec::lexer::Position;
use emojicodec::{bytecode, compiler, parser, vti};

/// I/O or argument failure (§6): a source file couldn't be read, or the
/// output path couldn't be written.
const EXIT_ARGUMENT_FAILURE: i32 = 1;
/// The compiler pipeline itself rejected the program. Kept distinct from
/// [`EXIT_ARGUMENT_FAILURE`] so a script can tell "fix your command line"
/// from "fix your program" apart — §6 only requires "non-zero" here.
const EXIT_COMPILE_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "emojicodec", about = "Compiler for the Emojicode bytecode language", disable_version_flag = true)]
struct Cli {
    /// Print the compiler version and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Emit diagnostics as a JSON array on standard error instead of
    /// colored human-readable text.
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Dump a package report (every package this program depends on) to
    /// standard output.
    #[arg(short = 'r', long = "report", conflicts_with = "report_package")]
    report: bool,

    /// Dump a package report limited to one package name.
    #[arg(short = 'R', long = "report-package", value_name = "PKG")]
    report_package: Option<String>,

    /// Path the compiled bytecode is written to.
    #[arg(short = 'o', long = "output", value_name = "outPath", default_value = "a.out")]
    output: PathBuf,

    /// Source files to compile, concatenated in order into one unit.
    #[arg(value_name = "inputs")]
    inputs: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let _ = simple_logger::init_with_level(log::Level::Warn);

    if cli.version {
        println!("emojicodec {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    if cli.inputs.is_empty() {
        emit_and_exit(
            &[Diagnostic::io_error("no input files given")],
            cli.json,
            None,
            &[],
            EXIT_ARGUMENT_FAILURE,
        );
    }

    let (source, file_ranges) = match read_inputs(&cli.inputs) {
        Ok(loaded) => loaded,
        Err(diagnostic) => emit_and_exit(&[diagnostic], cli.json, None, &[], EXIT_ARGUMENT_FAILURE),
    };

    let (mut program, warnings) = match parser::parse_source(&source) {
        Ok(parsed) => parsed,
        Err(failure) => {
            let diagnostic: Diagnostic = failure.into();
            emit_and_exit(&[diagnostic], cli.json, Some(&source), &file_ranges, EXIT_COMPILE_FAILURE)
        }
    };

    let warning_diagnostics: Vec<Diagnostic> = warnings.into_iter().map(Diagnostic::from).collect();
    emit_diagnostics(&warning_diagnostics, cli.json, Some(&source), &file_ranges);

    if let Err(e) = vti::assign(&mut program) {
        let diagnostic: Diagnostic = e.into();
        emit_and_exit(&[diagnostic], cli.json, Some(&source), &file_ranges, EXIT_COMPILE_FAILURE);
    }

    if cli.report || cli.report_package.is_some() {
        print_package_report(&program, cli.report_package.as_deref());
    }

    let bytecode_file = match compiler::compile(&program) {
        Ok(file) => file,
        Err(e) => {
            let diagnostic: Diagnostic = e.into();
            emit_and_exit(&[diagnostic], cli.json, Some(&source), &file_ranges, EXIT_COMPILE_FAILURE)
        }
    };

    let bytes = match bytecode::Writer::write(&bytecode_file) {
        Ok(bytes) => bytes,
        Err(e) => emit_and_exit(
            &[Diagnostic::io_error(e.to_string())],
            cli.json,
            None,
            &[],
            EXIT_ARGUMENT_FAILURE,
        ),
    };

    if let Err(e) = fs::write(&cli.output, &bytes) {
        emit_and_exit(
            &[Diagnostic::io_error(format!("{}: {e}", cli.output.display()))],
            cli.json,
            None,
            &[],
            EXIT_ARGUMENT_FAILURE,
        );
    }

    info!("wrote {} bytes to {}", bytes.len(), cli.output.display());
}

/// Reads every input in order, concatenating their contents into one
/// translation unit (a newline separates each file, so a malformed final
/// line in one input can't merge into the next file's first token) and
/// recording each file's line range for the `-j` diagnostic `file` field.
fn read_inputs(inputs: &[PathBuf]) -> Result<(String, Vec<(PathBuf, Range<usize>)>), Diagnostic> {
    let mut sources = Vec::with_capacity(inputs.len());
    let mut ranges = Vec::with_capacity(inputs.len());
    let mut next_line = 1usize;
    for path in inputs {
        let text = fs::read_to_string(path)
            .map_err(|e| Diagnostic::io_error(format!("{}: {e}", path.display())))?;
        let line_count = text.lines().count().max(1);
        ranges.push((path.clone(), next_line..next_line + line_count));
        next_line += line_count;
        sources.push(text);
    }
    Ok((sources.join("\n"), ranges))
}

fn file_for_position(file_ranges: &[(PathBuf, Range<usize>)], position: Option<Position>) -> Option<String> {
    let line = position?.line;
    file_ranges
        .iter()
        .find(|(_, range)| range.contains(&line))
        .map(|(path, _)| path.display().to_string())
}

fn emit_diagnostics(
    diagnostics: &[Diagnostic],
    json: bool,
    source: Option<&str>,
    file_ranges: &[(PathBuf, Range<usize>)],
) {
    if diagnostics.is_empty() {
        return;
    }
    if json {
        let rows: Vec<JsonDiagnostic> = diagnostics
            .iter()
            .map(|d| d.to_json(file_for_position(file_ranges, d.position)))
            .collect();
        eprintln!("{}", serde_json::to_string(&rows).unwrap_or_default());
    } else {
        diagnostics::report(diagnostics, source);
    }
}

fn emit_and_exit(
    diagnostics: &[Diagnostic],
    json: bool,
    source: Option<&str>,
    file_ranges: &[(PathBuf, Range<usize>)],
    code: i32,
) -> ! {
    emit_diagnostics(diagnostics, json, source, file_ranges);
    std::process::exit(code);
}

fn print_package_report(program: &emojicodec::ast::Program, filter: Option<&str>) {
    println!("package report:");
    for package in &program.packages {
        let name = if package.is_standard() { "<standard>" } else { package.name.as_str() };
        if let Some(filter) = filter {
            if package.name != filter {
                continue;
            }
        }
        println!(
            "  {name} v{}.{} (native binary: {})",
            package.version.major, package.version.minor, package.requires_native_binary
        );
    }
    if filter.is_none() {
        if let Some(version) = &program.own_version {
            println!("  <self> v{}.{}", version.major, version.minor);
        }
    }
}
