use std::{
    error::Error,
    io,
    path::{Path, PathBuf},
    process::{Command, Output},
    str,
};

const EMOJICODEC_PATH: &str = "./target/debug/emojicodec";

fn run_compiler(src_path: &Path, out_path: &Path) -> Result<Output, io::Error> {
    Command::new(EMOJICODEC_PATH)
        .arg("-o")
        .arg(out_path)
        .arg(src_path)
        .output()
}

/// Writes `source` to a fixture file under `dir`, invokes the compiled
/// `emojicodec` binary against it, and returns the bytecode it produced.
/// Mirrors the teacher's `check_compilation` subprocess style, adapted to
/// a compiler with no separate "run" mode.
pub fn check_compilation(dir: &Path, name: &str, source: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let src_path = dir.join(format!("{name}.emoji"));
    let out_path = dir.join(name);
    std::fs::write(&src_path, source)?;

    let output = run_compiler(&src_path, &out_path)?;
    let stderr = str::from_utf8(&output.stderr)?;
    assert!(
        output.status.success(),
        "emojicodec exited with status {:?}:\n{stderr}",
        output.status.code()
    );

    Ok(std::fs::read(&out_path)?)
}

/// Like [`check_compilation`] but asserts the compiler rejects `source`
/// with a non-zero exit status, returning its stderr for inspection.
pub fn check_failing_compilation(dir: &Path, name: &str, source: &str) -> Result<String, Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let src_path = dir.join(format!("{name}.emoji"));
    let out_path = dir.join(name);
    std::fs::write(&src_path, source)?;

    let output = run_compiler(&src_path, &out_path)?;
    assert!(
        !output.status.success(),
        "emojicodec unexpectedly accepted a program that should have failed to compile"
    );
    Ok(str::from_utf8(&output.stderr)?.to_string())
}

pub fn fixture_dir() -> PathBuf {
    PathBuf::from("./target/test-fixtures")
}
