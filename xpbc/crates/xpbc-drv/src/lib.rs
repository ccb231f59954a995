//! xpbc-drv - Compiler Driver
//!
//! ============================================================================
//! COMPILER DRIVER OVERVIEW
//! ============================================================================
//!
//! The driver is the entry point and orchestrator for the whole compilation
//! pipeline: it parses the single command-line argument this language's
//! front end accepts, reads the source file, runs the lexer/parser/emitter
//! pipeline (`xpbc-par`) to produce a finalized `XPB` container, runs the
//! reader/generator pipeline (`xpbc-gen`) to lower that container to NASM
//! text, and writes both artifacts beside the input file.
//!
//! ============================================================================
//! COMPILATION PIPELINE
//! ============================================================================
//!
//! ```text
//! Source file (<input>)
//!        │
//!        ▼
//!   [Read File]
//!        │
//!        ▼
//!   [Lexer + Parser + Emitter]  (xpbc-par)  ──▶ XPB container bytes
//!        │                                           │
//!        │                                           ▼
//!        │                                    [Write <input>.xpb]
//!        ▼
//!   [Reader + Assembly Generator]  (xpbc-gen)  ──▶ NASM text
//!        │
//!        ▼
//!   [Write <input>.xpb.asm]
//! ```
//!
//! ============================================================================
//! COMMAND LINE INTERFACE
//! ============================================================================
//!
//! USAGE:
//!
//!   xpbc <input>
//!
//! There are no flags: argument parsing, invoking an assembler/linker, and
//! anything beyond a single source path are out of scope for this front
//! end. A full argument-parsing crate is not pulled in for a
//! one-positional-argument CLI.
//!
//! ============================================================================
//! ERROR HANDLING
//! ============================================================================
//!
//! Every fault — wrong argument count, an unopenable file, or any
//! lexical/syntactic/container error surfaced by `xpbc-par`/`xpbc-gen` —
//! is rendered as a single `ERROR: ...` line on stderr and the process
//! exits with code 1. There is no recovery and no partial output: either
//! both files are written, or neither is.

use std::path::{Path, PathBuf};

use xpbc_util::{CompileError, SourceMap};

/// Parsed command-line arguments: just the one source path this language's
/// driver accepts.
pub struct Args {
    pub input: PathBuf,
}

impl Args {
    /// Parses `argv` (excluding the program name). Exactly one positional
    /// argument is accepted.
    pub fn parse<I: IntoIterator<Item = String>>(argv: I) -> Result<Self, CompileError> {
        let mut argv = argv.into_iter();
        let input = argv
            .next()
            .ok_or_else(|| CompileError::Io("expected exactly one argument: <input>".into()))?;
        if argv.next().is_some() {
            return Err(CompileError::Io("expected exactly one argument: <input>".into()));
        }
        Ok(Self { input: PathBuf::from(input) })
    }
}

/// Output paths a successful compilation writes: `<input>.xpb` and
/// `<input>.xpb.asm`. The second suffix is appended to the already-suffixed
/// `.xpb` path, not to the original input path — matching the reference
/// driver's `strcat` sequencing.
pub struct OutputPaths {
    pub container: PathBuf,
    pub assembly: PathBuf,
}

impl OutputPaths {
    pub fn for_input(input: &Path) -> Self {
        let mut container = input.as_os_str().to_owned();
        container.push(".xpb");
        let container = PathBuf::from(container);

        let mut assembly = container.as_os_str().to_owned();
        assembly.push(".asm");
        let assembly = PathBuf::from(assembly);

        Self { container, assembly }
    }
}

/// Runs the full pipeline for one source file: read, compile to `XPB`,
/// lower to assembly, write both outputs. Returns the paths written on
/// success.
pub fn compile_file(input: &Path) -> Result<OutputPaths, CompileError> {
    let bytes = std::fs::read(input)
        .map_err(|e| CompileError::Io(format!("could not open '{}': {e}", input.display())))?;

    let source = SourceMap::new(bytes);
    let container = xpbc_par::compile(&source)?;
    let assembly = xpbc_gen::generate(&container)?;

    let paths = OutputPaths::for_input(input);
    std::fs::write(&paths.container, &container).map_err(|e| {
        CompileError::Io(format!("could not write '{}': {e}", paths.container.display()))
    })?;
    std::fs::write(&paths.assembly, assembly).map_err(|e| {
        CompileError::Io(format!("could not write '{}': {e}", paths.assembly.display()))
    })?;

    Ok(paths)
}

/// Top-level entry point used by `main`: parses arguments, runs the
/// pipeline, and renders any fault as the `ERROR: ...` line this compiler's
/// error contract commits to. Returns the process exit code.
pub fn run<I: IntoIterator<Item = String>>(argv: I) -> i32 {
    match Args::parse(argv).and_then(|args| compile_file(&args.input)) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("ERROR: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_append_xpb_then_asm() {
        let paths = OutputPaths::for_input(Path::new("prog.src"));
        assert_eq!(paths.container, PathBuf::from("prog.src.xpb"));
        assert_eq!(paths.assembly, PathBuf::from("prog.src.xpb.asm"));
    }

    #[test]
    fn args_parse_rejects_zero_arguments() {
        let err = Args::parse(std::iter::empty::<String>()).unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }

    #[test]
    fn args_parse_rejects_more_than_one_argument() {
        let err = Args::parse(vec!["a.src".to_string(), "b.src".to_string()]).unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }

    #[test]
    fn args_parse_accepts_exactly_one_argument() {
        let args = Args::parse(vec!["a.src".to_string()]).unwrap();
        assert_eq!(args.input, PathBuf::from("a.src"));
    }

    #[test]
    fn compile_file_writes_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("main.src");
        std::fs::write(&input, b"main(): { print(\"hi\"); }").unwrap();

        let paths = compile_file(&input).unwrap();
        assert!(paths.container.exists());
        assert!(paths.assembly.exists());

        let asm = std::fs::read_to_string(&paths.assembly).unwrap();
        assert!(asm.contains("_start:"));
    }

    #[test]
    fn compile_file_reports_unopenable_path() {
        let err = compile_file(Path::new("/nonexistent/path/does/not/exist.src")).unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }

    #[test]
    fn compile_file_propagates_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.src");
        std::fs::write(&input, b"main(): { x:i24; }").unwrap();

        let err = compile_file(&input).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
