//! Command-line interface: argument parsing and command dispatch.
//!
//! Three subcommands cover the engine's surfaces:
//!
//! - `parse`: parse files and report syntax diagnostics; `--check`
//!   verifies the verbatim round-trip (emit(parse(S)) == S).
//! - `format`: apply a formatting-options bundle (JSON) and print or
//!   rewrite the result.
//! - `check`: run the analyzer over files and print diagnostics, as
//!   text or JSON.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::debug;

use pythia_analysis::AnalysisSession;
use pythia_core::config::AnalysisConfig;
use pythia_core::version::PythonVersion;
use pythia_cst::{emit, format_module, parse_module, render_diagnostic, Codegen, CodegenState, FormatOptions};

#[derive(Debug, Parser)]
#[command(name = "pythia", about = "A Python static-analysis engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Python language version to analyze as (e.g. 2.7, 3.6).
    #[arg(long, default_value = "3.7")]
    pub python_version: String,
    /// Files or directories to process.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse files and report syntax diagnostics.
    Parse {
        #[command(flatten)]
        common: CommonArgs,
        /// Verify that re-emitting the tree reproduces the input.
        #[arg(long)]
        check: bool,
    },
    /// Re-emit files through the formatter.
    Format {
        #[command(flatten)]
        common: CommonArgs,
        /// JSON file holding the formatting options bundle.
        #[arg(long)]
        options: Option<PathBuf>,
        /// Rewrite files in place instead of printing to stdout.
        #[arg(long)]
        write: bool,
    },
    /// Analyze files and print diagnostics.
    Check {
        #[command(flatten)]
        common: CommonArgs,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Parse { common, check } => run_parse(&common, check),
        Command::Format {
            common,
            options,
            write,
        } => run_format(&common, options.as_deref(), write),
        Command::Check { common, json } => run_check(&common, json),
    }
}

fn parse_version(text: &str) -> PythonVersion {
    match PythonVersion::parse(text) {
        Some(version) => version,
        None => {
            eprintln!("unknown Python version '{text}', defaulting to 3.7");
            PythonVersion::default()
        }
    }
}

/// Expand files and directories into the Python files beneath them.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "py")
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files
}

fn run_parse(common: &CommonArgs, check: bool) -> i32 {
    let version = parse_version(&common.python_version);
    let mut failures = 0;
    for file in collect_files(&common.paths) {
        let source = match std::fs::read_to_string(&file) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("{}: {error}", file.display());
                failures += 1;
                continue;
            }
        };
        let parsed = parse_module(&source, version);
        for diagnostic in &parsed.diagnostics {
            eprintln!(
                "{}",
                render_diagnostic(&source, &file.display().to_string(), diagnostic)
            );
        }
        if check {
            let emitted = emit(&parsed.module);
            if emitted != source {
                eprintln!("{}: round-trip mismatch", file.display());
                failures += 1;
                continue;
            }
            debug!(file = %file.display(), "round-trip ok");
        }
        if !parsed.diagnostics.is_empty() {
            failures += 1;
        }
    }
    if failures > 0 {
        1
    } else {
        0
    }
}

fn run_format(common: &CommonArgs, options_path: Option<&Path>, write: bool) -> i32 {
    let version = parse_version(&common.python_version);
    let options: FormatOptions = match options_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(options) => options,
                Err(error) => {
                    eprintln!("{}: invalid options: {error}", path.display());
                    return 2;
                }
            },
            Err(error) => {
                eprintln!("{}: {error}", path.display());
                return 2;
            }
        },
        None => FormatOptions::default(),
    };

    for file in collect_files(&common.paths) {
        let source = match std::fs::read_to_string(&file) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("{}: {error}", file.display());
                return 1;
            }
        };
        let mut parsed = parse_module(&source, version);
        format_module(&mut parsed.module, &options);
        let mut state = CodegenState::default();
        parsed.module.codegen(&mut state);
        let formatted = state.into_string();
        if write {
            if formatted != source {
                if let Err(error) = std::fs::write(&file, &formatted) {
                    eprintln!("{}: {error}", file.display());
                    return 1;
                }
            }
        } else {
            print!("{formatted}");
        }
    }
    0
}

fn run_check(common: &CommonArgs, json: bool) -> i32 {
    let version = parse_version(&common.python_version);
    let mut config = AnalysisConfig::for_version(version);
    // Directories double as search roots so sibling imports resolve.
    for path in &common.paths {
        if path.is_dir() {
            config.search_paths.push(path.clone());
        } else if let Some(parent) = path.parent() {
            config.search_paths.push(parent.to_path_buf());
        }
    }
    let mut session = AnalysisSession::new(config);

    let files = collect_files(&common.paths);
    let mut modules = Vec::new();
    for file in &files {
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("{}: {error}", file.display());
                return 1;
            }
        };
        let name = module_name_for(file);
        let module = session.add_module_with_path(&name, Some(file.clone()), &source);
        modules.push((file.clone(), module));
    }
    if let Err(error) = session.analyze() {
        eprintln!("analysis cancelled: {error}");
        return 1;
    }

    let query = session.query();
    let mut total = 0usize;
    for (file, module) in &modules {
        let diagnostics = query.diagnostics_of(*module);
        total += diagnostics.len();
        if json {
            for diagnostic in &diagnostics {
                let record = serde_json::json!({
                    "file": file.display().to_string(),
                    "severity": diagnostic.severity.as_str(),
                    "code": diagnostic.code.as_str(),
                    "start": diagnostic.span.start,
                    "end": diagnostic.span.end,
                    "message": diagnostic.message,
                });
                println!("{record}");
            }
        } else {
            let source = std::fs::read_to_string(file).unwrap_or_default();
            for diagnostic in &diagnostics {
                eprintln!(
                    "{}",
                    render_diagnostic(&source, &file.display().to_string(), diagnostic)
                );
            }
        }
    }
    if total > 0 {
        1
    } else {
        0
    }
}

/// The dotted module name for a file: its stem, or the package path when
/// `__init__.py`.
fn module_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("module");
    if stem == "__init__" {
        path.parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or(stem)
            .to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names() {
        assert_eq!(module_name_for(Path::new("/x/foo.py")), "foo");
        assert_eq!(module_name_for(Path::new("/x/pkg/__init__.py")), "pkg");
    }

    #[test]
    fn collect_files_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "not python").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.py"), "y = 2\n").unwrap();
        let files = collect_files(&[dir.path().to_path_buf()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "py"));
    }
}
