// cobol-structurer: a thin debug driver around the `cobol_structurer` library.
//
// Reads a JSON-serialised `SyntaxTree` fixture and prints the structured
// tree of every section in it. Argument parsing, COBOL parsing, and
// rendering the structured tree back into source text are all out of
// scope for this crate - see the crate docs.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cobol_structurer::{structure_program, SyntaxTree, TracingReporter};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    match run() {
        Ok(failed) if failed => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Loads, structures, and prints every section of the given syntax-tree
/// fixture. Returns whether any section failed to structure - a failure
/// here is a per-section `CoreError`, not a reason to abort the run, so it
/// is folded into the printed output rather than propagated through `?`.
fn run() -> Result<bool> {
    let path = std::env::args()
        .nth(1)
        .context("usage: cobol-structure <syntax-tree.json>")?;

    let contents = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let tree: SyntaxTree =
        serde_json::from_str(&contents).with_context(|| format!("failed to parse {path} as a syntax tree"))?;

    let mut reporter = TracingReporter;
    let results = structure_program(&tree, false, &mut reporter);

    let mut failed = false;
    let output: Vec<_> = results
        .into_iter()
        .map(|r| {
            let name = tree.section(r.section).name.clone();
            match r.outcome {
                Ok(block) => serde_json::json!({ "section": name, "block": block }),
                Err(e) => {
                    failed = true;
                    serde_json::json!({ "section": name, "error": e.to_string() })
                }
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output).context("failed to serialise output")?);
    Ok(failed)
}
