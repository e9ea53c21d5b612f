//! Flood front end: lexer, parser, name resolution and diagnostics.

pub mod ast;
mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod symbol;

use lexer::LexError;
use serde::Serialize;
use std::fs;
use symbol::SymbolTable;
use tracing::debug;

pub const TOOL_NAME: &str = "flood";
pub const VERSION: &str = "0.1";

pub use diagnostics::{diagnostic, render, Diagnostic, Edit, FixIt, Position, Span, TraceFrame};

#[derive(Serialize)]
pub struct CheckReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckReport {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            tool: TOOL_NAME,
            version: VERSION,
            ok: diagnostics.is_empty(),
            diagnostics,
        }
    }
}

#[derive(Serialize)]
pub struct RunReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub ok: bool,
    pub stdout: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn to_json<T: Serialize>(report: &T) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

pub fn load_source(path: &str) -> Result<String, Diagnostic> {
    fs::read_to_string(path).map_err(|err| {
        diagnostic(
            "E0001",
            format!("Unable to read file: {err}"),
            path,
            Span::default(),
            vec!["IO error".to_string()],
            Some("Ensure the path exists and is readable.".to_string()),
        )
    })
}

fn diagnostic_from_lex_error(path: &str, err: LexError) -> Diagnostic {
    diagnostic(
        err.code,
        err.message,
        path,
        err.span,
        vec!["Lexer error".to_string()],
        None,
    )
}

fn diagnostic_from_parse_error(path: &str, err: parser::ParseError) -> Diagnostic {
    let fixits = err
        .fixit
        .map(|hint| {
            vec![FixIt {
                title: hint.title.to_string(),
                edits: vec![Edit {
                    file: path.to_string(),
                    span: hint.span,
                    replacement: hint.replacement,
                }],
            }]
        })
        .unwrap_or_default();
    let mut diag = diagnostic(
        err.code,
        err.message,
        path,
        err.span,
        vec!["Parser error".to_string()],
        None,
    );
    diag.fixits = fixits;
    diag
}

pub fn parse_source(path: &str, source: &str) -> Result<ast::Program, Vec<Diagnostic>> {
    let tokens = lexer::lex(source).map_err(|err| vec![diagnostic_from_lex_error(path, err)])?;
    let program = parser::parse(&tokens).map_err(|errs| {
        errs.into_iter()
            .map(|err| diagnostic_from_parse_error(path, err))
            .collect::<Vec<_>>()
    })?;
    debug!(file = path, decls = program.decls.len(), "parsed program");
    Ok(program)
}

/// Resolves names in `program`; any diagnostic means code generation must not run.
pub fn analyze_program(
    path: &str,
    program: &mut ast::Program,
    predeclared: &[&str],
) -> Result<SymbolTable, Vec<Diagnostic>> {
    let (symbols, diagnostics) = sema::analyze(program, predeclared, path);
    debug!(file = path, symbols = symbols.len(), errors = diagnostics.len(), "analyzed program");
    if diagnostics.is_empty() {
        Ok(symbols)
    } else {
        Err(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    fn write_temp(contents: &str, name: &str) -> PathBuf {
        let mut path = env::temp_dir();
        let file_name = format!("flood_{name}_{}.fl", std::process::id());
        path.push(file_name);
        fs::write(&path, contents).expect("write temp file");
        path
    }

    #[test]
    fn load_source_reads_file() {
        let path = write_temp("fn main() { }\n", "load");
        let source = load_source(path.to_str().unwrap()).unwrap();
        assert_eq!(source, "fn main() { }\n");
        fs::remove_file(path).ok();
    }

    #[test]
    fn load_source_reports_missing_file() {
        let diag = load_source("/definitely/not/here.fl").unwrap_err();
        assert_eq!(diag.code, "E0001");
    }

    #[test]
    fn parse_source_maps_lex_errors() {
        let diags = parse_source("bad.fl", "fn main() { @ }").unwrap_err();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0100");
        assert_eq!(diags[0].file, "bad.fl");
    }

    #[test]
    fn parse_source_maps_fixits() {
        let diags = parse_source("semi.fl", "fn main() { print 1 }").unwrap_err();
        assert_eq!(diags[0].fixits.len(), 1);
        assert_eq!(diags[0].fixits[0].edits[0].replacement, ";");
    }

    #[test]
    fn check_report_serializes() {
        let mut program = parse_source("t.fl", "fn main() { print nope; }").unwrap();
        let diags = analyze_program("t.fl", &mut program, &[]).unwrap_err();
        let output = to_json(&CheckReport::new(diags));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["tool"], "flood");
        assert_eq!(value["diagnostics"][0]["code"], "E0300");
        assert!(value["diagnostics"][0].get("trace").is_none());
    }
}
