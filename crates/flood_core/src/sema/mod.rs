//! Name resolution.
//!
//! One walk over the AST that classifies every declaration as local or global,
//! writes the resolved [`SymbolId`] back into the tree and collects every
//! scoping error instead of stopping at the first one.

mod expr;
mod stmt;

use crate::ast::{Decl, FnDecl, Program};
use crate::diagnostics::{diagnostic, Diagnostic, Span};
use crate::symbol::{hash_name, SymbolId, SymbolKind, SymbolTable};
use std::collections::HashSet;

/// Upper bound on locals alive in one function; matches the 1-byte slot operand.
pub const MAX_LOCALS: usize = 256;

/// Depth of parameters and of a function body's top-level statements.
const FUNCTION_DEPTH: usize = 1;

struct ScopeEntry {
    name: String,
    hash: u32,
    id: SymbolId,
    depth: usize,
}

/// Resolves `program` in place. `predeclared` names (host natives) occupy the
/// first global symbols in order.
pub fn analyze(
    program: &mut Program,
    predeclared: &[&str],
    file: &str,
) -> (SymbolTable, Vec<Diagnostic>) {
    let mut analyzer = Analyzer::new(file);
    for name in predeclared {
        analyzer.declare_global(name, Span::default());
    }
    analyzer.hoist_globals(program);
    for decl in &mut program.decls {
        match decl {
            Decl::Fn(function) => analyzer.analyze_function(function),
            Decl::Var(var) => {
                if let Some(init) = &mut var.init {
                    analyzer.analyze_expr(init);
                }
            }
        }
    }
    (analyzer.symbols, analyzer.diagnostics)
}

pub(crate) struct Analyzer<'a> {
    file: &'a str,
    diagnostics: Vec<Diagnostic>,
    symbols: SymbolTable,
    globals: Vec<ScopeEntry>,
    locals: Vec<ScopeEntry>,
    depth: usize,
    overflow_reported: bool,
}

impl<'a> Analyzer<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            file,
            diagnostics: Vec::new(),
            symbols: SymbolTable::new(),
            globals: Vec::new(),
            locals: Vec::new(),
            depth: 0,
            overflow_reported: false,
        }
    }

    /// Registers every top-level name before any body is visited so functions
    /// can call each other regardless of order.
    fn hoist_globals(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            match decl {
                Decl::Fn(function) => {
                    function.id = Some(self.declare_global(&function.name, function.name_span));
                }
                Decl::Var(var) => {
                    var.id = Some(self.declare_global(&var.name, var.name_span));
                }
            }
        }
    }

    fn analyze_function(&mut self, function: &mut FnDecl) {
        self.locals.clear();
        self.overflow_reported = false;
        self.depth = FUNCTION_DEPTH;

        for param in &mut function.params {
            if self.find_at_depth(&param.name, FUNCTION_DEPTH).is_some() {
                self.diagnostics.push(diagnostic(
                    "E0303",
                    format!("`{}` used as parameter more than once", param.name),
                    self.file,
                    param.span,
                    vec!["Parameter names must be unique.".to_string()],
                    None,
                ));
            }
            param.id = Some(self.push_local(&param.name, param.span));
        }

        for stmt in &mut function.body.stmts {
            self.analyze_stmt(stmt);
        }

        self.locals.clear();
        self.depth = 0;
    }

    fn declare_global(&mut self, name: &str, span: Span) -> SymbolId {
        if let Some(previous) = self.globals.iter().find(|entry| entry.name == name) {
            let previous = self.symbols.get(previous.id).span;
            self.diagnostics.push(redeclared(self.file, name, span, previous));
        }
        let id = self.symbols.push(name, span, SymbolKind::Global);
        self.globals.push(ScopeEntry {
            name: name.to_string(),
            hash: hash_name(name),
            id,
            depth: 0,
        });
        id
    }

    pub(crate) fn declare_local(&mut self, name: &str, span: Span) -> SymbolId {
        if let Some(previous) = self.find_at_depth(name, self.depth) {
            let previous = self.symbols.get(previous).span;
            self.diagnostics.push(redeclared(self.file, name, span, previous));
        }
        self.push_local(name, span)
    }

    fn push_local(&mut self, name: &str, span: Span) -> SymbolId {
        if self.locals.len() >= MAX_LOCALS && !self.overflow_reported {
            self.overflow_reported = true;
            self.diagnostics.push(diagnostic(
                "E0304",
                "too many local variables in function",
                self.file,
                span,
                vec![format!("At most {MAX_LOCALS} locals may be live at once.")],
                None,
            ));
        }
        let id = self.symbols.push(name, span, SymbolKind::Local);
        self.locals.push(ScopeEntry {
            name: name.to_string(),
            hash: hash_name(name),
            id,
            depth: self.depth,
        });
        id
    }

    /// Only the innermost run of entries can share `depth`.
    fn find_at_depth(&self, name: &str, depth: usize) -> Option<SymbolId> {
        let hash = hash_name(name);
        self.locals
            .iter()
            .rev()
            .take_while(|entry| entry.depth == depth)
            .find(|entry| entry.hash == hash && entry.name == name)
            .map(|entry| entry.id)
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<SymbolId> {
        let hash = hash_name(name);
        self.locals
            .iter()
            .rev()
            .chain(self.globals.iter().rev())
            .find(|entry| entry.hash == hash && entry.name == name)
            .map(|entry| entry.id)
    }

    pub(crate) fn begin_scope(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn end_scope(&mut self) {
        while self
            .locals
            .last()
            .is_some_and(|entry| entry.depth == self.depth)
        {
            self.locals.pop();
        }
        self.depth -= 1;
    }

    fn suggest_name(&self, name: &str) -> Option<String> {
        let candidates: HashSet<&str> = self
            .locals
            .iter()
            .chain(self.globals.iter())
            .map(|entry| entry.name.as_str())
            .collect();
        best_suggestion(name, candidates.into_iter())
    }
}

fn redeclared(file: &str, name: &str, span: Span, previous: Span) -> Diagnostic {
    let note = if previous == Span::default() {
        format!("`{name}` is a builtin.")
    } else {
        format!("Previous declaration on line {}.", previous.start.line)
    };
    diagnostic(
        "E0301",
        format!("redeclared variable `{name}`"),
        file,
        span,
        vec![note],
        Some("Shadowing is only allowed in a nested block.".to_string()),
    )
}

fn notes_with_suggestion(mut notes: Vec<String>, suggestion: Option<String>) -> Vec<String> {
    if let Some(suggestion) = suggestion {
        notes.push(format!("Did you mean `{suggestion}`?"));
    }
    notes
}

fn best_suggestion<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        let distance = edit_distance(name, candidate);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }

    let (candidate, distance) = best?;
    if distance <= max_suggestion_distance(name.len()) {
        Some(candidate.to_string())
    } else {
        None
    }
}

fn max_suggestion_distance(len: usize) -> usize {
    if len <= 4 {
        1
    } else if len <= 8 {
        2
    } else {
        3
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        prev.clone_from_slice(&curr);
    }

    prev[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Stmt};
    use crate::{lexer, parser};

    fn check(source: &str) -> (Program, SymbolTable, Vec<Diagnostic>) {
        let tokens = lexer::lex(source).unwrap();
        let mut program = parser::parse(&tokens).unwrap();
        let (symbols, diags) = analyze(&mut program, &["clock"], "test.fl");
        (program, symbols, diags)
    }

    fn codes(source: &str) -> Vec<&'static str> {
        check(source).2.into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn analyze_simple_ok() {
        let (_, symbols, diags) = check("var g = 1;\nfn main() { var x = g; print x + clock(); }");
        assert!(diags.is_empty(), "{diags:?}");
        // clock, g, main, x
        assert_eq!(symbols.len(), 4);
    }

    #[test]
    fn analyze_reports_unknown_name_with_suggestion() {
        let (_, _, diags) = check("fn main() { var count = 1; print coun; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0300");
        assert_eq!(diags[0].message, "`coun` not found in this scope");
        assert!(diags[0].notes.iter().any(|note| note.contains("count")));
    }

    #[test]
    fn analyze_allows_shadowing_in_nested_block() {
        let (program, symbols, diags) =
            check("fn main() { var x = 1; { var x = 2; print x; } print x; }");
        assert!(diags.is_empty());
        let Decl::Fn(main) = &program.decls[0] else {
            panic!("expected function");
        };
        let Stmt::Var(outer) = &main.body.stmts[0] else {
            panic!("expected var");
        };
        let Stmt::Block(block) = &main.body.stmts[1] else {
            panic!("expected block");
        };
        let Stmt::Var(inner) = &block.stmts[0] else {
            panic!("expected var");
        };
        let Stmt::Print { expr, .. } = &block.stmts[1] else {
            panic!("expected print");
        };
        let ExprKind::Ident { id: inner_use, .. } = &expr.kind else {
            panic!("expected ident");
        };
        let Stmt::Print { expr, .. } = &main.body.stmts[2] else {
            panic!("expected print");
        };
        let ExprKind::Ident { id: outer_use, .. } = &expr.kind else {
            panic!("expected ident");
        };
        assert_ne!(outer.id, inner.id);
        assert_eq!(*inner_use, inner.id);
        assert_eq!(*outer_use, outer.id);
        assert_eq!(symbols.get(inner.id.unwrap()).kind, SymbolKind::Local);
    }

    #[test]
    fn analyze_rejects_redeclaration_at_same_depth() {
        assert_eq!(codes("fn main() { var x = 1; var x = 2; }"), vec!["E0301"]);
        assert_eq!(codes("var g; var g;\nfn main() { }"), vec!["E0301"]);
        assert_eq!(codes("fn clock() { }"), vec!["E0301"]);
    }

    #[test]
    fn analyze_rejects_param_redeclared_in_body() {
        assert_eq!(codes("fn f(a) { var a = 1; }"), vec!["E0301"]);
    }

    #[test]
    fn analyze_rejects_duplicate_params() {
        let (_, _, diags) = check("fn f(a, a) { }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "`a` used as parameter more than once");
    }

    #[test]
    fn analyze_hoists_functions() {
        let source = "fn main() { print even(4); }\nfn even(n) { if (n == 0) { return true; } return odd(n - 1); }\nfn odd(n) { if (n == 0) { return false; } return even(n - 1); }";
        assert!(codes(source).is_empty());
    }

    #[test]
    fn analyze_var_initializer_sees_outer_binding() {
        let (_, _, diags) = check("fn main() { var x = 1; { var x = x + 1; print x; } }");
        assert!(diags.is_empty());
        assert_eq!(codes("fn main() { var y = y; }"), vec!["E0300"]);
    }

    #[test]
    fn analyze_block_locals_leave_scope() {
        assert_eq!(codes("fn main() { { var t = 1; } print t; }"), vec!["E0300"]);
    }

    #[test]
    fn analyze_rejects_invalid_assignment_target() {
        assert_eq!(codes("fn main() { var x; x + 1 = 2; }"), vec!["E0302"]);
        assert!(codes("fn main() { var xs = [1]; xs[0] += 2; }").is_empty());
    }

    #[test]
    fn analyze_collects_all_errors() {
        let diags = codes("fn main() { print a; print b; var c; var c; }");
        assert_eq!(diags, vec!["E0300", "E0300", "E0301"]);
    }

    #[test]
    fn analyze_reports_local_overflow_once() {
        let mut body = String::new();
        for i in 0..(MAX_LOCALS + 3) {
            body.push_str(&format!("var v{i};"));
        }
        let source = format!("fn main() {{ {body} }}");
        assert_eq!(codes(&source), vec!["E0304"]);
    }
}
