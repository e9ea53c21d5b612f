use super::{notes_with_suggestion, Analyzer};
use crate::ast::{Expr, ExprKind};
use crate::diagnostics::diagnostic;

impl<'a> Analyzer<'a> {
    pub(super) fn analyze_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Null | ExprKind::Bool(_) | ExprKind::Number(_) | ExprKind::Str(_) => {}
            ExprKind::Ident { name, id } => {
                *id = self.resolve(name);
                if id.is_none() {
                    let suggestion = self.suggest_name(name);
                    let notes = notes_with_suggestion(
                        vec!["Declare it with `var` before use.".to_string()],
                        suggestion,
                    );
                    self.diagnostics.push(diagnostic(
                        "E0300",
                        format!("`{name}` not found in this scope"),
                        self.file,
                        expr.span,
                        notes,
                        None,
                    ));
                }
            }
            ExprKind::Unary { expr, .. } => self.analyze_expr(expr),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.analyze_expr(left);
                self.analyze_expr(right);
            }
            ExprKind::List(elements) => {
                for element in elements {
                    self.analyze_expr(element);
                }
            }
            ExprKind::Index { base, index } => {
                self.analyze_expr(base);
                self.analyze_expr(index);
            }
            ExprKind::Assign { target, value, .. } => {
                if !matches!(target.kind, ExprKind::Ident { .. } | ExprKind::Index { .. }) {
                    self.diagnostics.push(diagnostic(
                        "E0302",
                        "cannot assign to left-hand expression",
                        self.file,
                        target.span,
                        vec!["Only variables and list elements can be assigned.".to_string()],
                        None,
                    ));
                }
                self.analyze_expr(target);
                self.analyze_expr(value);
            }
            ExprKind::Call { callee, args } => {
                self.analyze_expr(callee);
                for arg in args {
                    self.analyze_expr(arg);
                }
            }
            ExprKind::GetProperty { object, .. } => self.analyze_expr(object),
        }
    }
}
