use super::Analyzer;
use crate::ast::{Block, Stmt};

impl<'a> Analyzer<'a> {
    pub(super) fn analyze_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(block) => self.analyze_block(block),
            Stmt::Var(var) => {
                if let Some(init) = &mut var.init {
                    self.analyze_expr(init);
                }
                var.id = Some(self.declare_local(&var.name, var.name_span));
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.analyze_expr(cond);
                self.analyze_block(then_block);
                if let Some(else_block) = else_block {
                    self.analyze_block(else_block);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.analyze_expr(value);
                }
            }
            Stmt::Print { expr, .. } | Stmt::Expr { expr, .. } => self.analyze_expr(expr),
        }
    }

    fn analyze_block(&mut self, block: &mut Block) {
        self.begin_scope();
        for stmt in &mut block.stmts {
            self.analyze_stmt(stmt);
        }
        self.end_scope();
    }
}
