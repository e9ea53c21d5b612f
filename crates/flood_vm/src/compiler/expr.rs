use super::{FuncCompiler, MAX_ARGS};
use crate::chunk::OpCode;
use crate::value::Value;
use flood_core::ast::{BinaryOp, Expr, ExprKind, LogicalOp, UnaryOp};
use flood_core::Span;

impl<'a> FuncCompiler<'a> {
    pub(super) fn compile_expr(&mut self, expr: &Expr) {
        let line = expr.span.start.line;
        match &expr.kind {
            ExprKind::Null => self.emit_op(OpCode::Null, line),
            ExprKind::Bool(true) => self.emit_op(OpCode::True, line),
            ExprKind::Bool(false) => self.emit_op(OpCode::False, line),
            ExprKind::Number(value) => self.emit_constant(Value::Num(*value), expr.span),
            ExprKind::Str(_) => {
                self.error("E0602", "string literals are not supported", expr.span);
                self.emit_op(OpCode::Null, line);
            }
            ExprKind::Ident { id, .. } => match id {
                Some(id) => self.emit_load(*id, line),
                None => self.emit_op(OpCode::Null, line),
            },
            ExprKind::Unary { op, expr: operand } => {
                self.compile_expr(operand);
                let op = match op {
                    UnaryOp::Neg => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit_op(op, line);
            }
            ExprKind::Binary { left, op, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.emit_op(binary_opcode(*op), line);
            }
            ExprKind::Logical { left, op, right } => {
                self.compile_expr(left);
                let jump = match op {
                    LogicalOp::And => OpCode::JumpIfFalse,
                    LogicalOp::Or => OpCode::JumpIfTrue,
                };
                let end = self.emit_jump(jump, line);
                self.emit_op(OpCode::Pop, line);
                self.compile_expr(right);
                self.patch_jump(end, expr.span);
            }
            ExprKind::List(elements) => {
                let count = self.count_operand(elements.len(), "list elements", expr.span);
                for element in elements {
                    self.compile_expr(element);
                }
                self.emit_op_arg(OpCode::List, count, line);
            }
            ExprKind::Index { base, index } => {
                self.compile_expr(base);
                self.compile_expr(index);
                self.emit_op(OpCode::GetIndex, line);
            }
            ExprKind::Assign { target, op, value } => {
                let desugared;
                let value = match op.binary() {
                    Some(binary) => {
                        desugared = Expr {
                            kind: ExprKind::Binary {
                                left: target.clone(),
                                op: binary,
                                right: value.clone(),
                            },
                            span: expr.span,
                        };
                        &desugared
                    }
                    None => value.as_ref(),
                };
                self.compile_assign(target, value, expr.span);
            }
            ExprKind::Call { callee, args } => {
                let argc = self.count_operand(args.len(), "call arguments", expr.span);
                if let ExprKind::GetProperty { object, name } = &callee.kind {
                    self.compile_expr(object);
                    for arg in args {
                        self.compile_expr(arg);
                    }
                    let name_index = self.identifier_constant(name, callee.span);
                    self.emit_op_arg(OpCode::Invoke, name_index, line);
                    self.chunk.write(argc, line);
                } else {
                    self.compile_expr(callee);
                    for arg in args {
                        self.compile_expr(arg);
                    }
                    self.emit_op_arg(OpCode::Call, argc, line);
                }
            }
            ExprKind::GetProperty { .. } => {
                self.error(
                    "E0602",
                    "property access is only supported in method calls",
                    expr.span,
                );
                self.emit_op(OpCode::Null, line);
            }
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, span: Span) {
        let line = span.start.line;
        match &target.kind {
            ExprKind::Ident { id, .. } => {
                self.compile_expr(value);
                if let Some(id) = id {
                    self.emit_store(*id, line);
                }
            }
            ExprKind::Index { base, index } => {
                self.compile_expr(base);
                self.compile_expr(index);
                self.compile_expr(value);
                self.emit_op(OpCode::SetIndex, line);
            }
            _ => {
                self.error("E0602", "invalid assignment target", target.span);
                self.compile_expr(value);
            }
        }
    }

    /// Reuses an existing constant when the chunk already names `name`.
    fn identifier_constant(&mut self, name: &str, span: Span) -> u8 {
        let heap = &*self.heap;
        let existing = self.chunk.constants.iter().position(|constant| {
            constant
                .as_obj()
                .and_then(|obj| heap.string(obj).ok())
                .is_some_and(|string| string.chars == name)
        });
        if let Some(index) = existing {
            return index as u8;
        }
        let obj = self.heap.alloc_string(name);
        self.make_constant(Value::Obj(obj), span)
    }

    fn count_operand(&mut self, count: usize, what: &str, span: Span) -> u8 {
        match u8::try_from(count) {
            Ok(count) if (count as usize) <= MAX_ARGS => count,
            _ => {
                self.error(
                    "E0604",
                    format!("too many {what}: {count} (limit {MAX_ARGS})"),
                    span,
                );
                0
            }
        }
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::FloorDiv => OpCode::FloorDiv,
        BinaryOp::Mod => OpCode::Mod,
        BinaryOp::EqEq => OpCode::Equal,
        BinaryOp::NotEq => OpCode::NotEqual,
        BinaryOp::Lt => OpCode::Less,
        BinaryOp::LtEq => OpCode::LessEqual,
        BinaryOp::Gt => OpCode::Greater,
        BinaryOp::GtEq => OpCode::GreaterEqual,
    }
}
