//! Single-pass bytecode generation over a resolved AST.

mod expr;

use crate::chunk::{Chunk, OpCode};
use crate::heap::{Function, Heap, ObjRef, Object};
use crate::value::Value;
use flood_core::ast::{Block, Decl, FnDecl, Program, Stmt};
use flood_core::symbol::{SymbolId, SymbolKind, SymbolTable};
use flood_core::{diagnostic, Diagnostic, Span};
use tracing::debug;

/// Globals and locals are addressed with a 1-byte operand.
pub const MAX_SLOTS: usize = 256;
/// Call arguments and list literal elements share the 1-byte count operand.
pub const MAX_ARGS: usize = 255;

/// Compiles a resolved program into its top-level script function. Every
/// function declared in `program` becomes a constant of the script.
pub fn compile(
    heap: &mut Heap,
    program: &Program,
    symbols: &mut SymbolTable,
    file: &str,
) -> Result<ObjRef, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    assign_global_slots(symbols, file, &mut diagnostics);

    let mut functions = Vec::new();
    for decl in &program.decls {
        if let Decl::Fn(function) = decl {
            let obj = compile_function(heap, symbols, file, &mut diagnostics, function);
            functions.push((function, obj));
        }
    }

    let mut script = FuncCompiler::new(heap, symbols, file, &mut diagnostics, "script", 0);
    for (decl, obj) in functions {
        let line = decl.span.start.line;
        script.emit_constant(Value::Obj(obj), decl.span);
        if let Some(id) = decl.id {
            script.emit_store(id, line);
        }
        script.emit_op(OpCode::Pop, line);
    }
    for decl in &program.decls {
        if let Decl::Var(var) = decl {
            let line = var.span.start.line;
            match &var.init {
                Some(init) => script.compile_expr(init),
                None => script.emit_op(OpCode::Null, line),
            }
            if let Some(id) = var.id {
                script.emit_store(id, line);
            }
            script.emit_op(OpCode::Pop, line);
        }
    }
    let main = program.decls.iter().find_map(|decl| match decl {
        Decl::Fn(function) if function.name == "main" => function.id,
        _ => None,
    });
    let end_line = program
        .decls
        .last()
        .map(|decl| match decl {
            Decl::Fn(function) => function.span.end.line,
            Decl::Var(var) => var.span.end.line,
        })
        .unwrap_or(1);
    if let Some(id) = main {
        script.emit_load(id, end_line);
        script.emit_op_arg(OpCode::Call, 0, end_line);
        script.emit_op(OpCode::Pop, end_line);
    }
    script.emit_op(OpCode::Null, end_line);
    script.emit_op(OpCode::Return, end_line);
    let script = script.finish();

    if diagnostics.is_empty() {
        Ok(script)
    } else {
        Err(diagnostics)
    }
}

/// Number of global slots a compiled program needs.
pub fn global_count(symbols: &SymbolTable) -> usize {
    symbols
        .iter()
        .filter(|(_, symbol)| symbol.kind == SymbolKind::Global)
        .count()
}

/// Globals are numbered in declaration order, so predeclared natives keep
/// the slots the VM registered them in.
fn assign_global_slots(symbols: &mut SymbolTable, file: &str, diagnostics: &mut Vec<Diagnostic>) {
    let globals: Vec<(SymbolId, Span)> = symbols
        .iter()
        .filter(|(_, symbol)| symbol.kind == SymbolKind::Global)
        .map(|(id, symbol)| (id, symbol.span))
        .collect();
    for (slot, (id, span)) in globals.into_iter().enumerate() {
        if slot == MAX_SLOTS {
            diagnostics.push(diagnostic(
                "E0603",
                "too many global variables",
                file,
                span,
                vec![format!("At most {MAX_SLOTS} globals, builtins included.")],
                None,
            ));
        }
        symbols.set_slot(id, slot);
    }
}

fn compile_function(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    file: &str,
    diagnostics: &mut Vec<Diagnostic>,
    decl: &FnDecl,
) -> ObjRef {
    let mut compiler = FuncCompiler::new(heap, symbols, file, diagnostics, &decl.name, decl.params.len());
    if decl.params.len() > MAX_ARGS {
        compiler.error(
            "E0604",
            format!("too many parameters in `{}`", decl.name),
            decl.name_span,
        );
    }
    for param in &decl.params {
        match param.id {
            Some(id) => compiler.declare_local(id, param.span),
            None => compiler.stack_pos += 1,
        }
    }
    for stmt in &decl.body.stmts {
        compiler.compile_stmt(stmt);
    }
    let line = decl.body.span.end.line;
    compiler.emit_op(OpCode::Null, line);
    compiler.emit_op(OpCode::Return, line);
    compiler.finish()
}

pub(crate) struct FuncCompiler<'a> {
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    file: &'a str,
    diagnostics: &'a mut Vec<Diagnostic>,
    name: String,
    arity: usize,
    chunk: Chunk,
    /// Next free local slot, relative to the frame base.
    stack_pos: usize,
}

impl<'a> FuncCompiler<'a> {
    fn new(
        heap: &'a mut Heap,
        symbols: &'a mut SymbolTable,
        file: &'a str,
        diagnostics: &'a mut Vec<Diagnostic>,
        name: &str,
        arity: usize,
    ) -> Self {
        Self {
            heap,
            symbols,
            file,
            diagnostics,
            name: name.to_string(),
            arity,
            chunk: Chunk::new(),
            stack_pos: 0,
        }
    }

    fn finish(self) -> ObjRef {
        debug!(
            function = %self.name,
            arity = self.arity,
            bytes = self.chunk.code.len(),
            constants = self.chunk.constants.len(),
            "compiled function"
        );
        self.heap.alloc(Object::Function(Function {
            name: self.name,
            arity: self.arity,
            chunk: self.chunk,
        }))
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        let line = stmt.span().start.line;
        match stmt {
            Stmt::Block(block) => self.compile_block(block),
            Stmt::Var(var) => {
                match &var.init {
                    Some(init) => self.compile_expr(init),
                    None => self.emit_op(OpCode::Null, line),
                }
                match var.id {
                    Some(id) => self.declare_local(id, var.name_span),
                    None => self.stack_pos += 1,
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                self.compile_expr(cond);
                let then_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.compile_block(then_block);
                let else_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(then_jump, *span);
                self.emit_op(OpCode::Pop, line);
                if let Some(else_block) = else_block {
                    self.compile_block(else_block);
                }
                self.patch_jump(else_jump, *span);
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(value) => self.compile_expr(value),
                    None => self.emit_op(OpCode::Null, line),
                }
                self.emit_op(OpCode::Return, line);
            }
            Stmt::Print { expr, .. } => {
                self.compile_expr(expr);
                self.emit_op(OpCode::Print, line);
            }
            Stmt::Expr { expr, .. } => {
                self.compile_expr(expr);
                self.emit_op(OpCode::Pop, line);
            }
        }
    }

    /// Locals declared inside `block` are popped on exit and their slots
    /// handed back to later siblings.
    fn compile_block(&mut self, block: &Block) {
        let start = self.stack_pos;
        for stmt in &block.stmts {
            self.compile_stmt(stmt);
        }
        let line = block.span.end.line;
        let mut remaining = self.stack_pos - start;
        if remaining == 1 {
            self.emit_op(OpCode::Pop, line);
        } else {
            while remaining > 0 {
                let count = remaining.min(u8::MAX as usize);
                self.emit_op_arg(OpCode::PopN, count as u8, line);
                remaining -= count;
            }
        }
        self.stack_pos = start;
    }

    fn declare_local(&mut self, id: SymbolId, span: Span) {
        let slot = self.stack_pos;
        if slot == MAX_SLOTS {
            self.error("E0603", "too many local variables in function", span);
        }
        self.symbols.set_slot(id, slot);
        self.stack_pos += 1;
    }

    fn emit_load(&mut self, id: SymbolId, line: u32) {
        match self.resolved_slot(id) {
            Some((SymbolKind::Local, slot)) => self.emit_op_arg(OpCode::GetLocal, slot, line),
            Some((SymbolKind::Global, slot)) => self.emit_op_arg(OpCode::GetGlobal, slot, line),
            None => self.emit_op(OpCode::Null, line),
        }
    }

    /// Leaves the stored value on the stack.
    fn emit_store(&mut self, id: SymbolId, line: u32) {
        match self.resolved_slot(id) {
            Some((SymbolKind::Local, slot)) => self.emit_op_arg(OpCode::SetLocal, slot, line),
            Some((SymbolKind::Global, slot)) => self.emit_op_arg(OpCode::SetGlobal, slot, line),
            None => {}
        }
    }

    fn resolved_slot(&self, id: SymbolId) -> Option<(SymbolKind, u8)> {
        let symbol = self.symbols.get(id);
        let slot = u8::try_from(symbol.slot?).ok()?;
        Some((symbol.kind, slot))
    }

    fn emit_op(&mut self, op: OpCode, line: u32) {
        self.chunk.write_op(op, line);
    }

    fn emit_op_arg(&mut self, op: OpCode, arg: u8, line: u32) {
        self.chunk.write_op(op, line);
        self.chunk.write(arg, line);
    }

    fn emit_constant(&mut self, value: Value, span: Span) {
        let index = self.make_constant(value, span);
        self.emit_op_arg(OpCode::Constant, index, span.start.line);
    }

    fn make_constant(&mut self, value: Value, span: Span) -> u8 {
        match self.chunk.add_constant(value) {
            Some(index) => index,
            None => {
                self.error(
                    "E0601",
                    format!("too many constants in `{}`", self.name),
                    span,
                );
                0
            }
        }
    }

    /// Writes `op` with a placeholder offset; returns the opcode's position.
    fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        let offset = self.chunk.code.len();
        self.emit_op(op, line);
        self.chunk.write(0xff, line);
        self.chunk.write(0xff, line);
        offset
    }

    fn patch_jump(&mut self, offset: usize, span: Span) {
        let jump = self.chunk.code.len() - (offset + 3);
        let Ok(jump) = u16::try_from(jump) else {
            self.error("E0600", "jump too far", span);
            return;
        };
        let [hi, lo] = jump.to_be_bytes();
        self.chunk.code[offset + 1] = hi;
        self.chunk.code[offset + 2] = lo;
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(diagnostic(
            code,
            message,
            self.file,
            span,
            vec!["Code generation error".to_string()],
            None,
        ));
    }
}
