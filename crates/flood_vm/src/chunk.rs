use crate::heap::Heap;
use crate::value::{display, Value};
use std::fmt::Write;

/// Most constants one chunk can address with a 1-byte operand.
pub const MAX_CONSTANTS: usize = 256;

macro_rules! opcodes {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum OpCode {
            $($variant),+
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[$(OpCode::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name),+
                }
            }
        }
    };
}

opcodes! {
    Constant => "CONSTANT",
    Null => "NULL",
    True => "TRUE",
    False => "FALSE",
    Pop => "POP",
    PopN => "POP_N",
    GetLocal => "GET_LOCAL",
    SetLocal => "SET_LOCAL",
    GetGlobal => "GET_GLOBAL",
    SetGlobal => "SET_GLOBAL",
    Add => "ADD",
    Sub => "SUB",
    Mul => "MUL",
    Div => "DIV",
    FloorDiv => "FLOOR_DIV",
    Mod => "MOD",
    Equal => "EQUAL",
    NotEqual => "NOT_EQUAL",
    Less => "LESS",
    LessEqual => "LESS_EQUAL",
    Greater => "GREATER",
    GreaterEqual => "GREATER_EQUAL",
    Negate => "NEGATE",
    Not => "NOT",
    List => "LIST",
    GetIndex => "GET_INDEX",
    SetIndex => "SET_INDEX",
    Jump => "JUMP",
    JumpIfFalse => "JUMP_IF_FALSE",
    JumpIfTrue => "JUMP_IF_TRUE",
    Call => "CALL",
    Invoke => "INVOKE",
    Return => "RETURN",
    Print => "PRINT",
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}

/// Bytecode, constants and a run-length line table for one function.
#[derive(Debug, Default, Clone)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    /// `(line, run)` pairs covering `code` in order.
    pub lines: Vec<(u32, u32)>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        match self.lines.last_mut() {
            Some((last, run)) if *last == line => *run += 1,
            _ => self.lines.push((line, 1)),
        }
    }

    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op as u8, line);
    }

    /// `None` once the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        if self.constants.len() >= MAX_CONSTANTS {
            return None;
        }
        self.constants.push(value);
        Some((self.constants.len() - 1) as u8)
    }

    pub fn line_at(&self, offset: usize) -> u32 {
        let mut covered = 0usize;
        for (line, run) in &self.lines {
            covered += *run as usize;
            if covered > offset {
                return *line;
            }
        }
        self.lines.last().map(|(line, _)| *line).unwrap_or(0)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)?;
        let lo = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn disassemble(&self, name: &str, heap: &Heap) -> String {
        let mut out = format!("== {name} ==\n");
        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instruction(heap, offset, &mut out);
        }
        out
    }

    fn disassemble_instruction(&self, heap: &Heap, offset: usize, out: &mut String) -> usize {
        let _ = write!(out, "{offset:04} ");
        let line = self.line_at(offset);
        if offset > 0 && line == self.line_at(offset - 1) {
            out.push_str("   | ");
        } else {
            let _ = write!(out, "{line:4} ");
        }

        let op = match OpCode::try_from(self.code[offset]) {
            Ok(op) => op,
            Err(byte) => {
                let _ = writeln!(out, "<unknown {byte}>");
                return offset + 1;
            }
        };
        let byte = |at: usize| self.code.get(at).copied().unwrap_or(0);
        match op {
            OpCode::Constant => {
                let index = byte(offset + 1);
                let _ = writeln!(out, "{:<16} {index:4} '{}'", op.name(), self.constant_text(heap, index));
                offset + 2
            }
            OpCode::PopN
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::List
            | OpCode::Call => {
                let _ = writeln!(out, "{:<16} {:4}", op.name(), byte(offset + 1));
                offset + 2
            }
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                let jump = self.read_u16(offset + 1).unwrap_or(0) as usize;
                let _ = writeln!(out, "{:<16} {offset:4} -> {}", op.name(), offset + 3 + jump);
                offset + 3
            }
            OpCode::Invoke => {
                let index = byte(offset + 1);
                let argc = byte(offset + 2);
                let _ = writeln!(
                    out,
                    "{:<16} ({argc} args) {index:4} '{}'",
                    op.name(),
                    self.constant_text(heap, index)
                );
                offset + 3
            }
            _ => {
                let _ = writeln!(out, "{}", op.name());
                offset + 1
            }
        }
    }

    fn constant_text(&self, heap: &Heap, index: u8) -> String {
        self.constants
            .get(index as usize)
            .map(|value| display(heap, *value))
            .unwrap_or_else(|| "?".to_string())
    }
}
