use crate::chunk::OpCode;
use crate::compiler;
use crate::gc::{GcReport, Roots};
use crate::heap::{Heap, Native, ObjKind, ObjRef, Object};
use crate::natives;
use crate::runtime_error::{runtime_error, RuntimeError};
use crate::value::{display, format_number, type_name, Value};
use crate::InterpError;
use flood_core::ast::Program;
use flood_core::TraceFrame;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

const GC_MIN_THRESHOLD: usize = 1024;
const DEFAULT_MAX_FRAMES: usize = 256;
const SLOTS_PER_FRAME: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPolicy {
    /// Collect after every instruction.
    EveryInstruction,
    /// Collect once the live object count reaches the threshold; the next
    /// threshold is `max(2 * live, minimum)`.
    Threshold(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub max_frames: usize,
    pub max_stack: usize,
    pub gc: GcPolicy,
}

impl VmConfig {
    pub fn with_max_frames(max_frames: usize) -> Self {
        Self {
            max_frames,
            max_stack: max_frames.saturating_mul(SLOTS_PER_FRAME),
            ..Self::default()
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_stack: DEFAULT_MAX_FRAMES * SLOTS_PER_FRAME,
            gc: GcPolicy::Threshold(GC_MIN_THRESHOLD),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CallFrame {
    function: ObjRef,
    /// Stack index of local slot 0; the callee sits just below it.
    base: usize,
    ip: usize,
}

pub struct Vm {
    config: VmConfig,
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Vec<Value>,
    native_names: Vec<String>,
    methods: HashMap<ObjKind, HashMap<String, ObjRef>>,
    output: String,
    next_gc: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let next_gc = match config.gc {
            GcPolicy::EveryInstruction => 0,
            GcPolicy::Threshold(min) => min,
        };
        let mut vm = Self {
            config,
            heap: Heap::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Vec::new(),
            native_names: Vec::new(),
            methods: HashMap::new(),
            output: String::new(),
            next_gc,
        };
        natives::install(&mut vm);
        vm
    }

    /// Registers a global function. Natives take the next global slot and
    /// are visible to every program run afterwards.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        code: impl Fn(&mut Heap, &[Value]) -> Result<Value, String> + 'static,
    ) {
        let native = self.alloc_native(name, arity, code);
        let slot = self.native_names.len();
        self.globals.truncate(slot);
        self.globals.push(Value::Obj(native));
        self.native_names.push(name.to_string());
    }

    /// Registers a method for every object of `kind`. `arity` excludes the
    /// receiver, which the native gets as its first argument.
    pub fn define_method(
        &mut self,
        kind: ObjKind,
        name: &str,
        arity: usize,
        code: impl Fn(&mut Heap, &[Value]) -> Result<Value, String> + 'static,
    ) {
        let native = self.alloc_native(name, arity, code);
        self.methods
            .entry(kind)
            .or_default()
            .insert(name.to_string(), native);
    }

    fn alloc_native(
        &mut self,
        name: &str,
        arity: usize,
        code: impl Fn(&mut Heap, &[Value]) -> Result<Value, String> + 'static,
    ) -> ObjRef {
        self.heap.alloc(Object::Native(Native {
            name: name.to_string(),
            arity,
            code: Rc::new(code),
        }))
    }

    pub fn run_source(&mut self, file: &str, source: &str) -> Result<(), InterpError> {
        let mut program = flood_core::parse_source(file, source).map_err(InterpError::Compile)?;
        self.run(&mut program, file)
    }

    pub fn run(&mut self, program: &mut Program, file: &str) -> Result<(), InterpError> {
        let script = self.compile(program, file)?;
        self.execute(script).map_err(InterpError::Runtime)
    }

    /// Resolves and compiles `program` against this VM's natives and sizes
    /// the globals for it.
    pub fn compile(&mut self, program: &mut Program, file: &str) -> Result<ObjRef, InterpError> {
        let predeclared: Vec<&str> = self.native_names.iter().map(String::as_str).collect();
        let mut symbols = flood_core::analyze_program(file, program, &predeclared)
            .map_err(InterpError::Compile)?;
        let script = compiler::compile(&mut self.heap, program, &mut symbols, file)
            .map_err(InterpError::Compile)?;
        self.globals.truncate(self.native_names.len());
        self.globals
            .resize(compiler::global_count(&symbols), Value::Nil);
        Ok(script)
    }

    /// Disassembly of the script followed by every function it declares.
    pub fn disassemble(&mut self, program: &mut Program, file: &str) -> Result<String, InterpError> {
        let script = self.compile(program, file)?;
        let script_fn = self.heap.function(script).map_err(RuntimeError::from)?;
        let mut out = script_fn.chunk.disassemble(&script_fn.name, &self.heap);
        for constant in &script_fn.chunk.constants {
            if let Some(function) = constant.as_obj().and_then(|obj| self.heap.function(obj).ok()) {
                out.push('\n');
                out.push_str(&function.chunk.disassemble(&function.name, &self.heap));
            }
        }
        Ok(out)
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn global(&self, slot: usize) -> Option<Value> {
        self.globals.get(slot).copied()
    }

    pub fn collect_garbage(&mut self) -> GcReport {
        let frames: Vec<ObjRef> = self.frames.iter().map(|frame| frame.function).collect();
        let pinned: Vec<Value> = self
            .methods
            .values()
            .flat_map(|methods| methods.values())
            .map(|native| Value::Obj(*native))
            .collect();
        let roots = Roots {
            stack: &self.stack,
            globals: &self.globals,
            frames: &frames,
            pinned: &pinned,
        };
        self.heap.collect(&roots)
    }

    fn execute(&mut self, script: ObjRef) -> Result<(), RuntimeError> {
        debug!(globals = self.globals.len(), "run start");
        self.stack.clear();
        self.frames.clear();
        self.stack.push(Value::Obj(script));
        self.frames.push(CallFrame {
            function: script,
            base: 1,
            ip: 0,
        });
        match self.dispatch() {
            Ok(()) => {
                debug!(live = self.heap.live_count(), "run finished");
                Ok(())
            }
            Err(mut err) => {
                err.trace = self.trace();
                debug!(code = err.code, message = %err.message, "runtime error");
                self.stack.clear();
                self.frames.clear();
                Err(err)
            }
        }
    }

    /// The script frame only shows up when the error happened in a
    /// top-level initializer.
    fn trace(&self) -> Vec<TraceFrame> {
        let skip = usize::from(self.frames.len() > 1);
        self.frames[skip..]
            .iter()
            .rev()
            .filter_map(|frame| {
                let function = self.heap.function(frame.function).ok()?;
                Some(TraceFrame {
                    function: function.name.clone(),
                    line: function.chunk.line_at(frame.ip.saturating_sub(1)),
                })
            })
            .collect()
    }

    fn dispatch(&mut self) -> Result<(), RuntimeError> {
        loop {
            let byte = self.read_byte()?;
            let op = OpCode::try_from(byte)
                .map_err(|byte| runtime_error("E0400", format!("unknown opcode {byte}")))?;
            match op {
                OpCode::Constant => {
                    let value = self.read_constant()?;
                    self.push(value)?;
                }
                OpCode::Null => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop()?;
                }
                OpCode::PopN => {
                    let count = self.read_byte()? as usize;
                    let len = self.stack.len().saturating_sub(count);
                    self.stack.truncate(len);
                }
                OpCode::GetLocal => {
                    let index = self.local_index()?;
                    let value = self.stack[index];
                    self.push(value)?;
                }
                OpCode::SetLocal => {
                    let index = self.local_index()?;
                    self.stack[index] = self.peek(0)?;
                }
                OpCode::GetGlobal => {
                    let slot = self.read_byte()? as usize;
                    let value = self.globals.get(slot).copied().ok_or_else(|| undefined_global(slot))?;
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let slot = self.read_byte()? as usize;
                    let value = self.peek(0)?;
                    let global = self.globals.get_mut(slot).ok_or_else(|| undefined_global(slot))?;
                    *global = value;
                }
                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::FloorDiv
                | OpCode::Mod
                | OpCode::Less
                | OpCode::LessEqual
                | OpCode::Greater
                | OpCode::GreaterEqual => self.numeric_binary(op)?,
                OpCode::Equal | OpCode::NotEqual => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = left == right;
                    self.push(Value::Bool(if op == OpCode::Equal { equal } else { !equal }))?;
                }
                OpCode::Negate => match self.pop()? {
                    Value::Num(value) => self.push(Value::Num(-value))?,
                    _ => return Err(runtime_error("E0401", "operand must be number")),
                },
                OpCode::Not => match self.pop()? {
                    Value::Bool(value) => self.push(Value::Bool(!value))?,
                    _ => return Err(runtime_error("E0401", "operand must be boolean")),
                },
                OpCode::List => {
                    let count = self.read_byte()? as usize;
                    let start = self
                        .stack
                        .len()
                        .checked_sub(count)
                        .ok_or_else(stack_underflow)?;
                    let elements = self.stack.split_off(start);
                    let list = self.heap.alloc(Object::List(elements));
                    self.push(Value::Obj(list))?;
                }
                OpCode::GetIndex => {
                    let index = self.pop()?;
                    let base = self.pop()?;
                    let list = self.subscript(base)?;
                    let elements = self.heap.list(list)?;
                    let position = list_position(index, elements.len())?;
                    let value = elements[position];
                    self.push(value)?;
                }
                OpCode::SetIndex => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let base = self.pop()?;
                    let list = self.subscript(base)?;
                    let elements = self.heap.list_mut(list)?;
                    let position = list_position(index, elements.len())?;
                    elements[position] = value;
                    self.push(value)?;
                }
                OpCode::Jump => {
                    let offset = self.read_u16()?;
                    self.frame_mut()?.ip += offset as usize;
                }
                OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                    let offset = self.read_u16()?;
                    let Value::Bool(condition) = self.peek(0)? else {
                        return Err(runtime_error("E0401", "operand must be boolean"));
                    };
                    if condition == (op == OpCode::JumpIfTrue) {
                        self.frame_mut()?.ip += offset as usize;
                    }
                }
                OpCode::Call => {
                    let argc = self.read_byte()? as usize;
                    let callee = self.peek(argc)?;
                    self.call_value(callee, argc)?;
                }
                OpCode::Invoke => {
                    let name = self.read_constant()?;
                    let argc = self.read_byte()? as usize;
                    self.invoke(name, argc)?;
                }
                OpCode::Return => {
                    let result = self.pop()?;
                    let frame = self.frames.pop().ok_or_else(no_frame)?;
                    if self.frames.is_empty() {
                        self.stack.clear();
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    if let Some(slot) = self.stack.last_mut() {
                        *slot = result;
                    }
                }
                OpCode::Print => {
                    let value = self.pop()?;
                    self.output.push_str(&display(&self.heap, value));
                    self.output.push('\n');
                }
            }
            self.maybe_collect();
        }
    }

    fn numeric_binary(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let (Value::Num(a), Value::Num(b)) = (left, right) else {
            return Err(runtime_error("E0401", "operands must be numbers"));
        };
        let result = match op {
            OpCode::Add => Value::Num(a + b),
            OpCode::Sub => Value::Num(a - b),
            OpCode::Mul => Value::Num(a * b),
            OpCode::Div => Value::Num(a / b),
            OpCode::FloorDiv => Value::Num((a / b).floor()),
            OpCode::Mod => Value::Num(a % b),
            OpCode::Less => Value::Bool(a < b),
            OpCode::LessEqual => Value::Bool(a <= b),
            OpCode::Greater => Value::Bool(a > b),
            OpCode::GreaterEqual => Value::Bool(a >= b),
            _ => return Err(runtime_error("E0400", format!("{} is not arithmetic", op.name()))),
        };
        self.push(result)
    }

    fn subscript(&self, base: Value) -> Result<ObjRef, RuntimeError> {
        match base {
            Value::Obj(obj) if self.heap.kind(obj)? == ObjKind::List => Ok(obj),
            _ => Err(runtime_error("E0403", "object is not subscriptable")),
        }
    }

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        let obj = match callee {
            Value::Obj(obj) => obj,
            other => return Err(not_callable(type_name(&self.heap, other))),
        };
        let native = match self.heap.get(obj)? {
            Object::Function(function) => {
                check_arity(&function.name, function.arity, argc)?;
                None
            }
            Object::Native(native) => {
                check_arity(&native.name, native.arity, argc)?;
                Some(Rc::clone(&native.code))
            }
            other => return Err(not_callable(other.kind().name())),
        };
        match native {
            Some(code) => self.call_native(code, argc + 1, argc),
            None => {
                if self.frames.len() >= self.config.max_frames {
                    return Err(stack_overflow());
                }
                let base = self.stack.len() - argc;
                self.frames.push(CallFrame {
                    function: obj,
                    base,
                    ip: 0,
                });
                Ok(())
            }
        }
    }

    fn invoke(&mut self, name: Value, argc: usize) -> Result<(), RuntimeError> {
        let name_obj = name
            .as_obj()
            .ok_or_else(|| runtime_error("E0400", "method name must be a string"))?;
        let name = self.heap.string(name_obj)?.chars.clone();
        let receiver = self.peek(argc)?;
        let kind = match receiver {
            Value::Obj(obj) => Some(self.heap.kind(obj)?),
            _ => None,
        };
        let method = kind
            .and_then(|kind| self.methods.get(&kind))
            .and_then(|methods| methods.get(&name))
            .copied()
            .ok_or_else(|| {
                runtime_error(
                    "E0406",
                    format!("undefined method `{name}` for {}", type_name(&self.heap, receiver)),
                )
            })?;
        let native = self.heap.native(method)?;
        check_arity(&native.name, native.arity, argc)?;
        let code = Rc::clone(&native.code);
        self.call_native(code, argc + 1, argc + 1)
    }

    /// Runs `code` on the top `argc` values and replaces the top `popped`
    /// values with its result.
    fn call_native(
        &mut self,
        code: crate::heap::NativeFn,
        popped: usize,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let len = self.stack.len();
        let args: Vec<Value> = self.stack[len - argc..].to_vec();
        let result = code(&mut self.heap, &args).map_err(|message| runtime_error("E0400", message))?;
        self.stack.truncate(len - popped);
        self.push(result)
    }

    fn maybe_collect(&mut self) {
        match self.config.gc {
            GcPolicy::EveryInstruction => {
                self.collect_garbage();
            }
            GcPolicy::Threshold(min) => {
                if self.heap.live_count() >= self.next_gc {
                    let report = self.collect_garbage();
                    self.next_gc = report.live.saturating_mul(2).max(min);
                }
            }
        }
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack {
            return Err(stack_overflow());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(stack_underflow)
    }

    fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or_else(stack_underflow)
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    fn local_index(&mut self) -> Result<usize, RuntimeError> {
        let slot = self.read_byte()? as usize;
        let base = self.frame_mut()?.base;
        let index = base + slot;
        if index < self.stack.len() {
            Ok(index)
        } else {
            Err(runtime_error("E0400", format!("local slot {slot} is not on the stack")))
        }
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let function = self.heap.function(frame.function)?;
        let byte = *function
            .chunk
            .code
            .get(frame.ip)
            .ok_or_else(|| runtime_error("E0400", "instruction pointer ran past the chunk"))?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_constant(&mut self) -> Result<Value, RuntimeError> {
        let index = self.read_byte()? as usize;
        let frame = self.frames.last().ok_or_else(no_frame)?;
        self.heap
            .function(frame.function)?
            .chunk
            .constants
            .get(index)
            .copied()
            .ok_or_else(|| runtime_error("E0400", format!("constant {index} out of range")))
    }
}

fn check_arity(name: &str, arity: usize, argc: usize) -> Result<(), RuntimeError> {
    if arity == argc {
        return Ok(());
    }
    Err(runtime_error(
        "E0402",
        format!("incorrect number of arguments provided to `{name}`: expected {arity}, got {argc}"),
    ))
}

/// Lists are indexed by integral numbers in `0..len`.
fn list_position(index: Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Num(index) = index else {
        return Err(runtime_error("E0403", "list index must be number"));
    };
    if index.fract() != 0.0 {
        return Err(runtime_error("E0403", "list index must be an integer"));
    }
    if index < 0.0 || index >= len as f64 {
        return Err(runtime_error(
            "E0403",
            format!("index {} out of bounds for list of size {len}", format_number(index)),
        ));
    }
    Ok(index as usize)
}

fn not_callable(type_name: &str) -> RuntimeError {
    runtime_error(
        "E0405",
        format!("attempt to call non-callable value of type {type_name}"),
    )
}

fn stack_overflow() -> RuntimeError {
    runtime_error("E0404", "stack overflow")
}

fn stack_underflow() -> RuntimeError {
    runtime_error("E0400", "value stack underflow")
}

fn no_frame() -> RuntimeError {
    runtime_error("E0400", "no active call frame")
}

fn undefined_global(slot: usize) -> RuntimeError {
    runtime_error("E0400", format!("global slot {slot} is not defined"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stress_vm() -> Vm {
        Vm::new(VmConfig {
            gc: GcPolicy::EveryInstruction,
            ..VmConfig::default()
        })
    }

    /// Slot of the first user global; the builtins come before it.
    fn first_user_global(vm: &Vm) -> usize {
        vm.native_names.len()
    }

    #[test]
    fn natives_occupy_the_first_globals() {
        let vm = Vm::default();
        assert_eq!(vm.native_names, vec!["clock".to_string(), "type".to_string()]);
        let Some(Value::Obj(clock)) = vm.global(0) else {
            panic!("expected native");
        };
        assert_eq!(vm.heap().native(clock).unwrap().name, "clock");
    }

    #[test]
    fn reachable_lists_survive_collection() {
        let mut vm = stress_vm();
        vm.run_source("t.fl", "var keep = [1, [2, 3]];\nfn main() { var tmp = [4]; tmp.push(5); }")
            .unwrap();
        assert_eq!(vm.stack_len(), 0);
        let slot = first_user_global(&vm);
        let keep = vm.global(slot).unwrap();
        vm.collect_garbage();
        assert_eq!(display(vm.heap(), keep), "[1, [2, 3]]");
        let keep = keep.as_obj().unwrap();
        assert!(vm.heap().is_live(keep));

        let before = vm.heap().live_count();
        vm.run_source("t.fl", "var keep = null;").unwrap();
        let report = vm.collect_garbage();
        assert!(!vm.heap().is_live(keep));
        assert!(report.live < before);
    }

    #[test]
    fn collection_during_calls_keeps_frames_alive() {
        let mut vm = stress_vm();
        let source = "fn build(n) { var xs = []; var i = [0]; if (n > 0) { xs.push(build(n - 1)); } xs.push(n); return xs; }\nfn main() { print build(3); }";
        vm.run_source("t.fl", source).unwrap();
        assert_eq!(vm.take_output(), "[[[[0], 1], 2], 3]\n");
    }

    #[test]
    fn threshold_policy_collects_garbage() {
        let mut vm = Vm::new(VmConfig {
            gc: GcPolicy::Threshold(16),
            ..VmConfig::default()
        });
        let source = format!(
            "fn churn(n) {{ if (n > 0) {{ var junk = [n, [n]]; churn(n - 1); }} }}\nfn main() {{ {} }}",
            "churn(20); ".repeat(10)
        );
        vm.run_source("t.fl", &source).unwrap();
        let stats = vm.heap().stats();
        assert!(stats.gc_runs > 0);
        assert!(stats.alloc_count >= 400);
        assert!(stats.peak_live < 100, "{stats:?}");
    }

    #[test]
    fn max_frames_is_configurable() {
        let mut vm = Vm::new(VmConfig::with_max_frames(5));
        let source = "fn depth(n) { if (n == 0) { return 0; } return depth(n - 1); }\nfn main() { depth(2); }";
        vm.run_source("t.fl", source).unwrap();
        let err = vm
            .run_source("t.fl", "fn depth(n) { if (n == 0) { return 0; } return depth(n - 1); }\nfn main() { depth(3); }")
            .unwrap_err();
        let InterpError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.message, "stack overflow");
        assert_eq!(vm.stack_len(), 0);
    }

    /// Deterministic generator of nested-block programs that print their
    /// locals, along with the output they must produce.
    struct ProgramGen {
        state: u64,
        names: usize,
        source: String,
        expected: String,
    }

    impl ProgramGen {
        fn new(seed: u64) -> Self {
            Self {
                state: seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1,
                names: 0,
                source: String::new(),
                expected: String::new(),
            }
        }

        fn next(&mut self, bound: u64) -> u64 {
            self.state ^= self.state << 13;
            self.state ^= self.state >> 7;
            self.state ^= self.state << 17;
            self.state % bound
        }

        fn block(&mut self, depth: usize, scopes: &mut Vec<Vec<(String, u64)>>) {
            scopes.push(Vec::new());
            for _ in 0..1 + self.next(5) {
                match self.next(4) {
                    0 | 1 => {
                        let name = format!("v{}", self.names);
                        self.names += 1;
                        let value = self.next(1000);
                        self.source.push_str(&format!("var {name} = {value}; "));
                        if let Some(scope) = scopes.last_mut() {
                            scope.push((name, value));
                        }
                    }
                    2 if depth < 4 => {
                        self.source.push_str("{ ");
                        self.block(depth + 1, scopes);
                        self.source.push_str("} ");
                    }
                    _ => {
                        let visible: Vec<(String, u64)> = scopes.iter().flatten().cloned().collect();
                        if visible.is_empty() {
                            continue;
                        }
                        let (name, value) = &visible[self.next(visible.len() as u64) as usize];
                        self.source.push_str(&format!("print {name}; "));
                        self.expected.push_str(&format!("{value}\n"));
                    }
                }
            }
            scopes.pop();
        }
    }

    #[test]
    fn nested_blocks_keep_the_stack_balanced() {
        for seed in 1..200 {
            let mut generator = ProgramGen::new(seed);
            generator.block(0, &mut Vec::new());
            let source = format!("fn main() {{ {} }}", generator.source);
            for config in [VmConfig::default(), VmConfig { gc: GcPolicy::EveryInstruction, ..VmConfig::default() }] {
                let mut vm = Vm::new(config);
                if let Err(err) = vm.run_source("gen.fl", &source) {
                    panic!("seed {seed}: {err:?}\n{source}");
                }
                assert_eq!(vm.take_output(), generator.expected, "seed {seed}\n{source}");
                assert_eq!(vm.stack_len(), 0);
            }
        }
    }
}
