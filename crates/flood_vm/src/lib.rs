//! Flood bytecode compiler and virtual machine.

mod chunk;
mod compiler;
mod gc;
mod heap;
mod natives;
mod runtime_error;
mod value;
mod vm;

pub use chunk::{Chunk, OpCode};
pub use compiler::compile;
pub use gc::{GcReport, Roots};
pub use heap::{Function, Heap, HeapError, HeapStats, Native, NativeFn, ObjKind, ObjRef, Object, StringObj};
pub use runtime_error::RuntimeError;
pub use value::{display, format_number, type_name, Value};
pub use vm::{GcPolicy, Vm, VmConfig};

use flood_core::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("compilation failed with {} error(s)", .0.len())]
    Compile(Vec<Diagnostic>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpError {
    pub fn into_diagnostics(self, file: &str) -> Vec<Diagnostic> {
        match self {
            InterpError::Compile(diagnostics) => diagnostics,
            InterpError::Runtime(err) => vec![err.to_diagnostic(file)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn run(source: &str) -> String {
        let mut vm = Vm::default();
        if let Err(err) = vm.run_source("test.fl", source) {
            panic!("unexpected error: {err:?}");
        }
        assert_eq!(vm.stack_len(), 0);
        vm.take_output()
    }

    fn run_err(source: &str) -> (String, RuntimeError) {
        let mut vm = Vm::default();
        match vm.run_source("test.fl", source) {
            Err(InterpError::Runtime(err)) => {
                assert_eq!(vm.stack_len(), 0);
                (vm.take_output(), err)
            }
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    fn compile_codes(source: &str) -> Vec<&'static str> {
        let mut vm = Vm::default();
        match vm.run_source("test.fl", source) {
            Err(InterpError::Compile(diags)) => diags.into_iter().map(|diag| diag.code).collect(),
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    fn fixture_path(rel: &str) -> PathBuf {
        let mut root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        root.pop();
        root.pop();
        root.push(rel);
        root
    }

    #[test]
    fn run_adds_locals() {
        assert_eq!(run("fn main() { var x = 3; var y = 4; print x + y; }"), "7\n");
    }

    #[test]
    fn run_arithmetic() {
        let output = run("fn main() { print 7 // 2; print -7 // 2; print 7 % 3; print 1 / 4; print 1 / 0; print 2 * (3 - 5); }");
        assert_eq!(output, "3\n-4\n1\n0.25\ninf\n-4\n");
    }

    #[test]
    fn run_comparisons_and_equality() {
        let output = run("fn main() { print 1 < 2; print 2 <= 1; print 3 == 3; print null == false; print true != false; print !true; }");
        assert_eq!(output, "true\nfalse\ntrue\nfalse\ntrue\nfalse\n");
    }

    #[test]
    fn run_if_takes_only_one_branch() {
        let output = run("fn main() { if (false) { print 1; } else { print 2; } if (true) { print 3; } }");
        assert_eq!(output, "2\n3\n");
    }

    #[test]
    fn run_else_if_chain() {
        let source = "fn sign(n) { if (n < 0) { return -1; } else if (n == 0) { return 0; } else { return 1; } }\nfn main() { print sign(-5); print sign(0); print sign(9); }";
        assert_eq!(run(source), "-1\n0\n1\n");
    }

    #[test]
    fn run_logical_operators_short_circuit() {
        let source = "fn crash() { print 99; return true; }\nfn main() { print false and crash(); print true or crash(); print true and false; print false or true; }";
        assert_eq!(run(source), "false\ntrue\nfalse\ntrue\n");
    }

    #[test]
    fn run_shadowed_locals_are_distinct() {
        let source = "fn main() { var x = 1; { var x = 2; print x; { var x = x + 1; print x; } } print x; }";
        assert_eq!(run(source), "2\n3\n1\n");
    }

    #[test]
    fn run_recursion_and_mutual_recursion() {
        let source = "fn fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }\nfn even(n) { if (n == 0) { return true; } return odd(n - 1); }\nfn odd(n) { if (n == 0) { return false; } return even(n - 1); }\nfn main() { print fib(15); print even(10); print odd(7); }";
        assert_eq!(run(source), "610\ntrue\ntrue\n");
    }

    #[test]
    fn run_globals_initialize_in_order() {
        let source = "var a = 2;\nvar b = a * 10;\nvar c;\nfn bump() { a += 1; return a; }\nfn main() { print b; print c; bump(); bump(); print a; }";
        assert_eq!(run(source), "20\nnull\n4\n");
    }

    #[test]
    fn run_assignment_is_an_expression() {
        assert_eq!(run("fn main() { var a; var b; a = b = 5; print a + b; }"), "10\n");
    }

    #[test]
    fn run_script_without_main() {
        assert_eq!(run("var x = 1;"), "");
    }

    #[test]
    fn run_list_methods() {
        let source = "fn main() { var xs = []; xs.push(1); xs.push(2); xs.push(3); print xs.len(); print xs.pop(); print xs; print xs.len(); }";
        assert_eq!(run(source), "3\n3\n[1, 2]\n2\n");
    }

    #[test]
    fn run_list_indexing() {
        let source = "fn main() { var xs = [10, [20, 30]]; xs[0] += 5; xs[1][0] = true; print xs; print xs[1][1]; print (xs[0] = 1); }";
        assert_eq!(run(source), "[15, [true, 30]]\n30\n1\n");
    }

    #[test]
    fn run_self_referential_list_prints_ellipsis() {
        assert_eq!(run("fn main() { var xs = [1]; xs.push(xs); print xs; }"), "[1, ...]\n");
    }

    #[test]
    fn run_list_identity_equality() {
        let source = "fn main() { var a = [1]; var b = [1]; var c = a; print a == b; print a == c; }";
        assert_eq!(run(source), "false\ntrue\n");
    }

    #[test]
    fn run_builtins() {
        let source = "fn f() { }\nfn main() { print type(1); print type([]); print type(null); print type(f); print type(clock); print type(type(1)); print f; print clock; print clock() > 0; }";
        assert_eq!(
            run(source),
            "number\nlist\nnull\nfunction\nnative\nstring\n<function f>\n<native clock>\ntrue\n"
        );
    }

    #[test]
    fn run_functions_are_first_class() {
        let source = "fn twice(f, x) { return f(f(x)); }\nfn inc(x) { return x + 1; }\nfn main() { var g = inc; print twice(g, 5); }";
        assert_eq!(run(source), "7\n");
    }

    #[test]
    fn run_returns_null_without_return() {
        assert_eq!(run("fn f() { var x = 1; }\nfn main() { print f(); }"), "null\n");
    }

    #[test]
    fn run_error_trace_is_innermost_first() {
        let source = "fn inner() {\n  return 1 + null;\n}\nfn main() {\n  inner();\n}\n";
        let (_, err) = run_err(source);
        assert_eq!(err.code, "E0401");
        assert_eq!(err.message, "operands must be numbers");
        let frames: Vec<(&str, u32)> = err
            .trace
            .iter()
            .map(|frame| (frame.function.as_str(), frame.line))
            .collect();
        assert_eq!(frames, vec![("inner", 2), ("main", 5)]);
    }

    #[test]
    fn run_error_in_initializer_traces_script() {
        let (_, err) = run_err("var x = 1;\nvar y = x + null;\nfn main() { }");
        assert_eq!(err.code, "E0401");
        assert_eq!(err.trace.len(), 1);
        assert_eq!(err.trace[0].function, "script");
        assert_eq!(err.trace[0].line, 2);
    }

    #[test]
    fn run_error_keeps_output_before_failure() {
        let (output, err) = run_err("fn main() { print 1; print -true; }");
        assert_eq!(output, "1\n");
        assert_eq!(err.message, "operand must be number");
    }

    #[test]
    fn run_arity_mismatch_never_runs_body() {
        let (output, err) = run_err("fn add(a, b) { print 1; return a + b; }\nfn main() { add(1); }");
        assert_eq!(output, "");
        assert_eq!(err.code, "E0402");
        assert_eq!(
            err.message,
            "incorrect number of arguments provided to `add`: expected 2, got 1"
        );
    }

    #[test]
    fn run_extra_arguments_never_run_body() {
        let (output, err) = run_err("fn add(a, b) { print 1; return a + b; }\nfn main() { add(1, 2, 3); }");
        assert_eq!(output, "");
        assert_eq!(err.code, "E0402");
        assert_eq!(
            err.message,
            "incorrect number of arguments provided to `add`: expected 2, got 3"
        );
    }

    #[test]
    fn run_prints_deeply_nested_list() {
        let mut source = String::from(
            "fn nest(xs, n) { if (n > 0) { return nest([xs], n - 1); } return xs; }\nfn main() {\n  var a = [];\n",
        );
        for _ in 0..120 {
            source.push_str("  a = nest(a, 200);\n");
        }
        source.push_str("  print a;\n}\n");
        let expected = format!("{}{}\n", "[".repeat(24_001), "]".repeat(24_001));
        assert_eq!(run(&source), expected);
    }

    #[test]
    fn run_main_with_params_is_an_arity_error() {
        let (_, err) = run_err("fn main(x) { }");
        assert_eq!(err.code, "E0402");
    }

    #[test]
    fn run_native_arity_is_checked() {
        let (_, err) = run_err("fn main() { var xs = []; xs.push(); }");
        assert_eq!(err.message, "incorrect number of arguments provided to `push`: expected 1, got 0");
    }

    #[test]
    fn run_stack_overflow() {
        let (_, err) = run_err("fn f() { return f(); }\nfn main() { f(); }");
        assert_eq!(err.code, "E0404");
        assert_eq!(err.message, "stack overflow");
    }

    #[test]
    fn run_type_errors() {
        assert_eq!(run_err("fn main() { print !1; }").1.message, "operand must be boolean");
        assert_eq!(
            run_err("fn main() { if (1) { } }").1.message,
            "operand must be boolean"
        );
        assert_eq!(
            run_err("fn main() { var x = 3; x(); }").1.message,
            "attempt to call non-callable value of type number"
        );
        assert_eq!(
            run_err("fn main() { var xs = [1]; xs(); }").1.message,
            "attempt to call non-callable value of type list"
        );
        assert_eq!(
            run_err("fn main() { var xs = []; xs.shove(1); }").1.message,
            "undefined method `shove` for list"
        );
        assert_eq!(
            run_err("fn main() { var n = 1; n.len(); }").1.message,
            "undefined method `len` for number"
        );
    }

    #[test]
    fn run_index_errors() {
        assert_eq!(run_err("fn main() { var n = 1; print n[0]; }").1.message, "object is not subscriptable");
        assert_eq!(run_err("fn main() { print [1][true]; }").1.message, "list index must be number");
        assert_eq!(run_err("fn main() { print [1][0.5]; }").1.message, "list index must be an integer");
        assert_eq!(
            run_err("fn main() { var xs = [1, 2]; print xs[3]; }").1.message,
            "index 3 out of bounds for list of size 2"
        );
        assert_eq!(
            run_err("fn main() { var xs = []; xs[-1] = 0; }").1.message,
            "index -1 out of bounds for list of size 0"
        );
    }

    #[test]
    fn run_pop_from_empty_list() {
        let (_, err) = run_err("fn main() { var xs = []; xs.pop(); }");
        assert_eq!(err.message, "pop from empty list");
        assert_eq!(err.trace[0].function, "main");
    }

    #[test]
    fn compile_errors_block_execution() {
        assert_eq!(compile_codes("fn main() { print \"hi\"; }"), vec!["E0602"]);
        assert_eq!(compile_codes("fn main() { print nope; }"), vec!["E0300"]);
        assert_eq!(compile_codes("fn main() { print 1 }"), vec!["E0200"]);
        assert_eq!(compile_codes("fn main() { print $; }"), vec!["E0100"]);
    }

    #[test]
    fn runtime_error_converts_to_diagnostic() {
        let (_, err) = run_err("fn main() {\n  print 1 - [];\n}");
        let diags = InterpError::Runtime(err).into_diagnostics("t.fl");
        assert_eq!(diags[0].code, "E0401");
        assert_eq!(diags[0].span.start.line, 2);
        assert_eq!(diags[0].trace.len(), 1);
        let json = serde_json::to_value(&diags[0]).unwrap();
        assert_eq!(json["trace"][0]["function"], "main");
    }

    #[test]
    fn custom_natives_are_callable() {
        let mut vm = Vm::default();
        vm.define_native("double", 1, |_, args| match args {
            [Value::Num(n)] => Ok(Value::Num(n * 2.0)),
            _ => Err("double expects a number".to_string()),
        });
        vm.run_source("t.fl", "fn main() { print double(21); }").unwrap();
        assert_eq!(vm.take_output(), "42\n");
        let err = vm.run_source("t.fl", "fn main() { double(null); }").unwrap_err();
        let InterpError::Runtime(err) = err else {
            panic!("expected runtime error");
        };
        assert_eq!(err.message, "double expects a number");
    }

    #[test]
    fn disassemble_lists_every_function() {
        let mut vm = Vm::default();
        let mut program = flood_core::parse_source("t.fl", "fn helper() { return 1; }\nfn main() { print helper(); }").unwrap();
        let text = vm.disassemble(&mut program, "t.fl").unwrap();
        assert!(text.starts_with("== script ==\n"));
        assert!(text.contains("== helper ==\n"));
        assert!(text.contains("== main ==\n"));
        assert!(text.contains("CALL"));
    }

    #[test]
    fn script_fixtures_produce_expected_output() {
        let dir = fixture_path("tests/scripts");
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "fl"))
            .collect();
        paths.sort();
        assert!(!paths.is_empty());

        for path in paths {
            let source = fs::read_to_string(&path).unwrap();
            let expected: String = source
                .lines()
                .filter_map(|line| line.split_once("# expect: ").map(|(_, value)| value.trim_end()))
                .map(|value| format!("{value}\n"))
                .collect();
            let expected_error = source
                .lines()
                .find_map(|line| line.split_once("# error: ").map(|(_, code)| code.trim()));

            for gc in [GcPolicy::EveryInstruction, GcPolicy::Threshold(8)] {
                let mut vm = Vm::new(VmConfig {
                    gc,
                    ..VmConfig::default()
                });
                let result = vm.run_source(path.to_str().unwrap(), &source);
                let name = path.display();
                match (result, expected_error) {
                    (Ok(()), None) => {}
                    (Err(InterpError::Runtime(err)), Some(code)) => {
                        assert_eq!(err.code, code, "{name}: {err}");
                    }
                    (Err(InterpError::Compile(diags)), Some(code)) => {
                        assert_eq!(diags[0].code, code, "{name}");
                    }
                    (result, _) => panic!("{name}: unexpected result {result:?}"),
                }
                assert_eq!(vm.take_output(), expected, "{name} with {gc:?}");
            }
        }
    }
}
