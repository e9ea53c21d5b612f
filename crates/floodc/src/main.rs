use flood_core::{render, CheckReport, Diagnostic, RunReport, TOOL_NAME, VERSION};
use flood_vm::{GcPolicy, InterpError, Vm, VmConfig};
use std::env;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Flood bytecode compiler and VM

Usage:
  floodc <file>
  floodc <command> [options]

Commands:
  run <file> [--json] [--max-frames <n>] [--gc-stress]
  check <file> [--json]
  disasm <file>

Options:
  -h, --help     Show this help message
  --version      Show version information

Logging is controlled by FLOOD_LOG (default: warn).
";

const RUN_HELP: &str = "\
Usage:
  floodc run <file> [--json] [--max-frames <n>] [--gc-stress]

Options:
  --json             Emit a JSON report instead of program output
  --max-frames <n>   Maximum call depth (default 256)
  --gc-stress        Collect garbage after every instruction
  -h, --help         Show this help message
";

const CHECK_HELP: &str = "\
Usage:
  floodc check <file> [--json]

Options:
  --json         Emit JSON diagnostics
  -h, --help     Show this help message
";

const DISASM_HELP: &str = "\
Usage:
  floodc disasm <file>

Options:
  -h, --help     Show this help message
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run {
        path: String,
        json: bool,
        max_frames: Option<usize>,
        gc_stress: bool,
    },
    Check {
        path: String,
        json: bool,
    },
    Disasm {
        path: String,
    },
}

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help") {
        print!("{HELP}");
        return;
    }

    if args[0] == "--version" {
        println!("{TOOL_NAME} {VERSION}");
        return;
    }

    let subcommand_help = match args[0].as_str() {
        "run" => Some(RUN_HELP),
        "check" => Some(CHECK_HELP),
        "disasm" => Some(DISASM_HELP),
        _ => None,
    };
    if let Some(help) = subcommand_help {
        if contains_help_flag(&args[1..]) {
            print!("{help}");
            return;
        }
    }

    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!();
            eprintln!("{HELP}");
            process::exit(2);
        }
    };

    debug!(?command, "parsed command");
    let code = execute(command);
    if code != 0 {
        process::exit(code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLOOD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn contains_help_flag(args: &[String]) -> bool {
    args.iter().any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args[0].as_str() {
        "run" => parse_run(&args[1..]),
        "check" => parse_check(&args[1..]),
        "disasm" => parse_disasm(&args[1..]),
        flag if flag.starts_with('-') => Err(format!("unknown option '{flag}'")),
        _ if args.len() == 1 => parse_run(args),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn parse_run(args: &[String]) -> Result<Command, String> {
    let parsed = parse_path_and_flags(
        args,
        ParseConfig {
            allow_json: true,
            allow_max_frames: true,
            allow_gc_stress: true,
        },
    )?;
    let path = parsed.path.ok_or_else(|| "missing path for run".to_string())?;
    Ok(Command::Run {
        path,
        json: parsed.json,
        max_frames: parsed.max_frames,
        gc_stress: parsed.gc_stress,
    })
}

fn parse_check(args: &[String]) -> Result<Command, String> {
    let parsed = parse_path_and_flags(
        args,
        ParseConfig {
            allow_json: true,
            ..ParseConfig::default()
        },
    )?;
    let path = parsed.path.ok_or_else(|| "missing path for check".to_string())?;
    Ok(Command::Check {
        path,
        json: parsed.json,
    })
}

fn parse_disasm(args: &[String]) -> Result<Command, String> {
    let parsed = parse_path_and_flags(args, ParseConfig::default())?;
    let path = parsed.path.ok_or_else(|| "missing path for disasm".to_string())?;
    Ok(Command::Disasm { path })
}

#[derive(Default)]
struct ParseConfig {
    allow_json: bool,
    allow_max_frames: bool,
    allow_gc_stress: bool,
}

#[derive(Default)]
struct ParsedArgs {
    path: Option<String>,
    json: bool,
    max_frames: Option<usize>,
    gc_stress: bool,
}

fn parse_path_and_flags(args: &[String], config: ParseConfig) -> Result<ParsedArgs, String> {
    let mut parsed = ParsedArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => {
                if !config.allow_json {
                    return Err("unexpected --json".to_string());
                }
                parsed.json = true;
            }
            "--max-frames" => {
                if !config.allow_max_frames {
                    return Err("unexpected --max-frames".to_string());
                }
                let value = iter
                    .next()
                    .ok_or_else(|| "missing value for --max-frames".to_string())?;
                parsed.max_frames = Some(parse_max_frames(value)?);
            }
            "--gc-stress" => {
                if !config.allow_gc_stress {
                    return Err("unexpected --gc-stress".to_string());
                }
                parsed.gc_stress = true;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option '{flag}'"));
            }
            value => {
                if parsed.path.is_some() {
                    return Err("multiple paths provided".to_string());
                }
                parsed.path = Some(value.to_string());
            }
        }
    }

    Ok(parsed)
}

fn parse_max_frames(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(frames) if frames > 0 => Ok(frames),
        _ => Err(format!("invalid --max-frames value '{value}' (expected a positive integer)")),
    }
}

fn vm_config(max_frames: Option<usize>, gc_stress: bool) -> VmConfig {
    let mut config = match max_frames {
        Some(frames) => VmConfig::with_max_frames(frames),
        None => VmConfig::default(),
    };
    if gc_stress {
        config.gc = GcPolicy::EveryInstruction;
    }
    config
}

/// Returns the process exit code.
fn execute(command: Command) -> i32 {
    match command {
        Command::Run {
            path,
            json,
            max_frames,
            gc_stress,
        } => run_file(&path, json, vm_config(max_frames, gc_stress)),
        Command::Check { path, json } => check_file(&path, json),
        Command::Disasm { path } => disasm_file(&path),
    }
}

fn run_file(path: &str, json: bool, config: VmConfig) -> i32 {
    let source = match flood_core::load_source(path) {
        Ok(source) => source,
        Err(diag) => {
            if json {
                print_run_report(None, vec![diag]);
            } else {
                report_diagnostics(&[diag], "");
            }
            return 1;
        }
    };

    let mut vm = Vm::new(config);
    let result = vm.run_source(path, &source);
    let stdout = vm.take_output();
    let diagnostics = match result {
        Ok(()) => Vec::new(),
        Err(err) => err.into_diagnostics(path),
    };
    if json {
        print_run_report(Some(stdout), diagnostics.clone());
    } else {
        print!("{stdout}");
        report_diagnostics(&diagnostics, &source);
    }
    if diagnostics.is_empty() {
        0
    } else {
        1
    }
}

fn check_file(path: &str, json: bool) -> i32 {
    let (source, diagnostics) = match flood_core::load_source(path) {
        Ok(source) => {
            let diagnostics = check_source(path, &source);
            (source, diagnostics)
        }
        Err(diag) => (String::new(), vec![diag]),
    };
    if json {
        println!("{}", flood_core::to_json(&CheckReport::new(diagnostics.clone())));
    } else if diagnostics.is_empty() {
        println!("{path}: ok");
    } else {
        report_diagnostics(&diagnostics, &source);
    }
    if diagnostics.is_empty() {
        0
    } else {
        1
    }
}

/// Front end plus code generation, without running anything.
fn check_source(path: &str, source: &str) -> Vec<Diagnostic> {
    let mut program = match flood_core::parse_source(path, source) {
        Ok(program) => program,
        Err(diagnostics) => return diagnostics,
    };
    match Vm::default().compile(&mut program, path) {
        Ok(_) => Vec::new(),
        Err(err) => err.into_diagnostics(path),
    }
}

fn disasm_file(path: &str) -> i32 {
    let source = match flood_core::load_source(path) {
        Ok(source) => source,
        Err(diag) => {
            report_diagnostics(&[diag], "");
            return 1;
        }
    };
    let result = flood_core::parse_source(path, &source)
        .map_err(InterpError::Compile)
        .and_then(|mut program| Vm::default().disassemble(&mut program, path));
    match result {
        Ok(text) => {
            print!("{text}");
            0
        }
        Err(err) => {
            report_diagnostics(&err.into_diagnostics(path), &source);
            1
        }
    }
}

fn print_run_report(stdout: Option<String>, diagnostics: Vec<Diagnostic>) {
    let report = RunReport {
        tool: TOOL_NAME,
        version: VERSION,
        ok: diagnostics.is_empty(),
        stdout,
        diagnostics,
    };
    println!("{}", flood_core::to_json(&report));
}

fn report_diagnostics(diagnostics: &[Diagnostic], source: &str) {
    for diag in diagnostics {
        eprint!("{}", render(diag, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(args: &[&str]) -> Result<Command, String> {
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        parse_command(&args)
    }

    #[test]
    fn parse_bare_file_runs_it() {
        assert_eq!(
            cmd(&["main.fl"]).unwrap(),
            Command::Run {
                path: "main.fl".to_string(),
                json: false,
                max_frames: None,
                gc_stress: false,
            }
        );
    }

    #[test]
    fn parse_run_flags_any_order() {
        let command = cmd(&["run", "--gc-stress", "main.fl", "--max-frames", "64", "--json"]).unwrap();
        assert_eq!(
            command,
            Command::Run {
                path: "main.fl".to_string(),
                json: true,
                max_frames: Some(64),
                gc_stress: true,
            }
        );
    }

    #[test]
    fn parse_run_rejects_bad_max_frames() {
        let err = cmd(&["run", "main.fl", "--max-frames", "zero"]).unwrap_err();
        assert!(err.contains("invalid --max-frames"));
        let err = cmd(&["run", "main.fl", "--max-frames", "0"]).unwrap_err();
        assert!(err.contains("positive integer"));
        let err = cmd(&["run", "main.fl", "--max-frames"]).unwrap_err();
        assert_eq!(err, "missing value for --max-frames");
    }

    #[test]
    fn parse_check_json() {
        assert_eq!(
            cmd(&["check", "main.fl", "--json"]).unwrap(),
            Command::Check {
                path: "main.fl".to_string(),
                json: true,
            }
        );
    }

    #[test]
    fn parse_check_rejects_run_flags() {
        let err = cmd(&["check", "main.fl", "--gc-stress"]).unwrap_err();
        assert_eq!(err, "unexpected --gc-stress");
    }

    #[test]
    fn parse_disasm_rejects_json() {
        assert_eq!(
            cmd(&["disasm", "main.fl"]).unwrap(),
            Command::Disasm {
                path: "main.fl".to_string()
            }
        );
        assert_eq!(cmd(&["disasm", "main.fl", "--json"]).unwrap_err(), "unexpected --json");
    }

    #[test]
    fn parse_requires_path() {
        assert_eq!(cmd(&["run"]).unwrap_err(), "missing path for run");
        assert_eq!(cmd(&["check", "--json"]).unwrap_err(), "missing path for check");
    }

    #[test]
    fn parse_rejects_unknown_input() {
        assert_eq!(cmd(&["build", "main.fl"]).unwrap_err(), "unknown command 'build'");
        assert_eq!(cmd(&["--fast"]).unwrap_err(), "unknown option '--fast'");
        assert_eq!(cmd(&["run", "a.fl", "b.fl"]).unwrap_err(), "multiple paths provided");
    }

    #[test]
    fn vm_config_from_flags() {
        let config = vm_config(Some(8), true);
        assert_eq!(config.max_frames, 8);
        assert_eq!(config.gc, GcPolicy::EveryInstruction);
        assert_eq!(vm_config(None, false), VmConfig::default());
    }

    #[test]
    fn check_source_reports_code_generation_errors() {
        let diags = check_source("t.fl", "fn main() { print \"text\"; }");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E0602");
        assert!(check_source("t.fl", "fn main() { print clock() > 0; }").is_empty());
    }
}
