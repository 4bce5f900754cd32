use anyhow::Context;
use clap::Parser;
use jsonlisp::MAX_EVAL_DEPTH;
use jsonlisp::ast::Value;
use jsonlisp::evaluator::{EvalConfig, Interpreter, RunMode, ScriptOutcome};
use jsonlisp::json::parse_json;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

/// jsonlisp - a small Lisp whose programs are JSON documents
#[derive(Parser, Debug)]
#[command(name = "jsonlisp")]
#[command(about = "Evaluate JSON-syntax Lisp programs", long_about = None)]
struct Args {
    /// Maximum evaluation nesting depth
    #[arg(long, default_value_t = MAX_EVAL_DEPTH)]
    max_depth: usize,

    /// Program to run (if not provided, starts an interactive session)
    script: Option<PathBuf>,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG controls the log level, WARN if not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = EvalConfig {
        max_depth: args.max_depth,
    };

    match args.script {
        Some(path) => run_script(path, config),
        None => {
            run_repl(config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_script(path: PathBuf, config: EvalConfig) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut interp = Interpreter::new()
        .with_config(config)
        .with_mode(RunMode::Script(path.clone()));

    let outcome = interp.run_script(&source);
    match &outcome {
        ScriptOutcome::Completed => {}
        ScriptOutcome::TestsFailed(failed) => {
            eprintln!("{}: {failed} test(s) failed", path.display());
        }
        ScriptOutcome::Failed(e) => eprintln!("{}: {e}", path.display()),
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

/// What the session loop does after one input line
enum Step {
    Continue,
    Quit,
}

fn run_repl(config: EvalConfig) -> anyhow::Result<()> {
    let mut interp = Interpreter::new().with_config(config);

    if !std::io::stdin().is_terminal() {
        // Piped input: no line editor, but the same prompt and echo
        for line in std::io::stdin().lock().lines() {
            print!("> ");
            let line = line.context("failed to read input")?;
            if let Step::Quit = handle_line(&mut interp, &line) {
                return Ok(());
            }
        }
        print!("> ");
        println!("goodbye :)");
        return Ok(());
    }

    println!("jsonlisp: every line is one JSON program, e.g. [\"+\", 1, 2]");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new().context("could not initialize line editor")?;

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.trim());
                }
                if let Step::Quit = handle_line(&mut interp, &line) {
                    break;
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("goodbye :)");
                break;
            }
            Err(err) => return Err(err).context("failed to read input"),
        }
    }

    Ok(())
}

fn handle_line(interp: &mut Interpreter, line: &str) -> Step {
    let line = line.trim();
    match line {
        "" => return Step::Continue,
        ":help" => {
            print_help();
            return Step::Continue;
        }
        ":env" => {
            print_environment(interp);
            return Step::Continue;
        }
        ":quit" => {
            println!("goodbye :)");
            return Step::Quit;
        }
        _ => {}
    }

    // Undecodable input is reported and then evaluated as null
    let program = parse_json(line).unwrap_or_else(|e| {
        println!("{e}");
        Value::Null
    });

    match interp.eval(&program) {
        Ok(result) => println!("$it = {result}"),
        Err(e) => println!("Error: {e}"),
    }
    Step::Continue
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current symbol table bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Forms:");
    println!("  Program:     [\"program\", form, ...]");
    println!("  Symbols:     [\"set\", name, value], [\"get\", name], [\"define\", name, value], [\"dump\"]");
    println!("  Arithmetic:  [\"+\", 1, 2]");
    println!("  Comparison:  [\"=\", a, b, ...]");
    println!("  Output:      [\"print\", value, ...]");
    println!("  Checks:      [\"test\", expr], [\"assert\", expr], [\"assert=\", a, b]");
    println!("  Control:     [\"if\", cond, then, else], [\"or\", expr, ...], [\"apply\", expr]");
    println!("  Quoting:     [\"quote\", expr], [\"quasiquote\", template] with unquote / splice-unquote");
    println!("  Arrays:      [\"head\", xs], [\"tail\", xs], [\"len\", xs], [\"map\", f, xs]");
    println!("  Maps:        [\"contains-key\", m, key], [\"insert\", m, key, value]");
    println!("  Procedures:  [\"lambda\", [params], body], [\"macro\", [params], body]");
    println!("  Other:       [\"type\", value], [\"->string\", value], [\"json.loads\", path]");
    println!();
}

fn print_environment(interp: &Interpreter) {
    let bindings = interp.symbols().get_all_bindings();

    if bindings.is_empty() {
        println!("Symbol table is empty.");
        return;
    }

    println!("Symbol table bindings ({} total):", bindings.len());
    for (name, value) in bindings {
        println!("  {name} = {value}");
    }
}
