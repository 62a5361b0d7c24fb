use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use sprig::{Interpreter, Scoping, Value};

#[derive(Parser)]
#[command(name = "sprig", about = "Sprig: a small Lisp with a tree walker and a stack machine")]
struct Cli {
    /// File to execute
    file: Option<String>,

    /// Evaluate an expression
    #[arg(short, long)]
    eval: Option<String>,

    /// Closures fall back to the caller's frames instead of the global frame
    #[arg(long)]
    dynamic: bool,

    /// Maximum nesting of closure calls and eval
    #[arg(long, default_value_t = 256)]
    max_depth: usize,

    /// Compile and run on the stack machine
    #[arg(long)]
    vm: bool,

    /// Print the opcode listing instead of running
    #[arg(long)]
    dump: bool,

    /// Print form and call counters to stderr after running
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn run(&self, interpreter: &Interpreter, source: &str) -> sprig::EvalResult {
        if self.dump {
            print!("{}", interpreter.disassemble(source)?);
            return Ok(Value::Nil);
        }
        if self.vm {
            interpreter.eval_str_compiled(source)
        } else {
            interpreter.eval_str(source)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scoping = if cli.dynamic {
        Scoping::Dynamic
    } else {
        Scoping::Lexical
    };
    let interpreter = Interpreter::builder()
        .with_scoping(scoping)
        .with_max_depth(cli.max_depth)
        .with_stats(cli.stats)
        .build();

    if let Some(expr) = &cli.eval {
        let result = cli.run(&interpreter, expr);
        report_stats(&cli, &interpreter);
        match result {
            Ok(val) => {
                if !matches!(val, Value::Nil) {
                    println!("{val}");
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(file) = &cli.file {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let result = cli.run(&interpreter, &content);
                report_stats(&cli, &interpreter);
                if let Err(e) = result {
                    eprintln!("Error in {file}: {e}");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Error reading {file}: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    repl(&cli, &interpreter);
}

fn report_stats(cli: &Cli, interpreter: &Interpreter) {
    if cli.stats {
        eprint!("{}", interpreter.take_stats());
    }
}

fn repl(cli: &Cli, interpreter: &Interpreter) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let history_path = dirs_path().join("history.txt");
    let _ = rl.load_history(&history_path);

    println!("Sprig v{}", env!("CARGO_PKG_VERSION"));
    println!("Type ,help for help, ,quit to exit\n");

    let mut buffer = String::new();
    let mut in_multiline = false;

    loop {
        let prompt = if in_multiline { "  ... " } else { "sprig> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if !in_multiline {
                    match trimmed {
                        ",quit" | ",exit" | ",q" => break,
                        ",help" | ",h" => {
                            print_help();
                            continue;
                        }
                        ",env" => {
                            print_env(interpreter);
                            continue;
                        }
                        ",stats" => {
                            print!("{}", interpreter.take_stats());
                            continue;
                        }
                        _ => {}
                    }
                }

                if in_multiline {
                    buffer.push('\n');
                    buffer.push_str(&line);
                } else {
                    buffer = line.clone();
                }

                if !is_balanced(&buffer) {
                    in_multiline = true;
                    continue;
                }

                in_multiline = false;
                let input = buffer.trim().to_string();
                buffer.clear();

                if input.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&input);

                match cli.run(interpreter, &input) {
                    Ok(val) => {
                        if !matches!(val, Value::Nil) {
                            println!("{val}");
                        }
                    }
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                if in_multiline {
                    buffer.clear();
                    in_multiline = false;
                    println!("^C");
                    continue;
                }
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(dirs_path());
    let _ = rl.save_history(&history_path);
}

fn is_balanced(input: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for ch in input.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_string
}

fn print_help() {
    println!("Sprig REPL Commands:");
    println!("  ,quit / ,q    Exit the REPL");
    println!("  ,help / ,h    Show this help");
    println!("  ,env          Show global bindings");
    println!("  ,stats        Show and reset counters (needs --stats)");
    println!();
    println!("Forms:");
    println!("  set, setg, setc, lambda, ret, if, while, ^tail-call");
    println!("  list, cons, car, cdr, quoted, parse, eval, read");
    println!("  print, printf, printfs, format, assert");
}

fn print_env(interpreter: &Interpreter) {
    let global = interpreter.global_env().global();
    let mut bindings = global.bindings();
    bindings.sort_by(|(a, _), (b, _)| a.cmp(b));
    if bindings.is_empty() {
        println!("(no bindings)");
    } else {
        for (name, val) in bindings {
            println!("  {name} = {val}");
        }
    }
}

fn dirs_path() -> std::path::PathBuf {
    dirs_home().join(".sprig")
}

fn dirs_home() -> std::path::PathBuf {
    std::env::var("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
}
