use purple::ast::{Procedure, Value, ValueKind};
use purple::environment::Environment;
use purple::{ErrorKind, Interpreter, ReadConfig, render};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| match std::env::args().nth(1) {
        Some(path) => run_script(&path),
        None => run_repl(),
    });

    match result {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
            eprintln!("The REPL encountered an unexpected error and must exit.");

            if let Some(msg) = panic_info.downcast_ref::<&str>() {
                eprintln!("Error: {msg}");
            } else if let Some(msg) = panic_info.downcast_ref::<String>() {
                eprintln!("Error: {msg}");
            } else {
                eprintln!("Error: Unknown panic occurred");
            }

            process::exit(1);
        }
    }
}

/// Evaluate a whole file, printing each result; stop at the first error
fn run_script(path: &str) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Could not read {path}: {err}");
            return 1;
        }
    };
    let lines: Vec<&str> = text.split('\n').collect();
    let config = ReadConfig {
        file: Some(path.into()),
        ..ReadConfig::default()
    };

    let mut interp = Interpreter::new();
    let forms = match purple::read_with_config(&text, &config) {
        Ok(forms) => forms,
        Err(err) => {
            println!("{}", render(&err, &lines));
            return 1;
        }
    };
    for form in &forms {
        match interp.eval(form) {
            Ok(Some(result)) => println!(";{result}"),
            Ok(None) => {}
            Err(err) => {
                println!("{}", render(&err, &lines));
                return 1;
            }
        }
    }
    0
}

fn run_repl() -> i32 {
    println!("Purple, a small Scheme with first-class continuations");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut interp = Interpreter::new();

    // Every line entered so far, so spans can be rendered against their source
    let mut history: Vec<String> = Vec::new();
    // Index in `history` of the first line of an unfinished form
    let mut pending_from: Option<usize> = None;

    loop {
        let prompt = if pending_from.is_some() { "...> " } else { "purple> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending_from.is_none() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.trim() {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interp.environment());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                let _ = rl.add_history_entry(line.as_str());
                history.push(line);

                let first = *pending_from.get_or_insert(history.len() - 1);
                let text = history[first..].join("\n");
                let result = interp.eval_str_with_config(&text, &ReadConfig::at_line(first));

                match result {
                    Ok(Some(result)) => println!(";{result}"),
                    Ok(None) => {}
                    // Keep reading until the form is complete
                    Err(err)
                        if matches!(err.kind, ErrorKind::UnclosedList | ErrorKind::UnclosedString) =>
                    {
                        continue;
                    }
                    Err(err) => {
                        let lines: Vec<&str> = history.iter().map(String::as_str).collect();
                        println!("{}", render(&err, &lines));
                    }
                }
                pending_from = None;
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                return 1;
            }
        }
    }
    0
}

fn print_help() {
    println!("Purple commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Pragmas:");
    println!("  #!debug    - Trace the engine state after every step");
    println!("  #!nodebug  - Stop tracing");
    println!();
    println!("Examples:");
    println!("  (define (fac n) (if (= n 0) 1 (* n (fac (- n 1)))))");
    println!("  (* 3 (call/cc (lambda (k) (k 2))))");
    println!("  (let ((x 23)) (set! x 42) x)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in procedures from everything else
    let mut builtins = Vec::new();
    let mut user_defined: Vec<(_, Value)> = Vec::new();

    for (name, value) in bindings {
        match &value.kind {
            ValueKind::Procedure(Procedure::Builtin(_)) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in procedures ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
