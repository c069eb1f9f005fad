use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use interpreter::{Host, Module};
use tracing::debug;

const USAGE_EXIT_CODE: u8 = 64;
const IO_EXIT_CODE: u8 = 74;

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize if RUST_LOG is set, a normal run prints nothing but the program's output
    if env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn usage() -> ExitCode {
    eprintln!("Usage: loxmod [module]");
    ExitCode::from(USAGE_EXIT_CODE)
}

// `dir/name` and `dir/name.lox` both run module `name` with `dir` as the module root
fn run_file(arg: &str) -> ExitCode {
    let path = Path::new(arg);
    let root = path.parent().unwrap_or_else(|| Path::new(""));
    let name = match path.extension() {
        Some(ext) if ext == "lox" => path.file_stem(),
        _ => path.file_name(),
    };

    let Some(name) = name.and_then(|name| name.to_str()) else {
        return usage();
    };

    let host = Host::new(root);
    match Module::main(&host, name).init() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(err.exit_code()),
    }
}

// Every line runs in one `__main__` module rooted at the working directory, until end of input
fn run_prompt() -> ExitCode {
    let host = Host::new(".");
    let mut module = Module::prompt(&host);
    let mut input = io::stdin().lock();
    let mut line = String::new();

    loop {
        print!("> ");
        if let Err(err) = io::stdout().flush() {
            eprintln!("Error writing prompt: {}", err);
            return ExitCode::from(IO_EXIT_CODE);
        }

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                return ExitCode::from(IO_EXIT_CODE);
            }
        }

        // the module already reported what went wrong, the prompt carries on
        if let Err(err) = module.eval(&line) {
            debug!(%err, "prompt line failed");
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    match args.as_slice() {
        [_] => run_prompt(),
        [_, module] => run_file(module),
        _ => usage(),
    }
}
