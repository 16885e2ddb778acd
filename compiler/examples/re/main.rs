use std::io::{self, BufRead};

use regjit_compiler::{backend::source, compile_with_options, Backend, CompileOptions};

const USAGE: &str = "re [--debug] [--backend interpreter|native|source] [--dfa] PATTERN";

#[derive(Default)]
struct Args {
    debug: bool,
    options: CompileOptions,
    patterns: Vec<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = args.peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => parsed.debug = true,
            "--dfa" => parsed.options = parsed.options.with_deterministic(true),
            "--backend" | "-b" => {
                let backend = args
                    .next()
                    .ok_or_else(|| USAGE.to_string())
                    .and_then(|name| name.parse::<Backend>())?;
                parsed.options = parsed.options.with_backend(backend);
            }
            _ => parsed.patterns.push(arg),
        }
    }

    Ok(parsed)
}

fn main() -> Result<(), String> {
    env_logger::init();

    let args = parse_args(std::env::args().skip(1))?;
    let pattern = match args.patterns.as_slice() {
        [pattern] => Ok(pattern.as_str()),
        _ => Err(USAGE.to_string()),
    }?;

    let compiled = compile_with_options(pattern, args.options).map_err(|e| e.to_string())?;

    if args.debug {
        println!(
            "DEBUG
--------
{}--------
{}--------
{}--------",
            compiled.instructions(),
            compiled.cfg().dump(),
            compiled.schedule().dump(compiled.cfg()),
        );

        if compiled.backend() == Backend::Source {
            let procedure = source::generate(compiled.program()).map_err(|e| e.to_string())?;
            println!("{}--------", procedure);
        }
    }

    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) if compiled.is_match(&line) => println!("{}", line),
            Ok(_) => continue,
            Err(e) => return Err(format!("{}", e)),
        }
    }

    Ok(())
}
