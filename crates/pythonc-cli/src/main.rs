//! Command-line driver: translate, compile, run.
//!
//! `pythonc [-O] [-c] [-v] <input.py> [args...]` translates the input to
//! `<base>.cpp`, hands it to the system C++ compiler, and runs the produced
//! binary with the remaining arguments. Exit status propagates from the
//! first failing step.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use std::{env, fs};

fn usage() -> i32 {
    eprintln!("usage: pythonc [-O] [-c] [-v] <input.py> [args...]");
    1
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut gcc_flags: Vec<String> = vec!["-g".into(), "-Wall".into(), "-std=c++11".into()];
    let mut quiet = true;
    let mut compile_only = false;
    while let Some(arg) = args.first() {
        match arg.as_str() {
            "-O" => {
                gcc_flags.retain(|f| f != "-g");
                gcc_flags.push("-O3".into());
                args.remove(0);
            }
            "-c" => {
                compile_only = true;
                args.remove(0);
            }
            "-v" => {
                quiet = false;
                args.remove(0);
            }
            _ => break,
        }
    }

    if args.is_empty() {
        return usage();
    }
    let input = PathBuf::from(&args[0]);
    let base = input.with_extension("");
    let cpp_path = input.with_extension("cpp");

    let start = Instant::now();
    let cpp = match pythonc::translate_file(&input) {
        Ok(cpp) => cpp,
        Err(err) => {
            eprintln!("{}: {err}", input.display());
            return 1;
        }
    };
    if let Err(err) = fs::write(&cpp_path, cpp) {
        eprintln!("{}: {err}", cpp_path.display());
        return 1;
    }
    if !quiet {
        println!("Transform time: {:.4}s", start.elapsed().as_secs_f64());
    }

    let start = Instant::now();
    let status = Command::new("c++")
        .args(&gcc_flags)
        .arg(&cpp_path)
        .arg("-o")
        .arg(&base)
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => return status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("c++: {err}");
            return 1;
        }
    }
    if !quiet {
        println!("Compile time: {:.4}s", start.elapsed().as_secs_f64());
    }

    if compile_only {
        return 0;
    }

    let start = Instant::now();
    let binary = if base.is_absolute() {
        base
    } else {
        Path::new(".").join(base)
    };
    let status = Command::new(&binary).args(&args[1..]).status();
    let code = match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("{}: {err}", binary.display());
            1
        }
    };
    if !quiet {
        println!("Run time: {:.4}s", start.elapsed().as_secs_f64());
    }
    code
}
