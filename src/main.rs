//! Parses a WAT file and prints the resulting module.
//!
//! Usage: `watmod <file.wat> [--json]`

use std::fs;
use std::process;
use watmod::wat;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let json = args.iter().skip(1).any(|a| a == "--json");
    let path = match args.iter().skip(1).find(|a| !a.starts_with("--")) {
        Some(path) => path,
        None => {
            eprintln!("Usage: {} <file.wat> [--json]", args[0]);
            process::exit(1);
        }
    };

    let source = fs::read_to_string(path)?;
    let module = match wat::parse(&source) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("{}:{}", path, e);
            process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
    } else {
        print!("{}", module);
    }
    Ok(())
}
