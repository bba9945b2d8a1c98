//! Minimal consumer of the public API: prints the name of the writer
//! library and the number of blocks in a given ASDF file.

use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: dump_tree FILE.asdf");
        return ExitCode::FAILURE;
    };

    let file = match asdf_rs::File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match file.tree() {
        Ok(tree) => {
            if let Ok(name) = tree.path("/asdf_library/name").and_then(|v| Ok(v.as_str()?.to_string())) {
                println!("written by: {name}");
            }
        }
        Err(e) => {
            eprintln!("{path}: failed to parse tree: {e}");
            return ExitCode::FAILURE;
        }
    }

    match file.block_count() {
        Ok(n) => println!("blocks: {n}"),
        Err(e) => eprintln!("{path}: {e}"),
    }

    ExitCode::SUCCESS
}
