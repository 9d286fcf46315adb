//! bucket-salvage entry point
//!
//! Parsing, logging setup and recovery all live in the CLI module. This
//! only maps the outcome to an exit status.

use bucket_salvage::cli;

fn main() {
    match cli::run() {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
