use std::path::PathBuf;
use std::process::ExitCode;

use masseff::Config;

fn main() -> ExitCode {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    match masseff::run(&config) {
        Ok(report) => {
            for failure in &report.failures {
                eprintln!("{} {}: {}", failure.variable, failure.label, failure.error);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
