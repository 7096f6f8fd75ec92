use std::process::ExitCode;

use clap::Parser;
use coman_server::cli::{self, Cli, Command};
use coman_server::{load_modules, logging, Core, Settings};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    if let Err(err) = logging::init(&settings, cli.verbose) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    let mut core = Core::new(settings);
    let report = load_modules(&mut core);
    tracing::debug!(loaded = ?report.loaded, skipped = report.skipped.len(), "modules discovered");

    let mut stdout = std::io::stdout().lock();
    let outcome = match cli.command {
        None => cli::serve(core, &cli.serve),
        Some(Command::Serve(args)) => cli::serve(core, &args),
        Some(Command::Modules { json }) => cli::list_modules(&core, json, &mut stdout).map_err(Into::into),
        Some(Command::Call {
            module,
            operation,
            json,
            args,
        }) => cli::call_module(&core, &module, &operation, json.as_deref(), &args, &mut stdout)
            .map_err(Into::into),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
