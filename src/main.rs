// src/main.rs

use std::process::ExitCode;

use dagrun::cli;
use dagrun::logging;
use dagrun::report::RunOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(e) = logging::init_logging(args.log_level) {
        eprintln!("dagrun: failed to initialise logging: {e:#}");
    }

    match dagrun::run(args).await {
        Ok(Some(report)) => {
            report.print();
            match report.outcome() {
                RunOutcome::Success => ExitCode::SUCCESS,
                RunOutcome::PartialFailure => ExitCode::from(1),
            }
        }
        // Dry run: the plan listing already went to stdout.
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_planning() {
                eprintln!("dagrun: planning error: {e:#}");
            } else {
                eprintln!("dagrun: error: {e:#}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}
