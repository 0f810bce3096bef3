use std::process::ExitCode;

use hotvisor::cli::{Cli, Command};
use hotvisor::lifecycle::signals::wait_for_termination;
use hotvisor::observability::{logging, metrics};
use hotvisor::App;

#[tokio::main]
async fn main() -> ExitCode {
    let command = Cli::parse_normalized(std::env::args_os()).into_command();

    let dump = matches!(&command, Command::Run(args) if args.dump);
    logging::init(if dump {
        logging::QUIET_DIRECTIVE
    } else {
        logging::DEFAULT_DIRECTIVE
    });

    if let Command::Run(args) = &command {
        if let Some(addr) = args.metrics_addr.filter(|_| !dump && !args.test) {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics exporter");
            }
        }
    }

    let terminate = async {
        if let Err(e) = wait_for_termination().await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
        }
    };

    let code = App::from_env().execute(command, terminate).await;
    ExitCode::from(code)
}
