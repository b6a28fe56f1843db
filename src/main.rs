use windsor::cli::{handle_command, CliArgs};
use windsor::util::logging::{init_logging, parse_level, LoggingConfig};
use windsor::VERSION;

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("windsor v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = handle_command(&args.command).await;
    std::process::exit(exit_code);
}

/// Flags win over `WINDSOR_LOG_LEVEL`; `WINDSOR_LOG_JSON` is honoured either way.
fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();
    if let Some(level) = &args.log_level {
        config.level = parse_level(level);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    init_logging(config);
}
