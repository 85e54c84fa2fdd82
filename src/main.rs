//! `homekeeper` command-line entry point.
use clap::Parser;
use std::process::ExitCode;

use homekeeper::cli::Cli;
use homekeeper::config::ConfigSource;
use homekeeper::{engine, logging};

fn main() -> ExitCode {
    let args = Cli::parse();
    logging::init_subscriber(args.verbose, args.log_file.as_deref());
    let log = logging::Logger::new(args.log_file.clone());

    let source = ConfigSource::File(args.config.clone());
    let status = engine::run(&source, &args.overrides(), &log);

    log.print_summary();
    status.into()
}
