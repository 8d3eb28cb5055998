//! Peaque CLI entry point.

use clap::Parser;
use miette::Result;
use peaque_cli::{cli, commands, error, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev::execute(dev_args).await,
        cli::Command::Build(build_args) => commands::build::execute(build_args).await,
        cli::Command::Start(start_args) => commands::start::execute(start_args).await,
    };

    result.map_err(error::into_miette)
}
