//! Command-line interface definition.
//!
//! Peaque exposes three subcommands: `dev` (development server with
//! HMR), `build` (production bundle) and `start` (run a finished build).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Peaque - a full-stack web framework.
#[derive(Parser, Debug)]
#[command(
    name = "peaque",
    version,
    about = "Full-stack web framework with file-system routing",
    long_about = "Peaque turns a conventional src/ directory into a running development\n\
                  server with hot module replacement, and into a self-contained\n\
                  production bundle with a standalone backend entry."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    Dev(DevArgs),
    /// Produce a production build
    Build(BuildArgs),
    /// Run a production build
    Start(StartArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DevArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Project base directory
    #[arg(short, long, default_value = ".")]
    pub base: PathBuf,

    /// Disable React strict mode in the dev shell
    #[arg(long)]
    pub no_strict: bool,

    /// Show full stack traces in error responses
    #[arg(long)]
    pub full_stack_traces: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Output directory (defaults to <base>/dist)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Project base directory
    #[arg(short, long, default_value = ".")]
    pub base: PathBuf,

    /// Skip minification
    #[arg(long)]
    pub no_minify: bool,

    /// Print a bundle size report from the bundler metafile
    #[arg(long)]
    pub analyze: bool,

    /// Skip rewriting public-asset references in bundled output
    #[arg(long)]
    pub no_asset_rewrite: bool,

    /// Emit the frontend for serverless hosting (no backend entry)
    #[arg(long)]
    pub serverless_frontend: bool,

    /// Disable the React compiler pass
    #[arg(long)]
    pub no_react_compiler: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Project base directory
    #[arg(short, long, default_value = ".")]
    pub base: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,
}
