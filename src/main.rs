//! stackgen CLI: conditional CloudFormation template generation.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "stackgen",
    version,
    about = "Generate the CBuildCI CloudFormation stacks from typed, validated builders"
)]
struct Cli {
    #[command(subcommand)]
    command: stackgen::cli::Commands,
}

fn main() {
    // logging goes to stderr; stdout is the report
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stackgen=warn"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = stackgen::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
