use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use awsh_cli::Session;
use awsh_protocol::Settings;

/// awsh: an interactive shell that routes commands, validates them in a
/// sandbox, and asks an AI when a line reads as a question.
#[derive(Parser, Debug)]
#[command(name = "awsh", version)]
struct Cli {
    /// Directory holding the runtime sockets (default: ~/.awsh)
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    settings.verbosity = settings.verbosity.max(cli.verbose.min(2));
    init_tracing(settings.verbosity);

    let mut session = Session::new(cli.runtime_dir, settings)?;
    let code = session.run()?;
    std::process::exit(code);
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
