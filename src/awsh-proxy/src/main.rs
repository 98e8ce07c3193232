use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use awsh_protocol::RuntimePaths;
use awsh_proxy::{RuleSet, SecurityProxy};

/// Security proxy between the awsh frontend and the AI backend.
#[derive(Parser, Debug)]
#[command(name = "awsh-proxy", version)]
struct Cli {
    /// Directory holding the runtime sockets (default: ~/.awsh)
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = match &cli.runtime_dir {
        Some(dir) => RuntimePaths::under(dir)?,
        None => RuntimePaths::resolve()?,
    };

    let rules = RuleSet::compile()?;
    let proxy = SecurityProxy::new(rules, paths.backend_socket.clone());
    let listener = SecurityProxy::bind(&paths.proxy_socket)?;
    proxy.serve(listener).await?;
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
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
