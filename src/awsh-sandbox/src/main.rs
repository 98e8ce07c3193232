use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use tracing_subscriber::EnvFilter;

use awsh_protocol::{ResultChannelWriter, RuntimePaths, Settings};
use awsh_sandbox::{Executor, FsView, SandboxServer, ShellSession};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: i32) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Sandbox executor for awsh: validates commands in a restricted shell.
#[derive(Parser, Debug)]
#[command(name = "awsh-sandbox", version)]
struct Cli {
    /// Directory holding the runtime sockets (default: ~/.awsh)
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,

    /// Shell to run inside the sandbox
    #[arg(long, default_value = "bash")]
    shell: String,

    /// Run without the restricted filesystem view
    #[arg(long)]
    no_fsview: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_env();
    let paths = match &cli.runtime_dir {
        Some(dir) => RuntimePaths::under(dir)?,
        None => RuntimePaths::resolve()?,
    };

    // SIGTERM/SIGINT raise the flag; the accept loop notices and unwinds so
    // files get removed on the way out.
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(request_shutdown))
            .context("install SIGTERM handler")?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(request_shutdown))
            .context("install SIGINT handler")?;
    }

    let fsview = if cli.no_fsview {
        None
    } else {
        Some(FsView::setup(&paths.root.join("sandbox")).context("set up filesystem view")?)
    };

    let shell_cwd = match &fsview {
        Some(view) if view.confine_process() => PathBuf::from("/"),
        Some(view) => view.work_dir().to_owned(),
        None => std::env::current_dir().context("resolve working directory")?,
    };

    let session =
        ShellSession::spawn(&cli.shell, &shell_cwd).context("spawn sandbox shell")?;
    let mut executor = Executor::new(session, settings.poll);
    executor.warm_up();

    let channel =
        ResultChannelWriter::create(&paths.result_file).context("create result channel")?;
    let mut server = SandboxServer::bind(&paths.sandbox_socket, executor, channel)
        .context("bind sandbox socket")?;

    let outcome = server.run(&SHUTDOWN);
    server.cleanup();
    drop(fsview);
    outcome.context("sandbox server failed")
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
