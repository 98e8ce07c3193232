//! The interactive session: prompt loop, routing, and shutdown.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use awsh_protocol::{CommandOutcome, ControlMessage, RuntimePaths, Settings};

use crate::backend::{BackendClient, QueryReply};
use crate::builtins::{BuiltinCommand, ShellBuiltin, HELP_TEXT};
use crate::exec::{self, DirectOutcome};
use crate::prompt::ContextCache;
use crate::router::{self, Route};
use crate::sandbox_client::SandboxClient;
use crate::supervisor::Supervisor;
use crate::term::{self, TermGuard};
use crate::{prompt, FrontendError};

static TERMINATED: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_signal: i32) {
    TERMINATED.store(true, Ordering::SeqCst);
}

extern "C" fn on_interrupt(_signal: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install handlers without SA_RESTART, so a blocking read is interrupted
/// and control returns to the loop.
///
/// SIGTERM requests orderly shutdown. SIGINT abandons the pending local
/// operation and never ends the session; during readline the terminal is
/// raw and Ctrl-C arrives as a byte instead of a signal.
fn install_signal_handlers() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let terminate = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let interrupt = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        let _ = sigaction(Signal::SIGTERM, &terminate);
        let _ = sigaction(Signal::SIGINT, &interrupt);
    }
}

/// True if a Ctrl-C arrived since the last check; clears the flag.
fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

enum Flow {
    Continue,
    Exit,
}

pub struct Session {
    settings: Settings,
    paths: RuntimePaths,
    supervisor: Supervisor,
    sandbox: SandboxClient,
    backend: BackendClient,
    cache: ContextCache,
    guard: TermGuard,
    editor: DefaultEditor,
    user: String,
    host: String,
    home: Option<PathBuf>,
    prev_dir: Option<PathBuf>,
    verbosity: u8,
    provider: Option<String>,
    model: Option<String>,
}

impl Session {
    /// Spawn the children and set up the loop. Children initialize in the
    /// background; the first prompt must not wait for them.
    pub fn new(runtime_dir: Option<PathBuf>, settings: Settings) -> Result<Self> {
        let paths = match &runtime_dir {
            Some(dir) => RuntimePaths::under(dir)?,
            None => RuntimePaths::resolve()?,
        };
        let supervisor = Supervisor::start(runtime_dir.as_deref(), &settings);
        let sandbox = SandboxClient::new(
            paths.sandbox_socket.clone(),
            &paths.result_file,
            &settings,
        );
        let backend = BackendClient::new(paths.proxy_socket.clone(), &settings);
        let cache = ContextCache::new(settings.prompt_cache_ttl);
        let guard = TermGuard::capture();
        let editor = DefaultEditor::new().context("initialize line editor")?;
        install_signal_handlers();

        Ok(Self {
            verbosity: settings.verbosity,
            settings,
            paths,
            supervisor,
            sandbox,
            backend,
            cache,
            guard,
            editor,
            user: std::env::var("USER").unwrap_or_else(|_| "user".to_owned()),
            host: hostname(),
            home: dirs::home_dir(),
            prev_dir: None,
            provider: None,
            model: None,
        })
    }

    pub fn run(&mut self) -> Result<i32> {
        loop {
            if TERMINATED.load(Ordering::SeqCst) {
                break;
            }
            self.supervisor.on_prompt();
            let prompt_line = self.render_prompt();
            match self.editor.readline(&prompt_line) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    let flow = self.handle_line(&line);
                    // A Ctrl-C consumed mid-command must not leak into the
                    // next line.
                    let _ = take_interrupt();
                    if matches!(flow, Flow::Exit) {
                        break;
                    }
                }
                // Ctrl-C cancels the edited line, never the session.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(error) => {
                    if !TERMINATED.load(Ordering::SeqCst) {
                        warn!(%error, "line editor failed");
                    }
                    break;
                }
            }
        }
        self.shutdown();
        Ok(0)
    }

    fn render_prompt(&mut self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let backend_status = self.backend.status();
        let health = self.supervisor.health();
        let context = self.cache.current(&cwd).clone();
        prompt::render(
            &self.user,
            &self.host,
            &cwd,
            self.home.as_deref(),
            &context,
            health,
            backend_status,
        )
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        match router::route(line) {
            Route::Empty => Flow::Continue,
            Route::Builtin(command) => {
                self.run_builtin(command);
                Flow::Continue
            }
            Route::Shell(builtin) => self.run_shell_builtin(builtin),
            Route::AiQuery => {
                // Optimization only; if the heuristic was wrong the user can
                // still run the line as a command by quoting it.
                self.send_query(line);
                Flow::Continue
            }
            Route::Command => {
                self.run_command(line);
                Flow::Continue
            }
        }
    }

    fn run_builtin(&mut self, command: BuiltinCommand) {
        match command {
            BuiltinCommand::Help => println!("{HELP_TEXT}"),
            BuiltinCommand::Status => {
                let health = self.supervisor.health();
                let backend = self.backend.status();
                println!("backend:  {backend:?}");
                println!("proxy:    {}", if health.proxy { "alive" } else { "down" });
                println!("sandbox:  {}", if health.sandbox { "alive" } else { "down" });
                println!("verbosity: {}", self.verbosity);
                if let Some(provider) = &self.provider {
                    println!("provider: {provider}");
                }
                if let Some(model) = &self.model {
                    println!("model:    {model}");
                }
            }
            BuiltinCommand::Verbosity(None) => println!("verbosity: {}", self.verbosity),
            BuiltinCommand::Verbosity(Some(level)) => {
                self.verbosity = level;
                self.propagate(ControlMessage::Verbose(level));
                println!("verbosity set to {level}");
            }
            BuiltinCommand::Provider(None) => match &self.provider {
                Some(provider) => println!("provider: {provider}"),
                None => println!("provider: (backend default)"),
            },
            BuiltinCommand::Provider(Some(name)) => {
                self.propagate(ControlMessage::Provider(name.clone()));
                self.provider = Some(name);
            }
            BuiltinCommand::Model(None) => match &self.model {
                Some(model) => println!("model: {model}"),
                None => println!("model: (backend default)"),
            },
            BuiltinCommand::Model(Some(name)) => {
                self.propagate(ControlMessage::Model(name.clone()));
                self.model = Some(name);
            }
        }
    }

    fn run_shell_builtin(&mut self, builtin: ShellBuiltin) -> Flow {
        match builtin {
            ShellBuiltin::Exit => return Flow::Exit,
            ShellBuiltin::Pwd => match std::env::current_dir() {
                Ok(cwd) => println!("{}", cwd.display()),
                Err(error) => eprintln!("awsh: pwd: {error}"),
            },
            ShellBuiltin::Cd(target) => self.change_directory(target),
        }
        Flow::Continue
    }

    fn change_directory(&mut self, target: Option<String>) {
        let Some(destination) = resolve_cd_target(
            target.as_deref(),
            self.home.as_deref(),
            self.prev_dir.as_deref(),
        ) else {
            eprintln!("awsh: cd: no target directory");
            return;
        };
        let before = std::env::current_dir().ok();
        if let Err(error) = std::env::set_current_dir(&destination) {
            eprintln!("awsh: cd: {}: {error}", destination.display());
            return;
        }
        self.prev_dir = before;
        self.cache.invalidate();
        if let Ok(cwd) = std::env::current_dir() {
            // Keep the backend's working directory in sync; best effort.
            self.propagate(ControlMessage::Cwd(cwd.display().to_string()));
        }
    }

    /// Direct attempt first; the sandbox is consulted only on failure, as a
    /// classification oracle. The direct attempt's output stays the source
    /// of truth for what the user sees.
    fn run_command(&mut self, line: &str) {
        let outcome = match exec::run_captured(line, self.settings.poll.ceiling(), &INTERRUPTED) {
            Ok(outcome) => outcome,
            Err(error) => {
                eprintln!("awsh: {error}");
                return;
            }
        };
        if take_interrupt() {
            // Ctrl-C abandoned the attempt; nothing to classify.
            println!();
            return;
        }
        if outcome.succeeded() {
            self.print_output(&outcome);
            return;
        }
        self.handle_failed_command(line, outcome);
    }

    fn handle_failed_command(&mut self, line: &str, direct: DirectOutcome) {
        let classification = match self.sandbox.classify(line) {
            Ok(result) => result.outcome,
            Err(error) => {
                // No sandbox reachable: surface what the OS reported.
                debug!(%error, "sandbox unreachable, surfacing direct result");
                self.print_failure(line, &direct);
                return;
            }
        };
        match classification {
            CommandOutcome::Exited(_) => self.print_failure(line, &direct),
            CommandOutcome::Interactive => self.run_interactive(line),
            CommandOutcome::InvalidShort => {
                let command = line.split_whitespace().next().unwrap_or(line);
                eprintln!("awsh: {command}: command not found");
            }
            CommandOutcome::InvalidLong => {
                self.send_failure_context(line, &direct);
                self.send_query(line);
            }
        }
    }

    /// Interactive branch: hand over the real TTY, then restore the editor.
    fn run_interactive(&mut self, line: &str) {
        match term::run_interactive(line, &self.guard) {
            Ok(code) if code != 0 => eprintln!("awsh: exit {code}"),
            Ok(_) => {}
            Err(error) => eprintln!("awsh: {error}"),
        }
    }

    fn print_output(&self, outcome: &DirectOutcome) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&outcome.stdout);
        let _ = stdout.flush();
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(&outcome.stderr);
        let _ = stderr.flush();
    }

    fn print_failure(&self, line: &str, direct: &DirectOutcome) {
        self.print_output(direct);
        match direct.exit_code {
            Some(code) => eprintln!("awsh: `{line}` exited with status {code}"),
            None if direct.timed_out => eprintln!("awsh: `{line}` timed out"),
            None => eprintln!("awsh: `{line}` was killed"),
        }
    }

    /// Write the failed attempt's output where the backend can read it and
    /// announce it, so the AI answer can reference the actual error.
    fn send_failure_context(&mut self, line: &str, direct: &DirectOutcome) {
        let capture_path = self.paths.root.join("last_failure.txt");
        let mut capture = direct.stdout.clone();
        capture.extend_from_slice(&direct.stderr);
        if let Err(error) = std::fs::write(&capture_path, &capture) {
            debug!(%error, "could not write failure capture");
            return;
        }
        self.propagate(ControlMessage::BashFailed {
            exit_code: direct.exit_code.unwrap_or(1),
            command: line.to_owned(),
            capture_path: capture_path.display().to_string(),
        });
    }

    fn send_query(&mut self, line: &str) {
        let message = ControlMessage::Query(line.to_owned());
        match self.backend.query(&message, &mut std::io::stdout(), &INTERRUPTED) {
            Ok(QueryReply::Answered) => {}
            Ok(QueryReply::Interrupted) => {}
            Ok(QueryReply::Blocked(reason)) => {
                println!("awsh: blocked by policy: {reason}");
            }
            Err(FrontendError::BackendTimeout) => {
                eprintln!("awsh: the AI did not answer in time");
            }
            Err(error) => eprintln!("awsh: ai unavailable: {error}"),
        }
    }

    fn propagate(&mut self, message: ControlMessage) {
        if let Err(error) = self.backend.send_control(&message) {
            debug!(%error, "control message not delivered");
        }
    }

    /// Orderly shutdown: children first, then the runtime files, then the
    /// terminal.
    fn shutdown(&mut self) {
        self.supervisor.shutdown();
        self.paths.remove_all();
        self.guard.restore();
    }
}

/// Resolve a `cd` target: `~` expansion, `-` for the previous directory,
/// bare `cd` for home.
fn resolve_cd_target(
    target: Option<&str>,
    home: Option<&Path>,
    prev: Option<&Path>,
) -> Option<PathBuf> {
    match target {
        None => home.map(Path::to_path_buf),
        Some("-") => prev.map(Path::to_path_buf),
        Some("~") => home.map(Path::to_path_buf),
        Some(path) => {
            if let Some(rest) = path.strip_prefix("~/") {
                home.map(|h| h.join(rest))
            } else {
                Some(PathBuf::from(path))
            }
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_owned())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}
