use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use agent_beacon::hook::{Dispatcher, HookEvent, HookPayload};
use agent_beacon::liveness::{LivenessChecker, PsProcessTable};
use agent_beacon::records::SessionDir;
use agent_beacon::tmux::{focus_session, TmuxClient};
use agent_beacon::{probe, Config, Registry, SessionView};

mod actions;
mod app;

use actions::Action;
use app::App;

#[derive(Parser)]
#[command(name = "agent-beacon")]
#[command(about = "Live status of your coding-agent sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard (default)
    Dash,
    /// Print the current sessions once
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Recheck process liveness before printing
        #[arg(long)]
        recheck: bool,
    },
    /// Apply a hook event; the payload is read from stdin
    Hook { event: String },
    /// Write a heartbeat from status-line JSON on stdin and print a status line
    Statusline,
    /// Focus the tmux pane of a session
    Focus { session_id: String },
}

impl Commands {
    /// Verbs run by the agent itself must never fail loudly.
    fn runs_inside_agent(&self) -> bool {
        matches!(self, Commands::Hook { .. } | Commands::Statusline)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Dash);

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(&command, &config.session_dir());

    if let Some(e) = config_error {
        if !command.runs_inside_agent() {
            return Err(e.into());
        }
        warn!(error = %e, "falling back to default config");
    }

    match command {
        Commands::Dash => run_dashboard(&config).await,
        Commands::List { json, recheck } => list_sessions(&config, json, recheck).await,
        Commands::Hook { event } => {
            run_hook(&config, &event).await;
            Ok(())
        }
        Commands::Statusline => {
            run_statusline(&config).await;
            Ok(())
        }
        Commands::Focus { session_id } => focus(&config, &session_id).await,
    }
}

/// The dashboard logs to a file so output never corrupts the terminal.
fn init_logging(command: &Commands, dir: &SessionDir) {
    let default_level = if command.runs_inside_agent() {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if matches!(command, Commands::Dash) {
        let path = log_path(dir);
        let file = path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
            });
        // Without a log file the dashboard runs silently.
        if let Ok(file) = file {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn log_path(dir: &SessionDir) -> PathBuf {
    let root = dir.root();
    root.parent().unwrap_or(root).join("agent-beacon.log")
}

fn build_registry(config: &Config) -> Registry {
    let checker = LivenessChecker::new(
        PsProcessTable::new(config.process_timeout()),
        config.agent_process_name.clone(),
        config.thresholds.start_time_epsilon,
    );
    Registry::new(config.session_dir(), config.registry_settings(), checker)
}

async fn read_stdin() -> std::io::Result<String> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    Ok(raw)
}

async fn run_hook(config: &Config, event_name: &str) {
    let Some(event) = HookEvent::from_name(event_name) else {
        debug!(event = event_name, "ignoring unknown hook event");
        return;
    };

    let payload = match read_stdin().await.map_err(anyhow::Error::from).and_then(|raw| {
        HookPayload::parse(&raw).context("hook payload is not valid JSON")
    }) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(event = event_name, error = %e, "dropping hook event");
            return;
        }
    };

    let dispatcher = Dispatcher::new(config.session_dir());
    let result = tokio::task::spawn_blocking(move || dispatcher.dispatch(event, &payload)).await;
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(event = event_name, error = %e, "hook event not applied"),
        Err(e) => warn!(event = event_name, error = %e, "hook task failed"),
    }
}

async fn run_statusline(config: &Config) {
    let raw = match read_stdin().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "could not read status-line input");
            return;
        }
    };
    match probe::run(&config.session_dir(), &raw, config.process_timeout()).await {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "heartbeat not written"),
    }
}

async fn list_sessions(config: &Config, json: bool, recheck: bool) -> Result<()> {
    let registry = build_registry(config);
    registry.dir().ensure()?;
    registry.refresh_once(recheck).await?;
    let sessions = registry.sessions();

    if json {
        println!("{}", serde_json::to_string_pretty(&*sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions in {}", registry.dir().root().display());
        return Ok(());
    }
    for session in sessions.iter() {
        println!("{}", table_row(session));
    }
    Ok(())
}

fn table_row(session: &SessionView) -> String {
    let mut row = format!(
        "{:<16} {:<24} {:<10}",
        session.status.label(),
        session.display_name(),
        session.last_seen_label()
    );
    for extra in [
        session.vcs_label(),
        session.context_label(),
        Some(session.cost_label()),
    ]
    .into_iter()
    .flatten()
    {
        row.push_str("  ");
        row.push_str(&extra);
    }
    row
}

async fn focus(config: &Config, id: &str) -> Result<()> {
    let registry = build_registry(config);
    registry.dir().ensure()?;
    registry.refresh_once(false).await?;
    let sessions = registry.sessions();

    let matches: Vec<&SessionView> = sessions
        .iter()
        .filter(|s| s.id.starts_with(id))
        .collect();
    let session = match matches.as_slice() {
        [session] => *session,
        [] => bail!("no session matches {id:?}"),
        _ => match matches.iter().find(|s| s.id == id) {
            Some(session) => *session,
            None => bail!("{id:?} matches {} sessions", matches.len()),
        },
    };
    let Some(target) = session.heartbeat.tmux_target.as_deref() else {
        bail!("session {} has no tmux pane", session.id);
    };

    let client = TmuxClient::new(config.process_timeout());
    if !client.is_server_running().await {
        bail!("tmux is not running, cannot focus {}", session.id);
    }
    client.focus_pane(target).await?;
    if std::env::var_os("TMUX").is_none() {
        attach(&client, target)?;
    }
    Ok(())
}

/// Run `tmux attach` in the foreground of the current terminal.
fn attach(client: &TmuxClient, target: &str) -> Result<()> {
    let cmd = client.attach_command(target);
    let status = std::process::Command::new(&cmd[0])
        .args(&cmd[1..])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to run tmux attach")?;
    if !status.success() {
        bail!("tmux attach exited with {status}");
    }
    Ok(())
}

async fn run_dashboard(config: &Config) -> Result<()> {
    let registry = build_registry(config);
    let worker = registry.start()?;

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
        if event::poll(Duration::from_millis(100)).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err()
                {
                    break;
                }
            }
        } else if input_tx.is_closed() {
            break;
        }
    });

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(Action::Quit);
        }
    });

    // Forward registry updates
    let update_tx = tx.clone();
    let updates = registry.on_change(move |sessions| {
        let _ = update_tx.send(Action::SessionsUpdated(sessions));
    });

    let tmux_client = TmuxClient::new(config.process_timeout());
    let inside_tmux = std::env::var_os("TMUX").is_some();

    let mut terminal = ratatui::init();
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        if let Err(e) = terminal.draw(|f| app.render(f)) {
            break Err(e.into());
        }

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            let feedback = match pending_action {
                Action::FocusSession(ref id) => {
                    match app.sessions.iter().find(|s| &s.id == id) {
                        Some(view) if view.heartbeat.tmux_target.is_none() => {
                            Some(Action::Error(format!("{} has no tmux pane", view.display_name())))
                        }
                        Some(view) if inside_tmux => {
                            focus_session(&tmux_client, view);
                            Some(Action::Notice(format!("Focusing {}", view.display_name())))
                        }
                        Some(view) => {
                            let target = view.heartbeat.tmux_target.clone().unwrap_or_default();
                            // Suspend TUI and attach to the pane's session
                            ratatui::restore();
                            let attached = match tmux_client.focus_pane(&target).await {
                                Ok(()) => attach(&tmux_client, &target),
                                Err(e) => Err(e.into()),
                            };
                            // Resume TUI
                            terminal = ratatui::init();
                            attached
                                .err()
                                .map(|e| Action::Error(format!("Failed to attach: {e}")))
                        }
                        None => None,
                    }
                }
                Action::Refresh => {
                    registry.refresh_now(true);
                    Some(Action::Notice("Refreshing…".to_string()))
                }
                Action::CopyPath(ref path) => Some(match arboard::Clipboard::new() {
                    Ok(mut clipboard) => match clipboard.set_text(path.clone()) {
                        Ok(()) => Action::Notice(format!("Copied {path}")),
                        Err(e) => Action::Error(format!("Clipboard error: {e}")),
                    },
                    Err(e) => Action::Error(format!("Clipboard error: {e}")),
                }),
                _ => None,
            };
            if let Some(feedback) = feedback {
                let _ = app.handle_action(feedback);
            }
        }

        // Handle events from channel
        let Some(action) = rx.recv().await else {
            break Ok(());
        };
        match app.handle_action(action) {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    // Restore terminal
    ratatui::restore();
    updates.abort();
    worker.abort();
    result
}
