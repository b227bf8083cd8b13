//! `TaskMesh`: serverless replicated task list over a topic mesh.
//!
//! Joins (or creates) a room and exposes the shared task list through a
//! line-oriented prompt. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/taskmesh/config.toml`).
//!
//! ```bash
//! # Create a new room (prints its topic for sharing)
//! cargo run --bin taskmesh
//!
//! # Join an existing room
//! cargo run --bin taskmesh -- --topic <64-hex-chars>
//! ```
//!
//! This binary drives the full replication stack over the in-process
//! loopback mesh; a networked swarm backend plugs in behind the same
//! `Mesh` trait.

use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskmesh::config::{CliArgs, ClientConfig};
use taskmesh::mesh::loopback::{LoopbackHub, LoopbackMesh};
use taskmesh::mesh::PeerId;
use taskmesh::net::{self, NodeCommand, NodeEvent};
use taskmesh::session::Session;
use taskmesh_proto::task::{Task, TaskStatus};
use taskmesh_proto::topic::Topic;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the prompt.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("taskmesh starting");

    // Malformed topic hex is the one user-visible protocol error.
    let topic = match config.topic.as_deref() {
        Some(hex) => match Topic::from_str(hex.trim()) {
            Ok(topic) => Some(topic),
            Err(e) => {
                eprintln!("invalid topic: {e}");
                std::process::exit(2);
            }
        },
        None => None,
    };

    let hub = Arc::new(LoopbackHub::new());
    let mesh = LoopbackMesh::new(
        &hub,
        PeerId::new(config.peer_name.clone()),
        config.inbox_capacity,
    );

    let mut session = Session::new();
    let joined = match topic {
        Some(t) => session.join(&mesh, t).await.map(|()| t),
        None => session.create_room(&mesh).await,
    };
    let topic = match joined {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to join room: {e}");
            std::process::exit(1);
        }
    };
    println!("room topic: {topic}");
    println!("type 'help' for commands");

    let (cmd_tx, evt_rx) = net::spawn_node(mesh, &config.to_node_config());

    let result = run_prompt(&cmd_tx, evt_rx, &config.timestamp_format).await;

    let _ = cmd_tx.send(NodeCommand::Shutdown).await;
    tracing::info!("taskmesh exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure
/// all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskmesh.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Reads prompt commands from stdin while draining node events.
async fn run_prompt(
    cmd_tx: &mpsc::Sender<NodeCommand>,
    mut evt_rx: mpsc::Receiver<NodeEvent>,
    timestamp_format: &str,
) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Local mirrors of the owner task's state, refreshed by events.
    let mut tasks: Vec<Task> = Vec::new();
    let mut peer_count = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break; // stdin closed
                };
                if !handle_line(line.trim(), cmd_tx, &tasks, peer_count, timestamp_format).await {
                    break;
                }
            }
            event = evt_rx.recv() => {
                match event {
                    Some(NodeEvent::TasksChanged(new_tasks)) => tasks = new_tasks,
                    Some(NodeEvent::PeerCountChanged(count)) => {
                        peer_count = count;
                        println!("({peer_count} peer(s) connected)");
                    }
                    Some(NodeEvent::Error(e)) => eprintln!("error: {e}"),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

/// Dispatches one prompt line. Returns `false` to quit.
async fn handle_line(
    line: &str,
    cmd_tx: &mpsc::Sender<NodeCommand>,
    tasks: &[Task],
    peer_count: usize,
    timestamp_format: &str,
) -> bool {
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "" => {}
        "help" => print_help(),
        "quit" | "exit" => return false,
        "ls" => print_tasks(tasks, timestamp_format),
        "peers" => println!("{peer_count} peer(s) connected"),
        "add" => {
            let (name, description) = match rest.split_once("::") {
                Some((name, desc)) => (name.trim(), desc.trim()),
                None => (rest, ""),
            };
            let cmd = NodeCommand::AddTask {
                name: name.to_string(),
                description: description.to_string(),
            };
            let _ = cmd_tx.send(cmd).await;
        }
        "rm" => {
            if let Some(task) = find_by_prefix(tasks, rest) {
                let _ = cmd_tx.send(NodeCommand::DeleteTask { id: task.id.clone() }).await;
            }
        }
        "toggle" => {
            if let Some(task) = find_by_prefix(tasks, rest) {
                let _ = cmd_tx.send(NodeCommand::Toggle { id: task.id.clone() }).await;
            }
        }
        "todo" | "start" | "done" => {
            let status = match verb {
                "todo" => TaskStatus::Todo,
                "start" => TaskStatus::InProgress,
                _ => TaskStatus::Done,
            };
            if let Some(task) = find_by_prefix(tasks, rest) {
                let cmd = NodeCommand::SetStatus {
                    id: task.id.clone(),
                    status,
                };
                let _ = cmd_tx.send(cmd).await;
            }
        }
        other => println!("unknown command: {other} (try 'help')"),
    }
    true
}

/// Finds the unique task whose id starts with `prefix`.
fn find_by_prefix<'a>(tasks: &'a [Task], prefix: &str) -> Option<&'a Task> {
    if prefix.is_empty() {
        println!("expected a task id prefix");
        return None;
    }
    let mut matches = tasks.iter().filter(|t| t.id.to_string().starts_with(prefix));
    let first = matches.next();
    if first.is_none() {
        println!("no task matches '{prefix}'");
    } else if matches.next().is_some() {
        println!("'{prefix}' is ambiguous, give more characters");
        return None;
    }
    first
}

fn print_tasks(tasks: &[Task], timestamp_format: &str) {
    if tasks.is_empty() {
        println!("(no tasks)");
        return;
    }
    for task in tasks {
        let marker = match task.status {
            TaskStatus::Todo => "[ ]",
            TaskStatus::InProgress => "[~]",
            TaskStatus::Done => "[x]",
        };
        let id = task.id.to_string();
        let short = &id[..8];
        let when = format_timestamp(task.created_at, timestamp_format);
        if task.description.is_empty() {
            println!("{marker} {short}  {}  ({when})", task.name);
        } else {
            println!("{marker} {short}  {}: {}  ({when})", task.name, task.description);
        }
    }
}

/// Renders a millisecond epoch timestamp with the configured format.
fn format_timestamp(ms: u64, format: &str) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(
            || ms.to_string(),
            |dt| dt.with_timezone(&chrono::Local).format(format).to_string(),
        )
}

fn print_help() {
    println!("commands:");
    println!("  add <name> [:: <description>]  create a task");
    println!("  ls                             list tasks");
    println!("  done | start | todo <id>       set a task's status");
    println!("  toggle <id>                    flip done/not-done");
    println!("  rm <id>                        delete a task");
    println!("  peers                          show connected peer count");
    println!("  quit                           leave");
}
