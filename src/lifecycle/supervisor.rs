//! Master process: forks, watches and replaces workers.
//!
//! # Responsibilities
//! - Refuse to start when another process already listens on a configured port
//! - Start the configured number of worker processes
//! - Announce readiness to the launching process once every worker is listening
//! - Respawn workers that exit while the master is not shutting down
//! - Classify worker errors; tear the whole group down on fatal ones
//! - Fan SIGTERM out to every worker on shutdown
//!
//! # Design Decisions
//! - The state machine (`SupervisorState`) is pure: events in, actions out.
//!   The runtime (`Supervisor`) only performs those actions.
//! - Each child has one task that drains its stdout before reaping it, so every
//!   message a worker sent is handled before its exit event
//! - Workers receive their configuration as JSON on stdin
//!
//! # Data Flow
//! ```text
//! child stdout (NDJSON) ─┐
//! child exit status ─────┼─▶ Event ─▶ SupervisorState::handle ─▶ Vec<Action> ─▶ Supervisor::apply
//! SIGTERM / Ctrl-C ──────┘
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::config::ProxyConfig;
use crate::ipc::{ErrorInfo, InfoName, IpcError, IpcMessage, IpcReader, IpcSender};
use crate::lifecycle::classify::{classify, startup_failed_message, ErrorClass};
use crate::lifecycle::{pidfile, signals};
use crate::net::listener;

/// Message carried by the aggregate readiness notification.
pub const STARTUP_COMPLETE: &str = "REX-STARTUP-COMPLETE";

pub type WorkerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A configured port is already taken; nothing has been forked.
    PortUnavailable(ErrorInfo),
    Spawned(WorkerId),
    SpawnFailed(ErrorInfo),
    Message(WorkerId, IpcMessage),
    Exited(WorkerId, Option<i32>),
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Fork,
    Kill(WorkerId),
    NotifyParent(IpcMessage),
    ClearIdentity,
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WorkerRecord {
    is_online: bool,
    is_ready: bool,
}

/// Pure supervisor state machine.
#[derive(Debug)]
pub struct SupervisorState {
    phase: Phase,
    worker_count: usize,
    spawned_total: usize,
    workers: BTreeMap<WorkerId, WorkerRecord>,
    ready_count: usize,
    announced: bool,
}

impl SupervisorState {
    pub fn new(worker_count: usize) -> Self {
        Self {
            phase: Phase::Starting,
            worker_count,
            spawned_total: 0,
            workers: BTreeMap::new(),
            ready_count: 0,
            announced: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    /// Initial forks.
    pub fn start(&mut self) -> Vec<Action> {
        vec![Action::Fork; self.worker_count]
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.phase == Phase::Terminated {
            return Vec::new();
        }

        match event {
            Event::PortUnavailable(error) => {
                let message = match classify(&error) {
                    ErrorClass::Fatal { message, .. } => message,
                    ErrorClass::Recoverable => error.message.clone().unwrap_or_else(|| error.code.clone()),
                };
                tracing::error!(code = %error.code, "{}", message);
                self.shutdown_fatal(&error, &message)
            }
            Event::Spawned(id) => {
                self.workers.insert(
                    id,
                    WorkerRecord {
                        is_online: true,
                        is_ready: false,
                    },
                );
                self.spawned_total += 1;
                if self.phase == Phase::Starting && self.spawned_total >= self.worker_count {
                    self.phase = Phase::Running;
                }
                Vec::new()
            }
            Event::SpawnFailed(error) => {
                let message = error.message.clone().unwrap_or_else(|| error.code.clone());
                self.shutdown_fatal(&error, &format!("Failed to start worker: {}", message))
            }
            Event::Message(id, IpcMessage::Info { name: InfoName::Ready, .. }) => self.on_ready(id),
            Event::Message(id, IpcMessage::Info { name: InfoName::Restart, .. }) => {
                tracing::info!(worker = id, "Worker requested restart");
                self.kill(id)
            }
            Event::Message(id, IpcMessage::Error { data }) => match classify(&data) {
                ErrorClass::Fatal { kind, message } => {
                    tracing::error!(worker = id, code = %data.code, kind = ?kind, "{}", message);
                    self.shutdown_fatal(&data, &message)
                }
                ErrorClass::Recoverable => {
                    tracing::warn!(worker = id, code = %data.code, message = ?data.message, "Worker reported an error");
                    self.kill(id)
                }
            },
            Event::Exited(id, code) => self.on_exit(id, code),
            Event::Terminate => {
                tracing::warn!("Master process shutting down");
                self.phase = Phase::ShuttingDown;
                let mut actions = self.kill_all();
                actions.push(Action::ClearIdentity);
                actions.push(Action::Exit(0));
                self.phase = Phase::Terminated;
                actions
            }
        }
    }

    fn on_ready(&mut self, id: WorkerId) -> Vec<Action> {
        let Some(record) = self.workers.get_mut(&id) else {
            return Vec::new();
        };
        if record.is_ready {
            return Vec::new();
        }
        record.is_ready = true;
        self.ready_count += 1;
        tracing::info!(worker = id, ready = self.ready_count, of = self.worker_count, "Worker ready");

        if self.ready_count >= self.worker_count && !self.announced {
            self.announced = true;
            tracing::info!(workers = self.worker_count, "All workers ready");
            return vec![Action::NotifyParent(IpcMessage::ready(STARTUP_COMPLETE))];
        }
        Vec::new()
    }

    fn on_exit(&mut self, id: WorkerId, code: Option<i32>) -> Vec<Action> {
        if let Some(record) = self.workers.remove(&id) {
            if record.is_ready {
                self.ready_count = self.ready_count.saturating_sub(1);
            }
        }
        match self.phase {
            Phase::Starting | Phase::Running => {
                tracing::error!(worker = id, code = ?code, "Worker process died, respawning");
                vec![Action::Fork]
            }
            Phase::ShuttingDown | Phase::Terminated => Vec::new(),
        }
    }

    fn kill(&mut self, id: WorkerId) -> Vec<Action> {
        match self.workers.get_mut(&id) {
            Some(record) if record.is_online => {
                record.is_online = false;
                vec![Action::Kill(id)]
            }
            _ => Vec::new(),
        }
    }

    fn kill_all(&mut self) -> Vec<Action> {
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        ids.into_iter().flat_map(|id| self.kill(id)).collect()
    }

    fn shutdown_fatal(&mut self, error: &ErrorInfo, message: &str) -> Vec<Action> {
        self.phase = Phase::ShuttingDown;
        let notice = ErrorInfo::new(error.code.clone()).with_message(startup_failed_message(message));
        let mut actions = vec![Action::NotifyParent(IpcMessage::error(notice))];
        actions.extend(self.kill_all());
        actions.push(Action::ClearIdentity);
        actions.push(Action::Exit(1));
        self.phase = Phase::Terminated;
        actions
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to serialize worker configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to write pid file: {0}")]
    PidFile(#[source] std::io::Error),
}

/// Everything the master needs to run.
#[derive(Debug)]
pub struct SupervisorOptions {
    /// Executable started as `<program> worker --id N`.
    pub program: PathBuf,
    pub config: ProxyConfig,
    pub pid_file: Option<PathBuf>,
    pub parent: IpcSender,
}

/// Runtime half of the master: performs the actions `SupervisorState` emits.
pub struct Supervisor {
    state: SupervisorState,
    program: PathBuf,
    config_json: Vec<u8>,
    addresses: Vec<SocketAddr>,
    pid_file: Option<PathBuf>,
    parent: IpcSender,
    children: HashMap<WorkerId, u32>,
    next_id: WorkerId,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Result<Self, SupervisorError> {
        let config_json = serde_json::to_vec(&options.config)?;
        // port 0 is resolved per bind, so there is nothing to collide with
        let addresses = options
            .config
            .server
            .instances
            .iter()
            .filter(|instance| instance.port != 0)
            .map(|instance| SocketAddr::new(instance.bind, instance.port))
            .collect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            state: SupervisorState::new(options.config.workers.resolve()),
            program: options.program,
            config_json,
            addresses,
            pid_file: options.pid_file,
            parent: options.parent,
            children: HashMap::new(),
            next_id: 1,
            events_tx,
            events_rx,
        })
    }

    /// Supervise until shutdown; returns the process exit code.
    pub async fn run(mut self) -> Result<i32, SupervisorError> {
        if let Some(path) = &self.pid_file {
            pidfile::write(path, std::process::id()).map_err(SupervisorError::PidFile)?;
        }

        let signal_tx = self.events_tx.clone();
        tokio::spawn(async move {
            signals::terminate().await;
            let _ = signal_tx.send(Event::Terminate);
        });

        tracing::info!(workers = self.state.worker_count, "Master process started");

        let mut pending = VecDeque::new();
        if let Err(error) = self.addresses.iter().try_for_each(|addr| listener::ensure_available(*addr)) {
            let actions = self.state.handle(Event::PortUnavailable(error.to_error_info()));
            if let Some(code) = self.apply(actions, &mut pending) {
                return Ok(code);
            }
        }

        let initial = self.state.start();
        if let Some(code) = self.apply(initial, &mut pending) {
            return Ok(code);
        }

        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None => match self.events_rx.recv().await {
                    Some(event) => event,
                    None => return Ok(1),
                },
            };
            if let Event::Exited(id, _) = &event {
                self.children.remove(id);
            }
            let actions = self.state.handle(event);
            if let Some(code) = self.apply(actions, &mut pending) {
                return Ok(code);
            }
        }
    }

    fn apply(&mut self, actions: Vec<Action>, pending: &mut VecDeque<Event>) -> Option<i32> {
        for action in actions {
            match action {
                Action::Fork => pending.push_back(self.fork()),
                Action::Kill(id) => self.kill(id),
                Action::NotifyParent(message) => {
                    if let Err(error) = self.parent.send(&message) {
                        tracing::error!(error = %error, "Failed to notify parent process");
                    }
                }
                Action::ClearIdentity => {
                    if let Some(path) = &self.pid_file {
                        if let Err(error) = pidfile::clear(path) {
                            tracing::warn!(path = %path.display(), error = %error, "Failed to clear pid file");
                        }
                    }
                }
                Action::Exit(code) => return Some(code),
            }
        }
        None
    }

    fn fork(&mut self) -> Event {
        let id = self.next_id;
        self.next_id += 1;

        let spawned = Command::new(&self.program)
            .arg("worker")
            .arg("--id")
            .arg(id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                tracing::error!(worker = id, error = %error, "Failed to spawn worker");
                return Event::SpawnFailed(ErrorInfo::from_io(&error, "spawn"));
            }
        };

        if let Some(pid) = child.id() {
            self.children.insert(id, pid);
            tracing::info!(worker = id, pid, "Worker process started");
        }

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let config = self.config_json.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(error) = stdin.write_all(&config).await {
                    tracing::warn!(worker = id, error = %error, "Failed to send configuration to worker");
                }
                // dropping stdin signals end of configuration
            }

            if let Some(stdout) = stdout {
                let mut reader = IpcReader::new(BufReader::new(stdout));
                loop {
                    match reader.next_message().await {
                        Ok(Some(message)) => {
                            let _ = events.send(Event::Message(id, message));
                        }
                        Ok(None) => break,
                        Err(error @ IpcError::Decode { .. }) => {
                            tracing::warn!(worker = id, error = %error, "Ignoring malformed worker message");
                        }
                        Err(error) => {
                            tracing::warn!(worker = id, error = %error, "Worker IPC channel failed");
                            break;
                        }
                    }
                }
            }

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(error) => {
                    tracing::warn!(worker = id, error = %error, "Failed to reap worker");
                    None
                }
            };
            let _ = events.send(Event::Exited(id, code));
        });

        Event::Spawned(id)
    }

    fn kill(&self, id: WorkerId) {
        let Some(&pid) = self.children.get(&id) else {
            return;
        };
        tracing::info!(worker = id, pid, "Terminating worker");
        if let Err(error) = signals::send_sigterm(pid) {
            tracing::warn!(worker = id, pid, error = %error, "Failed to signal worker");
        }
    }
}
