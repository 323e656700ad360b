//! Child process supervision for the daemons and the indexing service.
//!
//! [`ProcessSupervisor`] owns every child it starts. Termination is a single
//! SIGTERM per process followed by one fixed grace period for the whole set;
//! anything still alive afterwards is killed and reaped. Dropping the
//! supervisor kills whatever it still tracks.

mod error;
mod output;
mod spec;


use std::fmt;
use std::fs;
use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::rpc::RpcEndpoint;

pub use error::SpawnError;
pub use spec::{DaemonArgs, ProcessSpec};

/// Log target for process lifecycle events.
pub(crate) const PROCESS_TARGET: &str = "regtest_harness::process";

/// Which of the two daemons an instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Started first; listens for the peer connection and mines the
    /// maturity blocks.
    Primary,
    /// Started second; connects out to the primary.
    Secondary,
}

impl Role {
    /// Lower-case role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    id: u64,
    pid: u32,
    name: String,
}

impl ProcessHandle {
    /// Operating system process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a daemon takes part in the two-node network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peering {
    /// Accept inbound peers on `port`.
    Listen {
        /// P2P port.
        port: u16,
    },
    /// Refuse inbound peers and connect out to `address`.
    Connect {
        /// `host:port` of the listening daemon.
        address: String,
    },
}

/// Launch parameters for one daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonLaunch {
    /// Role of the daemon.
    pub role: Role,
    /// Daemon executable.
    pub program: String,
    /// Positional arguments placed before the flags.
    pub prefix_args: Vec<String>,
    /// Data directory; wiped and recreated before launch.
    pub data_dir: Utf8PathBuf,
    /// RPC server address and credentials.
    pub rpc: RpcEndpoint,
    /// P2P behaviour.
    pub peering: Peering,
}

impl DaemonLaunch {
    /// The daemon's flag map.
    #[must_use]
    pub fn flags(&self) -> DaemonArgs {
        let mut flags = DaemonArgs::new();
        flags
            .set("datadir", &self.data_dir)
            .set("listen", u8::from(self.listening()))
            .set("regtest", 1)
            .set("server", 1)
            .set("rpcuser", &self.rpc.user)
            .set("rpcpassword", &self.rpc.password)
            .set("rpcport", self.rpc.port);
        match &self.peering {
            Peering::Listen { port } => flags.set("port", port),
            Peering::Connect { address } => flags.set("connect", address),
        };
        flags
    }

    /// Whether the daemon accepts inbound peers.
    #[must_use]
    pub const fn listening(&self) -> bool {
        matches!(self.peering, Peering::Listen { .. })
    }

    /// The process spec the daemon is started from.
    #[must_use]
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec::new(format!("daemon-{}", self.role), self.program.clone())
            .args(self.prefix_args.iter().cloned())
            .flags(self.flags())
            .working_dir(self.data_dir.clone())
    }
}

/// A running daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonInstance {
    /// Process handle.
    pub handle: ProcessHandle,
    /// Data directory owned by this daemon.
    pub data_dir: Utf8PathBuf,
    /// RPC endpoint.
    pub rpc: RpcEndpoint,
    /// Role in the network.
    pub role: Role,
    /// Whether it accepts inbound peers.
    pub listening: bool,
}

#[derive(Debug)]
struct TrackedProcess {
    handle: ProcessHandle,
    child: Child,
    working_dir: Option<Utf8PathBuf>,
    signalled: bool,
}

/// Owns and terminates child processes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    grace: Duration,
    echo_output: bool,
    next_id: u64,
    tracked: Vec<TrackedProcess>,
}

impl ProcessSupervisor {
    /// Creates a supervisor with the teardown grace period and output policy.
    #[must_use]
    pub const fn new(grace: Duration, echo_output: bool) -> Self {
        Self {
            grace,
            echo_output,
            next_id: 0,
            tracked: Vec::new(),
        }
    }

    /// Starts `spec` without waiting for it to become ready.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::DataDirectoryInUse`] when another tracked
    /// process runs in the same directory, and
    /// [`SpawnError::BinaryNotFound`] or [`SpawnError::Launch`] when the
    /// process cannot be started.
    pub fn spawn(&mut self, spec: &ProcessSpec) -> Result<ProcessHandle, SpawnError> {
        if let Some(dir) = spec.directory() {
            self.ensure_unowned(dir)?;
        }
        self.launch(spec)
    }

    /// Prepares a fresh data directory and starts a daemon in it.
    ///
    /// # Errors
    ///
    /// As [`spawn`](Self::spawn), plus [`SpawnError::DataDirectory`] when
    /// the directory cannot be recreated.
    pub fn spawn_daemon(&mut self, launch: &DaemonLaunch) -> Result<DaemonInstance, SpawnError> {
        self.prepare_dir(&launch.data_dir)?;
        let handle = self.launch(&launch.process_spec())?;
        Ok(DaemonInstance {
            handle,
            data_dir: launch.data_dir.clone(),
            rpc: launch.rpc.clone(),
            role: launch.role,
            listening: launch.listening(),
        })
    }

    /// Wipes and recreates `dir` unless a tracked process runs in it.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::DataDirectoryInUse`] or
    /// [`SpawnError::DataDirectory`].
    pub fn prepare_dir(&self, dir: &Utf8Path) -> Result<(), SpawnError> {
        self.ensure_unowned(dir)?;
        prepare_data_dir(dir)
    }

    fn ensure_unowned(&self, dir: &Utf8Path) -> Result<(), SpawnError> {
        let owner = self
            .tracked
            .iter()
            .find(|process| process.working_dir.as_deref() == Some(dir));
        match owner {
            Some(process) => Err(SpawnError::DataDirectoryInUse {
                path: dir.to_owned(),
                owner: process.handle.name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn launch(&mut self, spec: &ProcessSpec) -> Result<ProcessHandle, SpawnError> {
        let command_line = spec.command_line();
        debug!(
            target: PROCESS_TARGET,
            process = spec.name(),
            program = spec.program(),
            args = ?command_line,
            "spawning process"
        );

        let mut command = Command::new(spec.program());
        command.args(&command_line).stdin(Stdio::null());
        if self.echo_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        if let Some(dir) = spec.directory() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SpawnError::BinaryNotFound {
                    program: spec.program().to_owned(),
                    source: source.into(),
                }
            } else {
                SpawnError::Launch {
                    name: spec.name().to_owned(),
                    program: spec.program().to_owned(),
                    source: source.into(),
                }
            }
        })?;
        output::attach(&mut child, spec.name());

        let handle = ProcessHandle {
            id: self.next_id,
            pid: child.id(),
            name: spec.name().to_owned(),
        };
        self.next_id += 1;
        info!(
            target: PROCESS_TARGET,
            process = spec.name(),
            pid = handle.pid,
            "process started"
        );
        self.tracked.push(TrackedProcess {
            handle: handle.clone(),
            child,
            working_dir: spec.directory().map(Utf8Path::to_owned),
            signalled: false,
        });
        Ok(handle)
    }

    /// Sends the termination signal to one process.
    ///
    /// Safe to call repeatedly and on processes that already exited: each
    /// process is signalled at most once.
    pub fn terminate(&mut self, handle: &ProcessHandle) {
        if let Some(process) = self
            .tracked
            .iter_mut()
            .find(|process| process.handle.id == handle.id)
        {
            signal(process);
        }
    }

    /// Signals every tracked process, waits the grace period once, then
    /// reaps them all, killing any that ignored the signal.
    pub fn terminate_all(&mut self) {
        if self.tracked.is_empty() {
            return;
        }
        for process in &mut self.tracked {
            signal(process);
        }
        debug!(
            target: PROCESS_TARGET,
            count = self.tracked.len(),
            grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX),
            "waiting for processes to exit"
        );
        thread::sleep(self.grace);
        for process in self.tracked.drain(..) {
            reap(process);
        }
    }

    /// Number of processes still tracked.
    #[must_use]
    pub const fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Number of tracked processes that have not exited.
    pub fn running_count(&mut self) -> usize {
        self.tracked
            .iter_mut()
            .filter_map(|process| matches!(process.child.try_wait(), Ok(None)).then_some(()))
            .count()
    }

    /// Process ids of every tracked process.
    #[must_use]
    pub fn pids(&self) -> Vec<u32> {
        self.tracked.iter().map(|process| process.handle.pid).collect()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        for mut process in self.tracked.drain(..) {
            warn!(
                target: PROCESS_TARGET,
                process = %process.handle.name,
                pid = process.handle.pid,
                "killing process left running"
            );
            force_kill(&mut process.child, &process.handle);
        }
    }
}

fn signal(process: &mut TrackedProcess) {
    if process.signalled {
        return;
    }
    process.signalled = true;
    let handle = &process.handle;
    let Ok(raw) = i32::try_from(handle.pid) else {
        warn!(target: PROCESS_TARGET, pid = handle.pid, "pid out of range");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => debug!(
            target: PROCESS_TARGET,
            process = %handle.name,
            pid = handle.pid,
            "sent SIGTERM"
        ),
        Err(Errno::ESRCH) => debug!(
            target: PROCESS_TARGET,
            process = %handle.name,
            pid = handle.pid,
            "process already gone"
        ),
        Err(error) => warn!(
            target: PROCESS_TARGET,
            process = %handle.name,
            pid = handle.pid,
            %error,
            "failed to signal process"
        ),
    }
}

fn reap(mut process: TrackedProcess) {
    match process.child.try_wait() {
        Ok(Some(status)) => debug!(
            target: PROCESS_TARGET,
            process = %process.handle.name,
            ?status,
            "process exited"
        ),
        Ok(None) | Err(_) => {
            warn!(
                target: PROCESS_TARGET,
                process = %process.handle.name,
                pid = process.handle.pid,
                "process outlived grace period, killing"
            );
            force_kill(&mut process.child, &process.handle);
        }
    }
}

fn force_kill(child: &mut Child, handle: &ProcessHandle) {
    if let Err(error) = child.kill() {
        debug!(target: PROCESS_TARGET, process = %handle.name, %error, "kill failed");
    }
    if let Err(error) = child.wait() {
        debug!(target: PROCESS_TARGET, process = %handle.name, %error, "wait failed");
    }
}

/// Removes `path` if present and creates it empty.
///
/// # Errors
///
/// Returns [`SpawnError::DataDirectory`] when either step fails.
pub fn prepare_data_dir(path: &Utf8Path) -> Result<(), SpawnError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(SpawnError::data_directory(path, error)),
    }
    fs::create_dir_all(path).map_err(|error| SpawnError::data_directory(path, error))
}

/// Removes a data directory after teardown; failures are logged only.
pub fn discard_data_dir(path: &Utf8Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(target: PROCESS_TARGET, %path, "removed data directory"),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!(
            target: PROCESS_TARGET,
            %path,
            %error,
            "failed to remove data directory"
        ),
    }
}
