//! Spawning actors as processes or threads.
//!
//! Process mode re-executes the current binary with an internal argv
//! (`__pulsar-worker ...`) carrying everything the child needs: its aid,
//! name, kind, and the arbiter's mailbox address. Thread mode runs the
//! same worker entry on a dedicated OS thread. Embedding binaries call
//! [`maybe_run_worker`] first thing in `main` so spawned processes take
//! the worker path instead of starting another arbiter.

// Layer 1: Standard library imports
use std::fmt;
use std::net::SocketAddr;
use std::process::{Child, Command};
use std::str::FromStr;
use std::thread::JoinHandle;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

// Layer 3: Internal module imports
use super::error::ActorError;
use super::factory::create_actor;
use super::runner::run_actor_blocking;
use crate::message::DEFAULT_MAX_FRAME_SIZE;
use crate::util::ActorId;

/// First argv token of a spawned worker process.
pub const WORKER_ARG: &str = "__pulsar-worker";

/// How an actor's loop is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    /// A forked/spawned OS process (the default): full isolation.
    Process,
    /// An OS thread in the arbiter's process; same semantics, shared heap.
    Thread,
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        Self::Process
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

impl FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Self::Process),
            "thread" => Ok(Self::Thread),
            other => Err(format!("unknown concurrency mode: {other}")),
        }
    }
}

/// Everything a spawned actor needs to start.
#[derive(Debug, Clone)]
pub struct SpawnParams {
    /// Identity assigned by the supervisor before the spawn
    pub aid: ActorId,
    /// Actor name (defaults to the kind when not given)
    pub name: String,
    /// Actor kind, resolved through the factory registry
    pub kind: String,
    /// Process or thread
    pub mode: ConcurrencyMode,
    /// Address of the arbiter's mailbox server
    pub mailbox_addr: SocketAddr,
    /// Identity of the supervisor (the arbiter)
    pub supervisor: ActorId,
    /// Handshake deadline
    pub handshake_timeout: Duration,
    /// Period of the actor's own notify heartbeat
    pub heartbeat_interval: Duration,
    /// Frame payload cap for the mailbox connection
    pub max_frame_size: usize,
}

impl SpawnParams {
    /// The worker argv encoding of these parameters (without
    /// [`WORKER_ARG`] itself).
    pub fn to_argv(&self) -> Vec<String> {
        vec![
            "--aid".to_owned(),
            self.aid.to_string(),
            "--name".to_owned(),
            self.name.clone(),
            "--kind".to_owned(),
            self.kind.clone(),
            "--mode".to_owned(),
            self.mode.to_string(),
            "--mailbox".to_owned(),
            self.mailbox_addr.to_string(),
            "--supervisor".to_owned(),
            self.supervisor.to_string(),
            "--handshake-timeout-ms".to_owned(),
            self.handshake_timeout.as_millis().to_string(),
            "--heartbeat-ms".to_owned(),
            self.heartbeat_interval.as_millis().to_string(),
            "--max-frame".to_owned(),
            self.max_frame_size.to_string(),
        ]
    }

    /// Parse a worker argv produced by [`to_argv`](Self::to_argv).
    pub fn from_argv(args: &[String]) -> Result<Self, ActorError> {
        fn invalid(reason: impl Into<String>) -> ActorError {
            ActorError::InvalidSpawnParams(reason.into())
        }

        let mut aid = None;
        let mut name = None;
        let mut kind = None;
        let mut mode = ConcurrencyMode::Process;
        let mut mailbox_addr = None;
        let mut supervisor = None;
        let mut handshake_timeout = Duration::from_secs(5);
        let mut heartbeat_interval = Duration::from_secs(2);
        let mut max_frame_size = DEFAULT_MAX_FRAME_SIZE;

        let mut pairs = args.chunks_exact(2);
        for pair in &mut pairs {
            let (flag, value) = (pair[0].as_str(), pair[1].as_str());
            match flag {
                "--aid" => aid = Some(value.parse().map_err(|_| invalid("bad aid"))?),
                "--name" => name = Some(value.to_owned()),
                "--kind" => kind = Some(value.to_owned()),
                "--mode" => mode = value.parse().map_err(invalid)?,
                "--mailbox" => {
                    mailbox_addr = Some(value.parse().map_err(|_| invalid("bad mailbox address"))?)
                }
                "--supervisor" => {
                    supervisor = Some(value.parse().map_err(|_| invalid("bad supervisor aid"))?)
                }
                "--handshake-timeout-ms" => {
                    let ms: u64 = value.parse().map_err(|_| invalid("bad handshake timeout"))?;
                    handshake_timeout = Duration::from_millis(ms);
                }
                "--heartbeat-ms" => {
                    let ms: u64 = value.parse().map_err(|_| invalid("bad heartbeat interval"))?;
                    heartbeat_interval = Duration::from_millis(ms);
                }
                "--max-frame" => {
                    max_frame_size = value.parse().map_err(|_| invalid("bad max frame size"))?
                }
                other => return Err(invalid(format!("unknown flag: {other}"))),
            }
        }
        if !pairs.remainder().is_empty() {
            return Err(invalid("dangling flag without value"));
        }

        let kind = kind.ok_or_else(|| invalid("missing --kind"))?;
        Ok(Self {
            aid: aid.ok_or_else(|| invalid("missing --aid"))?,
            name: name.unwrap_or_else(|| kind.clone()),
            kind,
            mode,
            mailbox_addr: mailbox_addr.ok_or_else(|| invalid("missing --mailbox"))?,
            supervisor: supervisor.ok_or_else(|| invalid("missing --supervisor"))?,
            handshake_timeout,
            heartbeat_interval,
            max_frame_size,
        })
    }
}

/// Handle to a spawned child, held by its supervisor.
#[derive(Debug)]
pub enum SpawnedChild {
    /// A worker process
    Process(Child),
    /// A worker thread
    Thread(JoinHandle<()>),
}

impl SpawnedChild {
    /// Which mode this child runs in.
    pub fn mode(&self) -> ConcurrencyMode {
        match self {
            Self::Process(_) => ConcurrencyMode::Process,
            Self::Thread(_) => ConcurrencyMode::Thread,
        }
    }

    /// True once the child's process has exited or its thread returned.
    pub fn is_finished(&mut self) -> bool {
        match self {
            Self::Process(child) => matches!(child.try_wait(), Ok(Some(_))),
            Self::Thread(handle) => handle.is_finished(),
        }
    }

    /// Ask the child to terminate (SIGTERM). Threads stop through their
    /// mailbox instead and this is a no-op for them.
    pub fn terminate(&mut self) {
        match self {
            #[cfg(unix)]
            Self::Process(child) => {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;
                let pid = Pid::from_raw(child.id() as i32);
                if let Err(error) = kill(pid, Signal::SIGTERM) {
                    warn!(%error, pid = child.id(), "SIGTERM failed");
                }
            }
            #[cfg(not(unix))]
            Self::Process(child) => {
                let _ = child.kill();
            }
            Self::Thread(_) => {}
        }
    }

    /// Force-kill the child's process and reap it. Threads cannot be
    /// force-killed; the caller waits and logs instead.
    pub fn force_kill(&mut self) {
        match self {
            Self::Process(child) => {
                if let Err(error) = child.kill() {
                    warn!(%error, pid = child.id(), "kill failed");
                }
                let _ = child.wait();
            }
            Self::Thread(handle) => {
                if !handle.is_finished() {
                    warn!("thread workers cannot be force-killed; waiting");
                }
            }
        }
    }

    /// Reap an exited worker process so it does not linger as a zombie.
    pub fn reap(&mut self) {
        if let Self::Process(child) = self {
            let _ = child.try_wait();
        }
    }
}

/// Launch a child actor in its own process or thread.
pub fn spawn_child(params: SpawnParams) -> Result<SpawnedChild, ActorError> {
    match params.mode {
        ConcurrencyMode::Process => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe)
                .arg(WORKER_ARG)
                .args(params.to_argv())
                .spawn()?;
            Ok(SpawnedChild::Process(child))
        }
        ConcurrencyMode::Thread => {
            // The factory must exist in this process; resolve before the
            // thread starts so the error surfaces to the spawner.
            let actor = create_actor(&params.kind)?;
            let thread_name = format!("pulsar-{}", params.name);
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    if let Err(error) = run_actor_blocking(actor, params) {
                        error!(%error, "worker thread exited with error");
                    }
                })
                .map_err(ActorError::from)?;
            Ok(SpawnedChild::Thread(handle))
        }
    }
}

/// Worker-process entry: if the current argv is a worker argv, run the
/// worker to completion and return its exit code.
///
/// Embedding binaries call this before anything else in `main`:
///
/// ```rust,no_run
/// fn main() {
///     if let Some(code) = pulsar_rt::actor::maybe_run_worker() {
///         std::process::exit(code);
///     }
///     // ... start the arbiter ...
/// }
/// ```
pub fn maybe_run_worker() -> Option<i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) != Some(WORKER_ARG) {
        return None;
    }
    Some(run_worker(&args[1..]))
}

fn run_worker(args: &[String]) -> i32 {
    let params = match SpawnParams::from_argv(args) {
        Ok(params) => params,
        Err(error) => {
            error!(%error, "invalid worker parameters");
            return 2;
        }
    };
    let actor = match create_actor(&params.kind) {
        Ok(actor) => actor,
        Err(error) => {
            error!(%error, kind = %params.kind, "cannot build worker actor");
            return 2;
        }
    };
    match run_actor_blocking(actor, params) {
        Ok(()) => 0,
        Err(error) => {
            error!(%error, "worker exited with error");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> SpawnParams {
        SpawnParams {
            aid: ActorId::new(),
            name: "worker-1".to_owned(),
            kind: "echo".to_owned(),
            mode: ConcurrencyMode::Thread,
            mailbox_addr: "127.0.0.1:4567".parse().unwrap(),
            supervisor: ActorId::new(),
            handshake_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(2),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    #[test]
    fn test_argv_roundtrip() {
        let params = sample_params();
        let parsed = SpawnParams::from_argv(&params.to_argv()).unwrap();

        assert_eq!(parsed.aid, params.aid);
        assert_eq!(parsed.name, params.name);
        assert_eq!(parsed.kind, params.kind);
        assert_eq!(parsed.mode, params.mode);
        assert_eq!(parsed.mailbox_addr, params.mailbox_addr);
        assert_eq!(parsed.supervisor, params.supervisor);
        assert_eq!(parsed.handshake_timeout, params.handshake_timeout);
        assert_eq!(parsed.heartbeat_interval, params.heartbeat_interval);
        assert_eq!(parsed.max_frame_size, params.max_frame_size);
    }

    #[test]
    fn test_missing_required_flags() {
        let result = SpawnParams::from_argv(&["--name".to_owned(), "x".to_owned()]);
        assert!(matches!(result, Err(ActorError::InvalidSpawnParams(_))));
    }

    #[test]
    fn test_name_defaults_to_kind() {
        let params = sample_params();
        let mut argv = params.to_argv();
        // Drop the name pair.
        let at = argv.iter().position(|flag| flag == "--name").unwrap();
        argv.drain(at..at + 2);

        let parsed = SpawnParams::from_argv(&argv).unwrap();
        assert_eq!(parsed.name, "echo");
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let mut argv = sample_params().to_argv();
        argv.push("--bogus".to_owned());
        argv.push("value".to_owned());

        assert!(matches!(
            SpawnParams::from_argv(&argv),
            Err(ActorError::InvalidSpawnParams(_))
        ));
    }

    #[test]
    fn test_dangling_flag_rejected() {
        let mut argv = sample_params().to_argv();
        argv.push("--aid".to_owned());

        assert!(matches!(
            SpawnParams::from_argv(&argv),
            Err(ActorError::InvalidSpawnParams(_))
        ));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "process".parse::<ConcurrencyMode>().unwrap(),
            ConcurrencyMode::Process
        );
        assert_eq!(
            "thread".parse::<ConcurrencyMode>().unwrap(),
            ConcurrencyMode::Thread
        );
        assert!("fiber".parse::<ConcurrencyMode>().is_err());
        assert_eq!(ConcurrencyMode::default(), ConcurrencyMode::Process);
    }

    #[test]
    fn test_spawn_unknown_kind_fails_before_thread_start() {
        let mut params = sample_params();
        params.kind = "never-registered-kind".to_owned();

        assert!(matches!(
            spawn_child(params),
            Err(ActorError::UnknownKind(_))
        ));
    }
}
