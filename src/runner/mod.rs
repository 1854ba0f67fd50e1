//! Process lifecycle and crash-loop supervision.
//!
//! A [`Runner`] owns one OS process at a time. `prepare` builds a fresh
//! process description and streamer pair, `start` launches it and waits
//! for it to exit, racing the optional deadline and the external stop
//! signal against the wait. `exec_loop` restarts background commands
//! until either circuit breaker trips.

pub mod error;

pub use error::ProcessError;

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CommandSpec;
use crate::streamer::{ConsoleSink, LineStreamer};

/// Exit codes strictly above this value fall in the reserved range shells
/// use for fatal failures; the status breaker counts them as bad exits.
const FATAL_STATUS_FLOOR: i32 = 120;

/// Restarts spaced closer than this count toward the time-window breaker.
const RESPAWN_WINDOW: Duration = Duration::from_secs(1);

/// Streak length on either breaker that halts auto-restart.
const RESTART_LIMIT: u32 = 3;

/// Builds one streamer per stream prefix, called at every `prepare`.
pub type StreamerFactory = Box<dyn Fn(&str) -> LineStreamer + Send + Sync>;

/// One logical supervised process across its restart attempts.
pub struct Runner {
    spec: CommandSpec,
    argv: Vec<String>,
    make_streamer: StreamerFactory,
    command: Option<Command>,
    streamers: Option<(LineStreamer, LineStreamer)>,
    status: i32,
    stop: Arc<Notify>,
}

/// Stop signal for a runner driven from another task. Cloneable; stopping
/// when nothing is running is a no-op.
#[derive(Clone)]
pub struct RunnerHandle {
    stop: Arc<Notify>,
}

impl RunnerHandle {
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

impl Runner {
    /// Build a runner from a command spec, tokenizing its argument
    /// template. An unparseable template degrades to no arguments rather
    /// than failing the request.
    pub fn new(spec: CommandSpec) -> Self {
        let argv = match shell_words::split(&spec.args) {
            Ok(argv) => argv,
            Err(err) => {
                warn!(
                    command = %spec.path,
                    args = %spec.args,
                    error = %err,
                    "unparseable argument template"
                );
                Vec::new()
            }
        };
        let name = spec.path.clone();
        Self {
            spec,
            argv,
            make_streamer: Box::new(move |prefix| {
                LineStreamer::new(prefix, false).with_sink(Box::new(ConsoleSink::new(&name)))
            }),
            command: None,
            streamers: None,
            status: 0,
            stop: Arc::new(Notify::new()),
        }
    }

    /// Replace the argument vector resolved from the spec template, for
    /// launch requests that carry their own arguments.
    pub fn with_args(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    pub fn with_streamer_factory(mut self, factory: StreamerFactory) -> Self {
        self.make_streamer = factory;
        self
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    /// Build a fresh process description and streamer pair. Required
    /// before every start; each description is consumed by the start that
    /// follows it.
    pub fn prepare(&mut self) {
        let mut cmd = Command::new(&self.spec.path);
        cmd.args(&self.argv);
        if !self.spec.cwd.is_empty() {
            cmd.current_dir(&self.spec.cwd);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        self.command = Some(cmd);
        self.streamers = Some((
            (self.make_streamer)("stdout"),
            (self.make_streamer)("stderr"),
        ));
    }

    /// Launch the prepared process and wait for it to exit. A spawn
    /// failure is logged and reported as an abnormal non-zero exit. Both
    /// streamers are flushed before this returns, so no trailing output
    /// is lost. Meant to be driven from its own task so the caller's loop
    /// stays responsive.
    pub async fn start(&mut self) -> i32 {
        self.status = 0;
        let Some(mut cmd) = self.command.take() else {
            warn!(command = %self.spec.path, "start without prepare");
            return self.status;
        };
        let (mut out_streamer, mut err_streamer) = match self.streamers.take() {
            Some(pair) => pair,
            None => (
                (self.make_streamer)("stdout"),
                (self.make_streamer)("stderr"),
            ),
        };

        debug!(
            command = %self.spec.path,
            args = ?self.argv,
            timeout_ms = self.spec.timeout_ms,
            "executing command"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let spawn_err = if err.kind() == std::io::ErrorKind::NotFound {
                    ProcessError::CommandNotFound(self.spec.path.clone())
                } else {
                    ProcessError::SpawnFailed {
                        command: self.spec.path.clone(),
                        source: err,
                    }
                };
                error!(
                    command = %self.spec.path,
                    args = ?self.argv,
                    error = %spawn_err,
                    "error executing command"
                );
                self.status = spawn_err.abnormal_status();
                let _ = out_streamer.close();
                let _ = err_streamer.close();
                return self.status;
            }
        };

        let out_pump = spawn_pump(child.stdout.take(), out_streamer);
        let err_pump = spawn_pump(child.stderr.take(), err_streamer);

        let status = self.supervise(&mut child).await;

        // Pumps finish at pipe EOF and flush on their way out.
        let _ = out_pump.await;
        let _ = err_pump.await;

        self.status = status;
        debug!(command = %self.spec.path, exitcode = self.status, "command exited");
        self.status
    }

    /// Supervision loop for background commands: restart after every exit
    /// until the command is oneshot or either circuit breaker trips.
    ///
    /// Two independent breakers guard two failure modes: processes that
    /// die immediately and respawn too fast (time-window streak), and
    /// processes that keep exiting with fatal-range codes even when the
    /// restarts are spaced out (status streak). The final exit status is
    /// returned to the embedder.
    pub async fn exec_loop(&mut self) -> i32 {
        let mut time_window_streak = 0u32;
        let mut status_streak = 0u32;
        let mut last_start = Instant::now();
        loop {
            let this_start = Instant::now();
            if this_start.duration_since(last_start) < RESPAWN_WINDOW {
                time_window_streak += 1;
            } else {
                time_window_streak = 1;
            }
            if is_fatal_status(self.status) {
                status_streak += 1;
            } else {
                status_streak = status_streak.saturating_sub(1);
            }
            last_start = this_start;

            self.prepare();
            debug!(
                command = %self.spec.path,
                args = ?self.argv,
                restart = time_window_streak,
                oneshot = self.spec.oneshot,
                "restart"
            );
            self.start().await;

            if self.spec.oneshot
                || time_window_streak == RESTART_LIMIT
                || status_streak == RESTART_LIMIT
            {
                info!(
                    restart_time = time_window_streak,
                    restart_fail = status_streak,
                    exitcode = self.status,
                    "restart limit reached"
                );
                return self.status;
            }
        }
    }

    async fn supervise(&self, child: &mut Child) -> i32 {
        enum Wakeup {
            Exited(std::io::Result<std::process::ExitStatus>),
            Deadline,
            Stopped,
        }

        let timeout = self.spec.timeout();
        let wakeup = tokio::select! {
            res = child.wait() => Wakeup::Exited(res),
            _ = deadline(timeout), if timeout.is_some() => Wakeup::Deadline,
            _ = self.stop.notified() => Wakeup::Stopped,
        };
        match wakeup {
            Wakeup::Exited(Ok(status)) => exit_code(status),
            Wakeup::Exited(Err(err)) => {
                error!(command = %self.spec.path, error = %err, "error waiting for command");
                -1
            }
            Wakeup::Deadline => {
                debug!(
                    command = %self.spec.path,
                    timeout_ms = self.spec.timeout_ms,
                    "timeout triggered"
                );
                self.kill_and_reap(child).await
            }
            Wakeup::Stopped => {
                info!(command = %self.spec.path, "stopping command");
                self.kill_and_reap(child).await
            }
        }
    }

    async fn kill_and_reap(&self, child: &mut Child) -> i32 {
        if let Err(err) = child.kill().await {
            warn!(command = %self.spec.path, error = %err, "failed to kill command");
        }
        match child.wait().await {
            Ok(status) => exit_code(status),
            Err(_) => -1,
        }
    }
}

fn is_fatal_status(status: i32) -> bool {
    status > FATAL_STATUS_FLOOR
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Drain one child pipe into its streamer from a dedicated task, closing
/// the streamer at EOF. A sink failure drops the affected line but keeps
/// draining so the process never blocks on a full pipe.
fn spawn_pump<R>(reader: Option<R>, mut streamer: LineStreamer) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            let _ = streamer.close();
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(err) = streamer.write(&chunk[..n]) {
                        warn!(prefix = streamer.prefix(), error = %err, "dropping output line");
                    }
                }
                Err(err) => {
                    warn!(prefix = streamer.prefix(), error = %err, "error reading command output");
                    break;
                }
            }
        }
        if let Err(err) = streamer.close() {
            warn!(prefix = streamer.prefix(), error = %err, "error flushing output");
        }
    })
}
