//! Ownership of the external capture process.
//!
//! stdout is exposed as a plain blocking [`Read`] for the demuxers. stderr is
//! drained by a dedicated thread into a [`DiagnosticBuffer`] so the child can
//! never stall on a full pipe, whether or not anyone looks at the diagnostics.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use super::diagnostics::DiagnosticBuffer;
use crate::errors::{CaptureError, Result};

/// Size of each stderr read performed by the drain thread.
const DRAIN_CHUNK: usize = 1024;

/// Program and argument vector for a capture process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Mirror stderr into the log at debug level.
    pub verbose: bool,
}

impl CaptureCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            verbose: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Launch the process described by this command.
    pub fn spawn(&self) -> Result<CaptureProcess> {
        CaptureProcess::spawn(self)
    }
}

/// Pid of a child that has not been reaped yet. Cleared under the lock before
/// reaping so a [`StopHandle`] never signals a recycled pid.
type LivePid = Arc<Mutex<Option<u32>>>;

fn lock_pid(pid: &LivePid) -> MutexGuard<'_, Option<u32>> {
    pid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Kills a [`CaptureProcess`] from another thread.
///
/// Used to unblock a reader stuck in `read` on a stalled process; the owner
/// still calls [`CaptureProcess::stop`] to reap it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    program: String,
    pid: LivePid,
}

impl StopHandle {
    /// Kill the process group. Returns false when the process was already
    /// reaped or the signal could not be sent.
    pub fn kill(&self) -> bool {
        let pid = lock_pid(&self.pid);
        match *pid {
            Some(pid) => {
                log::info!("Killing {} (pid {}) from stop handle", self.program, pid);
                kill_group(pid)
            }
            None => false,
        }
    }
}

/// A running capture process.
///
/// Reads come from the child's stdout. Call [`CaptureProcess::stop`] to
/// terminate it and collect the exit status; dropping the handle performs the
/// same shutdown on a best-effort basis.
pub struct CaptureProcess {
    program: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    diagnostics: DiagnosticBuffer,
    drain: Option<JoinHandle<()>>,
    drain_done: Receiver<()>,
    live_pid: LivePid,
}

impl CaptureProcess {
    /// Launch `program` with `args`, stdout and stderr piped.
    pub fn start<S: AsRef<OsStr>>(program: &str, args: &[S]) -> Result<Self> {
        let args = args
            .iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned());
        CaptureCommand::new(program).args(args).spawn()
    }

    fn spawn(command: &CaptureCommand) -> Result<Self> {
        let launch_error = |source: io::Error| CaptureError::Launch {
            program: command.program.clone(),
            source,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so stop() can take down any helpers the tool forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        log::debug!("Spawning {} with args: {:?}", command.program, command.args);
        let mut child = cmd.spawn().map_err(launch_error)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr) = match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                terminate(&mut child);
                let _ = child.wait();
                return Err(launch_error(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "failed to attach stdout/stderr",
                )));
            }
        };

        let diagnostics = DiagnosticBuffer::new();
        let (done_tx, drain_done) = crossbeam_channel::bounded(1);
        let drain_buffer = diagnostics.clone();
        let verbose = command.verbose;
        let pid = child.id();

        let drain = std::thread::Builder::new()
            .name("ffcapture-stderr-drain".to_string())
            .spawn(move || {
                drain_stderr(stderr, &drain_buffer, verbose, pid);
                let _ = done_tx.send(());
            });

        let drain = match drain {
            Ok(handle) => handle,
            Err(e) => {
                terminate(&mut child);
                let _ = child.wait();
                return Err(launch_error(e));
            }
        };

        log::info!("Started {} (pid {})", command.program, pid);

        Ok(Self {
            program: command.program.clone(),
            child: Some(child),
            stdout: Some(stdout),
            diagnostics,
            drain: Some(drain),
            drain_done,
            live_pid: Arc::new(Mutex::new(Some(pid))),
        })
    }

    /// OS process id of the child.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            program: self.program.clone(),
            pid: self.live_pid.clone(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Snapshot of the last stderr bytes, decoded lossily.
    pub fn last_diagnostics(&self) -> String {
        self.diagnostics.snapshot_string()
    }

    /// Shared handle to the stderr ring, usable from other threads.
    pub fn diagnostics(&self) -> DiagnosticBuffer {
        self.diagnostics.clone()
    }

    /// True once the child has closed stderr and the drain thread has exited.
    pub fn diagnostics_closed(&self) -> bool {
        self.drain.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Non-blocking check for process exit.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Err(CaptureError::AlreadyStopped);
        };
        let mut pid = lock_pid(&self.live_pid);
        let status = child.try_wait().map_err(CaptureError::Wait)?;
        if status.is_some() {
            *pid = None;
        }
        Ok(status)
    }

    /// Terminate the process and collect its exit status.
    ///
    /// The drain thread is joined before waiting on the child so the
    /// diagnostics snapshot reflects everything the process wrote.
    pub fn stop(&mut self) -> Result<ExitStatus> {
        let mut child = self.child.take().ok_or(CaptureError::AlreadyStopped)?;

        log::info!("Stopping {} (pid {})", self.program, child.id());
        terminate(&mut child);
        self.stdout = None;

        // Sender is dropped without sending only if the drain thread panicked.
        let _ = self.drain_done.recv();
        if let Some(handle) = self.drain.take() {
            if handle.join().is_err() {
                log::warn!("stderr drain thread for {} panicked", self.program);
            }
        }

        *lock_pid(&self.live_pid) = None;
        let status = child.wait().map_err(CaptureError::Wait)?;
        log::debug!("{} exited with {}", self.program, status);
        Ok(status)
    }
}

impl Read for CaptureProcess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("Error stopping {} during drop: {}", self.program, e);
            }
        }
    }
}

fn drain_stderr(mut stderr: ChildStderr, buffer: &DiagnosticBuffer, verbose: bool, pid: u32) {
    let mut chunk = [0u8; DRAIN_CHUNK];
    loop {
        match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.append(&chunk[..n]);
                if verbose {
                    log::debug!("[pid {}] {}", pid, String::from_utf8_lossy(&chunk[..n]).trim_end());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("stderr drain for pid {} ended: {}", pid, e);
                break;
            }
        }
    }
}

fn terminate(child: &mut Child) {
    if !kill_group(child.id()) {
        let _ = child.kill();
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid targets
    // the process group created for this child at spawn time.
    unsafe { libc::kill(-pgid, libc::SIGKILL) == 0 }
}

// Without process groups only the owning `Child` can kill the process.
#[cfg(not(unix))]
fn kill_group(_pid: u32) -> bool {
    false
}
