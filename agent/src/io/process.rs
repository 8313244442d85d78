//! Helpers for running child processes with timeouts and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Lossy stdout text with a truncation notice appended when bytes were dropped.
    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        text
    }

    /// Lossy stderr text with a truncation notice appended when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        text
    }
}

/// Build a platform shell invocation for `command` in `cwd`.
pub fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(cwd);
    cmd
}

/// Grace period for output readers to drain after the process group was killed.
const KILL_GRACE: Duration = Duration::from_secs(2);

type StreamOutput = Result<(Vec<u8>, usize)>;

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is fed and output is read concurrently while the child runs. `output_limit_bytes`
/// bounds the amount of stdout/stderr stored in memory (bytes beyond this are discarded while
/// still draining the pipe). The timeout covers the whole exchange: if the child is still
/// running, or something it left behind still holds the output pipes when the deadline
/// passes, the process group is killed and the output is marked `timed_out`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    own_process_group(&mut cmd);

    debug!("spawning child process");
    let deadline = Instant::now() + timeout;
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        spawn_stdin_writer(child_stdin, input.to_vec());
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let drain_by = if timed_out {
        Instant::now() + KILL_GRACE
    } else {
        deadline
    };
    let mut stdout_out = recv_by(&stdout_rx, drain_by);
    let mut stderr_out = recv_by(&stderr_rx, drain_by);
    if stdout_out.is_none() || stderr_out.is_none() {
        if !timed_out {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command exited but its output is still held open, killing process group"
            );
            timed_out = true;
            kill_tree(&mut child).context("kill leftover processes")?;
        }
        let grace = Instant::now() + KILL_GRACE;
        stdout_out = stdout_out.or_else(|| recv_by(&stdout_rx, grace));
        stderr_out = stderr_out.or_else(|| recv_by(&stderr_rx, grace));
    }

    let (stdout, stdout_truncated) = stdout_out
        .unwrap_or_else(|| Ok((Vec::new(), 0)))
        .context("collect stdout")?;
    let (stderr, stderr_truncated) = stderr_out
        .unwrap_or_else(|| Ok((Vec::new(), 0)))
        .context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Start a command detached from the agent and return its process id.
///
/// The child is never waited on; its output is discarded.
#[instrument(skip_all)]
pub fn spawn_detached(mut cmd: Command) -> Result<u32> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    own_process_group(&mut cmd);
    let child = cmd.spawn().context("spawn background command")?;
    let pid = child.id();
    debug!(pid, "background process started");
    Ok(pid)
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Kill the child and anything it spawned into its process group.
fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        // Grandchildren would otherwise keep the output pipes open past the timeout.
        let group = format!("-{}", child.id());
        if let Err(e) = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            warn!(err = %e, "failed to kill process group");
        }
    }
    match child.kill() {
        Ok(()) => Ok(()),
        // Already reaped by the group kill.
        Err(e) if e.kind() == ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write `input` to the child from its own thread so a child that answers while still
/// reading cannot fill its output pipe and stall the write.
fn spawn_stdin_writer(mut child_stdin: ChildStdin, input: Vec<u8>) {
    thread::spawn(move || match child_stdin.write_all(&input) {
        Ok(()) => {}
        // The child stopped reading; its exit status tells the rest.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading all input");
        }
        Err(e) => warn!(err = %e, "failed to write child stdin"),
    });
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamOutput> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if the caller already gave up on this stream.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Wait for a reader until `deadline`. `None` means the stream is still open.
fn recv_by(rx: &Receiver<StreamOutput>, deadline: Instant) -> Option<StreamOutput> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(output) => Some(output),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Err(anyhow!("output reader thread panicked"))),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("echo hello; echo oops >&2; exit 3", temp.path());
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(5), 1000).expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout_text(), "hello\n");
        assert_eq!(output.stderr_text(), "oops\n");
        assert!(!output.timed_out);
    }

    #[test]
    fn feeds_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("cat", temp.path());
        let output = run_command_with_timeout(cmd, Some(b"piped"), Duration::from_secs(5), 1000)
            .expect("run");
        assert_eq!(output.stdout, b"piped");
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("printf 0123456789", temp.path());
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.stdout_text().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn kills_on_timeout_including_grandchildren() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("sleep 30 & sleep 30", temp.path());
        let start = Instant::now();
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(300), 1000).expect("run");
        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn leftover_child_holding_output_is_killed_at_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("echo started; sleep 30 &", temp.path());
        let start = Instant::now();
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(300), 1000).expect("run");
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(output.timed_out);
        assert_eq!(output.stdout_text(), "started\n");
    }

    #[test]
    fn large_stdin_is_fed_while_output_is_read() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = vec![b'x'; 1_000_000];
        let cmd = shell_command("cat", temp.path());
        let output =
            run_command_with_timeout(cmd, Some(&input), Duration::from_secs(10), 2_000_000)
                .expect("run");
        assert!(!output.timed_out);
        assert_eq!(output.stdout.len(), input.len());
    }

    #[test]
    fn spawn_detached_returns_pid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pid = spawn_detached(shell_command("sleep 1", temp.path())).expect("spawn");
        assert!(pid > 0);
    }
}
