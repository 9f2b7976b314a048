//! Local process execution for the ssh and scp clients

use reconcile::CancelToken;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finished {
    /// Exited on its own; `None` exit code means killed by a signal
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Killed after exceeding the deadline
    TimedOut,
    /// Killed because the cancel token was set
    Cancelled,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run a command to completion, capturing output
///
/// The process is killed when `timeout` elapses or `cancel` is set, polled
/// every 50ms.
pub fn run_supervised(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> io::Result<Finished> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();

    let code = loop {
        if let Some(status) = child.try_wait()? {
            break status.code();
        }
        if cancel.is_cancelled() {
            kill(&mut child);
            return Ok(Finished::Cancelled);
        }
        if started.elapsed() >= timeout {
            kill(&mut child);
            return Ok(Finished::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Finished::Exited {
        code,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
