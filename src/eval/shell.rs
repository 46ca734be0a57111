//! External-process execution for the `shell` command.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::capture::CaptureSink;

fn shell_command(line: &str) -> Command {
    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };
    let mut cmd = Command::new(shell);
    cmd.arg(flag).arg(line);
    cmd
}

/// Copy `reader` into `sink` line by line until EOF.
async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, sink: CaptureSink) {
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => sink.write(&String::from_utf8_lossy(&line)),
            Err(e) => {
                debug!(error = %e, "stopped reading child output");
                break;
            }
        }
    }
}

/// Run `line` through the platform shell, streaming its stdout and stderr
/// into `sink` in arrival order, then append the return code.
///
/// Returns the exit code, or `None` if the process could not be spawned or
/// was terminated by a signal.
pub async fn run_shell(line: &str, sink: &CaptureSink) -> Option<i32> {
    let mut cmd = shell_command(line);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            sink.write_line(&format!("Failed to spawn shell: {e}"));
            return None;
        }
    };

    let stdout = pump(child.stdout.take(), sink.clone());
    let stderr = pump(child.stderr.take(), sink.clone());
    let (_, _, status) = tokio::join!(stdout, stderr, child.wait());

    match status {
        Ok(status) => match status.code() {
            Some(code) => {
                sink.write_line(&format!("\n- Return code {code}"));
                Some(code)
            }
            None => {
                sink.write_line("\n- Terminated by signal");
                None
            }
        },
        Err(e) => {
            sink.write_line(&format!("Failed to wait for shell: {e}"));
            None
        }
    }
}
