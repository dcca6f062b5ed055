//! Process management utilities

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from running a child process
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("IO error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command, feed `input` to its stdin and collect stdout/stderr.
///
/// The child is killed once `timeout` elapses. The timeout also bounds
/// reading its output, so a descendant that keeps the pipes open cannot
/// hold us past it; such readers are left behind. The exit status is not
/// checked here; callers decide what a failure means.
pub fn run_with_timeout(
    cmd: &mut Command,
    input: &[u8],
    timeout: Duration,
) -> Result<Output, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let deadline = start + timeout;
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(program = %program, pid = child.id(), "spawned child process");

    // Pipes are drained on their own threads so a chatty child never blocks
    // on a full buffer while we are still writing its input.
    let stdin = child.stdin.take();
    let data = input.to_vec();
    let writer = thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&data)?;
        }
        Ok(())
    });
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status: ExitStatus = loop {
        let polled = child.try_wait().map_err(|source| ProcessError::Io {
            program: program.clone(),
            source,
        })?;
        if let Some(status) = polled {
            break status;
        }
        if start.elapsed() > timeout {
            warn!(program = %program, ?timeout, "child process timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Timeout { program, timeout });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let timed_out = || {
        warn!(program = %program, ?timeout, "child output still open after exit");
        ProcessError::Timeout {
            program: program.clone(),
            timeout,
        }
    };

    match join_by(writer, deadline).ok_or_else(timed_out)? {
        Ok(Ok(())) => {}
        // The child may exit without reading all of its input.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Ok(Err(source)) => {
            return Err(ProcessError::Io {
                program: program.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(ProcessError::Io {
                program: program.clone(),
                source: std::io::Error::other("stdin writer panicked"),
            })
        }
    }

    let stdout = collect(stdout, &program, deadline).ok_or_else(timed_out)??;
    let stderr = collect(stderr, &program, deadline).ok_or_else(timed_out)??;
    debug!(program = %program, %status, elapsed = ?start.elapsed(), "child process finished");

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

type Drain = Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

/// Join `handle`, or give up with `None` once `deadline` passes
fn join_by<T>(handle: thread::JoinHandle<T>, deadline: Instant) -> Option<thread::Result<T>> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
    Some(handle.join())
}

fn collect(
    handle: Drain,
    program: &str,
    deadline: Instant,
) -> Option<Result<Vec<u8>, ProcessError>> {
    let Some(handle) = handle else {
        return Some(Ok(Vec::new()));
    };
    let joined = match join_by(handle, deadline)? {
        Ok(result) => result.map_err(|source| ProcessError::Io {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(ProcessError::Io {
            program: program.to_string(),
            source: std::io::Error::other("output reader panicked"),
        }),
    };
    Some(joined)
}
