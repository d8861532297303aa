//! Subprocess execution with timing, debug logging, and deadline support.
//!
//! This is the **only** way the rest of the crate should spawn child
//! processes: every git/agent/hook invocation funnels through [`run`] or
//! [`run_with_deadline`] so that logging and timeout behavior stay
//! consistent. Mirrors the single-entry-point pattern the teacher crate
//! used for shell execution.

use std::io::Write;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Run a command to completion, logging its invocation and timing.
///
/// `context` is a short label (e.g. a worktree name or task id) included in
/// the trace line; pass `None` for standalone tool invocations.
pub fn run(cmd: &mut Command, context: Option<&str>) -> std::io::Result<Output> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    let cmd_str = if args.is_empty() {
        program.clone()
    } else {
        format!("{program} {}", args.join(" "))
    };

    match context {
        Some(ctx) => log::debug!("$ {cmd_str} [{ctx}]"),
        None => log::debug!("$ {cmd_str}"),
    }

    let t0 = Instant::now();
    let result = cmd.output();
    let dur_ms = t0.elapsed().as_secs_f64() * 1000.0;

    match (&result, context) {
        (Ok(out), Some(ctx)) => log::debug!(
            "[trace] context={ctx} cmd=\"{cmd_str}\" dur={dur_ms:.1}ms ok={}",
            out.status.success()
        ),
        (Ok(out), None) => log::debug!(
            "[trace] cmd=\"{cmd_str}\" dur={dur_ms:.1}ms ok={}",
            out.status.success()
        ),
        (Err(e), Some(ctx)) => log::debug!("[trace] context={ctx} cmd=\"{cmd_str}\" dur={dur_ms:.1}ms err=\"{e}\""),
        (Err(e), None) => log::debug!("[trace] cmd=\"{cmd_str}\" dur={dur_ms:.1}ms err=\"{e}\""),
    }

    result
}

/// Outcome of a deadline-bounded subprocess invocation.
pub enum DeadlineOutcome {
    /// The process exited before the deadline elapsed.
    Finished(Output),
    /// The deadline elapsed; the process was sent SIGTERM (unix) or killed
    /// (other platforms) and reaped.
    TimedOut,
}

/// Spawn `cmd` with `prompt` piped to stdin, waiting up to `timeout` before
/// escalating to termination.
///
/// On unix, expiry sends SIGTERM first and gives the child one more second
/// to exit cleanly before SIGKILL; this avoids leaving an external agent's
/// own subprocesses (e.g. a sandboxed shell) in a half-written state.
pub fn run_with_deadline(
    cmd: &mut Command,
    prompt: Option<&str>,
    timeout: Duration,
    context: Option<&str>,
) -> anyhow::Result<DeadlineOutcome> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    if prompt.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    let program = cmd.get_program().to_string_lossy().into_owned();
    match context {
        Some(ctx) => log::debug!("$ {program} ... [{ctx}] (deadline {timeout:?})"),
        None => log::debug!("$ {program} ... (deadline {timeout:?})"),
    }

    let t0 = Instant::now();
    let mut child = cmd.spawn()?;

    if let Some(prompt) = prompt
        && let Some(mut stdin) = child.stdin.take()
    {
        // Some agents exit before reading all of stdin; a broken pipe here
        // is not a failure as long as the process still produces output.
        if let Err(e) = stdin.write_all(prompt.as_bytes())
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e).map_err(anyhow::Error::from);
        }
    }

    match child.wait_timeout(timeout)? {
        Some(_status) => {
            let output = child.wait_with_output()?;
            log::debug!(
                "[trace] context={:?} cmd=\"{program}\" dur={:.1}ms ok={}",
                context,
                t0.elapsed().as_secs_f64() * 1000.0,
                output.status.success()
            );
            Ok(DeadlineOutcome::Finished(output))
        }
        None => {
            terminate(&mut child);
            log::warn!("[trace] context={:?} cmd=\"{program}\" timed out after {timeout:?}", context);
            Ok(DeadlineOutcome::TimedOut)
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    let _ = kill(pid, Signal::SIGTERM);
    if child.wait_timeout(Duration::from_secs(1)).ok().flatten().is_none() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let out = run(&mut cmd, None).unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn deadline_finishes_fast_command() {
        let mut cmd = Command::new("echo");
        cmd.arg("quick");
        let outcome = run_with_deadline(&mut cmd, None, Duration::from_secs(5), None).unwrap();
        match outcome {
            DeadlineOutcome::Finished(out) => {
                assert!(out.status.success());
                assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "quick");
            }
            DeadlineOutcome::TimedOut => panic!("expected quick command to finish"),
        }
    }

    #[test]
    fn deadline_kills_slow_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let outcome = run_with_deadline(&mut cmd, None, Duration::from_millis(200), None).unwrap();
        assert!(matches!(outcome, DeadlineOutcome::TimedOut));
    }

    #[test]
    fn deadline_pipes_prompt_to_stdin() {
        let mut cmd = Command::new("cat");
        let outcome = run_with_deadline(&mut cmd, Some("fed via stdin"), Duration::from_secs(5), None).unwrap();
        match outcome {
            DeadlineOutcome::Finished(out) => {
                assert_eq!(String::from_utf8_lossy(&out.stdout), "fed via stdin");
            }
            DeadlineOutcome::TimedOut => panic!("expected cat to finish"),
        }
    }
}
