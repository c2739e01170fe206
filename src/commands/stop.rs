use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use llm_gateway::signals::send_signal_to_pid;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

/// Execute the stop command: send SIGTERM (or SIGKILL with `--force`) to the
/// running gateway's PID and wait up to `timeout` seconds for it to exit.
pub async fn execute(pid_file: Option<PathBuf>, force: bool, timeout: u64) -> Result<()> {
    let pid = crate::pid::PidFile::read(pid_file)?;

    #[cfg(unix)]
    {
        let sig = if force {
            SignalKind::from_raw(nix::libc::SIGKILL)
        } else {
            SignalKind::terminate()
        };
        send_signal_to_pid(pid, sig)?;
    }
    #[cfg(not(unix))]
    {
        send_signal_to_pid(pid, ())?;
    }

    println!("Sent {} to PID {}", if force { "SIGKILL" } else { "SIGTERM" }, pid);

    if force {
        return Ok(());
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(timeout);
    while std::time::Instant::now() < deadline {
        if !process_is_running(pid) {
            println!("Gateway stopped");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    bail!(
        "Gateway did not stop within {} seconds; use --force to SIGKILL",
        timeout
    );
}

#[cfg(unix)]
fn process_is_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn process_is_running(_pid: u32) -> bool {
    false
}
