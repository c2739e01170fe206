use anyhow::Result;
use std::path::PathBuf;

use llm_gateway::signals::send_signal_to_pid;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

/// Execute the reload command: send SIGHUP to the running gateway, which
/// triggers the same atomic reload path the config file watcher uses.
pub async fn execute(pid_file: Option<PathBuf>) -> Result<()> {
    let pid = crate::pid::PidFile::read(pid_file)?;

    #[cfg(unix)]
    send_signal_to_pid(pid, SignalKind::hangup())?;
    #[cfg(not(unix))]
    send_signal_to_pid(pid, ())?;

    println!("Sent SIGHUP to PID {}", pid);
    Ok(())
}
