use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use llm_gateway::config;
use llm_gateway::server::start_server;

use crate::daemon::{daemonize, DaemonConfig};
use crate::pid::PidFile;

/// Execute the start command: load process config, optionally daemonize, and
/// run the gateway until a shutdown signal arrives.
pub async fn execute(daemon: bool, pid_file: Option<PathBuf>) -> Result<()> {
    let mut process_cfg = config::load_config()?;
    if daemon {
        process_cfg.daemonize = true;
    }

    if process_cfg.daemonize {
        daemonize(DaemonConfig::default())?;
    }

    let _pid_guard = PidFile::create(pid_file)?;
    info!("gateway process starting (pid {})", std::process::id());

    start_server(process_cfg).await
}
