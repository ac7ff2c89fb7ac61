//! Process lifecycle: signals, systemd notification, restore on exit.

use crate::error::Result;
use crate::monitor::{ManagedInterface, Monitor};
use crate::net::NetworkOps;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// systemd notify-socket client.
///
/// Every call is a no-op when the process was not started with
/// `NOTIFY_SOCKET` set.
#[derive(Debug, Clone)]
pub struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub fn new() -> Self {
        let enabled = std::env::var_os("NOTIFY_SOCKET").is_some();
        if enabled {
            debug!("systemd notification socket detected");
        }
        Self { enabled }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn notify_ready(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Ready])
    }

    pub fn notify_watchdog(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Watchdog])
    }

    pub fn notify_status(&self, status: &str) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Status(status)])
    }

    pub fn notify_stopping(&self) -> Result<()> {
        self.send(&[sd_notify::NotifyState::Stopping])
    }

    fn send(&self, state: &[sd_notify::NotifyState<'_>]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        // Keep NOTIFY_SOCKET set; the watchdog needs it for the whole run.
        sd_notify::notify(false, state)?;
        Ok(())
    }
}

impl Default for SystemdNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels `cancel` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!(signal = name, "Shutdown requested"),
            Err(e) => error!(error = %e, "Cannot install signal handlers, shutting down"),
        }
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

/// Runs the monitoring loop until `cancel` fires, then restores the primary
/// address.
///
/// The loop runs in its own task; the restore happens even if that task
/// panics.
pub async fn run_managed<N: NetworkOps>(monitor: Monitor<N>, cancel: CancellationToken) -> Result<()> {
    let managed = ManagedInterface::new(monitor.swapper());
    let notifier = monitor.notifier().clone();

    let handle = tokio::spawn(monitor.run(cancel));
    let cycles = match handle.await {
        Ok(monitor) => Some(monitor.cycles()),
        Err(e) if e.is_panic() => {
            error!("Monitoring task panicked");
            None
        }
        Err(e) => {
            error!(error = %e, "Monitoring task aborted");
            None
        }
    };

    if let Err(e) = notifier.notify_stopping() {
        warn!(error = %e, "STOPPING notification failed");
    }

    managed.release().await?;
    if let Some(cycles) = cycles {
        info!(cycles, "lanswitchd stopped");
    }
    Ok(())
}

/// Runs a single cycle, logs it and restores the primary address.
pub async fn run_once<N: NetworkOps>(mut monitor: Monitor<N>) -> Result<()> {
    let managed = ManagedInterface::new(monitor.swapper());
    let report = monitor.run_cycle().await;
    info!(
        verdict = %report.assessment.verdict,
        failed = report.assessment.failed,
        total = report.assessment.total,
        mbps = ?report.assessment.mbps,
        outcome = ?report.outcome,
        "Single cycle complete"
    );
    managed.release().await?;
    Ok(())
}
