//! Termination signals that end the server's run loop.

use std::fmt;
use tokio::signal;

/// The signal that asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            #[cfg(unix)]
            ShutdownSignal::Interrupt => "SIGINT",
            #[cfg(not(unix))]
            ShutdownSignal::Interrupt => "Ctrl+C",
            ShutdownSignal::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Waits for the first termination signal and reports which one it was.
///
/// On Unix both SIGINT and SIGTERM stop the server; elsewhere only Ctrl+C is
/// watched and is reported as [`ShutdownSignal::Interrupt`].
///
/// # Errors
///
/// Fails when the signal handlers cannot be registered.
pub async fn wait_for_shutdown_signal() -> anyhow::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let received = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        Ok(received)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
