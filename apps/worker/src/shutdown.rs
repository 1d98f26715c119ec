//! Process shutdown signals.
//!
//! Container runtimes stop the worker with SIGTERM; interactive runs use
//! ctrl-c. Handlers are registered up front so a signal delivered while the
//! pruners start is not lost.

use dashprune_core::{AppError, AppResult};

/// Registered shutdown signal handlers.
pub struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Registers the shutdown signal handlers.
    pub fn install() -> AppResult<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|error| {
                    AppError::Internal(format!("failed to listen for SIGTERM: {error}"))
                })?,
        })
    }

    /// Waits for the first shutdown signal and returns its name.
    pub async fn recv(&mut self) -> AppResult<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => signal.map(|()| "interrupt").map_err(ctrl_c_error),
                _ = self.terminate.recv() => Ok("terminate"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .map(|()| "interrupt")
                .map_err(ctrl_c_error)
        }
    }
}

fn ctrl_c_error(error: std::io::Error) -> AppError {
    AppError::Internal(format!("failed to listen for ctrl-c: {error}"))
}
