//! Ordered, idempotent process shutdown.
//!
//! ```text
//! SIGINT / SIGTERM -> trigger -> close database pool -> close listener (bounded drain) -> exit
//! panic            -> log message + backtrace -> exit(1)
//! ```
//!
//! Only the first trigger runs the close sequence. The `Running ->
//! ShuttingDown` transition is a single check-and-set on the state channel,
//! so signals delivered while a shutdown is in flight are ignored.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Exit code after a clean shutdown.
pub const EXIT_OK: i32 = 0;
/// Exit code after an uncaught fault or an expired drain deadline.
pub const EXIT_FAILURE: i32 = 1;

/// A resource released during shutdown.
///
/// Implementations must treat a second `close` as a no-op.
#[async_trait]
pub trait Closeable: Send + Sync {
    fn name(&self) -> &'static str;
    async fn close(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Terminated(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    database: Arc<dyn Closeable>,
    listener: Arc<dyn Closeable>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(database: Arc<dyn Closeable>, listener: Arc<dyn Closeable>, drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state, database, listener, drain_timeout }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Runs the close sequence if this is the first trigger.
    ///
    /// Returns the exit code, or `None` when another trigger already owns the
    /// shutdown.
    pub async fn trigger(&self, signal: ShutdownSignal) -> Option<i32> {
        let won = self.state.send_if_modified(|s| {
            if *s == ShutdownState::Running {
                *s = ShutdownState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !won {
            debug!(signal = %signal, "Shutdown already in progress, ignoring {}", signal);
            return None;
        }

        info!(
            signal = %signal,
            "Got {}. Graceful shutdown start {}",
            signal,
            chrono::Utc::now().to_rfc3339()
        );

        info!("Closing DB connection...");
        match self.database.close().await {
            Ok(()) => info!("DB connection successfully closed!"),
            Err(e) => error!(error = %e, resource = self.database.name(), "SERVER_SHUTDOWN closeDbConnection"),
        }

        info!("Shutting down server...");
        let code = match tokio::time::timeout(self.drain_timeout, self.listener.close()).await {
            Ok(Ok(())) => {
                info!("Server shut down gracefully.");
                EXIT_OK
            }
            Ok(Err(e)) => {
                error!(error = %e, resource = self.listener.name(), "SERVER_SHUTDOWN Could not shutdown everything cleanly!");
                EXIT_OK
            }
            Err(_) => {
                warn!(timeout_secs = self.drain_timeout.as_secs(), "Drain deadline elapsed, forcing exit");
                EXIT_FAILURE
            }
        };

        self.state.send_replace(ShutdownState::Terminated(code));
        Some(code)
    }

    /// Resolves with the exit code once the state reaches `Terminated`.
    pub async fn terminated(&self) -> i32 {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|s| matches!(s, ShutdownState::Terminated(_))).await {
            Ok(state) => *state,
            // Unreachable while `self` owns the sender
            Err(_) => return EXIT_FAILURE,
        };
        match state {
            ShutdownState::Terminated(code) => code,
            _ => EXIT_FAILURE,
        }
    }

    /// Dispatches process signals to [`trigger`](Self::trigger) until the
    /// shutdown has finished, then returns the exit code.
    pub async fn run(self: Arc<Self>) -> std::io::Result<i32> {
        let mut signals = Signals::new()?;
        let done = self.terminated();
        tokio::pin!(done);
        loop {
            tokio::select! {
                code = &mut done => return Ok(code),
                signal = signals.recv() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.trigger(signal).await;
                    });
                }
            }
        }
    }
}

struct Signals {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
}

impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            term: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> ShutdownSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
                _ = self.term.recv() => ShutdownSignal::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            ShutdownSignal::Interrupt
        }
    }
}

/// Installs a panic hook that logs the fault and exits with [`EXIT_FAILURE`].
///
/// No drain is attempted: after a panic the process state is not trusted.
pub fn install_fault_trap() {
    std::panic::set_hook(Box::new(|info| {
        let message = fault_message(info.payload());
        let location = info
            .location()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown location".to_string());
        let trace = Backtrace::force_capture();
        error!(message = %message, location = %location, "[UNCAUGHT_EXCEPTION] Process will now exit");
        // The log writer is non-blocking and may not flush before exit
        eprintln!(
            "[UNCAUGHT_EXCEPTION] {}: Process will now exit. UncaughtException: {} at {}\n{}",
            chrono::Utc::now().to_rfc2822(),
            message,
            location,
            trace
        );
        std::process::exit(EXIT_FAILURE);
    }));
}

/// Extracts the human readable message of a panic payload.
pub fn fault_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
