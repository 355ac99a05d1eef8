//! Supervises daemon launch sequencing and runtime orchestration.

use std::io::{self, BufReader};
use std::sync::Arc;

use tracing::{info, warn};

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, Daemon, SystemConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::transport::{RpcConnectionHandler, SocketListener, serve_connection};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, the listener or the shutdown
/// listener fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;
    let daemon = bootstrap_with(&loader, reporter)?;
    let outcome = if daemon.config().stdio {
        serve_stdio(&daemon)
    } else {
        serve_socket(&daemon, &shutdown)
    };
    let failures = daemon.release();
    if failures > 0 {
        warn!(
            target: PROCESS_TARGET,
            failures,
            "some modules failed to de-initialise"
        );
    }
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    outcome
}

fn serve_stdio(daemon: &Daemon) -> Result<(), LaunchError> {
    info!(
        target: PROCESS_TARGET,
        protocol = %daemon.config().protocol(),
        "serving standard streams"
    );
    let codec = daemon.codec();
    let mut reader = BufReader::new(io::stdin().lock());
    let mut writer = io::stdout().lock();
    serve_connection(daemon.dispatcher(), codec.as_ref(), &mut reader, &mut writer)?;
    Ok(())
}

fn serve_socket<S: ShutdownSignal>(daemon: &Daemon, shutdown: &S) -> Result<(), LaunchError> {
    let listener = SocketListener::bind(daemon.config().daemon_socket())?;
    if let Some(address) = listener.local_addr() {
        info!(target: PROCESS_TARGET, %address, "tcp listener bound");
    }
    let handler = Arc::new(RpcConnectionHandler::new(
        Arc::clone(daemon.dispatcher()),
        daemon.codec(),
    ));
    let listener_handle = listener.start(handler)?;
    let waited = shutdown.wait();
    listener_handle.shutdown();
    listener_handle.join()?;
    waited?;
    Ok(())
}
