use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{FailurePolicy, SweepConfig};
use crate::remote::RemoteConnector;
use crate::Result;

use super::sweep::{sweep_once, SweepReport};

/// Background service that sweeps the remote directory once per cycle
pub struct SweepService {
    config: SweepConfig,
    connector: Arc<dyn RemoteConnector>,
}

impl SweepService {
    /// Create a new sweep service
    pub fn new(config: SweepConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        Self { config, connector }
    }

    /// Run a single sweep immediately
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        sweep_once(&self.config, self.connector.as_ref(), Utc::now()).await
    }

    /// Sweep, sleep, repeat until the shutdown signal
    ///
    /// Returns the error that stopped the service when the failure policy is
    /// `terminate`; `Ok(())` after a shutdown request.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Sweep service started");

        loop {
            if *shutdown.borrow() {
                info!("Sweep service received shutdown signal");
                break;
            }

            debug!("Sweep cycle starting at {}", Local::now());

            match self.sweep_now().await {
                Ok(report) => info!("{}", report),
                Err(e) => {
                    error!("{}", e);
                    match self.config.failure_policy() {
                        FailurePolicy::Terminate => {
                            error!("Stopping sweep service");
                            return Err(e);
                        }
                        FailurePolicy::Retry => warn!("Retrying next cycle"),
                    }
                }
            }

            let interval = self.config.cycle_interval();
            debug!("Next sweep in {} hours", interval.as_secs() / 3600);

            if wait_for_next_cycle(interval, &mut shutdown).await {
                info!("Sweep service received shutdown signal");
                break;
            }
        }

        info!("Sweep service stopped");
        Ok(())
    }
}

/// Sleep for `interval`; returns true if shutdown was requested meanwhile
async fn wait_for_next_cycle(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => continue,
                // Sender gone: nobody can cancel us any more, finish the wait
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}
