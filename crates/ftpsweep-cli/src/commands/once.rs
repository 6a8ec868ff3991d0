use std::sync::Arc;

use anyhow::Result;

use ftpsweep_core::{FtpConnector, SweepConfig, SweepService};

pub async fn run(config: SweepConfig) -> Result<()> {
    println!(
        "Sweeping {}...",
        config.directory().as_deref().unwrap_or("(no directory)")
    );

    let service = SweepService::new(config, Arc::new(FtpConnector));
    let report = service.sweep_now().await?;

    println!("{}", report);

    Ok(())
}
