use std::path::Path;

use anyhow::{bail, Result};

use ftpsweep_core::config::keys;
use ftpsweep_core::SweepConfig;

fn show(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(not set)".to_string())
}

pub fn run(config: &SweepConfig, config_path: &Path) -> Result<()> {
    println!("Config file: {}\n", config_path.display());

    println!("  {:<22} {}", keys::FTP_HOST, show(config.host()));
    println!("  {:<22} {}", keys::FTP_PORT, config.port());
    println!("  {:<22} {}", keys::FTP_USER, show(config.user()));
    println!(
        "  {:<22} {}",
        keys::FTP_PASSWORD,
        show(config.password().map(|_| "********".to_string()))
    );
    println!("  {:<22} {}", keys::FTP_DIRECTORY, show(config.directory()));

    let retention = config.max_age_days();
    match &retention {
        Ok(days) => println!("  {:<22} {} days", keys::DELETE_OLDER_THAN_DAYS, days),
        Err(e) => println!("  {:<22} [ERROR: {}]", keys::DELETE_OLDER_THAN_DAYS, e),
    }

    println!(
        "  {:<22} {} hours",
        keys::CYCLE_TIME_HOURS,
        config.cycle_interval().as_secs() / 3600
    );
    println!("  {:<22} {}", keys::DRY_RUN, config.dry_run());
    match config.timeout() {
        Some(timeout) => println!("  {:<22} {}s", keys::FTP_TIMEOUT_SECONDS, timeout.as_secs()),
        None => println!("  {:<22} (transport default)", keys::FTP_TIMEOUT_SECONDS),
    }
    println!("  {:<22} {}", keys::FAILURE_POLICY, config.failure_policy());
    println!();

    if let Err(e) = config.connection_params() {
        bail!("{}", e);
    }
    if config.directory().is_none() {
        bail!("{} not specified", keys::FTP_DIRECTORY);
    }
    retention?;

    println!("Configuration OK.");
    Ok(())
}
