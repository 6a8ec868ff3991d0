use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::{keys, SweepConfig};
use crate::remote::{RemoteConnector, RemoteEntry, RemoteSession};
use crate::{Error, Result};

/// Counters for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dry_run: bool,
    pub files_scanned: u32,
    pub file_candidates: u32,
    pub files_deleted: u32,
    pub file_failures: u32,
    pub dirs_checked: u32,
    pub dirs_pruned: u32,
    pub dir_failures: u32,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(
                f,
                "DryRun: {} of {} files would be deleted, {} of {} folders would be removed",
                self.file_candidates, self.files_scanned, self.dirs_pruned, self.dirs_checked
            )
        } else {
            write!(
                f,
                "{} of {} files deleted ({} failed), {} of {} folders removed ({} failed)",
                self.files_deleted,
                self.files_scanned,
                self.file_failures,
                self.dirs_pruned,
                self.dirs_checked,
                self.dir_failures
            )
        }
    }
}

/// Strictly older than `now - max_age_days`
///
/// A window reaching back past the earliest representable date expires
/// nothing.
pub fn is_expired(modified_at: DateTime<Utc>, now: DateTime<Utc>, max_age_days: u32) -> bool {
    match now.checked_sub_signed(Duration::days(i64::from(max_age_days))) {
        Some(cutoff) => modified_at < cutoff,
        None => false,
    }
}

/// Validate configuration and open a session
///
/// Host, user and password are checked first, then the retention window: a
/// connection without a usable policy is not worth opening.
pub async fn connect(
    config: &SweepConfig,
    connector: &dyn RemoteConnector,
) -> Result<Box<dyn RemoteSession>> {
    let params = config.connection_params()?;
    config.max_age_days()?;

    debug!("Connecting to {} as {}", params.address(), params.username);
    match connector.connect(&params).await {
        Ok(session) => Ok(session),
        Err(e @ Error::Connection(_)) => Err(e),
        Err(e) => Err(Error::Connection(e.to_string())),
    }
}

/// Run one full cycle: connect, list, delete expired files, prune empty folders
pub async fn sweep_once(
    config: &SweepConfig,
    connector: &dyn RemoteConnector,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let session = connect(config, connector).await?;
    let result = sweep_session(config, session.as_ref(), now).await;

    if let Err(e) = session.close().await {
        debug!("Closing session failed: {}", e);
    }

    result
}

async fn sweep_session(
    config: &SweepConfig,
    session: &dyn RemoteSession,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let directory = config
        .directory()
        .ok_or(Error::ConfigMissing(keys::FTP_DIRECTORY))?;

    if !session.directory_exists(&directory).await? {
        return Err(Error::DirectoryNotFound(directory));
    }

    let snapshot = session.list_recursive(&directory).await?;

    let max_age_days = config.max_age_days()?;
    let dry_run = config.dry_run();

    let mut report = SweepReport {
        dry_run,
        ..Default::default()
    };

    delete_expired_files(session, &snapshot, now, max_age_days, &mut report).await;
    prune_empty_directories(session, &snapshot, &mut report).await;

    Ok(report)
}

async fn delete_expired_files(
    session: &dyn RemoteSession,
    snapshot: &[RemoteEntry],
    now: DateTime<Utc>,
    max_age_days: u32,
    report: &mut SweepReport,
) {
    for file in snapshot.iter().filter(|e| e.is_file()) {
        report.files_scanned += 1;

        if !is_expired(file.modified_at, now, max_age_days) {
            continue;
        }

        report.file_candidates += 1;
        let age_days = (now - file.modified_at).num_days();

        if report.dry_run {
            info!(
                "DryRun: delete {} : {} days old - {}",
                file.full_path, age_days, file.modified_at
            );
            continue;
        }

        match session.delete_file(&file.full_path).await {
            Ok(()) => {
                info!(
                    "deleted {} : {} days old - {}",
                    file.full_path, age_days, file.modified_at
                );
                report.files_deleted += 1;
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", file.full_path, e);
                report.file_failures += 1;
            }
        }
    }
}

async fn prune_empty_directories(
    session: &dyn RemoteSession,
    snapshot: &[RemoteEntry],
    report: &mut SweepReport,
) {
    let mut directories: Vec<&RemoteEntry> = snapshot.iter().filter(|e| e.is_directory()).collect();
    // Children first, so a parent holding only empty folders is empty by the time it is listed
    directories.sort_by_key(|d| std::cmp::Reverse(d.depth()));

    for directory in directories {
        report.dirs_checked += 1;

        let contents = match session.list_recursive(&directory.full_path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to list folder {}: {}", directory.full_path, e);
                report.dir_failures += 1;
                continue;
            }
        };

        if contents.iter().any(|e| e.is_file()) {
            continue;
        }

        if report.dry_run {
            info!("DryRun: delete empty folder {}", directory.full_path);
            report.dirs_pruned += 1;
            continue;
        }

        match session.delete_directory(&directory.full_path).await {
            Ok(()) => {
                info!("deleted empty folder {}", directory.full_path);
                report.dirs_pruned += 1;
            }
            Err(e) => {
                warn!("Failed to delete folder {}: {}", directory.full_path, e);
                report.dir_failures += 1;
            }
        }
    }
}
