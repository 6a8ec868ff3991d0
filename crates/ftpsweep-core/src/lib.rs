pub mod config;
pub mod error;
pub mod remote;
pub mod sweeper;

#[cfg(test)]
mod test_logs;

pub use config::{
    ConfigSource, EnvSource, FailurePolicy, FileSource, LayeredSource, MapSource, SweepConfig,
};
pub use error::{Error, Result};
pub use remote::{EntryKind, FtpConnector, RemoteConnector, RemoteEntry, RemoteSession};
pub use sweeper::{SweepReport, SweepService};
