use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not specified")]
    ConfigMissing(&'static str),

    #[error("Invalid {key}: '{value}' ({reason})")]
    ConfigMalformed {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Directory '{0}' does not exist")]
    DirectoryNotFound(String),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Remote storage error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, Error>;
