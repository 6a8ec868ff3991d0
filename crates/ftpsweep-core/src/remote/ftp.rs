//! FTP implementation of the remote storage traits
//!
//! `suppaftp`'s `FtpStream` is blocking, so each call is shipped to the
//! blocking pool and awaited before the next one starts.

use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::list::File;
use suppaftp::types::Features;
use suppaftp::{FtpError, FtpStream};
use tracing::debug;

use super::{join_path, EntryKind, RemoteConnector, RemoteEntry, RemoteSession};
use crate::config::ConnectionParams;
use crate::{Error, Result};

/// Connects to a plain FTP server and logs in
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpConnector;

#[async_trait]
impl RemoteConnector for FtpConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn RemoteSession>> {
        let params = params.clone();
        let (stream, listing) = tokio::task::spawn_blocking(move || {
            let mut stream = open_stream(&params)?;
            let listing = Listing::negotiate(&mut stream);
            Ok::<_, Error>((stream, listing))
        })
        .await??;
        debug!("Listing directories with {:?}", listing);

        Ok(Box::new(FtpSession {
            stream: Arc::new(Mutex::new(stream)),
            listing,
        }))
    }
}

/// Directory listing command used for the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    /// RFC 3659 machine listing with UTC timestamps
    Mlsd,
    /// Free-form `ls`/DOS style listing
    List,
}

impl Listing {
    /// Ask the server with FEAT; anything short of an MLST entry means LIST
    fn negotiate(stream: &mut FtpStream) -> Self {
        match stream.feat() {
            Ok(features) => Self::from_features(&features),
            Err(e) => {
                debug!("FEAT failed, falling back to LIST: {}", e);
                Listing::List
            }
        }
    }

    fn from_features(features: &Features) -> Self {
        if features.keys().any(|name| name.eq_ignore_ascii_case("MLST")) {
            Listing::Mlsd
        } else {
            Listing::List
        }
    }

    fn fetch(self, stream: &mut FtpStream, dir: &str) -> Result<Vec<String>> {
        let lines = match self {
            Listing::Mlsd => stream.mlsd(Some(dir))?,
            Listing::List => stream.list(Some(dir))?,
        };
        Ok(lines)
    }

    fn parse(self, dir: &str, line: &str) -> Option<RemoteEntry> {
        match self {
            Listing::Mlsd => parse_mlsd_line(dir, line),
            Listing::List => parse_list_line(dir, line),
        }
    }
}

fn open_stream(params: &ConnectionParams) -> Result<FtpStream> {
    let address = params.address();
    debug!("Connecting to {}", address);

    let mut stream = match params.timeout {
        Some(timeout) => {
            let socket = address
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| Error::Connection(format!("could not resolve '{}'", address)))?;
            let stream = FtpStream::connect_timeout(socket, timeout)?;
            stream.get_ref().set_read_timeout(Some(timeout))?;
            stream.get_ref().set_write_timeout(Some(timeout))?;
            stream
        }
        None => FtpStream::connect(address.as_str())?,
    };

    stream.login(params.username.as_str(), params.password.as_str())?;
    Ok(stream)
}

struct FtpSession {
    stream: Arc<Mutex<FtpStream>>,
    listing: Listing,
}

impl FtpSession {
    async fn with_stream<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| Error::Remote("FTP session lock poisoned".to_string()))?;
            op(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.with_stream(move |stream| {
            let previous = stream.pwd()?;
            match stream.cwd(path.as_str()) {
                Ok(()) => {
                    stream.cwd(previous.as_str())?;
                    Ok(true)
                }
                // 550 and friends: the server refused, the directory is not there
                Err(FtpError::UnexpectedResponse(response)) => {
                    debug!("CWD {} refused: {:?}", path, response.status);
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = path.to_string();
        let listing = self.listing;
        self.with_stream(move |stream| {
            let mut entries = Vec::new();
            walk(
                &mut |dir: &str| listing.fetch(stream, dir),
                &|dir: &str, line: &str| listing.parse(dir, line),
                &path,
                &mut entries,
            )?;
            Ok(entries)
        })
        .await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.with_stream(move |stream| Ok(stream.rm(path.as_str())?))
            .await
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.with_stream(move |stream| Ok(stream.rmdir(path.as_str())?))
            .await
    }

    async fn close(&self) -> Result<()> {
        self.with_stream(|stream| Ok(stream.quit()?)).await
    }
}

/// Pre-order walk below `dir`, which itself is not included
///
/// `list` returns the raw lines for one directory and `parse` turns a line
/// into an entry; every directory entry is descended into right after it is
/// recorded.
fn walk<L, P>(list: &mut L, parse: &P, dir: &str, entries: &mut Vec<RemoteEntry>) -> Result<()>
where
    L: FnMut(&str) -> Result<Vec<String>>,
    P: Fn(&str, &str) -> Option<RemoteEntry>,
{
    let lines = list(dir)?;

    for line in lines {
        let Some(entry) = parse(dir, &line) else {
            continue;
        };

        let descend = entry.is_directory();
        let path = entry.full_path.clone();
        entries.push(entry);

        if descend {
            walk(list, parse, &path, entries)?;
        }
    }

    Ok(())
}

/// Turn one LIST line into an entry under `dir`
///
/// Returns `None` for `.`/`..`, symlinks and lines that are not entries
/// (such as the `total N` header).
pub(crate) fn parse_list_line(dir: &str, line: &str) -> Option<RemoteEntry> {
    match line.parse::<File>() {
        Ok(file) => into_entry(dir, file, line),
        Err(_) => {
            debug!("Skipping unparsable listing line: {}", line);
            None
        }
    }
}

/// Turn one MLSD line (`fact=value;...; name`) into an entry under `dir`
///
/// `cdir`/`pdir` entries and links are skipped along with malformed lines.
pub(crate) fn parse_mlsd_line(dir: &str, line: &str) -> Option<RemoteEntry> {
    match File::from_mlsx_line(line) {
        Ok(file) => into_entry(dir, file, line),
        Err(_) => {
            debug!("Skipping unparsable MLSD line: {}", line);
            None
        }
    }
}

fn into_entry(dir: &str, file: File, line: &str) -> Option<RemoteEntry> {
    let name = file.name().rsplit('/').next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let kind = if file.is_directory() {
        EntryKind::Directory
    } else if file.is_file() {
        EntryKind::File
    } else {
        debug!("Skipping non-regular entry: {}", line);
        return None;
    };

    Some(RemoteEntry {
        full_path: join_path(dir, name),
        kind,
        modified_at: DateTime::<Utc>::from(file.modified()),
    })
}
