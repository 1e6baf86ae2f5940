/*!
 * Server Configuration
 */

use anyhow::*;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Default interface the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen backlog; extra simultaneous connection attempts may be
/// refused by the kernel until the loop accepts the pending one
pub const DEFAULT_BACKLOG: i32 = 1;

/// Default upper bound on a single unterminated command line
pub const DEFAULT_MAX_LINE: usize = 4096;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub snapshot: PathBuf,
    pub backlog: i32,
    pub max_line: usize,
}

impl Config {
    /// Build a config from the two required inputs, defaults elsewhere
    pub fn new(port: u16, snapshot: impl Into<PathBuf>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            snapshot: snapshot.into(),
            backlog: DEFAULT_BACKLOG,
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Resolve `host:port` to the first matching socket address
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("no address for {}:{}", self.host, self.port))
    }
}
