//! Attach arguments and the configuration resolved from them.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use transport::Address;

use crate::logging::Trace;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Ports drawn from when `attach` names none.
pub const DEFAULT_PORT_RANGE: Range<u16> = 2000..50000;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments of the `attach` request. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub trace: Option<Trace>,
    pub cwd: Option<String>,
    /// Seconds to wait for the socket and the banner.
    pub connect_timeout: Option<u64>,
}

/// Everything one session needs to reach its remote debugger.
///
/// Resolved once from [`AttachArguments`] and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub address: Address,
    pub trace: Trace,
    pub cwd: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn resolve(args: AttachArguments, rng: &mut impl Rng) -> Self {
        let host = args
            .host
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = args
            .port
            .unwrap_or_else(|| rng.gen_range(DEFAULT_PORT_RANGE));

        Self {
            address: Address::new(host, port),
            trace: args.trace.unwrap_or_default(),
            cwd: args.cwd.as_deref().map(expand_tilde),
            connect_timeout: args
                .connect_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Resolve a file named by the remote against the working directory.
    pub fn source_path(&self, file: &str) -> String {
        match &self.cwd {
            Some(cwd) if Path::new(file).is_relative() => cwd.join(file).to_string_lossy().into_owned(),
            _ => file.to_string(),
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
