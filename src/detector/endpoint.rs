//! Leader-election endpoint parsing.
//!
//! Accepted forms:
//! ```text
//! ""                                            standalone
//! zk://host1:port1,host2:port2,.../path         ZooKeeper
//! zk://username:password@host1:port1,.../path   ZooKeeper with digest auth
//! file://path/to/file                           file holding one of the zk forms
//! ```

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Host;

const ZK_SCHEME: &str = "zk://";
const FILE_SCHEME: &str = "file://";
const DEFAULT_ZK_PORT: u16 = 2181;

/// Errors produced while parsing or resolving an endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("expecting 'zk://' or 'file://' at the beginning of '{0}'")]
    UnknownScheme(String),

    #[error("no ZooKeeper servers in '{0}'")]
    MissingServers(String),

    #[error("invalid ZooKeeper server '{0}'")]
    InvalidServer(String),

    #[error("expecting a znode path after the servers in '{0}'")]
    InvalidPath(String),

    #[error("expecting 'username:password' credentials")]
    InvalidCredentials,

    #[error("expecting a file path after 'file://'")]
    EmptyFile,

    #[error("failed to read '{path}': {reason}")]
    Unreadable { path: String, reason: String },
}

/// Digest credentials for an authenticated ensemble.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Auth payload for the `digest` scheme.
    pub fn digest(&self) -> Vec<u8> {
        format!("{}:{}", self.username, self.password).into_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A parsed `zk://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkUrl {
    /// `host:port` pairs, in the order given.
    pub servers: Vec<String>,
    /// Group znode, always absolute and without a trailing slash.
    pub path: String,
    pub credentials: Option<Credentials>,
}

impl ZkUrl {
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let rest = input
            .strip_prefix(ZK_SCHEME)
            .ok_or_else(|| EndpointError::UnknownScheme(input.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => return Err(EndpointError::InvalidPath(input.to_string())),
        };

        let (credentials, servers) = match authority.rsplit_once('@') {
            Some((userinfo, servers)) => {
                let (username, password) = userinfo
                    .split_once(':')
                    .ok_or(EndpointError::InvalidCredentials)?;
                if username.is_empty() {
                    return Err(EndpointError::InvalidCredentials);
                }
                let credentials = Credentials {
                    username: username.to_string(),
                    password: password.to_string(),
                };
                (Some(credentials), servers)
            }
            None => (None, authority),
        };

        if servers.is_empty() {
            return Err(EndpointError::MissingServers(input.to_string()));
        }

        let servers = servers
            .split(',')
            .map(parse_server)
            .collect::<Result<Vec<_>, _>>()?;

        let path = path.trim_end_matches('/');
        if path.is_empty() || path.contains("//") {
            return Err(EndpointError::InvalidPath(input.to_string()));
        }

        Ok(Self {
            servers,
            path: path.to_string(),
            credentials,
        })
    }
}

impl fmt::Display for ZkUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ZK_SCHEME)?;
        if let Some(credentials) = &self.credentials {
            write!(f, "{}:****@", credentials.username)?;
        }
        write!(f, "{}{}", self.servers.join(","), self.path)
    }
}

fn parse_server(server: &str) -> Result<String, EndpointError> {
    let invalid = || EndpointError::InvalidServer(server.to_string());

    let (host, port) = match server.rsplit_once(':') {
        // Bracketed IPv6 without a port, e.g. "[::1]".
        Some((_, tail)) if tail.ends_with(']') => (server, DEFAULT_ZK_PORT),
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (server, DEFAULT_ZK_PORT),
    };

    if host.is_empty() || port == 0 {
        return Err(invalid());
    }
    Host::parse(host).map_err(|_| invalid())?;

    Ok(format!("{host}:{port}"))
}

/// Where the detector should find (or skip) the leader-election service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEndpoint {
    /// No coordination service; the local master leads.
    Standalone,
    ZooKeeper(ZkUrl),
    /// A file whose contents are a `zk://` URL, read at detector creation.
    File(PathBuf),
}

impl DetectorEndpoint {
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(DetectorEndpoint::Standalone);
        }

        if let Some(path) = input.strip_prefix(FILE_SCHEME) {
            if path.is_empty() {
                return Err(EndpointError::EmptyFile);
            }
            return Ok(DetectorEndpoint::File(PathBuf::from(path)));
        }

        ZkUrl::parse(input).map(DetectorEndpoint::ZooKeeper)
    }

    /// Follow `file://` indirection, yielding `None` for standalone mode.
    pub fn resolve(&self) -> Result<Option<ZkUrl>, EndpointError> {
        match self {
            DetectorEndpoint::Standalone => Ok(None),
            DetectorEndpoint::ZooKeeper(url) => Ok(Some(url.clone())),
            DetectorEndpoint::File(path) => read_indirection(path).map(Some),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DetectorEndpoint::Standalone => "standalone",
            DetectorEndpoint::ZooKeeper(_) => "zookeeper",
            DetectorEndpoint::File(_) => "file",
        }
    }
}

fn read_indirection(path: &Path) -> Result<ZkUrl, EndpointError> {
    let contents = std::fs::read_to_string(path).map_err(|e| EndpointError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    ZkUrl::parse(contents.trim())
}

impl FromStr for DetectorEndpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DetectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorEndpoint::Standalone => f.write_str(""),
            DetectorEndpoint::ZooKeeper(url) => url.fmt(f),
            DetectorEndpoint::File(path) => write!(f, "{FILE_SCHEME}{}", path.display()),
        }
    }
}

impl Serialize for DetectorEndpoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_is_standalone() {
        assert_eq!(DetectorEndpoint::parse("").unwrap(), DetectorEndpoint::Standalone);
        assert_eq!(DetectorEndpoint::parse("  ").unwrap(), DetectorEndpoint::Standalone);
    }

    #[test]
    fn test_unauthenticated_url() {
        let url = ZkUrl::parse("zk://10.0.0.1:2181,zk2.example.com:2182/cluster/master").unwrap();
        assert_eq!(url.servers, vec!["10.0.0.1:2181", "zk2.example.com:2182"]);
        assert_eq!(url.path, "/cluster/master");
        assert!(url.credentials.is_none());
    }

    #[test]
    fn test_authenticated_url() {
        let url = ZkUrl::parse("zk://ops:s3cret@zk1:2181/master/").unwrap();
        let credentials = url.credentials.clone().unwrap();
        assert_eq!(credentials.username, "ops");
        assert_eq!(credentials.digest(), b"ops:s3cret".to_vec());
        assert_eq!(url.path, "/master");
        assert_eq!(url.to_string(), "zk://ops:****@zk1:2181/master");
    }

    #[test]
    fn test_default_zk_port() {
        let url = ZkUrl::parse("zk://zk1/master").unwrap();
        assert_eq!(url.servers, vec!["zk1:2181"]);
    }

    #[test]
    fn test_malformed_urls() {
        assert!(matches!(
            DetectorEndpoint::parse("http://zk1:2181/master"),
            Err(EndpointError::UnknownScheme(_))
        ));
        assert!(matches!(
            DetectorEndpoint::parse("zk://zk1:2181"),
            Err(EndpointError::InvalidPath(_))
        ));
        assert!(matches!(
            DetectorEndpoint::parse("zk:///master"),
            Err(EndpointError::MissingServers(_))
        ));
        assert!(matches!(
            DetectorEndpoint::parse("zk://zk1:notaport/master"),
            Err(EndpointError::InvalidServer(_))
        ));
        assert!(matches!(
            DetectorEndpoint::parse("zk://nopassword@zk1/master"),
            Err(EndpointError::InvalidCredentials)
        ));
        assert_eq!(DetectorEndpoint::parse("file://"), Err(EndpointError::EmptyFile));
    }

    #[test]
    fn test_file_indirection_resolves() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "zk://zk1:2181,zk2:2181/master").unwrap();

        let endpoint =
            DetectorEndpoint::parse(&format!("file://{}", file.path().display())).unwrap();
        assert_eq!(endpoint.kind(), "file");

        let url = endpoint.resolve().unwrap().unwrap();
        assert_eq!(url.servers.len(), 2);
        assert_eq!(url.path, "/master");
    }

    #[test]
    fn test_missing_file_fails_on_resolve() {
        let endpoint = DetectorEndpoint::parse("file:///definitely/not/here").unwrap();
        assert!(matches!(endpoint.resolve(), Err(EndpointError::Unreadable { .. })));
    }
}
