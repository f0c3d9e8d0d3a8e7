//! Process identity: `id@ip:port`.

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pid '{0}', expecting 'id@ip:port'")]
pub struct PidParseError(String);

/// Externally reachable identity of an actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    pub id: String,
    pub addr: SocketAddr,
}

impl Pid {
    pub fn new(id: impl Into<String>, addr: SocketAddr) -> Self {
        Self { id: id.into(), addr }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

impl FromStr for Pid {
    type Err = PidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PidParseError(s.to_string());
        let (id, addr) = s.split_once('@').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }
        let addr = addr.parse().map_err(|_| invalid())?;
        Ok(Self::new(id, addr))
    }
}

impl Serialize for Pid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
