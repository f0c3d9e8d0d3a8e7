//! Process runtime: the listen address and the one-time initialization.
//!
//! # Data Flow
//! ```text
//! MasterConfig
//!     → configure_address (PROCESS_IP, PROCESS_PORT)
//!     → initialize("master") → ProcessRuntime { listener, local_addr }
//!     → bootstrap (Pid from local_addr, HTTP served on listener)
//! ```
//!
//! # Design Decisions
//! - The address travels through the environment so child tooling sees the
//!   same values the runtime bound
//! - Initialization is process-wide and happens at most once
//! - An unspecified bind address is kept for listening, but the advertised
//!   address is resolved from the host so the pid is routable

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, UdpSocket};

use crate::config::MasterConfig;

pub const IP_VAR: &str = "PROCESS_IP";
pub const PORT_VAR: &str = "PROCESS_PORT";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Process runtime is already initialized")]
    AlreadyInitialized,

    #[error("Invalid value '{value}' for {var}")]
    Environment { var: &'static str, value: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Publish the configured listen address for [`initialize`].
///
/// `PROCESS_IP` is only written when an address was configured.
pub fn configure_address(config: &MasterConfig) {
    // Must run before any spawned task reads the environment.
    if let Some(ip) = config.ip {
        std::env::set_var(IP_VAR, ip.to_string());
    }
    std::env::set_var(PORT_VAR, config.port.to_string());
}

/// Read the listen address from the environment.
pub fn address_from_env() -> Result<SocketAddr, RuntimeError> {
    let ip = match std::env::var(IP_VAR) {
        Ok(value) => value.parse::<IpAddr>().map_err(|_| RuntimeError::Environment {
            var: IP_VAR,
            value,
        })?,
        Err(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    let port = match std::env::var(PORT_VAR) {
        Ok(value) => value.parse::<u16>().map_err(|_| RuntimeError::Environment {
            var: PORT_VAR,
            value,
        })?,
        Err(_) => 0,
    };
    Ok(SocketAddr::new(ip, port))
}

/// Initialize the process runtime from the environment. Only the first call
/// succeeds.
pub async fn initialize(name: &str) -> Result<ProcessRuntime, RuntimeError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(RuntimeError::AlreadyInitialized);
    }
    let addr = address_from_env()?;
    ProcessRuntime::bind(name, addr).await
}

/// The bound listener the master is reachable on.
#[derive(Debug)]
pub struct ProcessRuntime {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
    advertised_addr: SocketAddr,
}

impl ProcessRuntime {
    /// Bind without touching the process-wide guard.
    pub async fn bind(name: &str, addr: SocketAddr) -> Result<Self, RuntimeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RuntimeError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let advertised_addr = advertise(local_addr).await;

        tracing::info!(
            name = %name,
            address = %local_addr,
            advertised = %advertised_addr,
            "Process runtime initialized"
        );
        if advertised_addr.ip().is_unspecified() {
            tracing::warn!(
                address = %local_addr,
                "Could not resolve a host address; advertised pid will not be routable"
            );
        }

        Ok(Self {
            name: name.to_string(),
            listener,
            local_addr,
            advertised_addr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address other processes should use to reach this one.
    pub fn advertised_addr(&self) -> SocketAddr {
        self.advertised_addr
    }

    pub fn into_listener(self) -> TcpListener {
        self.listener
    }
}

/// Replace an unspecified bound address with one resolved from the host.
async fn advertise(local_addr: SocketAddr) -> SocketAddr {
    if !local_addr.ip().is_unspecified() {
        return local_addr;
    }
    let ipv6 = local_addr.is_ipv6();
    let resolved = match host_ip(ipv6).await {
        Some(ip) => Some(ip),
        None => route_ip(ipv6).await,
    };
    match resolved {
        Some(ip) => SocketAddr::new(ip, local_addr.port()),
        None => local_addr,
    }
}

fn hostname() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// First non-loopback address the hostname resolves to.
async fn host_ip(ipv6: bool) -> Option<IpAddr> {
    let hostname = hostname()?;
    let addrs = lookup_host((hostname.as_str(), 0)).await.ok()?;
    let found = addrs
        .map(|addr| addr.ip())
        .find(|ip| ip.is_ipv6() == ipv6 && routable(ip));
    found
}

/// Source address the kernel would pick for outbound traffic. Connecting a
/// UDP socket sends nothing.
async fn route_ip(ipv6: bool) -> Option<IpAddr> {
    let (bind, target): (SocketAddr, SocketAddr) = if ipv6 {
        (
            (Ipv6Addr::UNSPECIFIED, 0).into(),
            (Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), 9).into(),
        )
    } else {
        ((Ipv4Addr::UNSPECIFIED, 0).into(), (Ipv4Addr::new(192, 0, 2, 1), 9).into())
    };
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect(target).await.ok()?;
    let ip = socket.local_addr().ok()?.ip();
    routable(&ip).then_some(ip)
}

fn routable(ip: &IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let runtime = ProcessRuntime::bind("test", "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(runtime.name(), "test");
        assert_ne!(runtime.local_addr().port(), 0);
        assert_eq!(runtime.advertised_addr(), runtime.local_addr());
    }

    #[tokio::test]
    async fn test_unspecified_bind_advertises_host_address() {
        let runtime = ProcessRuntime::bind("test", "0.0.0.0:0".parse().unwrap())
            .await
            .unwrap();
        let advertised = runtime.advertised_addr();
        assert!(runtime.local_addr().ip().is_unspecified());
        assert_eq!(advertised.port(), runtime.local_addr().port());
        // Hosts with no resolvable name and no route keep the bound address.
        if !advertised.ip().is_unspecified() {
            assert!(!advertised.ip().is_loopback());
            assert!(advertised.is_ipv4());
        }
    }

    #[tokio::test]
    async fn test_specified_address_is_advertised_as_is() {
        let addr: SocketAddr = "127.0.0.1:5050".parse().unwrap();
        assert_eq!(advertise(addr).await, addr);
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = ProcessRuntime::bind("a", "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let err = ProcessRuntime::bind("b", first.local_addr()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Bind { addr, .. } if addr == first.local_addr()));
    }
}
