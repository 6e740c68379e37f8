//! Command line and environment configuration

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use clap::Parser;

use crate::error::Error;

/// Do not change the leader election ID, otherwise multiple operator
/// instances can be running during upgrade.
pub const LEADER_ELECTION_ID: &str = "734f7229.kubevirt.io";

/// Port the webhook server listens on
pub const WEBHOOK_PORT: u16 = 9443;

/// A listen address. Accepts `host:port`, `:port` for all IPv4 interfaces,
/// or `0` to disable the listener. Use `[::]:port` to listen on IPv6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindAddress(Option<SocketAddr>);

impl BindAddress {
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.0
    }
}

impl From<SocketAddr> for BindAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(Some(addr))
    }
}

impl FromStr for BindAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "0" {
            return Ok(Self(None));
        }

        let candidate = if s.starts_with(':') {
            format!("0.0.0.0{s}")
        } else {
            s.to_string()
        };

        candidate
            .parse::<SocketAddr>()
            .map(|addr| Self(Some(addr)))
            .map_err(|e| Error::ConfigError(format!("invalid bind address {s:?}: {e}")))
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("disabled"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The address the metric endpoint binds to.
    #[arg(long, env = "METRICS_ADDR", default_value = ":8443")]
    pub metrics_addr: BindAddress,

    /// The address the readiness probe endpoint binds to.
    #[arg(long, env = "READY_PROBE_ADDR", default_value = ":9440")]
    pub ready_probe_addr: BindAddress,

    /// Enable leader election for controller manager. Enabling this will
    /// ensure there is only one active controller manager.
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    pub enable_leader_election: bool,

    /// Namespace the leader election lease lives in
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub leader_election_namespace: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    #[arg(long, env = "ENABLE_WEBHOOKS", hide = true)]
    pub enable_webhooks: Option<String>,
}

impl Args {
    /// Webhooks are on unless `ENABLE_WEBHOOKS` is exactly `false`
    pub fn webhooks_enabled(&self) -> bool {
        webhooks_enabled(self.enable_webhooks.as_deref())
    }
}

pub fn webhooks_enabled(value: Option<&str>) -> bool {
    value != Some("false")
}
