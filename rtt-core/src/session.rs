//! Proximity discovery capabilities: the service, an attached session, publish/subscribe sessions.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::event::{AttachCallback, DiscoveryCallback};

/// Service name both roles advertise and look for.
pub const DEFAULT_SERVICE_NAME: &str = "My_Rtt_Service";

/// Upper bound of the subscriber's discovery distance window (100 m).
pub const DEFAULT_MAX_DISTANCE_MM: u32 = 100_000;

/// Opaque token for a discovered peer. Only meaningful within the discovery session that reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(u32);

impl PeerHandle {
    pub const fn new(id: u32) -> Self {
        PeerHandle(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Identity stamped on every attach, publish and subscribe request when it is issued.
/// Callbacks carry it back so replies for a superseded request can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionTag(pub(crate) u64);

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discovery role selected when a flow starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    None,
    Publisher,
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::None => "None",
            Role::Publisher => "Publisher",
            Role::Subscriber => "Subscriber",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role {0:?} (expected publisher or subscriber)")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publisher" | "pub" => Ok(Role::Publisher),
            "subscriber" | "sub" => Ok(Role::Subscriber),
            "none" | "" => Ok(Role::None),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub service_name: String,
    /// Let subscribers range to this publisher.
    pub ranging_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeConfig {
    pub service_name: String,
    pub min_distance_mm: Option<u32>,
    pub max_distance_mm: Option<u32>,
}

/// Platform discovery service. `attach` returns immediately; the outcome arrives through the callback.
pub trait ProximityDiscoveryService: Send + Sync {
    fn is_available(&self) -> bool;
    fn attach(&self, callback: AttachCallback);
}

/// An attached discovery context. Owned by the orchestrator until closed.
pub trait AwareSession: Send {
    fn publish(&self, config: &PublishConfig, callback: DiscoveryCallback);
    fn subscribe(&self, config: &SubscribeConfig, callback: DiscoveryCallback);
    fn close(&self);
}

/// An active publish or subscribe registration.
pub trait DiscoverySession: Send {
    fn close(&self);
}
