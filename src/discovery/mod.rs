pub mod address;
pub mod announcer;

use serde::{Deserialize, Serialize};

pub use address::resolve_address;
pub use announcer::{AnnouncerHandle, DiscoveryAnnouncer, DEFAULT_ANNOUNCE_INTERVAL};

pub const DISCOVERY_TOPIC: &str = "discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceState {
    Up,
    Down,
}

/// Liveness broadcast payload, built fresh for every publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryToken {
    pub state: InstanceState,
    pub address: String,
}

impl DiscoveryToken {
    pub fn up(address: impl Into<String>) -> Self {
        Self {
            state: InstanceState::Up,
            address: address.into(),
        }
    }

    pub fn down(address: impl Into<String>) -> Self {
        Self {
            state: InstanceState::Down,
            address: address.into(),
        }
    }
}
