//! Cluster member identity and state types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a single cluster member.
///
/// Immutable once constructed; IDs are unique within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Cluster-unique server ID
    pub id: u64,
    /// Network address other members use to reach this server
    pub address: String,
}

impl ServerInfo {
    pub fn new(id: u64, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Voting role of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Receives replicated state but does not count towards quorum.
    Standby,
    /// Full voting member.
    Voter,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Standby => write!(f, "standby"),
            NodeRole::Voter => write!(f, "voter"),
        }
    }
}

/// Replication state of the local engine, reported to watch callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Unavailable,
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Unavailable => "unavailable",
            NodeState::Follower => "follower",
            NodeState::Candidate => "candidate",
            NodeState::Leader => "leader",
        };
        f.write_str(s)
    }
}
