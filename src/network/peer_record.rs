//! Renderable peer records and the resolver that derives them from a peer store.
//!
//! A record is never stored. It is rebuilt from a single snapshot of the store
//! entry every time it is requested, so it always reflects the live stack.

use super::peer_status::{PeerData, PeerStore};
use crate::error::StoreError;
use libp2p_identity::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Scheme prefix of the textual ENR form.
pub const ENR_PREFIX: &str = "enr:";

/// Connection state of a peer as tracked by the store.
///
/// The discriminants are an internal encoding only. The external form comes
/// from [`ConnectionState::as_str`] and does not move if these are renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    NotConnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "NOT_CONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        }
    }

    /// Connected or in the middle of a dial.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Connecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the connection that produced a store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Direction {
    #[default]
    Unknown = 0,
    Inbound = 1,
    Outbound = 2,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Unknown => "UNKNOWN",
            Direction::Inbound => "INBOUND",
            Direction::Outbound => "OUTBOUND",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External view of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    pub enr: String,
    pub last_seen_p2p_address: String,
    pub state: String,
    pub direction: String,
}

impl PeerRecord {
    /// Placeholder for a trusted peer the store knows nothing useful about.
    pub fn never_connected(peer_id: &PeerId) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            enr: String::new(),
            last_seen_p2p_address: String::new(),
            state: ConnectionState::NotConnected.as_str().to_string(),
            direction: Direction::Unknown.as_str().to_string(),
        }
    }
}

/// Field of a store entry, used to give lookup failures context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerField {
    Enr,
    Address,
    ConnectionState,
    Direction,
}

impl fmt::Display for PeerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerField::Enr => "ENR",
            PeerField::Address => "address",
            PeerField::ConnectionState => "connection state",
            PeerField::Direction => "direction",
        };
        f.write_str(name)
    }
}

/// What the resolver was doing with a field when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStep {
    /// Reading the field from the store
    Obtain,
    /// Rendering a value the store returned
    Serialize,
}

impl fmt::Display for ResolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolveStep::Obtain => "obtain",
            ResolveStep::Serialize => "serialize",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not {step} {field} for peer {peer_id}: {source}")]
pub struct ResolveError {
    pub peer_id: PeerId,
    pub field: PeerField,
    pub step: ResolveStep,
    #[source]
    pub source: StoreError,
}

impl ResolveError {
    /// A failed store read.
    pub fn new(peer_id: PeerId, field: PeerField, source: StoreError) -> Self {
        Self {
            peer_id,
            field,
            step: ResolveStep::Obtain,
            source,
        }
    }

    /// A stored value that could not be rendered.
    pub fn serialize(peer_id: PeerId, field: PeerField, source: StoreError) -> Self {
        Self {
            peer_id,
            field,
            step: ResolveStep::Serialize,
            source,
        }
    }

    pub fn is_peer_unknown(&self) -> bool {
        self.source.is_peer_unknown()
    }
}

/// Resolve a peer into its renderable record.
///
/// Returns `Ok(None)` when the store does not know the peer, and also when the
/// entry exists but was never classified with a direction. Any other lookup
/// failure is returned with the failing field attached.
pub fn resolve_peer(
    store: &dyn PeerStore,
    peer_id: &PeerId,
) -> Result<Option<PeerRecord>, ResolveError> {
    let data = match store.peer_data(peer_id) {
        Ok(data) => data,
        Err(e) if e.is_peer_unknown() => return Ok(None),
        Err(e) => return Err(e),
    };
    render(peer_id, &data)
}

fn render(peer_id: &PeerId, data: &PeerData) -> Result<Option<PeerRecord>, ResolveError> {
    if data.direction == Direction::Unknown {
        return Ok(None);
    }

    let enr = match &data.enr {
        Some(enr) => {
            let serialized = enr
                .serialize()
                .map_err(|e| ResolveError::serialize(*peer_id, PeerField::Enr, e.into()))?;
            format!("{}{}", ENR_PREFIX, serialized)
        }
        None => String::new(),
    };

    Ok(Some(PeerRecord {
        peer_id: peer_id.to_string(),
        enr,
        last_seen_p2p_address: data
            .address
            .as_ref()
            .map(|addr| addr.to_string())
            .unwrap_or_default(),
        state: data.connection_state.as_str().to_string(),
        direction: data.direction.as_str().to_string(),
    }))
}
