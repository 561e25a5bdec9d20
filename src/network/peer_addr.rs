//! Parsing of operator-supplied peer addresses and identifiers.

use libp2p_identity::PeerId;
use multiaddr::{Multiaddr, Protocol};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddrParseError {
    #[error("invalid multiaddress {input:?}: {source}")]
    Multiaddr {
        input: String,
        #[source]
        source: multiaddr::Error,
    },

    #[error("multiaddress {0:?} does not end with a /p2p component")]
    MissingPeerId(String),

    #[error("invalid peer id {input:?}: {source}")]
    PeerId {
        input: String,
        #[source]
        source: libp2p_identity::ParseError,
    },
}

/// A peer identity with the transport address it was advertised on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub peer_id: PeerId,
    /// `None` when the input was a bare `/p2p/<id>`.
    pub address: Option<Multiaddr>,
}

impl FromStr for PeerAddr {
    type Err = AddrParseError;

    /// Accepts `<transport>/p2p/<peer id>`; the transport part may be empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut address = Multiaddr::from_str(s.trim()).map_err(|source| {
            AddrParseError::Multiaddr {
                input: s.to_string(),
                source,
            }
        })?;

        let peer_id = match address.pop() {
            Some(Protocol::P2p(peer_id)) => peer_id,
            _ => return Err(AddrParseError::MissingPeerId(s.to_string())),
        };

        Ok(Self {
            peer_id,
            address: (!address.is_empty()).then_some(address),
        })
    }
}

pub fn parse_peer_id(s: &str) -> Result<PeerId, AddrParseError> {
    PeerId::from_str(s.trim()).map_err(|source| AddrParseError::PeerId {
        input: s.to_string(),
        source,
    })
}
