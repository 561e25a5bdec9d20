//! Operator control surface for trusted peers and the blacklist.
//!
//! Takes raw operator input, validates it, and delegates to the
//! [`PeerManager`] and [`Blacklist`]. Only two kinds of failure leave this
//! layer: malformed input and store failures while resolving peers.

use crate::network::blacklist::{Blacklist, BlacklistSnapshot};
use crate::network::peer_addr::{parse_peer_id, AddrParseError, PeerAddr};
use crate::network::peer_record::{PeerRecord, ResolveError};
use crate::peer_manager::PeerManager;
use libp2p_identity::PeerId;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{context}: {source}")]
    MalformedInput {
        context: &'static str,
        #[source]
        source: AddrParseError,
    },

    #[error("could not get peer info: {0}")]
    Infrastructure(#[from] ResolveError),
}

impl ControlError {
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, ControlError::MalformedInput { .. })
    }
}

pub struct PeerControl {
    peers: PeerManager,
    blacklist: Arc<Blacklist>,
}

impl PeerControl {
    pub fn new(peers: PeerManager, blacklist: Arc<Blacklist>) -> Self {
        Self { peers, blacklist }
    }

    pub fn list_trusted(&self) -> Result<Vec<PeerRecord>, ControlError> {
        self.peers.list_trusted().map_err(|e| {
            tracing::error!("❌ Failed to list trusted peers: {}", e);
            ControlError::from(e)
        })
    }

    /// Trust the peer named by a `.../p2p/<id>` multiaddress.
    /// Re-adding a trusted peer succeeds without effect.
    pub fn add_trusted(&self, addr: &str) -> Result<PeerId, ControlError> {
        let PeerAddr { peer_id, address } =
            addr.parse::<PeerAddr>()
                .map_err(|source| ControlError::MalformedInput {
                    context: "could not derive peer info from multiaddress",
                    source,
                })?;
        self.peers.add_trusted(peer_id, address);
        Ok(peer_id)
    }

    /// Stop trusting a peer. Succeeds whether or not it was trusted.
    pub async fn remove_trusted(&self, id: &str) -> Result<(), ControlError> {
        let peer_id = parse_peer_id(id).map_err(|source| ControlError::MalformedInput {
            context: "could not decode peer id",
            source,
        })?;
        self.peers.remove_trusted(&peer_id).await;
        Ok(())
    }

    /// Trust every well-formed entry of `addrs`. Bad entries are logged and
    /// skipped. Returns how many entries were accepted.
    pub fn seed_trusted(&self, addrs: &[String]) -> usize {
        let mut accepted = 0;
        for addr in addrs {
            match self.add_trusted(addr) {
                Ok(_) => accepted += 1,
                Err(e) => tracing::warn!("⚠️  Skipping trusted peer '{}': {}", addr, e),
            }
        }
        accepted
    }

    pub fn prune_all(&self) -> usize {
        self.peers.prune_all()
    }

    pub fn list_blacklist(&self) -> BlacklistSnapshot {
        self.blacklist.snapshot()
    }

    pub fn add_blacklist(&self, ip: &str, id: &str) {
        self.blacklist.add(ip, id);
    }

    pub fn remove_blacklist(&self, ip: &str, id: &str) {
        self.blacklist.remove(ip, id);
    }
}
