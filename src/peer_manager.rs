//! Trusted peer management.
//!
//! Trusted peers are exempt from pruning and are listed even if the node has
//! never connected to them. Trust is independent of the connection itself:
//! removing trust never deletes a store entry, and a failed disconnect never
//! keeps a peer trusted.

use crate::network::connection_manager::PeerDisconnector;
use crate::network::peer_record::{resolve_peer, PeerRecord, ResolveError};
use crate::network::peer_status::PeerStore;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PeerManager {
    store: Arc<dyn PeerStore>,
    disconnector: Arc<dyn PeerDisconnector>,
    disconnect_timeout: Duration,
}

impl PeerManager {
    pub fn new(store: Arc<dyn PeerStore>, disconnector: Arc<dyn PeerDisconnector>) -> Self {
        Self {
            store,
            disconnector,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }

    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// One record per trusted peer. Peers the store cannot describe get a
    /// "never connected" placeholder instead of being dropped.
    pub fn list_trusted(&self) -> Result<Vec<PeerRecord>, ResolveError> {
        let trusted = self.store.trusted_peers();
        let mut records = Vec::with_capacity(trusted.len());
        for peer_id in &trusted {
            let record = resolve_peer(self.store.as_ref(), peer_id)?
                .unwrap_or_else(|| PeerRecord::never_connected(peer_id));
            records.push(record);
        }
        Ok(records)
    }

    /// Trust `peer_id`, making sure the store has an entry for it.
    ///
    /// A direction already known to the store is kept; a fresh entry starts
    /// with an unknown direction. Returns false if the peer was already trusted.
    pub fn add_trusted(&self, peer_id: PeerId, address: Option<Multiaddr>) -> bool {
        self.store.ensure_entry(peer_id, address);

        let added = self.store.set_trusted(&[peer_id]) > 0;
        if added {
            info!(%peer_id, "✓ Added trusted peer");
        } else {
            debug!(%peer_id, "Peer already trusted");
        }
        added
    }

    /// Drop trust for `peer_id` after asking for a disconnect.
    ///
    /// The disconnect is advisory: its failure or timeout is logged and the
    /// trust removal goes ahead regardless. Returns false if the peer was not
    /// trusted.
    pub async fn remove_trusted(&self, peer_id: &PeerId) -> bool {
        match tokio::time::timeout(self.disconnect_timeout, self.disconnector.disconnect(peer_id))
            .await
        {
            Ok(Ok(())) => debug!(%peer_id, "Disconnected peer before removing trust"),
            Ok(Err(e)) => warn!(%peer_id, "⚠️  Disconnect failed while removing trust: {}", e),
            Err(_) => warn!(
                %peer_id,
                "⚠️  Disconnect timed out after {:?} while removing trust",
                self.disconnect_timeout
            ),
        }

        if !self.store.is_trusted(peer_id) {
            return false;
        }

        let removed = self.store.delete_trusted(&[*peer_id]) > 0;
        if removed {
            info!(%peer_id, "✓ Removed trusted peer");
        }
        removed
    }

    /// Discard every non-trusted store entry.
    pub fn prune_all(&self) -> usize {
        let pruned = self.store.prune_all();
        info!("🧹 Pruned {} non-trusted peer(s)", pruned);
        pruned
    }

    pub fn is_trusted(&self, peer_id: &PeerId) -> bool {
        self.store.is_trusted(peer_id)
    }
}
