//! Connection manager for tracking peer connection state.
//!
//! Records dial/accept/drop transitions from the live network stack into the
//! shared [`PeerStatus`] store and keeps connection counters. It is also the
//! component that the control surface asks to disconnect a peer.

use super::peer_record::{ConnectionState, Direction};
use super::peer_status::{PeerStatus, PeerStore};
use crate::error::NetworkError;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Something that can drop the connection to a peer.
#[async_trait::async_trait]
pub trait PeerDisconnector: Send + Sync {
    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;
}

pub struct ConnectionManager {
    store: Arc<PeerStatus>,
    connected_count: AtomicUsize,
    inbound_count: AtomicUsize,
    outbound_count: AtomicUsize,
}

impl ConnectionManager {
    pub fn new(store: Arc<PeerStatus>) -> Self {
        Self {
            store,
            connected_count: AtomicUsize::new(0),
            inbound_count: AtomicUsize::new(0),
            outbound_count: AtomicUsize::new(0),
        }
    }

    /// Record an accepted inbound connection.
    /// Returns false if the peer was already connected.
    pub fn mark_inbound(&self, peer_id: PeerId, address: Multiaddr) -> bool {
        let accepted = self.store.upsert_with(peer_id, |data| {
            if data.connection_state == ConnectionState::Connected {
                return false;
            }
            data.address = Some(address);
            data.direction = Direction::Inbound;
            data.connection_state = ConnectionState::Connected;
            true
        });
        if accepted {
            self.increment(Direction::Inbound);
        }
        accepted
    }

    /// Record the start of an outbound dial.
    /// Returns false if the peer is already connected or being dialed.
    pub fn mark_connecting(&self, peer_id: PeerId, address: Multiaddr) -> bool {
        self.store.upsert_with(peer_id, |data| {
            if data.connection_state.is_active() {
                return false;
            }
            data.address = Some(address);
            data.direction = Direction::Outbound;
            data.connection_state = ConnectionState::Connecting;
            true
        })
    }

    /// Complete a dial started with [`mark_connecting`](Self::mark_connecting).
    pub fn mark_connected(&self, peer_id: &PeerId) -> bool {
        let direction = self.store.update(peer_id, |data| {
            if data.connection_state == ConnectionState::Connecting {
                data.connection_state = ConnectionState::Connected;
                Some(data.direction)
            } else {
                None
            }
        });
        match direction.flatten() {
            Some(direction) => {
                self.increment(direction);
                true
            }
            None => false,
        }
    }

    /// Record a dropped connection or a failed dial.
    pub fn mark_disconnected(&self, peer_id: &PeerId) {
        let was_connected = self.store.update(peer_id, |data| {
            let was = (data.connection_state == ConnectionState::Connected)
                .then_some(data.direction);
            data.connection_state = ConnectionState::NotConnected;
            was
        });
        if let Some(direction) = was_connected.flatten() {
            self.decrement(direction);
        }
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.store
            .connection_state(peer_id)
            .map(|state| state == ConnectionState::Connected)
            .unwrap_or(false)
    }

    pub fn get_connected_peers(&self) -> Vec<PeerId> {
        self.store.peers_in_state(ConnectionState::Connected)
    }

    pub fn connected_count(&self) -> usize {
        self.connected_count.load(Ordering::Relaxed)
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound_count.load(Ordering::Relaxed)
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound_count.load(Ordering::Relaxed)
    }

    fn increment(&self, direction: Direction) {
        self.connected_count.fetch_add(1, Ordering::Relaxed);
        match direction {
            Direction::Inbound => {
                self.inbound_count.fetch_add(1, Ordering::Relaxed);
            }
            Direction::Outbound => {
                self.outbound_count.fetch_add(1, Ordering::Relaxed);
            }
            Direction::Unknown => {}
        }
    }

    fn decrement(&self, direction: Direction) {
        self.connected_count.fetch_sub(1, Ordering::Relaxed);
        match direction {
            Direction::Inbound => {
                self.inbound_count.fetch_sub(1, Ordering::Relaxed);
            }
            Direction::Outbound => {
                self.outbound_count.fetch_sub(1, Ordering::Relaxed);
            }
            Direction::Unknown => {}
        }
    }
}

#[async_trait::async_trait]
impl PeerDisconnector for ConnectionManager {
    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if !self.begin_disconnect(peer_id) {
            return Err(NetworkError::NotConnected(*peer_id));
        }
        tracing::debug!(%peer_id, "🔌 Disconnecting peer");
        self.finish_disconnect(peer_id);
        Ok(())
    }
}

impl ConnectionManager {
    /// Move an active peer to Disconnecting. The connection stops counting
    /// here, so an accept that lands mid-disconnect is counted afresh.
    fn begin_disconnect(&self, peer_id: &PeerId) -> bool {
        let left = self.store.update(peer_id, |data| {
            let previous = data.connection_state;
            if !previous.is_active() {
                return None;
            }
            data.connection_state = ConnectionState::Disconnecting;
            Some((previous, data.direction))
        });
        match left.flatten() {
            Some((previous, direction)) => {
                // A dial in progress was never counted.
                if previous == ConnectionState::Connected {
                    self.decrement(direction);
                }
                true
            }
            None => false,
        }
    }

    /// Settle a disconnect, unless the peer reconnected in the meantime.
    fn finish_disconnect(&self, peer_id: &PeerId) {
        self.store.update(peer_id, |data| {
            if data.connection_state == ConnectionState::Disconnecting {
                data.connection_state = ConnectionState::NotConnected;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Multiaddr {
        "/ip4/192.168.1.10/tcp/9000".parse().unwrap()
    }

    #[test]
    fn test_inbound_lifecycle() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();

        assert!(cm.mark_inbound(peer, addr()));
        assert!(!cm.mark_inbound(peer, addr()));
        assert!(cm.is_connected(&peer));
        assert_eq!(cm.connected_count(), 1);
        assert_eq!(cm.inbound_count(), 1);
        assert_eq!(store.direction(&peer), Ok(Direction::Inbound));

        cm.mark_disconnected(&peer);
        assert!(!cm.is_connected(&peer));
        assert_eq!(cm.connected_count(), 0);
        assert_eq!(cm.inbound_count(), 0);
        // Entry survives the drop for later inspection.
        assert!(store.contains(&peer));
    }

    #[test]
    fn test_outbound_lifecycle() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();

        assert!(!cm.mark_connected(&peer));
        assert!(cm.mark_connecting(peer, addr()));
        assert!(!cm.mark_connecting(peer, addr()));
        assert_eq!(
            store.connection_state(&peer),
            Ok(ConnectionState::Connecting)
        );
        assert_eq!(cm.connected_count(), 0);

        assert!(cm.mark_connected(&peer));
        assert!(!cm.mark_connected(&peer));
        assert_eq!(cm.outbound_count(), 1);
        assert_eq!(cm.get_connected_peers(), vec![peer]);
    }

    #[test]
    fn test_failed_dial_does_not_touch_counters() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store);
        let peer = PeerId::random();

        cm.mark_connecting(peer, addr());
        cm.mark_disconnected(&peer);
        assert_eq!(cm.connected_count(), 0);
        assert_eq!(cm.outbound_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_connected_peer() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();
        cm.mark_inbound(peer, addr());

        cm.disconnect(&peer).await.unwrap();
        assert_eq!(
            store.connection_state(&peer),
            Ok(ConnectionState::NotConnected)
        );
        assert_eq!(cm.connected_count(), 0);
        assert_eq!(cm.inbound_count(), 0);
    }

    #[test]
    fn test_accept_during_disconnect_survives() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();
        cm.mark_inbound(peer, addr());

        assert!(cm.begin_disconnect(&peer));
        assert_eq!(
            store.connection_state(&peer),
            Ok(ConnectionState::Disconnecting)
        );
        assert_eq!(cm.connected_count(), 0);

        // The peer dials back in before the teardown settles.
        assert!(cm.mark_inbound(peer, addr()));
        cm.finish_disconnect(&peer);

        assert_eq!(
            store.connection_state(&peer),
            Ok(ConnectionState::Connected)
        );
        assert!(cm.is_connected(&peer));
        assert_eq!(cm.connected_count(), 1);
        assert_eq!(cm.inbound_count(), 1);
    }

    #[test]
    fn test_drop_during_disconnect_is_counted_once() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();
        cm.mark_connecting(peer, addr());
        cm.mark_connected(&peer);
        assert_eq!(cm.outbound_count(), 1);

        assert!(cm.begin_disconnect(&peer));
        cm.mark_disconnected(&peer);
        cm.finish_disconnect(&peer);

        assert_eq!(
            store.connection_state(&peer),
            Ok(ConnectionState::NotConnected)
        );
        assert_eq!(cm.connected_count(), 0);
        assert_eq!(cm.outbound_count(), 0);
        assert!(!cm.begin_disconnect(&peer));
    }

    #[tokio::test]
    async fn test_disconnect_unknown_peer_fails() {
        let store = Arc::new(PeerStatus::new());
        let cm = ConnectionManager::new(store.clone());
        let peer = PeerId::random();

        let err = cm.disconnect(&peer).await.unwrap_err();
        assert!(matches!(err, NetworkError::NotConnected(p) if p == peer));
        assert!(store.is_empty());
    }
}
