//! Peer connection store.
//!
//! Holds one entry per peer the live network stack has seen, plus the trusted
//! peer set. Trust is tracked separately from the entries, so a peer can be
//! trusted before it has ever been seen and stays trusted after pruning.
//!
//! Entries live in a `DashMap`, so every read or write of a single peer happens
//! under that entry's shard lock and observes a consistent snapshot.

use super::peer_record::{ConnectionState, Direction, PeerField, ResolveError};
use crate::error::{EnrError, StoreError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Maximum encoded size of a node record (EIP-778).
pub const MAX_ENR_SIZE: usize = 300;

/// A node record as received from discovery, kept in its RLP encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enr(Vec<u8>);

impl Enr {
    pub fn from_rlp(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Textual form without the `enr:` scheme prefix.
    pub fn serialize(&self) -> Result<String, EnrError> {
        let first = *self.0.first().ok_or(EnrError::Empty)?;
        if self.0.len() > MAX_ENR_SIZE {
            return Err(EnrError::TooLarge(self.0.len()));
        }
        if first < 0xc0 {
            return Err(EnrError::NotAList(first));
        }
        Ok(URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// Snapshot of one store entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerData {
    pub enr: Option<Enr>,
    pub address: Option<Multiaddr>,
    pub connection_state: ConnectionState,
    pub direction: Direction,
}

/// Capabilities the control surface needs from a connection store.
pub trait PeerStore: Send + Sync {
    fn enr(&self, peer_id: &PeerId) -> Result<Option<Enr>, StoreError>;
    fn address(&self, peer_id: &PeerId) -> Result<Option<Multiaddr>, StoreError>;
    fn connection_state(&self, peer_id: &PeerId) -> Result<ConnectionState, StoreError>;
    fn direction(&self, peer_id: &PeerId) -> Result<Direction, StoreError>;

    /// All fields of one entry.
    ///
    /// The default composes the per-field lookups. Stores that can read an
    /// entry atomically should override it.
    fn peer_data(&self, peer_id: &PeerId) -> Result<PeerData, ResolveError> {
        let wrap = |field| move |e| ResolveError::new(*peer_id, field, e);
        Ok(PeerData {
            enr: self.enr(peer_id).map_err(wrap(PeerField::Enr))?,
            address: self.address(peer_id).map_err(wrap(PeerField::Address))?,
            connection_state: self
                .connection_state(peer_id)
                .map_err(wrap(PeerField::ConnectionState))?,
            direction: self
                .direction(peer_id)
                .map_err(wrap(PeerField::Direction))?,
        })
    }

    /// Insert or update an entry. An existing entry keeps its connection
    /// state, and keeps its ENR and address unless new ones are given.
    fn add(
        &self,
        enr: Option<Enr>,
        peer_id: PeerId,
        address: Option<Multiaddr>,
        direction: Direction,
    );

    /// Make sure an entry exists for a peer that is about to be trusted,
    /// recording `address` if given.
    ///
    /// A direction already known to the store is kept and a new entry starts
    /// with [`Direction::Unknown`]. The default reads the direction and then
    /// writes it back; stores that can do this under one entry lock should
    /// override it so a concurrent accept is never overwritten.
    fn ensure_entry(&self, peer_id: PeerId, address: Option<Multiaddr>) {
        let direction = self.direction(&peer_id).unwrap_or(Direction::Unknown);
        self.add(None, peer_id, address, direction);
    }

    fn trusted_peers(&self) -> Vec<PeerId>;
    fn is_trusted(&self, peer_id: &PeerId) -> bool;
    /// Returns how many of `peers` were not trusted before.
    fn set_trusted(&self, peers: &[PeerId]) -> usize;
    /// Returns how many of `peers` were actually removed.
    fn delete_trusted(&self, peers: &[PeerId]) -> usize;

    /// Drop every entry that is not trusted. Returns the number dropped.
    fn prune_all(&self) -> usize;
}

/// In-memory connection store shared by the network stack and the control surface.
pub struct PeerStatus {
    peers: DashMap<PeerId, PeerData>,
    trusted: RwLock<HashSet<PeerId>>,
}

impl PeerStatus {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            trusted: RwLock::new(HashSet::new()),
        }
    }

    /// Apply `f` to an existing entry under its lock.
    pub fn update<R>(&self, peer_id: &PeerId, f: impl FnOnce(&mut PeerData) -> R) -> Option<R> {
        self.peers.get_mut(peer_id).map(|mut entry| f(entry.value_mut()))
    }

    /// Apply `f` to the entry for `peer_id`, creating a blank one first if needed.
    pub fn upsert_with<R>(&self, peer_id: PeerId, f: impl FnOnce(&mut PeerData) -> R) -> R {
        let mut entry = self.peers.entry(peer_id).or_default();
        f(entry.value_mut())
    }

    pub fn set_connection_state(
        &self,
        peer_id: &PeerId,
        state: ConnectionState,
    ) -> Result<(), StoreError> {
        self.update(peer_id, |data| data.connection_state = state)
            .ok_or(StoreError::PeerUnknown)
    }

    pub fn set_enr(&self, peer_id: &PeerId, enr: Enr) -> Result<(), StoreError> {
        self.update(peer_id, |data| data.enr = Some(enr))
            .ok_or(StoreError::PeerUnknown)
    }

    /// Forget an entry. Trust is not affected.
    pub fn remove(&self, peer_id: &PeerId) -> Option<PeerData> {
        self.peers.remove(peer_id).map(|(_, data)| data)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers_in_state(&self, state: ConnectionState) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|entry| entry.value().connection_state == state)
            .map(|entry| *entry.key())
            .collect()
    }

    fn read<T>(&self, peer_id: &PeerId, f: impl FnOnce(&PeerData) -> T) -> Result<T, StoreError> {
        self.peers
            .get(peer_id)
            .map(|entry| f(entry.value()))
            .ok_or(StoreError::PeerUnknown)
    }
}

impl Default for PeerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerStore for PeerStatus {
    fn enr(&self, peer_id: &PeerId) -> Result<Option<Enr>, StoreError> {
        self.read(peer_id, |data| data.enr.clone())
    }

    fn address(&self, peer_id: &PeerId) -> Result<Option<Multiaddr>, StoreError> {
        self.read(peer_id, |data| data.address.clone())
    }

    fn connection_state(&self, peer_id: &PeerId) -> Result<ConnectionState, StoreError> {
        self.read(peer_id, |data| data.connection_state)
    }

    fn direction(&self, peer_id: &PeerId) -> Result<Direction, StoreError> {
        self.read(peer_id, |data| data.direction)
    }

    fn peer_data(&self, peer_id: &PeerId) -> Result<PeerData, ResolveError> {
        self.read(peer_id, PeerData::clone)
            .map_err(|e| ResolveError::new(*peer_id, PeerField::Enr, e))
    }

    fn add(
        &self,
        enr: Option<Enr>,
        peer_id: PeerId,
        address: Option<Multiaddr>,
        direction: Direction,
    ) {
        self.upsert_with(peer_id, |data| {
            if enr.is_some() {
                data.enr = enr;
            }
            if address.is_some() {
                data.address = address;
            }
            data.direction = direction;
        });
    }

    fn ensure_entry(&self, peer_id: PeerId, address: Option<Multiaddr>) {
        self.upsert_with(peer_id, |data| {
            if address.is_some() {
                data.address = address;
            }
        });
    }

    fn trusted_peers(&self) -> Vec<PeerId> {
        self.trusted.read().iter().copied().collect()
    }

    fn is_trusted(&self, peer_id: &PeerId) -> bool {
        self.trusted.read().contains(peer_id)
    }

    fn set_trusted(&self, peers: &[PeerId]) -> usize {
        let mut trusted = self.trusted.write();
        peers.iter().filter(|id| trusted.insert(**id)).count()
    }

    fn delete_trusted(&self, peers: &[PeerId]) -> usize {
        let mut trusted = self.trusted.write();
        peers.iter().filter(|id| trusted.remove(*id)).count()
    }

    fn prune_all(&self) -> usize {
        // Held across the sweep so a peer being trusted concurrently is either
        // fully kept or pruned before it becomes trusted.
        let trusted = self.trusted.read();
        let mut pruned = 0;
        self.peers.retain(|peer_id, _| {
            let keep = trusted.contains(peer_id);
            if !keep {
                pruned += 1;
            }
            keep
        });
        pruned
    }
}
