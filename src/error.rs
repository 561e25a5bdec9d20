use libp2p_identity::PeerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a peer store lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store holds no entry for the peer. Callers treat this as absence.
    #[error("peer unknown")]
    PeerUnknown,

    #[error("invalid ENR: {0}")]
    InvalidEnr(#[from] EnrError),

    #[error("peer store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_peer_unknown(&self) -> bool {
        matches!(self, StoreError::PeerUnknown)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrError {
    #[error("record is empty")]
    Empty,

    #[error("record is {0} bytes, exceeds the 300 byte limit")]
    TooLarge(usize),

    #[error("record does not start with an RLP list prefix (found 0x{0:02x})")]
    NotAList(u8),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),

    #[error("transport error: {0}")]
    Transport(String),
}
