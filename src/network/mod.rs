pub mod blacklist;
pub mod connection_manager;
pub mod peer_addr;
pub mod peer_record;
pub mod peer_status;
