use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Banned IPs and banned peer ids, maintained by the operator.
///
/// Both sets sit behind one lock so a combined `(ip, id)` update is seen by
/// readers either entirely or not at all. Admission control reads these sets
/// through `is_ip_banned` / `is_id_banned`; nothing here rejects connections.
pub struct Blacklist {
    sets: RwLock<BannedSets>,
}

#[derive(Default)]
struct BannedSets {
    ips: BTreeSet<String>,
    ids: BTreeSet<String>,
}

/// Point-in-time copy of both sets, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistSnapshot {
    pub ips: Vec<String>,
    pub ids: Vec<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(BannedSets::default()),
        }
    }

    /// Seed from configured entries. Empty strings are skipped.
    pub fn with_entries<I, D>(ips: I, ids: D) -> Self
    where
        I: IntoIterator<Item = String>,
        D: IntoIterator<Item = String>,
    {
        let sets = BannedSets {
            ips: ips.into_iter().filter(|ip| !ip.is_empty()).collect(),
            ids: ids.into_iter().filter(|id| !id.is_empty()).collect(),
        };
        Self {
            sets: RwLock::new(sets),
        }
    }

    /// Ban `ip` and/or `id`; an empty field is ignored.
    /// Returns true if either set changed.
    pub fn add(&self, ip: &str, id: &str) -> bool {
        let mut sets = self.sets.write();
        let mut changed = false;
        if !ip.is_empty() {
            changed |= sets.ips.insert(ip.to_string());
        }
        if !id.is_empty() {
            changed |= sets.ids.insert(id.to_string());
        }
        if changed {
            tracing::info!(ip, id, "🚫 Blacklist updated");
        }
        changed
    }

    /// Lift the ban on `ip` and/or `id`. Absent entries are not an error.
    pub fn remove(&self, ip: &str, id: &str) -> bool {
        let mut sets = self.sets.write();
        let mut changed = false;
        if !ip.is_empty() {
            changed |= sets.ips.remove(ip);
        }
        if !id.is_empty() {
            changed |= sets.ids.remove(id);
        }
        if changed {
            tracing::info!(ip, id, "✓ Removed from blacklist");
        }
        changed
    }

    pub fn snapshot(&self) -> BlacklistSnapshot {
        let sets = self.sets.read();
        BlacklistSnapshot {
            ips: sets.ips.iter().cloned().collect(),
            ids: sets.ids.iter().cloned().collect(),
        }
    }

    pub fn is_ip_banned(&self, ip: &str) -> bool {
        self.sets.read().ips.contains(ip)
    }

    pub fn is_id_banned(&self, id: &str) -> bool {
        self.sets.read().ids.contains(id)
    }

    /// (banned ips, banned ids)
    pub fn stats(&self) -> (usize, usize) {
        let sets = self.sets.read();
        (sets.ips.len(), sets.ids.len())
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new()
    }
}
