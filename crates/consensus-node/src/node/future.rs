use parking_lot::RwLock;
use std::collections::HashMap;
use threshold_bls::Hash;

struct Held<M> {
    received_at: u64,
    message: M,
}

/// Messages waiting for a dependency (a parent block, a slot, a sign key),
/// keyed by the hash of what they wait for.
pub struct FutureMessageHolder<M> {
    messages: RwLock<HashMap<Hash, Vec<Held<M>>>>,
}

impl<M> Default for FutureMessageHolder<M> {
    fn default() -> Self {
        FutureMessageHolder {
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl<M> FutureMessageHolder<M> {
    pub fn new() -> Self {
        FutureMessageHolder::default()
    }

    pub fn add(&self, key: Hash, message: M, now: u64) {
        self.messages.write().entry(key).or_default().push(Held {
            received_at: now,
            message,
        });
    }

    /// Removes and returns everything waiting on `key`, oldest first.
    pub fn take(&self, key: &Hash) -> Vec<M> {
        self.messages
            .write()
            .remove(key)
            .map(|held| held.into_iter().map(|h| h.message).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &Hash) -> bool {
        self.messages.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Hash> {
        self.messages.read().keys().copied().collect()
    }

    pub fn size(&self) -> usize {
        self.messages.read().values().map(|v| v.len()).sum()
    }

    /// Drops messages older than `ttl`. Returns how many were dropped.
    pub fn forget_expired(&self, now: u64, ttl: u64) -> usize {
        let mut messages = self.messages.write();

        let mut dropped = 0;

        messages.retain(|_, held| {
            let before = held.len();

            held.retain(|h| h.received_at.saturating_add(ttl) > now);

            dropped += before - held.len();

            !held.is_empty()
        });

        dropped
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_take_returns_in_arrival_order() {
        let holder = FutureMessageHolder::new();

        let key = Hash::digest(b"parent");

        holder.add(key, 1, 10);
        holder.add(key, 2, 11);
        holder.add(Hash::digest(b"other"), 3, 12);

        assert_eq!(holder.size(), 3);
        assert_eq!(holder.take(&key), vec![1, 2]);
        assert!(holder.take(&key).is_empty());
        assert!(!holder.contains(&key));
    }

    #[test]
    fn test_forget_expired() {
        let holder = FutureMessageHolder::new();

        holder.add(Hash::digest(b"a"), "old", 0);
        holder.add(Hash::digest(b"a"), "new", 50);

        assert_eq!(holder.forget_expired(100, 60), 1);
        assert_eq!(holder.take(&Hash::digest(b"a")), vec!["new"]);
    }
}
