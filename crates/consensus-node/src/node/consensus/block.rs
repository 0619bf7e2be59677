use super::verify::VerifyContext;
use crate::node::errors::{NodeError, NodeResult};
use dkg_core::primitives::GroupInfo;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use threshold_bls::{Hash, Id};
use tracing::debug;

/// `(height, pre_hash, block_hash)`.
pub type SlotKey = (u64, Hash, Hash);

pub type SharedVerifyContext = Arc<Mutex<VerifyContext>>;

/// Per-group bookkeeping of every candidate block this node verifies.
pub struct BlockContext {
    group: GroupInfo,
    contexts: RwLock<HashMap<SlotKey, SharedVerifyContext>>,
    hash_index: RwLock<HashMap<Hash, SlotKey>>,
    castor_casts: RwLock<HashMap<(u64, Id), Hash>>,
    signed_qn: RwLock<HashMap<u64, u64>>,
    success: RwLock<HashMap<(u64, Hash), Hash>>,
    broadcast_qn: RwLock<HashMap<u64, u64>>,
}

impl BlockContext {
    pub fn new(group: GroupInfo) -> Self {
        BlockContext {
            group,
            contexts: RwLock::new(HashMap::new()),
            hash_index: RwLock::new(HashMap::new()),
            castor_casts: RwLock::new(HashMap::new()),
            signed_qn: RwLock::new(HashMap::new()),
            success: RwLock::new(HashMap::new()),
            broadcast_qn: RwLock::new(HashMap::new()),
        }
    }

    pub fn group(&self) -> &GroupInfo {
        &self.group
    }

    pub fn group_id(&self) -> Id {
        self.group.group_id()
    }

    /// Inserts the context built by `create` unless one already exists for
    /// the key. The flag tells whether this call created it.
    pub fn get_or_create<F>(&self, key: SlotKey, create: F) -> (SharedVerifyContext, bool)
    where
        F: FnOnce() -> VerifyContext,
    {
        if let Some(ctx) = self.contexts.read().get(&key) {
            return (ctx.clone(), false);
        }

        let mut contexts = self.contexts.write();

        if let Some(ctx) = contexts.get(&key) {
            return (ctx.clone(), false);
        }

        let ctx = Arc::new(Mutex::new(create()));

        contexts.insert(key, ctx.clone());

        self.hash_index.write().insert(key.2, key);

        (ctx, true)
    }

    pub fn get(&self, key: &SlotKey) -> Option<SharedVerifyContext> {
        self.contexts.read().get(key).cloned()
    }

    pub fn get_by_hash(&self, block_hash: &Hash) -> Option<SharedVerifyContext> {
        let key = *self.hash_index.read().get(block_hash)?;

        self.get(&key)
    }

    pub fn contexts(&self) -> Vec<SharedVerifyContext> {
        self.contexts.read().values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.contexts.read().len()
    }

    /// A castor may cast one block per height.
    pub fn check_castor(&self, castor: Id, height: u64, block_hash: Hash) -> NodeResult<()> {
        let mut casts = self.castor_casts.write();

        match casts.get(&(height, castor)) {
            Some(known) if *known != block_hash => Err(NodeError::CastorEquivocation(castor)),
            Some(_) => Ok(()),
            None => {
                casts.insert((height, castor), block_hash);

                Ok(())
            }
        }
    }

    /// Admits signing a block of `total_qn` at `height` unless a higher one
    /// was signed already, and records it.
    pub fn try_sign_qn(&self, height: u64, total_qn: u64) -> NodeResult<()> {
        let mut signed = self.signed_qn.write();

        let highest = signed.entry(height).or_insert(0);

        if total_qn < *highest {
            return Err(NodeError::LowerQN {
                signed: *highest,
                actual: total_qn,
            });
        }

        *highest = total_qn;

        Ok(())
    }

    pub fn signed_qn(&self, height: u64) -> Option<u64> {
        self.signed_qn.read().get(&height).copied()
    }

    /// Only one block per `(height, pre_hash)` may succeed. Returns `true`
    /// for the first block and for repeats of it.
    pub fn try_mark_success(&self, height: u64, pre_hash: Hash, block_hash: Hash) -> bool {
        let mut success = self.success.write();

        let winner = success.entry((height, pre_hash)).or_insert(block_hash);

        *winner == block_hash
    }

    /// Gives up a success mark when the commit did not go through.
    pub fn release_success(&self, height: u64, pre_hash: Hash, block_hash: Hash) {
        let mut success = self.success.write();

        if success.get(&(height, pre_hash)) == Some(&block_hash) {
            success.remove(&(height, pre_hash));
        }
    }

    /// Returns `true` when nothing with an equal or higher QN went out at
    /// this height yet, and records the QN.
    pub fn should_broadcast(&self, height: u64, total_qn: u64) -> bool {
        let mut broadcast = self.broadcast_qn.write();

        match broadcast.get(&height) {
            Some(qn) if *qn >= total_qn => false,
            _ => {
                broadcast.insert(height, total_qn);

                true
            }
        }
    }

    /// Drops everything below `min_height`. Returns the number of contexts
    /// removed.
    pub fn sweep(&self, min_height: u64) -> usize {
        let removed: Vec<SlotKey> = {
            let mut contexts = self.contexts.write();

            let stale: Vec<SlotKey> = contexts
                .keys()
                .filter(|(height, _, _)| *height < min_height)
                .copied()
                .collect();

            for key in stale.iter() {
                contexts.remove(key);
            }

            stale
        };

        {
            let mut index = self.hash_index.write();

            for key in removed.iter() {
                index.remove(&key.2);
            }
        }

        self.castor_casts.write().retain(|(h, _), _| *h >= min_height);
        self.signed_qn.write().retain(|h, _| *h >= min_height);
        self.success.write().retain(|(h, _), _| *h >= min_height);
        self.broadcast_qn.write().retain(|h, _| *h >= min_height);

        if !removed.is_empty() {
            debug!(group = ?self.group_id(), removed = removed.len(), "swept verify contexts");
        }

        removed.len()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::chain::types::Block;
    use crate::node::cache::tests::group;
    use crate::node::messages::CastBody;
    use dkg_core::SignedMessage;
    use threshold_bls::SecretKey;

    fn context(height: u64, seed: &[u8]) -> (SlotKey, VerifyContext) {
        let group = group("block-ctx", 0, 100);

        let pre = Block::genesis(group.group_id(), 1_000).header;

        let mut header = pre.clone();
        header.height = height;
        header.pre_hash = pre.hash;
        header.extra = seed.to_vec();
        header.hash = header.gen_hash();

        let key = (height, pre.hash, header.hash);

        let sk = SecretKey::from_seed(b"castor");

        let cast = SignedMessage::new(CastBody { header }, &sk, Id::from_address(b"castor"));

        (key, VerifyContext::new(cast, &pre, &group, 7_000, 1_000))
    }

    #[test]
    fn test_get_or_create_inserts_once() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        let (key, first) = context(1, b"a");
        let (_, second) = context(1, b"a");

        let (a, created_a) = ctx.get_or_create(key, || first);
        let (b, created_b) = ctx.get_or_create(key, || second);

        assert!(created_a);
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(ctx.get_by_hash(&key.2).is_some());
        assert_eq!(ctx.size(), 1);
    }

    #[test]
    fn test_castor_equivocation() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        let castor = Id::from_address(b"castor");

        assert!(ctx.check_castor(castor, 3, Hash::digest(b"a")).is_ok());
        assert!(ctx.check_castor(castor, 3, Hash::digest(b"a")).is_ok());
        assert!(matches!(
            ctx.check_castor(castor, 3, Hash::digest(b"b")),
            Err(NodeError::CastorEquivocation(_))
        ));
        assert!(ctx.check_castor(castor, 4, Hash::digest(b"b")).is_ok());
    }

    #[test]
    fn test_signed_qn_never_goes_down() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        ctx.try_sign_qn(5, 20).unwrap();
        ctx.try_sign_qn(5, 20).unwrap();

        assert!(matches!(
            ctx.try_sign_qn(5, 19),
            Err(NodeError::LowerQN {
                signed: 20,
                actual: 19
            })
        ));

        ctx.try_sign_qn(5, 25).unwrap();
        ctx.try_sign_qn(6, 1).unwrap();

        assert_eq!(ctx.signed_qn(5), Some(25));
    }

    #[test]
    fn test_one_success_per_parent() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        let pre = Hash::digest(b"pre");

        assert!(ctx.try_mark_success(4, pre, Hash::digest(b"a")));
        assert!(ctx.try_mark_success(4, pre, Hash::digest(b"a")));
        assert!(!ctx.try_mark_success(4, pre, Hash::digest(b"b")));

        ctx.release_success(4, pre, Hash::digest(b"a"));

        assert!(ctx.try_mark_success(4, pre, Hash::digest(b"b")));
    }

    #[test]
    fn test_broadcast_once_per_qn() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        assert!(ctx.should_broadcast(2, 10));
        assert!(!ctx.should_broadcast(2, 10));
        assert!(!ctx.should_broadcast(2, 9));
        assert!(ctx.should_broadcast(2, 11));
    }

    #[test]
    fn test_sweep() {
        let ctx = BlockContext::new(group("block-ctx", 0, 100));

        for height in 1..=5 {
            let (key, vctx) = context(height, b"s");

            ctx.get_or_create(key, || vctx);
            ctx.try_sign_qn(height, height).unwrap();
        }

        assert_eq!(ctx.sweep(4), 3);
        assert_eq!(ctx.size(), 2);
        assert_eq!(ctx.signed_qn(3), None);
        assert_eq!(ctx.signed_qn(4), Some(4));
    }
}
