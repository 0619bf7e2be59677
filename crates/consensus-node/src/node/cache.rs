use dkg_core::primitives::GroupInfo;
use ecvrf::{VrfPublicKey, VrfSecretKey};
use std::collections::HashMap;
use threshold_bls::{Hash, Id, PublicKey, SecretKey};

pub trait NodeInfoFetcher {
    fn get_id(&self) -> Id;

    fn get_secret_key(&self) -> &SecretKey;

    fn get_public_key(&self) -> PublicKey;

    fn get_vrf_secret_key(&self) -> &VrfSecretKey;

    fn get_vrf_public_key(&self) -> VrfPublicKey;
}

/// The miner's own keys. The id is derived from the identity public key.
pub struct InMemoryNodeInfoCache {
    id: Id,
    secret_key: SecretKey,
    vrf_secret_key: VrfSecretKey,
}

impl InMemoryNodeInfoCache {
    pub fn new(secret_key: SecretKey, vrf_secret_key: VrfSecretKey) -> Self {
        InMemoryNodeInfoCache {
            id: Id::from_public_key(&secret_key.public_key()),
            secret_key,
            vrf_secret_key,
        }
    }
}

impl NodeInfoFetcher for InMemoryNodeInfoCache {
    fn get_id(&self) -> Id {
        self.id
    }

    fn get_secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    fn get_public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    fn get_vrf_secret_key(&self) -> &VrfSecretKey {
        &self.vrf_secret_key
    }

    fn get_vrf_public_key(&self) -> VrfPublicKey {
        self.vrf_secret_key.public_key()
    }
}

pub trait GroupInfoFetcher {
    fn get_group(&self, id: &Id) -> Option<&GroupInfo>;

    fn groups(&self) -> &[GroupInfo];

    fn size(&self) -> usize;

    fn effective_groups(&self, height: u64) -> Vec<&GroupInfo>;

    fn select_verify_group(&self, seed: &Hash, height: u64) -> Option<&GroupInfo>;

    /// Live groups `member` belongs to at `height`.
    fn groups_of_member(&self, member: &Id, height: u64) -> usize;
}

pub trait GroupInfoUpdater {
    /// Appends, inserts in order or ignores a known group. Returns `true`
    /// when the group was new.
    fn add_group_info(&mut self, group: GroupInfo) -> bool;

    fn remove_released(&mut self, height: u64, release_delay: u64) -> Vec<GroupInfo>;

    fn refresh(&mut self, groups: Vec<GroupInfo>);
}

/// Groups ordered by `(work_height, id)` with an id index.
#[derive(Default)]
pub struct InMemoryGroupDirectory {
    groups: Vec<GroupInfo>,
    index: HashMap<Id, usize>,
}

impl InMemoryGroupDirectory {
    pub fn new() -> Self {
        InMemoryGroupDirectory::default()
    }

    fn reindex(&mut self) {
        self.index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.group_id(), i))
            .collect();
    }
}

fn order_key(group: &GroupInfo) -> (u64, Id) {
    (group.work_height(), group.group_id())
}

/// Picks `seed mod n` among the groups effective at `height`, in directory
/// order.
pub fn select_group<'a, I>(groups: I, seed: &Hash, height: u64) -> Option<&'a GroupInfo>
where
    I: IntoIterator<Item = &'a GroupInfo>,
{
    let effective: Vec<&GroupInfo> = groups
        .into_iter()
        .filter(|g| g.is_effective(height))
        .collect();

    if effective.is_empty() {
        return None;
    }

    let index = seed.mod_u64(effective.len() as u64) as usize;

    Some(effective[index])
}

impl GroupInfoFetcher for InMemoryGroupDirectory {
    fn get_group(&self, id: &Id) -> Option<&GroupInfo> {
        self.index.get(id).and_then(|i| self.groups.get(*i))
    }

    fn groups(&self) -> &[GroupInfo] {
        &self.groups
    }

    fn size(&self) -> usize {
        self.groups.len()
    }

    fn effective_groups(&self, height: u64) -> Vec<&GroupInfo> {
        self.groups
            .iter()
            .filter(|g| g.is_effective(height))
            .collect()
    }

    fn select_verify_group(&self, seed: &Hash, height: u64) -> Option<&GroupInfo> {
        select_group(self.groups.iter(), seed, height)
    }

    fn groups_of_member(&self, member: &Id, height: u64) -> usize {
        self.groups
            .iter()
            .filter(|g| !g.is_dismissed(height) && g.is_member(member))
            .count()
    }
}

impl GroupInfoUpdater for InMemoryGroupDirectory {
    fn add_group_info(&mut self, group: GroupInfo) -> bool {
        if let Some(existing) = self.get_group(&group.group_id()) {
            if existing.group_hash() != group.group_hash() {
                panic!(
                    "group {:?} seen with two different headers",
                    group.group_id()
                );
            }

            return false;
        }

        let key = order_key(&group);

        let appendable = self
            .groups
            .last()
            .map(|last| order_key(last) < key)
            .unwrap_or(true);

        if appendable {
            self.index.insert(group.group_id(), self.groups.len());
            self.groups.push(group);

            return true;
        }

        let position = self.groups.partition_point(|g| order_key(g) < key);

        self.groups.insert(position, group);

        self.reindex();

        true
    }

    fn remove_released(&mut self, height: u64, release_delay: u64) -> Vec<GroupInfo> {
        let (released, kept): (Vec<GroupInfo>, Vec<GroupInfo>) = self
            .groups
            .drain(..)
            .partition(|g| g.should_release(height, release_delay));

        self.groups = kept;

        self.reindex();

        released
    }

    fn refresh(&mut self, mut groups: Vec<GroupInfo>) {
        groups.sort_by_key(order_key);
        groups.dedup_by_key(|g| g.group_id());

        self.groups = groups;

        self.reindex();
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use dkg_core::primitives::{GroupHeader, GroupInitInfo};

    pub fn group(seed: &str, work: u64, dismiss: u64) -> GroupInfo {
        let members: Vec<Id> = (0..4)
            .map(|i| Id::from_address(format!("{}-{}", seed, i).as_bytes()))
            .collect();

        let header = GroupHeader::new(seed.into(), None, None, 0, 0, work, dismiss, &members);

        let sk = SecretKey::from_seed(seed.as_bytes());

        let info = GroupInitInfo {
            parent_sign: sk.sign(header.hash.as_bytes()),
            header,
            members,
        };

        GroupInfo::new(sk.public_key(), info, 3)
    }

    #[test]
    fn test_add_keeps_order_and_index() {
        let mut dir = InMemoryGroupDirectory::new();

        let a = group("a", 10, 100);
        let b = group("b", 30, 100);
        let c = group("c", 20, 100);

        assert!(dir.add_group_info(a.clone()));
        assert!(dir.add_group_info(b.clone()));
        assert!(dir.add_group_info(c.clone()));
        assert!(!dir.add_group_info(c.clone()));

        let order: Vec<u64> = dir.groups().iter().map(|g| g.work_height()).collect();

        assert_eq!(order, vec![10, 20, 30]);

        for g in [a, b, c].iter() {
            assert_eq!(dir.get_group(&g.group_id()), Some(g));
        }
    }

    #[test]
    fn test_select_verify_group_filters_by_height() {
        let mut dir = InMemoryGroupDirectory::new();

        dir.add_group_info(group("a", 0, 50));
        dir.add_group_info(group("b", 40, 100));

        let seed = Hash::digest(b"seed");

        assert_eq!(dir.effective_groups(10).len(), 1);
        assert_eq!(
            dir.select_verify_group(&seed, 10).map(|g| g.work_height()),
            Some(0)
        );
        assert_eq!(dir.effective_groups(45).len(), 2);
        assert_eq!(
            dir.select_verify_group(&seed, 60).map(|g| g.work_height()),
            Some(40)
        );
        assert!(dir.select_verify_group(&seed, 100).is_none());
    }

    #[test]
    fn test_remove_released_and_membership_count() {
        let mut dir = InMemoryGroupDirectory::new();

        let a = group("a", 0, 50);
        let member = a.members()[0];

        dir.add_group_info(a.clone());
        dir.add_group_info(group("b", 10, 200));

        assert_eq!(dir.groups_of_member(&member, 10), 1);
        assert_eq!(dir.groups_of_member(&member, 50), 0);

        assert!(dir.remove_released(60, 20).is_empty());

        let released = dir.remove_released(70, 20);

        assert_eq!(released, vec![a.clone()]);
        assert_eq!(dir.size(), 1);
        assert!(dir.get_group(&a.group_id()).is_none());
    }

    #[test]
    fn test_refresh_replaces_content() {
        let mut dir = InMemoryGroupDirectory::new();

        dir.add_group_info(group("a", 0, 50));

        dir.refresh(vec![group("c", 20, 90), group("b", 10, 90)]);

        let order: Vec<u64> = dir.groups().iter().map(|g| g.work_height()).collect();

        assert_eq!(order, vec![10, 20]);
    }
}
