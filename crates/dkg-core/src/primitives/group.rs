use super::types::{GroupHeader, GroupInitInfo};
use std::collections::HashMap;
use threshold_bls::{Hash, Id, PublicKey};

/// A group committed on the group chain.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    group_id: Id,
    group_pk: PublicKey,
    threshold: usize,
    init_info: GroupInitInfo,
    member_index: HashMap<Id, usize>,
}

impl GroupInfo {
    pub fn new(group_pk: PublicKey, init_info: GroupInitInfo, threshold: usize) -> Self {
        let member_index = init_info
            .members
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        GroupInfo {
            group_id: Id::from_public_key(&group_pk),
            group_pk,
            threshold,
            init_info,
            member_index,
        }
    }

    pub fn group_id(&self) -> Id {
        self.group_id
    }

    pub fn group_pk(&self) -> &PublicKey {
        &self.group_pk
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn init_info(&self) -> &GroupInitInfo {
        &self.init_info
    }

    pub fn header(&self) -> &GroupHeader {
        &self.init_info.header
    }

    pub fn group_hash(&self) -> Hash {
        self.init_info.group_hash()
    }

    pub fn members(&self) -> &[Id] {
        &self.init_info.members
    }

    pub fn member_size(&self) -> usize {
        self.init_info.members.len()
    }

    pub fn member_index(&self, id: &Id) -> Option<usize> {
        self.member_index.get(id).copied()
    }

    pub fn is_member(&self, id: &Id) -> bool {
        self.member_index.contains_key(id)
    }

    pub fn work_height(&self) -> u64 {
        self.init_info.header.work_height
    }

    pub fn dismiss_height(&self) -> u64 {
        self.init_info.header.dismiss_height
    }

    /// Working in `[work_height, dismiss_height)`.
    pub fn is_effective(&self, height: u64) -> bool {
        self.work_height() <= height && height < self.dismiss_height()
    }

    pub fn is_dismissed(&self, height: u64) -> bool {
        height >= self.dismiss_height()
    }

    pub fn should_release(&self, height: u64, release_delay: u64) -> bool {
        height >= self.dismiss_height().saturating_add(release_delay)
    }
}

impl PartialEq for GroupInfo {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id && self.group_hash() == other.group_hash()
    }
}

impl Eq for GroupInfo {}
