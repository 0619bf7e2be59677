use crate::primitives::{DKGError, DKGResult, GroupInfo, GroupInitInfo};
use std::collections::{BTreeMap, HashMap, HashSet};
use threshold_bls::keys::PUBLIC_KEY_LENGTH;
use threshold_bls::sig::recover_group_signature;
use threshold_bls::{Id, PublicKey, Signature};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitedStatus {
    Waiting,
    Success,
    Failed,
}

/// What adding one report led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitedOutcome {
    Waiting,
    Accepted(GroupInfo),
}

struct Candidate {
    public_key: PublicKey,
    partials: BTreeMap<Id, Signature>,
}

/// Collects `GroupInited` reports from members. The group is accepted once
/// `threshold` partial signatures reported with the same public key recover
/// a signature over the group hash that verifies against it. Bad partials
/// only delay acceptance; the context fails at the ready height alone.
pub struct InitedGroupContext {
    init_info: GroupInitInfo,
    threshold: usize,
    reported: HashSet<Id>,
    candidates: HashMap<[u8; PUBLIC_KEY_LENGTH], Candidate>,
    status: InitedStatus,
}

impl InitedGroupContext {
    pub fn new(init_info: GroupInitInfo, threshold: usize) -> Self {
        InitedGroupContext {
            init_info,
            threshold,
            reported: HashSet::new(),
            candidates: HashMap::new(),
            status: InitedStatus::Waiting,
        }
    }

    pub fn init_info(&self) -> &GroupInitInfo {
        &self.init_info
    }

    pub fn status(&self) -> &InitedStatus {
        &self.status
    }

    pub fn report_count(&self) -> usize {
        self.reported.len()
    }

    /// The most reported key and how many members reported it.
    pub fn leading_key(&self) -> Option<(PublicKey, usize)> {
        self.candidates
            .values()
            .map(|c| (c.public_key, c.partials.len()))
            .max_by_key(|(_, count)| *count)
    }

    pub fn add_inited(
        &mut self,
        member: Id,
        group_pk: PublicKey,
        member_sign: Signature,
    ) -> DKGResult<InitedOutcome> {
        if self.status != InitedStatus::Waiting {
            return Err(DKGError::AlreadyFinished);
        }

        if !self.init_info.is_member(&member) {
            return Err(DKGError::NotMember(member));
        }

        if !self.reported.insert(member) {
            return Ok(InitedOutcome::Waiting);
        }

        let candidate = self
            .candidates
            .entry(group_pk.to_bytes())
            .or_insert_with(|| Candidate {
                public_key: group_pk,
                partials: BTreeMap::new(),
            });

        candidate.partials.insert(member, member_sign);

        if candidate.partials.len() < self.threshold {
            return Ok(InitedOutcome::Waiting);
        }

        let group_hash = self.init_info.group_hash();

        let recovered = recover_with(
            &candidate.partials,
            &member,
            self.threshold,
            group_hash.as_bytes(),
            &group_pk,
        )?;

        if recovered.is_none() {
            return Ok(InitedOutcome::Waiting);
        }

        self.status = InitedStatus::Success;

        Ok(InitedOutcome::Accepted(GroupInfo::new(
            group_pk,
            self.init_info.clone(),
            self.threshold,
        )))
    }

    /// Marks the context failed when the ready height passed without success.
    pub fn check_timeout(&mut self, height: u64) -> bool {
        if self.status == InitedStatus::Waiting && self.init_info.ready_timeout(height) {
            self.status = InitedStatus::Failed;
        }

        self.status == InitedStatus::Failed
    }
}

/// Tries every `threshold`-sized subset of `partials` that contains `newest`
/// and returns the first recovered signature verifying under `group_pk`.
/// Subsets without `newest` were already tried when their last member came in.
fn recover_with(
    partials: &BTreeMap<Id, Signature>,
    newest: &Id,
    threshold: usize,
    message: &[u8],
    group_pk: &PublicKey,
) -> DKGResult<Option<Signature>> {
    let newest_sign = match partials.get(newest) {
        Some(sign) => *sign,
        None => return Ok(None),
    };

    let others: Vec<(Id, Signature)> = partials
        .iter()
        .filter(|(id, _)| *id != newest)
        .map(|(id, sign)| (*id, *sign))
        .collect();

    let k = threshold.saturating_sub(1);

    if others.len() < k {
        return Ok(None);
    }

    let mut picks: Vec<usize> = (0..k).collect();

    loop {
        let subset: BTreeMap<Id, Signature> = picks
            .iter()
            .map(|i| others[*i])
            .chain(std::iter::once((*newest, newest_sign)))
            .collect();

        let recovered = recover_group_signature(&subset, threshold)?;

        if group_pk.verify(message, &recovered) {
            return Ok(Some(recovered));
        }

        // next combination in lexicographic order
        let n = others.len();

        let pivot = match (0..k).rev().find(|i| picks[*i] < n - k + *i) {
            Some(pivot) => pivot,
            None => return Ok(None),
        };

        picks[pivot] += 1;

        for j in pivot + 1..k {
            picks[j] = picks[j - 1] + 1;
        }
    }
}
