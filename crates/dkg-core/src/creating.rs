use crate::primitives::{
    DKGError, DKGResult, GroupHeader, GroupInfo, GroupInitInfo, GroupParams,
};
use bitvec::prelude::*;
use threshold_bls::{GroupSignGenerator, Hash, Id, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatingStatus {
    /// Pings sent, collecting pongs.
    Pinging,
    /// Header built, waiting for the parent group's co-signature.
    WaitingSign,
    /// Parent signature recovered, `GroupInit` can go out.
    Signed,
    Failed,
}

/// King-side state for creating one group at one create height.
pub struct CreatingGroupContext {
    base_hash: Hash,
    create_height: u64,
    parent: GroupInfo,
    pre_group_id: Option<Id>,
    candidates: Vec<Id>,
    pongs: BitVec,
    header: Option<GroupHeader>,
    members: Vec<Id>,
    parent_sign: GroupSignGenerator,
    status: CreatingStatus,
}

impl CreatingGroupContext {
    pub fn new(
        base_hash: Hash,
        create_height: u64,
        parent: GroupInfo,
        pre_group_id: Option<Id>,
        candidates: Vec<Id>,
    ) -> Self {
        let pongs = BitVec::repeat(false, candidates.len());

        let parent_sign = GroupSignGenerator::new(parent.threshold());

        CreatingGroupContext {
            base_hash,
            create_height,
            parent,
            pre_group_id,
            candidates,
            pongs,
            header: None,
            members: vec![],
            parent_sign,
            status: CreatingStatus::Pinging,
        }
    }

    pub fn base_hash(&self) -> Hash {
        self.base_hash
    }

    pub fn create_height(&self) -> u64 {
        self.create_height
    }

    pub fn parent(&self) -> &GroupInfo {
        &self.parent
    }

    pub fn candidates(&self) -> &[Id] {
        &self.candidates
    }

    pub fn status(&self) -> CreatingStatus {
        self.status
    }

    pub fn header(&self) -> Option<&GroupHeader> {
        self.header.as_ref()
    }

    pub fn members(&self) -> &[Id] {
        &self.members
    }

    pub fn pong_count(&self) -> usize {
        self.pongs.count_ones()
    }

    pub fn all_ponged(&self) -> bool {
        self.pongs.all()
    }

    /// Returns `true` when every candidate has answered.
    pub fn add_pong(&mut self, candidate: Id) -> DKGResult<bool> {
        if self.status != CreatingStatus::Pinging {
            return Err(DKGError::AlreadyFinished);
        }

        let index = self
            .candidates
            .iter()
            .position(|c| *c == candidate)
            .ok_or(DKGError::NotMember(candidate))?;

        self.pongs.set(index, true);

        Ok(self.all_ponged())
    }

    pub fn is_pong_timeout(&self, height: u64, params: &GroupParams) -> bool {
        height >= self.create_height + params.wait_pong_gap
    }

    /// Builds the header once all candidates answered, or once the pong
    /// window closed with at least `member_min` answers. Too few answers
    /// after the window fails the context for good.
    pub fn try_build_header(
        &mut self,
        height: u64,
        params: &GroupParams,
    ) -> DKGResult<Option<GroupHeader>> {
        if self.status != CreatingStatus::Pinging {
            return Ok(None);
        }

        let count = self.pong_count();

        if !self.all_ponged() {
            if !self.is_pong_timeout(height, params) {
                return Ok(None);
            }

            if count < params.member_min {
                self.status = CreatingStatus::Failed;

                return Err(DKGError::NotEnoughPongs {
                    min: params.member_min,
                    actual: count,
                });
            }
        }

        let members: Vec<Id> = self
            .candidates
            .iter()
            .zip(self.pongs.iter())
            .filter(|(_, ponged)| **ponged)
            .map(|(id, _)| *id)
            .collect();

        if members.len() < params.member_min || members.len() > params.member_max {
            self.status = CreatingStatus::Failed;

            return Err(DKGError::InvalidGroupSize(members.len()));
        }

        let header = build_header(
            self.create_height,
            Some(self.parent.group_id()),
            self.pre_group_id,
            &members,
            params,
        );

        self.header = Some(header.clone());
        self.members = members;
        self.status = CreatingStatus::WaitingSign;

        Ok(Some(header))
    }

    /// Feeds one parent member's partial signature over the header hash.
    /// Returns the `GroupInitInfo` on the call that completes and verifies
    /// the parent signature.
    pub fn add_parent_sign(
        &mut self,
        signer: Id,
        partial: Signature,
    ) -> DKGResult<Option<GroupInitInfo>> {
        if self.status != CreatingStatus::WaitingSign {
            return Ok(None);
        }

        if !self.parent.is_member(&signer) {
            return Err(DKGError::NotMember(signer));
        }

        if !self.parent_sign.add_witness(signer, partial)? {
            return Ok(None);
        }

        let (header, sign) = match (self.header.clone(), self.parent_sign.group_sign()) {
            (Some(header), Some(sign)) => (header, *sign),
            _ => return Ok(None),
        };

        if !self
            .parent
            .group_pk()
            .verify(header.hash.as_bytes(), &sign)
        {
            self.status = CreatingStatus::Failed;

            return Err(DKGError::RecoveredSignatureInvalid);
        }

        self.status = CreatingStatus::Signed;

        Ok(Some(GroupInitInfo {
            header,
            parent_sign: sign,
            members: self.members.clone(),
        }))
    }
}

/// The header every honest party derives from the same inputs.
pub fn build_header(
    create_height: u64,
    parent_id: Option<Id>,
    pre_group_id: Option<Id>,
    members: &[Id],
    params: &GroupParams,
) -> GroupHeader {
    let ready_height = create_height + params.ready_gap;
    let work_height = ready_height + params.work_gap;
    let dismiss_height = work_height + params.group_life;

    GroupHeader::new(
        format!("group-{}", create_height),
        parent_id,
        pre_group_id,
        create_height,
        ready_height,
        work_height,
        dismiss_height,
        members,
    )
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::primitives::GroupInitInfo;
    use crate::session::tests::{init_info, members};
    use threshold_bls::poly::Poly;
    use threshold_bls::SecretKey;

    fn parent_group() -> (GroupInfo, Poly) {
        let ms = members(4);
        let info: GroupInitInfo = init_info(&ms);

        let poly = Poly::from_secret_seed(&SecretKey::from_seed(b"parent-group"), 3).unwrap();

        (GroupInfo::new(poly.public_key(), info, 3), poly)
    }

    fn candidates(n: usize) -> Vec<Id> {
        (0..n)
            .map(|i| Id::from_address(format!("candidate-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_all_pongs_build_the_header() {
        let (parent, _) = parent_group();

        let params = GroupParams::default();

        let mut ctx = CreatingGroupContext::new(Hash::digest(b"b"), 10, parent, None, candidates(4));

        for (i, c) in candidates(4).into_iter().enumerate() {
            assert_eq!(ctx.add_pong(c).unwrap(), i == 3);
        }

        let header = ctx.try_build_header(10, &params).unwrap().unwrap();

        assert_eq!(header.ready_height, 15);
        assert_eq!(header.work_height, 20);
        assert_eq!(header.dismiss_height, 120);
        assert_eq!(ctx.status(), CreatingStatus::WaitingSign);
    }

    #[test]
    fn test_partial_pongs_wait_for_window() {
        let (parent, _) = parent_group();

        let params = GroupParams::default();

        let mut ctx = CreatingGroupContext::new(Hash::digest(b"b"), 10, parent, None, candidates(6));

        for c in candidates(4) {
            ctx.add_pong(c).unwrap();
        }

        assert_eq!(ctx.try_build_header(11, &params).unwrap(), None);

        let header = ctx.try_build_header(12, &params).unwrap().unwrap();

        assert_eq!(ctx.members().len(), 4);
        assert_eq!(header.member_root, crate::primitives::member_root(&candidates(4)));
    }

    #[test]
    fn test_too_few_pongs_is_terminal() {
        let (parent, _) = parent_group();

        let params = GroupParams::default();

        let mut ctx = CreatingGroupContext::new(Hash::digest(b"b"), 10, parent, None, candidates(6));

        ctx.add_pong(candidates(1)[0]).unwrap();

        assert_eq!(
            ctx.try_build_header(12, &params),
            Err(DKGError::NotEnoughPongs { min: 4, actual: 1 })
        );
        assert_eq!(ctx.status(), CreatingStatus::Failed);
        assert!(ctx.add_pong(candidates(2)[1]).is_err());
    }

    #[test]
    fn test_parent_co_signature() {
        let (parent, poly) = parent_group();

        let params = GroupParams::default();

        let mut ctx =
            CreatingGroupContext::new(Hash::digest(b"b"), 10, parent.clone(), None, candidates(4));

        for c in candidates(4) {
            ctx.add_pong(c).unwrap();
        }

        let header = ctx.try_build_header(10, &params).unwrap().unwrap();

        let mut result = None;

        for id in parent.members().iter() {
            let partial = poly.eval(id).sign(header.hash.as_bytes());

            if let Some(info) = ctx.add_parent_sign(*id, partial).unwrap() {
                result = Some(info);
            }
        }

        let info = result.unwrap();

        assert_eq!(info.validate(parent.group_pk()), Ok(()));
        assert_eq!(ctx.status(), CreatingStatus::Signed);
    }
}
