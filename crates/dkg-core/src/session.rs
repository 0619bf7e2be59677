use crate::primitives::{DKGError, DKGResult, GroupInitInfo, SharePiece};
use std::collections::BTreeMap;
use threshold_bls::hash::DataHasher;
use threshold_bls::poly::Poly;
use threshold_bls::{Hash, Id, PublicKey, SecretKey};

/// Member-side progress through one group's key exchange. Only moves forward,
/// one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionStatus {
    Init,
    SendShare,
    SendSignPubKey,
    SendInited,
    Done,
}

impl SessionStatus {
    fn next(self) -> Option<SessionStatus> {
        match self {
            SessionStatus::Init => Some(SessionStatus::SendShare),
            SessionStatus::SendShare => Some(SessionStatus::SendSignPubKey),
            SessionStatus::SendSignPubKey => Some(SessionStatus::SendInited),
            SessionStatus::SendInited => Some(SessionStatus::Done),
            SessionStatus::Done => None,
        }
    }
}

/// The result of aggregating all received pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedKeys {
    pub sign_secret: SecretKey,
    pub sign_public: PublicKey,
    pub group_pk: PublicKey,
}

pub struct DkgSession {
    init_info: GroupInitInfo,
    my_id: Id,
    threshold: usize,
    status: SessionStatus,
    seed: SecretKey,
    poly: Poly,
    pieces: BTreeMap<Id, SharePiece>,
    /// Height each missing piece was last asked for, by sender.
    requested: BTreeMap<Id, u64>,
    keys: Option<AggregatedKeys>,
    member_sign_pks: BTreeMap<Id, PublicKey>,
}

static_assertions::assert_impl_all!(DkgSession: Send, Sync);

impl DkgSession {
    /// The polynomial seed is derived from the master secret and the group
    /// hash, so a restarted member deals the same shares again.
    pub fn new(
        init_info: GroupInitInfo,
        my_id: Id,
        master_secret: &SecretKey,
        threshold: usize,
    ) -> DKGResult<Self> {
        if !init_info.is_member(&my_id) {
            return Err(DKGError::NotMember(my_id));
        }

        let seed_hash = DataHasher::with_domain(b"dkg-seed")
            .update_fixed(&master_secret.to_bytes())
            .update_fixed(init_info.group_hash().as_bytes())
            .finalize();

        let seed = SecretKey::from_seed(seed_hash.as_bytes());

        let poly = Poly::from_secret_seed(&seed, threshold)?;

        Ok(DkgSession {
            init_info,
            my_id,
            threshold,
            status: SessionStatus::Init,
            seed,
            poly,
            pieces: BTreeMap::new(),
            requested: BTreeMap::new(),
            keys: None,
            member_sign_pks: BTreeMap::new(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn init_info(&self) -> &GroupInitInfo {
        &self.init_info
    }

    pub fn group_hash(&self) -> Hash {
        self.init_info.group_hash()
    }

    pub fn my_id(&self) -> Id {
        self.my_id
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keys(&self) -> Option<&AggregatedKeys> {
        self.keys.as_ref()
    }

    pub fn advance(&mut self, to: SessionStatus) -> DKGResult<()> {
        if self.status.next() != Some(to) {
            return Err(DKGError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;

        Ok(())
    }

    /// Deterministic piece for `receiver`; safe to call again when a member
    /// asks for a re-send.
    pub fn share_piece_for(&self, receiver: &Id) -> DKGResult<SharePiece> {
        if !self.init_info.is_member(receiver) {
            return Err(DKGError::NotMember(*receiver));
        }

        Ok(SharePiece {
            share: self.poly.eval(receiver),
            seed_public_key: self.seed.public_key(),
        })
    }

    /// Produces one piece per member (own included, kept locally) and moves to
    /// `SendShare`. Returns the pieces to send to the other members.
    pub fn gen_share_pieces(&mut self) -> DKGResult<Vec<(Id, SharePiece)>> {
        self.advance(SessionStatus::SendShare)?;

        let own = self.share_piece_for(&self.my_id)?;

        self.pieces.insert(self.my_id, own);

        let my_id = self.my_id;

        self.init_info
            .members
            .iter()
            .filter(|id| **id != my_id)
            .map(|id| Ok((*id, self.share_piece_for(id)?)))
            .collect()
    }

    /// Returns `true` once a piece from every member is held. Duplicates are
    /// ignored.
    pub fn handle_share_piece(&mut self, sender: Id, piece: SharePiece) -> DKGResult<bool> {
        if !self.init_info.is_member(&sender) {
            return Err(DKGError::NotMember(sender));
        }

        if !piece.is_valid() {
            return Err(DKGError::InvalidSharePiece(sender));
        }

        self.pieces.entry(sender).or_insert(piece);

        Ok(self.has_all_pieces())
    }

    pub fn has_all_pieces(&self) -> bool {
        self.pieces.len() == self.init_info.member_size()
    }

    pub fn missing_pieces(&self) -> Vec<Id> {
        self.init_info
            .members
            .iter()
            .filter(|id| !self.pieces.contains_key(id))
            .copied()
            .collect()
    }

    /// Members whose piece is still missing and who were not asked within
    /// the last `expiry` heights. Records them as asked at `height`.
    pub fn take_share_requests(&mut self, height: u64, expiry: u64) -> Vec<Id> {
        let requested = &self.requested;

        let due: Vec<Id> = self
            .missing_pieces()
            .into_iter()
            .filter(|id| match requested.get(id) {
                Some(asked) => height >= asked.saturating_add(expiry),
                None => true,
            })
            .collect();

        for id in due.iter() {
            self.requested.insert(*id, height);
        }

        due
    }

    /// Sums the received shares into this member's signing key and the seed
    /// public keys into the group key. Moves to `SendSignPubKey`.
    pub fn aggregate(&mut self) -> DKGResult<AggregatedKeys> {
        if !self.has_all_pieces() {
            return Err(DKGError::MissingPieces(
                self.init_info.member_size() - self.pieces.len(),
            ));
        }

        self.advance(SessionStatus::SendSignPubKey)?;

        let sign_secret = SecretKey::aggregate(self.pieces.values().map(|p| &p.share))?;

        let group_pk = PublicKey::aggregate(self.pieces.values().map(|p| &p.seed_public_key))?;

        let keys = AggregatedKeys {
            sign_public: sign_secret.public_key(),
            sign_secret,
            group_pk,
        };

        self.member_sign_pks.insert(self.my_id, keys.sign_public);

        self.keys = Some(keys.clone());

        Ok(keys)
    }

    pub fn add_member_sign_pk(&mut self, member: Id, sign_pk: PublicKey) -> DKGResult<()> {
        if !self.init_info.is_member(&member) {
            return Err(DKGError::NotMember(member));
        }

        self.member_sign_pks.entry(member).or_insert(sign_pk);

        Ok(())
    }

    pub fn member_sign_pks(&self) -> &BTreeMap<Id, PublicKey> {
        &self.member_sign_pks
    }

    pub fn is_done(&self) -> bool {
        self.status == SessionStatus::Done
    }

    pub fn is_timeout(&self, height: u64) -> bool {
        !self.is_done() && self.init_info.ready_timeout(height)
    }
}
