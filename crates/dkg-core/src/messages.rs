use crate::primitives::{GroupHeader, GroupInitInfo, SharePiece, SignData};
use serde::{Deserialize, Serialize};
use threshold_bls::hash::DataHasher;
use threshold_bls::{Hash, Id, PublicKey, SecretKey, Signature};

/// The content of a protocol message, hashed into its [`SignData`].
pub trait MessageBody {
    fn gen_hash(&self) -> Hash;
}

/// A message body plus the sender's signature over the body hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage<T> {
    pub body: T,
    pub sign: SignData,
}

impl<T: MessageBody> SignedMessage<T> {
    pub fn new(body: T, secret_key: &SecretKey, signer: Id) -> Self {
        let sign = SignData::new(secret_key, signer, body.gen_hash());

        SignedMessage { body, sign }
    }

    pub fn signer(&self) -> Id {
        self.sign.signer
    }

    /// The envelope was produced for this very body.
    pub fn is_bound(&self) -> bool {
        self.sign.data_hash == self.body.gen_hash()
    }

    pub fn verify(&self, public_key: &PublicKey) -> bool {
        self.is_bound() && self.sign.verify(public_key)
    }
}

fn init_info_hash(hasher: &mut DataHasher, info: &GroupInitInfo) {
    hasher
        .update_fixed(info.header.hash.as_bytes())
        .update_fixed(&info.parent_sign.to_bytes())
        .update_u64(info.members.len() as u64);

    for id in info.members.iter() {
        hasher.update_fixed(id.as_bytes());
    }
}

/// King to candidate: are you online for the group created at this height?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub base_hash: Hash,
    pub create_height: u64,
}

impl MessageBody for Ping {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"ping")
            .update_fixed(self.base_hash.as_bytes())
            .update_u64(self.create_height)
            .finalize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub base_hash: Hash,
    pub create_height: u64,
}

impl MessageBody for Pong {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"pong")
            .update_fixed(self.base_hash.as_bytes())
            .update_u64(self.create_height)
            .finalize()
    }
}

/// King to parent group: please co-sign this header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroupRaw {
    pub base_hash: Hash,
    pub header: GroupHeader,
    pub members: Vec<Id>,
}

impl MessageBody for CreateGroupRaw {
    fn gen_hash(&self) -> Hash {
        let mut hasher = DataHasher::with_domain(b"create-group-raw");

        hasher
            .update_fixed(self.base_hash.as_bytes())
            .update_fixed(self.header.hash.as_bytes());

        for id in self.members.iter() {
            hasher.update_fixed(id.as_bytes());
        }

        hasher.finalize()
    }
}

/// Parent member to king: partial signature over the header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroupSign {
    pub group_hash: Hash,
    pub partial: Signature,
}

impl MessageBody for CreateGroupSign {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"create-group-sign")
            .update_fixed(self.group_hash.as_bytes())
            .update_fixed(&self.partial.to_bytes())
            .finalize()
    }
}

/// King to the new members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInit {
    pub init_info: GroupInitInfo,
}

impl MessageBody for GroupInit {
    fn gen_hash(&self) -> Hash {
        let mut hasher = DataHasher::with_domain(b"group-init");

        init_info_hash(&mut hasher, &self.init_info);

        hasher.finalize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePieceMessage {
    pub group_hash: Hash,
    pub receiver: Id,
    pub piece: SharePiece,
}

impl MessageBody for SharePieceMessage {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"share-piece")
            .update_fixed(self.group_hash.as_bytes())
            .update_fixed(self.receiver.as_bytes())
            .update_fixed(&self.piece.share.to_bytes())
            .update_fixed(&self.piece.seed_public_key.to_bytes())
            .finalize()
    }
}

/// Asks `receiver` to send its piece again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub group_hash: Hash,
    pub receiver: Id,
}

impl MessageBody for ShareRequest {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"share-request")
            .update_fixed(self.group_hash.as_bytes())
            .update_fixed(self.receiver.as_bytes())
            .finalize()
    }
}

/// A member's signing public key, with a proof of possession over the group
/// hash made by the matching signing share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPubKey {
    pub group_hash: Hash,
    pub group_id: Id,
    pub sign_pk: PublicKey,
    pub pop: Signature,
}

impl SignPubKey {
    pub fn verify_pop(&self) -> bool {
        self.sign_pk.verify(self.group_hash.as_bytes(), &self.pop)
    }
}

impl MessageBody for SignPubKey {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"sign-pubkey")
            .update_fixed(self.group_hash.as_bytes())
            .update_fixed(self.group_id.as_bytes())
            .update_fixed(&self.sign_pk.to_bytes())
            .update_fixed(&self.pop.to_bytes())
            .finalize()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignPubKeyRequest {
    pub group_id: Id,
}

impl MessageBody for SignPubKeyRequest {
    fn gen_hash(&self) -> Hash {
        DataHasher::with_domain(b"sign-pubkey-request")
            .update_fixed(self.group_id.as_bytes())
            .finalize()
    }
}

/// Broadcast by a member once its keys are aggregated. `member_sign` is a
/// partial signature over the group hash made with the signing share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInited {
    pub init_info: GroupInitInfo,
    pub group_pk: PublicKey,
    pub member_sign: Signature,
}

impl MessageBody for GroupInited {
    fn gen_hash(&self) -> Hash {
        let mut hasher = DataHasher::with_domain(b"group-inited");

        init_info_hash(&mut hasher, &self.init_info);

        hasher
            .update_fixed(&self.group_pk.to_bytes())
            .update_fixed(&self.member_sign.to_bytes())
            .finalize()
    }
}

/// Every group-formation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DkgMessage {
    Ping(SignedMessage<Ping>),
    Pong(SignedMessage<Pong>),
    CreateGroupRaw(SignedMessage<CreateGroupRaw>),
    CreateGroupSign(SignedMessage<CreateGroupSign>),
    GroupInit(SignedMessage<GroupInit>),
    SharePiece(SignedMessage<SharePieceMessage>),
    ShareRequest(SignedMessage<ShareRequest>),
    SignPubKey(SignedMessage<SignPubKey>),
    SignPubKeyRequest(SignedMessage<SignPubKeyRequest>),
    GroupInited(SignedMessage<GroupInited>),
}

impl DkgMessage {
    pub fn signer(&self) -> Id {
        self.sign_data().signer
    }

    pub fn sign_data(&self) -> &SignData {
        match self {
            DkgMessage::Ping(m) => &m.sign,
            DkgMessage::Pong(m) => &m.sign,
            DkgMessage::CreateGroupRaw(m) => &m.sign,
            DkgMessage::CreateGroupSign(m) => &m.sign,
            DkgMessage::GroupInit(m) => &m.sign,
            DkgMessage::SharePiece(m) => &m.sign,
            DkgMessage::ShareRequest(m) => &m.sign,
            DkgMessage::SignPubKey(m) => &m.sign,
            DkgMessage::SignPubKeyRequest(m) => &m.sign,
            DkgMessage::GroupInited(m) => &m.sign,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DkgMessage::Ping(_) => "ping",
            DkgMessage::Pong(_) => "pong",
            DkgMessage::CreateGroupRaw(_) => "create_group_raw",
            DkgMessage::CreateGroupSign(_) => "create_group_sign",
            DkgMessage::GroupInit(_) => "group_init",
            DkgMessage::SharePiece(_) => "share_piece",
            DkgMessage::ShareRequest(_) => "share_request",
            DkgMessage::SignPubKey(_) => "sign_pubkey",
            DkgMessage::SignPubKeyRequest(_) => "sign_pubkey_request",
            DkgMessage::GroupInited(_) => "group_inited",
        }
    }

    /// Signature check against the sender's identity key, including the
    /// body-hash binding.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        match self {
            DkgMessage::Ping(m) => m.verify(public_key),
            DkgMessage::Pong(m) => m.verify(public_key),
            DkgMessage::CreateGroupRaw(m) => m.verify(public_key),
            DkgMessage::CreateGroupSign(m) => m.verify(public_key),
            DkgMessage::GroupInit(m) => m.verify(public_key),
            DkgMessage::SharePiece(m) => m.verify(public_key),
            DkgMessage::ShareRequest(m) => m.verify(public_key),
            DkgMessage::SignPubKey(m) => m.verify(public_key),
            DkgMessage::SignPubKeyRequest(m) => m.verify(public_key),
            DkgMessage::GroupInited(m) => m.verify(public_key),
        }
    }
}
