//! Protobuf encoding of [`ConsensusMessage`]. Every message travels inside one
//! `Envelope` whose `oneof` names the protocol step.

use super::errors::{NodeError, NodeResult};
use super::messages::{CastBody, ConsensusMessage, VerifiedBody};
use crate::chain::types::{Block, BlockHeader, Transaction};
use dkg_core::messages::{
    CreateGroupRaw, CreateGroupSign, GroupInit, GroupInited, Ping, Pong, SharePieceMessage,
    ShareRequest, SignPubKey, SignPubKeyRequest,
};
use dkg_core::primitives::{GroupHeader, GroupInitInfo, SharePiece, SignData};
use dkg_core::{DkgMessage, SignedMessage};
use prost::Message;
use std::convert::TryFrom;
use threshold_bls::{Hash, Id, PublicKey, SecretKey, Signature};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignDataProto {
    #[prost(bytes = "vec", tag = "1")]
    pub data_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub signer: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub version: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupHeaderProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub parent_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub pre_group_id: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub create_height: u64,
    #[prost(uint64, tag = "5")]
    pub ready_height: u64,
    #[prost(uint64, tag = "6")]
    pub work_height: u64,
    #[prost(uint64, tag = "7")]
    pub dismiss_height: u64,
    #[prost(bytes = "vec", tag = "8")]
    pub member_root: Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub extra: Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupInitInfoProto {
    #[prost(message, optional, tag = "1")]
    pub header: Option<GroupHeaderProto>,
    #[prost(bytes = "vec", tag = "2")]
    pub parent_sign: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub members: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PingProto {
    #[prost(bytes = "vec", tag = "1")]
    pub base_hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub create_height: u64,
    #[prost(message, optional, tag = "3")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateGroupRawProto {
    #[prost(bytes = "vec", tag = "1")]
    pub base_hash: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub header: Option<GroupHeaderProto>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub members: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "4")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateGroupSignProto {
    #[prost(bytes = "vec", tag = "1")]
    pub group_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub partial: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupInitProto {
    #[prost(message, optional, tag = "1")]
    pub init_info: Option<GroupInitInfoProto>,
    #[prost(message, optional, tag = "2")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharePieceProto {
    #[prost(bytes = "vec", tag = "1")]
    pub group_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub receiver: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub share: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub seed_public_key: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShareRequestProto {
    #[prost(bytes = "vec", tag = "1")]
    pub group_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub receiver: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignPubKeyProto {
    #[prost(bytes = "vec", tag = "1")]
    pub group_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub group_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub sign_pk: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub pop: Vec<u8>,
    #[prost(message, optional, tag = "5")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignPubKeyRequestProto {
    #[prost(bytes = "vec", tag = "1")]
    pub group_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupInitedProto {
    #[prost(message, optional, tag = "1")]
    pub init_info: Option<GroupInitInfoProto>,
    #[prost(bytes = "vec", tag = "2")]
    pub group_pk: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub member_sign: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockHeaderProto {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub pre_hash: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "5")]
    pub castor: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub group_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub prove_value: Vec<u8>,
    #[prost(uint64, tag = "8")]
    pub total_qn: u64,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub tx_hashes: Vec<Vec<u8>>,
    #[prost(bytes = "vec", tag = "10")]
    pub tx_root: Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub signature: Vec<u8>,
    #[prost(bytes = "vec", tag = "12")]
    pub random: Vec<u8>,
    #[prost(bytes = "vec", tag = "13")]
    pub extra: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionProto {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub source: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub nonce: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockProto {
    #[prost(message, optional, tag = "1")]
    pub header: Option<BlockHeaderProto>,
    #[prost(message, repeated, tag = "2")]
    pub transactions: Vec<TransactionProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CastProto {
    #[prost(message, optional, tag = "1")]
    pub header: Option<BlockHeaderProto>,
    #[prost(message, optional, tag = "2")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerifiedProto {
    #[prost(bytes = "vec", tag = "1")]
    pub block_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub group_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub pre_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub block_sign: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub random_sign: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub sign: Option<SignDataProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionsProto {
    #[prost(message, repeated, tag = "1")]
    pub transactions: Vec<TransactionProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    #[prost(
        oneof = "envelope::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14"
    )]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Ping(super::PingProto),
        #[prost(message, tag = "2")]
        Pong(super::PingProto),
        #[prost(message, tag = "3")]
        CreateGroupRaw(super::CreateGroupRawProto),
        #[prost(message, tag = "4")]
        CreateGroupSign(super::CreateGroupSignProto),
        #[prost(message, tag = "5")]
        GroupInit(super::GroupInitProto),
        #[prost(message, tag = "6")]
        SharePiece(super::SharePieceProto),
        #[prost(message, tag = "7")]
        ShareRequest(super::ShareRequestProto),
        #[prost(message, tag = "8")]
        SignPubKey(super::SignPubKeyProto),
        #[prost(message, tag = "9")]
        SignPubKeyRequest(super::SignPubKeyRequestProto),
        #[prost(message, tag = "10")]
        GroupInited(super::GroupInitedProto),
        #[prost(message, tag = "11")]
        Cast(super::CastProto),
        #[prost(message, tag = "12")]
        Verified(super::VerifiedProto),
        #[prost(message, tag = "13")]
        NewBlock(super::BlockProto),
        #[prost(message, tag = "14")]
        Transactions(super::TransactionsProto),
    }
}

pub fn encode(msg: &ConsensusMessage) -> Vec<u8> {
    Envelope::from(msg).encode_to_vec()
}

pub fn decode(bytes: &[u8]) -> NodeResult<ConsensusMessage> {
    ConsensusMessage::try_from(Envelope::decode(bytes)?)
}

fn required<T>(value: Option<T>, field: &'static str) -> NodeResult<T> {
    value.ok_or(NodeError::WireMissingField(field))
}

fn hash(bytes: &[u8]) -> NodeResult<Hash> {
    Ok(Hash::from_slice(bytes)?)
}

fn id(bytes: &[u8]) -> NodeResult<Id> {
    Ok(Id::from_bytes(bytes)?)
}

fn optional_id(bytes: &[u8]) -> NodeResult<Option<Id>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    id(bytes).map(Some)
}

fn ids(list: &[Vec<u8>]) -> NodeResult<Vec<Id>> {
    list.iter().map(|b| id(b)).collect()
}

fn public_key(bytes: &[u8]) -> NodeResult<PublicKey> {
    Ok(PublicKey::from_bytes(bytes)?)
}

fn signature(bytes: &[u8]) -> NodeResult<Signature> {
    Ok(Signature::from_bytes(bytes)?)
}

impl From<&SignData> for SignDataProto {
    fn from(s: &SignData) -> Self {
        SignDataProto {
            data_hash: s.data_hash.as_bytes().to_vec(),
            signature: s.signature.to_bytes().to_vec(),
            signer: s.signer.as_bytes().to_vec(),
            version: s.version,
        }
    }
}

fn sign_data(proto: Option<SignDataProto>) -> NodeResult<SignData> {
    let proto = required(proto, "sign")?;

    Ok(SignData {
        data_hash: hash(&proto.data_hash)?,
        signature: signature(&proto.signature)?,
        signer: id(&proto.signer)?,
        version: proto.version,
    })
}

impl From<&GroupHeader> for GroupHeaderProto {
    fn from(h: &GroupHeader) -> Self {
        let optional = |id: &Option<Id>| id.map(|i| i.as_bytes().to_vec()).unwrap_or_default();

        GroupHeaderProto {
            name: h.name.clone(),
            parent_id: optional(&h.parent_id),
            pre_group_id: optional(&h.pre_group_id),
            create_height: h.create_height,
            ready_height: h.ready_height,
            work_height: h.work_height,
            dismiss_height: h.dismiss_height,
            member_root: h.member_root.as_bytes().to_vec(),
            extra: h.extra.clone(),
            hash: h.hash.as_bytes().to_vec(),
        }
    }
}

impl TryFrom<GroupHeaderProto> for GroupHeader {
    type Error = NodeError;

    fn try_from(p: GroupHeaderProto) -> NodeResult<Self> {
        Ok(GroupHeader {
            name: p.name,
            parent_id: optional_id(&p.parent_id)?,
            pre_group_id: optional_id(&p.pre_group_id)?,
            create_height: p.create_height,
            ready_height: p.ready_height,
            work_height: p.work_height,
            dismiss_height: p.dismiss_height,
            member_root: hash(&p.member_root)?,
            extra: p.extra,
            hash: hash(&p.hash)?,
        })
    }
}

impl From<&GroupInitInfo> for GroupInitInfoProto {
    fn from(info: &GroupInitInfo) -> Self {
        GroupInitInfoProto {
            header: Some((&info.header).into()),
            parent_sign: info.parent_sign.to_bytes().to_vec(),
            members: info.members.iter().map(|m| m.as_bytes().to_vec()).collect(),
        }
    }
}

fn group_init_info(proto: Option<GroupInitInfoProto>) -> NodeResult<GroupInitInfo> {
    let proto = required(proto, "init_info")?;

    Ok(GroupInitInfo {
        header: GroupHeader::try_from(required(proto.header, "header")?)?,
        parent_sign: signature(&proto.parent_sign)?,
        members: ids(&proto.members)?,
    })
}

impl From<&BlockHeader> for BlockHeaderProto {
    fn from(h: &BlockHeader) -> Self {
        BlockHeaderProto {
            hash: h.hash.as_bytes().to_vec(),
            height: h.height,
            pre_hash: h.pre_hash.as_bytes().to_vec(),
            timestamp: h.timestamp,
            castor: h.castor.as_bytes().to_vec(),
            group_id: h.group_id.as_bytes().to_vec(),
            prove_value: h.prove_value.clone(),
            total_qn: h.total_qn,
            tx_hashes: h.tx_hashes.iter().map(|t| t.as_bytes().to_vec()).collect(),
            tx_root: h.tx_root.as_bytes().to_vec(),
            signature: h
                .signature
                .map(|s| s.to_bytes().to_vec())
                .unwrap_or_default(),
            random: h.random.clone(),
            extra: h.extra.clone(),
        }
    }
}

fn block_header(proto: Option<BlockHeaderProto>) -> NodeResult<BlockHeader> {
    let p = required(proto, "header")?;

    let signature = if p.signature.is_empty() {
        None
    } else {
        Some(signature(&p.signature)?)
    };

    Ok(BlockHeader {
        hash: hash(&p.hash)?,
        height: p.height,
        pre_hash: hash(&p.pre_hash)?,
        timestamp: p.timestamp,
        castor: id(&p.castor)?,
        group_id: id(&p.group_id)?,
        prove_value: p.prove_value,
        total_qn: p.total_qn,
        tx_hashes: p
            .tx_hashes
            .iter()
            .map(|t| hash(t))
            .collect::<NodeResult<_>>()?,
        tx_root: hash(&p.tx_root)?,
        signature,
        random: p.random,
        extra: p.extra,
    })
}

impl From<&Transaction> for TransactionProto {
    fn from(tx: &Transaction) -> Self {
        TransactionProto {
            hash: tx.hash.as_bytes().to_vec(),
            source: tx.source.as_bytes().to_vec(),
            nonce: tx.nonce,
            payload: tx.payload.clone(),
        }
    }
}

impl TryFrom<TransactionProto> for Transaction {
    type Error = NodeError;

    fn try_from(p: TransactionProto) -> NodeResult<Self> {
        Ok(Transaction {
            hash: hash(&p.hash)?,
            source: id(&p.source)?,
            nonce: p.nonce,
            payload: p.payload,
        })
    }
}

fn transactions(list: Vec<TransactionProto>) -> NodeResult<Vec<Transaction>> {
    list.into_iter().map(Transaction::try_from).collect()
}

fn ping_proto(base_hash: &Hash, create_height: u64, sign: &SignData) -> PingProto {
    PingProto {
        base_hash: base_hash.as_bytes().to_vec(),
        create_height,
        sign: Some(sign.into()),
    }
}

fn dkg_payload(msg: &DkgMessage) -> envelope::Payload {
    use envelope::Payload;

    match msg {
        DkgMessage::Ping(m) => Payload::Ping(ping_proto(
            &m.body.base_hash,
            m.body.create_height,
            &m.sign,
        )),
        DkgMessage::Pong(m) => Payload::Pong(ping_proto(
            &m.body.base_hash,
            m.body.create_height,
            &m.sign,
        )),
        DkgMessage::CreateGroupRaw(m) => Payload::CreateGroupRaw(CreateGroupRawProto {
            base_hash: m.body.base_hash.as_bytes().to_vec(),
            header: Some((&m.body.header).into()),
            members: m.body.members.iter().map(|i| i.as_bytes().to_vec()).collect(),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::CreateGroupSign(m) => Payload::CreateGroupSign(CreateGroupSignProto {
            group_hash: m.body.group_hash.as_bytes().to_vec(),
            partial: m.body.partial.to_bytes().to_vec(),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::GroupInit(m) => Payload::GroupInit(GroupInitProto {
            init_info: Some((&m.body.init_info).into()),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::SharePiece(m) => Payload::SharePiece(SharePieceProto {
            group_hash: m.body.group_hash.as_bytes().to_vec(),
            receiver: m.body.receiver.as_bytes().to_vec(),
            share: m.body.piece.share.to_bytes().to_vec(),
            seed_public_key: m.body.piece.seed_public_key.to_bytes().to_vec(),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::ShareRequest(m) => Payload::ShareRequest(ShareRequestProto {
            group_hash: m.body.group_hash.as_bytes().to_vec(),
            receiver: m.body.receiver.as_bytes().to_vec(),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::SignPubKey(m) => Payload::SignPubKey(SignPubKeyProto {
            group_hash: m.body.group_hash.as_bytes().to_vec(),
            group_id: m.body.group_id.as_bytes().to_vec(),
            sign_pk: m.body.sign_pk.to_bytes().to_vec(),
            pop: m.body.pop.to_bytes().to_vec(),
            sign: Some((&m.sign).into()),
        }),
        DkgMessage::SignPubKeyRequest(m) => {
            Payload::SignPubKeyRequest(SignPubKeyRequestProto {
                group_id: m.body.group_id.as_bytes().to_vec(),
                sign: Some((&m.sign).into()),
            })
        }
        DkgMessage::GroupInited(m) => Payload::GroupInited(GroupInitedProto {
            init_info: Some((&m.body.init_info).into()),
            group_pk: m.body.group_pk.to_bytes().to_vec(),
            member_sign: m.body.member_sign.to_bytes().to_vec(),
            sign: Some((&m.sign).into()),
        }),
    }
}

impl From<&ConsensusMessage> for Envelope {
    fn from(msg: &ConsensusMessage) -> Self {
        use envelope::Payload;

        let payload = match msg {
            ConsensusMessage::Dkg(m) => dkg_payload(m),
            ConsensusMessage::Cast(m) => Payload::Cast(CastProto {
                header: Some((&m.body.header).into()),
                sign: Some((&m.sign).into()),
            }),
            ConsensusMessage::Verified(m) => Payload::Verified(VerifiedProto {
                block_hash: m.body.block_hash.as_bytes().to_vec(),
                group_id: m.body.group_id.as_bytes().to_vec(),
                height: m.body.height,
                pre_hash: m.body.pre_hash.as_bytes().to_vec(),
                block_sign: m.body.block_sign.to_bytes().to_vec(),
                random_sign: m.body.random_sign.to_bytes().to_vec(),
                sign: Some((&m.sign).into()),
            }),
            ConsensusMessage::NewBlock(b) => Payload::NewBlock(BlockProto {
                header: Some((&b.header).into()),
                transactions: b.transactions.iter().map(Into::into).collect(),
            }),
            ConsensusMessage::Transactions(txs) => Payload::Transactions(TransactionsProto {
                transactions: txs.iter().map(Into::into).collect(),
            }),
        };

        Envelope {
            payload: Some(payload),
        }
    }
}

impl TryFrom<Envelope> for ConsensusMessage {
    type Error = NodeError;

    fn try_from(msg: Envelope) -> NodeResult<Self> {
        use envelope::Payload;

        let dkg = |m: DkgMessage| -> NodeResult<ConsensusMessage> { Ok(ConsensusMessage::Dkg(m)) };

        match required(msg.payload, "payload")? {
            Payload::Ping(p) => dkg(DkgMessage::Ping(SignedMessage {
                body: Ping {
                    base_hash: hash(&p.base_hash)?,
                    create_height: p.create_height,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::Pong(p) => dkg(DkgMessage::Pong(SignedMessage {
                body: Pong {
                    base_hash: hash(&p.base_hash)?,
                    create_height: p.create_height,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::CreateGroupRaw(p) => dkg(DkgMessage::CreateGroupRaw(SignedMessage {
                body: CreateGroupRaw {
                    base_hash: hash(&p.base_hash)?,
                    header: GroupHeader::try_from(required(p.header, "header")?)?,
                    members: ids(&p.members)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::CreateGroupSign(p) => dkg(DkgMessage::CreateGroupSign(SignedMessage {
                body: CreateGroupSign {
                    group_hash: hash(&p.group_hash)?,
                    partial: signature(&p.partial)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::GroupInit(p) => dkg(DkgMessage::GroupInit(SignedMessage {
                body: GroupInit {
                    init_info: group_init_info(p.init_info)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::SharePiece(p) => dkg(DkgMessage::SharePiece(SignedMessage {
                body: SharePieceMessage {
                    group_hash: hash(&p.group_hash)?,
                    receiver: id(&p.receiver)?,
                    piece: SharePiece {
                        share: SecretKey::from_bytes(&p.share)?,
                        seed_public_key: public_key(&p.seed_public_key)?,
                    },
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::ShareRequest(p) => dkg(DkgMessage::ShareRequest(SignedMessage {
                body: ShareRequest {
                    group_hash: hash(&p.group_hash)?,
                    receiver: id(&p.receiver)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::SignPubKey(p) => dkg(DkgMessage::SignPubKey(SignedMessage {
                body: SignPubKey {
                    group_hash: hash(&p.group_hash)?,
                    group_id: id(&p.group_id)?,
                    sign_pk: public_key(&p.sign_pk)?,
                    pop: signature(&p.pop)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::SignPubKeyRequest(p) => dkg(DkgMessage::SignPubKeyRequest(SignedMessage {
                body: SignPubKeyRequest {
                    group_id: id(&p.group_id)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::GroupInited(p) => dkg(DkgMessage::GroupInited(SignedMessage {
                body: GroupInited {
                    init_info: group_init_info(p.init_info)?,
                    group_pk: public_key(&p.group_pk)?,
                    member_sign: signature(&p.member_sign)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::Cast(p) => Ok(ConsensusMessage::Cast(SignedMessage {
                body: CastBody {
                    header: block_header(p.header)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::Verified(p) => Ok(ConsensusMessage::Verified(SignedMessage {
                body: VerifiedBody {
                    block_hash: hash(&p.block_hash)?,
                    group_id: id(&p.group_id)?,
                    height: p.height,
                    pre_hash: hash(&p.pre_hash)?,
                    block_sign: signature(&p.block_sign)?,
                    random_sign: signature(&p.random_sign)?,
                },
                sign: sign_data(p.sign)?,
            })),
            Payload::NewBlock(p) => Ok(ConsensusMessage::NewBlock(Block {
                header: block_header(p.header)?,
                transactions: transactions(p.transactions)?,
            })),
            Payload::Transactions(p) => Ok(ConsensusMessage::Transactions(transactions(
                p.transactions,
            )?)),
        }
    }
}
