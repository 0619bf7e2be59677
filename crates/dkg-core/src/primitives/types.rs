use super::{DKGError, DKGResult};
use serde::{Deserialize, Serialize};
use threshold_bls::hash::DataHasher;
use threshold_bls::{Hash, Id, PublicKey, SecretKey, Signature};

/// Signature envelope carried by every protocol message. `data_hash` must be
/// the hash of the message it travels with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignData {
    pub data_hash: Hash,
    pub signature: Signature,
    pub signer: Id,
    pub version: u32,
}

impl SignData {
    pub const VERSION: u32 = 1;

    pub fn new(secret_key: &SecretKey, signer: Id, data_hash: Hash) -> Self {
        SignData {
            data_hash,
            signature: secret_key.sign(data_hash.as_bytes()),
            signer,
            version: SignData::VERSION,
        }
    }

    pub fn verify(&self, public_key: &PublicKey) -> bool {
        public_key.verify(self.data_hash.as_bytes(), &self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHeader {
    pub name: String,
    pub parent_id: Option<Id>,
    pub pre_group_id: Option<Id>,
    pub create_height: u64,
    pub ready_height: u64,
    pub work_height: u64,
    pub dismiss_height: u64,
    pub member_root: Hash,
    pub extra: Vec<u8>,
    pub hash: Hash,
}

impl GroupHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        parent_id: Option<Id>,
        pre_group_id: Option<Id>,
        create_height: u64,
        ready_height: u64,
        work_height: u64,
        dismiss_height: u64,
        members: &[Id],
    ) -> Self {
        let mut header = GroupHeader {
            name,
            parent_id,
            pre_group_id,
            create_height,
            ready_height,
            work_height,
            dismiss_height,
            member_root: member_root(members),
            extra: vec![],
            hash: Hash::default(),
        };

        header.hash = header.gen_hash();

        header
    }

    pub fn gen_hash(&self) -> Hash {
        let mut hasher = DataHasher::with_domain(b"group-header");

        hasher.update_str(&self.name);

        for id in [self.parent_id, self.pre_group_id].iter() {
            match id {
                Some(id) => hasher.update_u32(1).update_fixed(id.as_bytes()),
                None => hasher.update_u32(0),
            };
        }

        hasher
            .update_u64(self.create_height)
            .update_u64(self.ready_height)
            .update_u64(self.work_height)
            .update_u64(self.dismiss_height)
            .update_fixed(self.member_root.as_bytes())
            .update_bytes(&self.extra)
            .finalize()
    }

    pub fn is_hash_valid(&self) -> bool {
        self.hash == self.gen_hash()
    }
}

/// Everything a member needs to start the key exchange. Immutable once the
/// header hash is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInitInfo {
    pub header: GroupHeader,
    /// The parent group's threshold signature over the header hash.
    pub parent_sign: Signature,
    pub members: Vec<Id>,
}

impl GroupInitInfo {
    pub fn group_hash(&self) -> Hash {
        self.header.hash
    }

    pub fn member_size(&self) -> usize {
        self.members.len()
    }

    pub fn member_index(&self, id: &Id) -> Option<usize> {
        self.members.iter().position(|m| m == id)
    }

    pub fn is_member(&self, id: &Id) -> bool {
        self.member_index(id).is_some()
    }

    /// Header hash, member root and parent signature all check out.
    pub fn validate(&self, parent_pk: &PublicKey) -> DKGResult<()> {
        if !self.header.is_hash_valid() {
            return Err(DKGError::HeaderHashMismatch);
        }

        if member_root(&self.members) != self.header.member_root {
            return Err(DKGError::MemberRootMismatch);
        }

        if !parent_pk.verify(self.group_hash().as_bytes(), &self.parent_sign) {
            return Err(DKGError::RecoveredSignatureInvalid);
        }

        Ok(())
    }

    pub fn ready_timeout(&self, height: u64) -> bool {
        height >= self.header.ready_height
    }
}

/// What member `i` sends member `j`: `f_i(j)` and the public key of `f_i(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePiece {
    pub share: SecretKey,
    pub seed_public_key: PublicKey,
}

impl SharePiece {
    pub fn is_valid(&self) -> bool {
        self.share.is_valid() && self.seed_public_key.is_valid()
    }
}

/// Binary Merkle root over the member ids. An odd node is paired with itself.
pub fn member_root(members: &[Id]) -> Hash {
    if members.is_empty() {
        return Hash::default();
    }

    let mut level: Vec<Hash> = members.iter().map(|id| Hash::digest(id.as_bytes())).collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);

                DataHasher::new()
                    .update_fixed(pair[0].as_bytes())
                    .update_fixed(right.as_bytes())
                    .finalize()
            })
            .collect();
    }

    level[0]
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn members(n: usize) -> Vec<Id> {
        (0..n)
            .map(|i| Id::from_address(format!("miner-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_header_hash_covers_fields() {
        let header = GroupHeader::new("g".into(), None, None, 10, 15, 20, 120, &members(4));

        assert!(header.is_hash_valid());

        let mut changed = header.clone();
        changed.work_height = 21;

        assert!(!changed.is_hash_valid());

        let mut parented = header.clone();
        parented.parent_id = Some(members(1)[0]);

        assert_ne!(parented.gen_hash(), header.hash);
    }

    #[test]
    fn test_member_root_depends_on_order() {
        let mut ms = members(5);

        let root = member_root(&ms);

        ms.swap(0, 1);

        assert_ne!(member_root(&ms), root);
        assert_eq!(member_root(&[]), Hash::default());
    }

    #[test]
    fn test_validate_init_info() {
        let parent = SecretKey::from_seed(b"parent");
        let ms = members(4);

        let header = GroupHeader::new("g".into(), None, None, 10, 15, 20, 120, &ms);

        let info = GroupInitInfo {
            parent_sign: parent.sign(header.hash.as_bytes()),
            header,
            members: ms.clone(),
        };

        assert_eq!(info.validate(&parent.public_key()), Ok(()));

        let mut tampered = info.clone();
        tampered.members.pop();

        assert_eq!(
            tampered.validate(&parent.public_key()),
            Err(DKGError::MemberRootMismatch)
        );

        let other = SecretKey::from_seed(b"other").public_key();

        assert_eq!(
            info.validate(&other),
            Err(DKGError::RecoveredSignatureInvalid)
        );
    }

    #[test]
    fn test_sign_data_binds_the_hash() {
        let sk = SecretKey::from_seed(b"m");
        let id = Id::from_public_key(&sk.public_key());

        let sd = SignData::new(&sk, id, Hash::digest(b"payload"));

        assert!(sd.verify(&sk.public_key()));

        let mut forged = sd.clone();
        forged.data_hash = Hash::digest(b"other");

        assert!(!forged.verify(&sk.public_key()));
    }
}
