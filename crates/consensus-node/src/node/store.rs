use super::errors::NodeResult;
use super::types::{JoinedGroupInfo, JoinedGroupRecord};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use threshold_bls::ecies::{self, EciesCipher};
use threshold_bls::{Id, PublicKey, SecretKey};
use tracing::{debug, warn};

const SIGN_KEY_SUFFIX: &str = "_signKey";

const GROUP_INFO_SUFFIX: &str = "_gInfo";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> NodeResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> NodeResult<()>;

    fn delete(&self, key: &str) -> NodeResult<()>;

    fn keys(&self) -> NodeResult<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> NodeResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> NodeResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());

        Ok(())
    }

    fn delete(&self, key: &str) -> NodeResult<()> {
        self.entries.write().remove(key);

        Ok(())
    }

    fn keys(&self) -> NodeResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// One file per key under a directory. Keys are used as file names as is.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> NodeResult<Self> {
        let dir = dir.into();

        fs::create_dir_all(&dir)?;

        Ok(FileStore { dir })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> NodeResult<Option<Vec<u8>>> {
        let path = self.dir.join(key);

        if !path.exists() {
            return Ok(None);
        }

        Ok(Some(fs::read(path)?))
    }

    fn put(&self, key: &str, value: &[u8]) -> NodeResult<()> {
        let tmp = self.dir.join(format!("{}.tmp", key));

        fs::write(&tmp, value)?;
        fs::rename(tmp, self.dir.join(key))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> NodeResult<()> {
        let path = self.dir.join(key);

        if path.exists() {
            fs::remove_file(path)?;
        }

        Ok(())
    }

    fn keys(&self) -> NodeResult<Vec<String>> {
        let mut keys = vec![];

        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();

            if !name.ends_with(".tmp") {
                keys.push(name);
            }
        }

        keys.sort();

        Ok(keys)
    }
}

type Opener = Box<dyn Fn() -> NodeResult<Arc<dyn KeyValueStore>> + Send + Sync>;

/// Persists the groups this miner joined. The signing share is encrypted to
/// the miner's own public key. The backend is opened on first use.
pub struct JoinedGroupStore {
    backend: OnceCell<Arc<dyn KeyValueStore>>,
    opener: Opener,
    secret_key: SecretKey,
    joined: RwLock<HashMap<Id, JoinedGroupInfo>>,
}

fn sign_key_key(group_id: &Id) -> String {
    format!("{}{}", group_id.to_hex(), SIGN_KEY_SUFFIX)
}

fn group_info_key(group_id: &Id) -> String {
    format!("{}{}", group_id.to_hex(), GROUP_INFO_SUFFIX)
}

impl JoinedGroupStore {
    pub fn new<F>(secret_key: SecretKey, opener: F) -> Self
    where
        F: Fn() -> NodeResult<Arc<dyn KeyValueStore>> + Send + Sync + 'static,
    {
        JoinedGroupStore {
            backend: OnceCell::new(),
            opener: Box::new(opener),
            secret_key,
            joined: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory(secret_key: SecretKey) -> Self {
        JoinedGroupStore::new(secret_key, || {
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>)
        })
    }

    pub fn with_backend(secret_key: SecretKey, backend: Arc<dyn KeyValueStore>) -> Self {
        JoinedGroupStore::new(secret_key, move || Ok(backend.clone()))
    }

    fn backend(&self) -> NodeResult<&Arc<dyn KeyValueStore>> {
        self.backend.get_or_try_init(|| (self.opener)())
    }

    fn persist(&self, info: &JoinedGroupInfo) -> NodeResult<()> {
        let backend = self.backend()?;

        let cipher = ecies::encrypt(
            &self.secret_key.public_key(),
            &info.sign_secret.to_bytes(),
            &mut rand::thread_rng(),
        )?;

        backend.put(&sign_key_key(&info.group_id), &bincode::serialize(&cipher)?)?;
        backend.put(
            &group_info_key(&info.group_id),
            &bincode::serialize(&info.record())?,
        )?;

        Ok(())
    }

    pub fn save(&self, info: JoinedGroupInfo) -> NodeResult<()> {
        self.persist(&info)?;

        debug!(group = ?info.group_id, "joined group saved");

        self.joined.write().insert(info.group_id, info);

        Ok(())
    }

    fn load(&self, group_id: &Id) -> NodeResult<Option<JoinedGroupInfo>> {
        let backend = self.backend()?;

        let (sign_key, record) = match (
            backend.get(&sign_key_key(group_id))?,
            backend.get(&group_info_key(group_id))?,
        ) {
            (Some(sign_key), Some(record)) => (sign_key, record),
            _ => return Ok(None),
        };

        let cipher: EciesCipher = bincode::deserialize(&sign_key)?;

        let plain = ecies::decrypt(&self.secret_key, &cipher)?;

        let record: JoinedGroupRecord = bincode::deserialize(&record)?;

        Ok(Some(record.with_secret(SecretKey::from_bytes(&plain)?)))
    }

    /// From memory, falling back to the backend.
    pub fn get(&self, group_id: &Id) -> Option<JoinedGroupInfo> {
        if let Some(info) = self.joined.read().get(group_id) {
            return Some(info.clone());
        }

        match self.load(group_id) {
            Ok(Some(info)) => {
                self.joined.write().insert(*group_id, info.clone());

                Some(info)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(group = ?group_id, "could not load joined group: {}", e);

                None
            }
        }
    }

    pub fn is_joined(&self, group_id: &Id) -> bool {
        self.get(group_id).is_some()
    }

    /// Returns `true` when the key was new.
    pub fn add_member_sign_pk(
        &self,
        group_id: &Id,
        member: Id,
        sign_pk: PublicKey,
    ) -> NodeResult<bool> {
        // pulls the record into memory if it only lives in the backend
        if self.get(group_id).is_none() {
            return Ok(false);
        }

        // held across persist: additions for one group are serialized
        let mut joined = self.joined.write();

        let info = match joined.get_mut(group_id) {
            Some(info) => info,
            None => return Ok(false),
        };

        if info.member_sign_pks.contains_key(&member) {
            return Ok(false);
        }

        let mut updated = info.clone();

        updated.member_sign_pks.insert(member, sign_pk);

        self.persist(&updated)?;

        *info = updated;

        Ok(true)
    }

    pub fn remove(&self, group_id: &Id) -> NodeResult<()> {
        self.joined.write().remove(group_id);

        let backend = self.backend()?;

        backend.delete(&sign_key_key(group_id))?;
        backend.delete(&group_info_key(group_id))?;

        Ok(())
    }

    /// Every group with both records present in the backend.
    pub fn load_all(&self) -> NodeResult<Vec<JoinedGroupInfo>> {
        let ids: Vec<Id> = self
            .backend()?
            .keys()?
            .iter()
            .filter_map(|k| k.strip_suffix(GROUP_INFO_SUFFIX))
            .filter_map(|hex| Id::from_hex(hex).ok())
            .collect();

        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use threshold_bls::Hash;

    fn joined(seed: &[u8]) -> JoinedGroupInfo {
        let group_sk = SecretKey::from_seed(seed);
        let sign_secret = SecretKey::from_seed(&[seed, &b"-share"[..]].concat());

        let mut member_sign_pks = BTreeMap::new();
        member_sign_pks.insert(Id::from_address(b"me"), sign_secret.public_key());

        JoinedGroupInfo {
            group_id: Id::from_public_key(&group_sk.public_key()),
            group_hash: Hash::digest(seed),
            group_pk: group_sk.public_key(),
            sign_secret,
            member_sign_pks,
        }
    }

    #[test]
    fn test_records_survive_a_restart() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let owner = SecretKey::from_seed(b"owner");

        let info = joined(b"g1");

        let store = JoinedGroupStore::with_backend(owner.clone(), backend.clone());

        store.save(info.clone()).unwrap();

        assert!(backend
            .get(&format!("{}_signKey", info.group_id.to_hex()))
            .unwrap()
            .is_some());

        let reopened = JoinedGroupStore::with_backend(owner, backend);

        assert_eq!(reopened.get(&info.group_id), Some(info.clone()));
        assert_eq!(reopened.load_all().unwrap(), vec![info]);
    }

    #[test]
    fn test_sign_key_is_not_stored_in_clear() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let info = joined(b"g1");

        JoinedGroupStore::with_backend(SecretKey::from_seed(b"owner"), backend.clone())
            .save(info.clone())
            .unwrap();

        let raw = backend
            .get(&format!("{}_signKey", info.group_id.to_hex()))
            .unwrap()
            .unwrap();

        let secret = info.sign_secret.to_bytes();

        assert!(!raw.windows(secret.len()).any(|w| w == secret));

        let stranger = JoinedGroupStore::with_backend(SecretKey::from_seed(b"stranger"), backend);

        assert_eq!(stranger.get(&info.group_id), None);
    }

    #[test]
    fn test_member_sign_pks_and_removal() {
        let store = JoinedGroupStore::in_memory(SecretKey::from_seed(b"owner"));

        let info = joined(b"g1");

        store.save(info.clone()).unwrap();

        let other = SecretKey::from_seed(b"other").public_key();

        assert!(store
            .add_member_sign_pk(&info.group_id, Id::from_address(b"other"), other)
            .unwrap());
        assert!(!store
            .add_member_sign_pk(&info.group_id, Id::from_address(b"other"), other)
            .unwrap());

        assert_eq!(
            store
                .get(&info.group_id)
                .and_then(|i| i.member_sign_pk(&Id::from_address(b"other"))),
            Some(other)
        );

        store.remove(&info.group_id).unwrap();

        assert!(!store.is_joined(&info.group_id));
    }

    #[test]
    fn test_concurrent_sign_pks_are_all_kept() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let owner = SecretKey::from_seed(b"owner");

        let info = joined(b"g1");

        let store = Arc::new(JoinedGroupStore::with_backend(owner.clone(), backend.clone()));

        store.save(info.clone()).unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                let group_id = info.group_id;

                std::thread::spawn(move || {
                    let member = Id::from_address(&[i]);
                    let pk = SecretKey::from_seed(&[b'm', i]).public_key();

                    store.add_member_sign_pk(&group_id, member, pk).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert_eq!(store.get(&info.group_id).unwrap().member_sign_pks.len(), 9);

        let reopened = JoinedGroupStore::with_backend(owner, backend);

        assert_eq!(reopened.get(&info.group_id).unwrap().member_sign_pks.len(), 9);
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::open(dir.path()).unwrap();

        store.put("a_gInfo", b"1").unwrap();
        store.put("b_signKey", b"2").unwrap();

        assert_eq!(store.get("a_gInfo").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["a_gInfo", "b_signKey"]);

        store.delete("a_gInfo").unwrap();

        assert_eq!(store.get("a_gInfo").unwrap(), None);

        let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());

        let owner = SecretKey::from_seed(b"owner");
        let info = joined(b"g2");

        JoinedGroupStore::with_backend(owner.clone(), backend.clone())
            .save(info.clone())
            .unwrap();

        assert_eq!(
            JoinedGroupStore::with_backend(owner, backend).get(&info.group_id),
            Some(info)
        );
    }
}
