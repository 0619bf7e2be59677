use crate::error::BLSResult;
use crate::id::Id;
use crate::keys::Signature;
use crate::sig::recover_group_signature;
use std::collections::BTreeMap;

/// Collects partial signatures until the threshold is reached, then recovers
/// the group signature exactly once.
#[derive(Debug, Clone)]
pub struct GroupSignGenerator {
    threshold: usize,
    witnesses: BTreeMap<Id, Signature>,
    group_sign: Option<Signature>,
}

impl GroupSignGenerator {
    pub fn new(threshold: usize) -> Self {
        GroupSignGenerator {
            threshold,
            witnesses: BTreeMap::new(),
            group_sign: None,
        }
    }

    /// Returns `true` only on the call that triggers recovery. Duplicates and
    /// additions after recovery are ignored.
    pub fn add_witness(&mut self, id: Id, signature: Signature) -> BLSResult<bool> {
        if self.group_sign.is_some() || self.witnesses.contains_key(&id) {
            return Ok(false);
        }

        self.witnesses.insert(id, signature);

        if self.witnesses.len() < self.threshold {
            return Ok(false);
        }

        let recovered = recover_group_signature(&self.witnesses, self.threshold)?;

        if !recovered.is_valid() {
            panic!("recovered group signature is the identity point");
        }

        self.group_sign = Some(recovered);

        Ok(true)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn witness_size(&self) -> usize {
        self.witnesses.len()
    }

    pub fn has_witness(&self, id: &Id) -> bool {
        self.witnesses.contains_key(id)
    }

    pub fn witnesses(&self) -> &BTreeMap<Id, Signature> {
        &self.witnesses
    }

    pub fn is_recovered(&self) -> bool {
        self.group_sign.is_some()
    }

    pub fn group_sign(&self) -> Option<&Signature> {
        self.group_sign.as_ref()
    }
}
